//! The Lamp resource: declared desired state for one managed device.

use lamp_id::{IdError, ResourceId, DEFAULT_NAMESPACE};
use serde::{Deserialize, Serialize};

/// A lamp resource as it appears in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lamp {
    pub metadata: ObjectMeta,
    pub spec: LampSpec,
}

/// Identity fields of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
}

/// Desired state of a lamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LampSpec {
    /// Network address of the device (`host` or `host:port`).
    pub host: String,

    /// Target color. An opaque token, compared byte for byte.
    pub color: String,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Lamp {
    /// Build a lamp from its parts.
    pub fn new(id: &ResourceId, host: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                namespace: id.namespace().to_string(),
                name: id.name().to_string(),
            },
            spec: LampSpec {
                host: host.into(),
                color: color.into(),
            },
        }
    }

    /// The resource identity.
    pub fn id(&self) -> Result<ResourceId, IdError> {
        ResourceId::new(self.metadata.namespace.as_str(), self.metadata.name.as_str())
    }

    /// Network address of the device.
    pub fn host(&self) -> &str {
        &self.spec.host
    }

    /// The color the device should show.
    pub fn desired_color(&self) -> &str {
        &self.spec.color
    }
}
