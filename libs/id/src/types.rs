//! Resource identity type.

use std::fmt;
use std::str::FromStr;

use crate::IdError;

/// Maximum length of a namespace (DNS label).
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Maximum length of a name (DNS subdomain).
pub const MAX_NAME_LEN: usize = 253;

/// Namespace used when a manifest leaves it out.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity of one managed resource: `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    namespace: String,
    name: String,
}

impl ResourceId {
    /// Creates an identity from its parts, validating both.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, IdError> {
        let namespace = namespace.into();
        let name = name.into();

        validate_segment(&namespace, MAX_NAMESPACE_LEN).map_err(|reason| {
            IdError::InvalidNamespace {
                value: namespace.clone(),
                reason,
            }
        })?;
        validate_segment(&name, MAX_NAME_LEN).map_err(|reason| IdError::InvalidName {
            value: name.clone(),
            reason,
        })?;

        Ok(Self { namespace, name })
    }

    /// Parses an identity from its canonical `namespace/name` form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let Some((namespace, name)) = s.split_once('/') else {
            return Err(IdError::MissingSeparator(s.to_string()));
        };

        Self::new(namespace, name)
    }

    /// The namespace part.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The name part.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Checks one identity segment. Returns the reason on failure.
fn validate_segment(value: &str, max_len: usize) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err("must not be empty");
    }
    if value.len() > max_len {
        return Err("too long");
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err("must contain only lowercase alphanumerics, '-' or '.'");
    }

    let bytes = value.as_bytes();
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !bytes.first().is_some_and(alnum) || !bytes.last().is_some_and(alnum) {
        return Err("must start and end with an alphanumeric character");
    }

    Ok(())
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ResourceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ResourceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
