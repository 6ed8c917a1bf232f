//! Read-only access to lamp resources.
//!
//! The reconciler only ever reads through [`ResourceStore`]. Where the
//! resources come from is up to the bootstrap code; [`MemoryStore`] holds
//! them in memory and can be seeded from a JSON manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lamp_id::{IdError, ResourceId};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::resource::Lamp;

/// Resource store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The resource does not exist (deleted or never created).
    #[error("resource not found: {0}")]
    NotFound(ResourceId),

    /// The store could not answer.
    #[error("resource store unavailable: {0}")]
    Unavailable(String),

    /// The lamp carries an invalid identity.
    #[error("invalid lamp identity: {0}")]
    InvalidIdentity(#[from] IdError),

    /// A manifest could not be loaded.
    #[error("invalid manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },
}

impl StoreError {
    /// Returns true if the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Resource-read capability consumed by the reconciler.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Read one resource by identity.
    async fn get(&self, id: &ResourceId) -> Result<Lamp, StoreError>;

    /// List all known identities.
    async fn list(&self) -> Result<Vec<ResourceId>, StoreError>;
}

/// In-memory resource store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    lamps: RwLock<BTreeMap<ResourceId, Lamp>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON manifest holding an array of lamps.
    pub fn from_manifest(path: &Path) -> Result<Self, StoreError> {
        let manifest_error = |reason: String| StoreError::Manifest {
            path: path.to_path_buf(),
            reason,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
        let lamps: Vec<Lamp> =
            serde_json::from_str(&raw).map_err(|e| manifest_error(e.to_string()))?;

        let mut by_id = BTreeMap::new();
        for lamp in lamps {
            let id = lamp.id().map_err(|e| manifest_error(e.to_string()))?;
            if by_id.contains_key(&id) {
                return Err(manifest_error(format!("duplicate resource {id}")));
            }
            by_id.insert(id, lamp);
        }

        debug!(path = %path.display(), count = by_id.len(), "Loaded lamp manifest");

        Ok(Self {
            lamps: RwLock::new(by_id),
        })
    }

    /// Insert or replace a lamp.
    pub async fn insert(&self, lamp: Lamp) -> Result<(), StoreError> {
        let id = lamp.id()?;
        self.lamps.write().await.insert(id, lamp);
        Ok(())
    }

    /// Remove a lamp, returning it if it existed.
    pub async fn remove(&self, id: &ResourceId) -> Option<Lamp> {
        self.lamps.write().await.remove(id)
    }

    /// Number of lamps held.
    pub async fn len(&self) -> usize {
        self.lamps.read().await.len()
    }

    /// Returns true if the store holds no lamps.
    pub async fn is_empty(&self) -> bool {
        self.lamps.read().await.is_empty()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, id: &ResourceId) -> Result<Lamp, StoreError> {
        self.lamps
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn list(&self) -> Result<Vec<ResourceId>, StoreError> {
        Ok(self.lamps.read().await.keys().cloned().collect())
    }
}
