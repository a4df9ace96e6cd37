//! Get-or-create for the single vector store this deployment writes to.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use docbridge_core::store::StoreHandle;
use tokio::sync::Mutex;

use crate::upstream::{UpstreamError, VectorStoreApi};

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("failed to access store handle state at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store handle state at {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("could not load the persisted store handle: {0}")]
    Load(#[source] StateStoreError),
    #[error("vector store creation failed: {0}")]
    Create(#[source] UpstreamError),
    #[error("vector store was created but could not be persisted: {0}")]
    Persist(#[source] StateStoreError),
}

impl ProvisioningError {
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            ProvisioningError::Create(err) => Some(err),
            _ => None,
        }
    }
}

/// Single-key persistence for the store handle.
#[async_trait]
pub trait HandleStore: Send + Sync {
    async fn load(&self) -> Result<Option<StoreHandle>, StateStoreError>;
    async fn save(&self, handle: &StoreHandle) -> Result<(), StateStoreError>;
}

/// JSON file on local disk. Writes go to a sibling temp file and are renamed
/// into place, so a crash mid-write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct FileHandleStore {
    path: PathBuf,
}

impl FileHandleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StateStoreError {
        StateStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl HandleStore for FileHandleStore {
    async fn load(&self) -> Result<Option<StoreHandle>, StateStoreError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        if data.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|source| StateStoreError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    async fn save(&self, handle: &StoreHandle) -> Result<(), StateStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let data = serde_json::to_vec_pretty(handle).map_err(|source| StateStoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }
}

/// Process-local stand-in, used by tests and throwaway deployments.
#[derive(Debug, Default)]
pub struct MemoryHandleStore {
    slot: StdMutex<Option<StoreHandle>>,
}

impl MemoryHandleStore {
    pub fn with_handle(handle: StoreHandle) -> Self {
        Self {
            slot: StdMutex::new(Some(handle)),
        }
    }
}

#[async_trait]
impl HandleStore for MemoryHandleStore {
    async fn load(&self) -> Result<Option<StoreHandle>, StateStoreError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save(&self, handle: &StoreHandle) -> Result<(), StateStoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
        Ok(())
    }
}

pub struct StoreHandleCache {
    state: Arc<dyn HandleStore>,
    api: Arc<dyn VectorStoreApi>,
    store_name: String,
    // Serialises load-or-create within this process; other processes sharing
    // the same state file can still race.
    provisioning: Mutex<()>,
}

impl StoreHandleCache {
    pub fn new(
        state: Arc<dyn HandleStore>,
        api: Arc<dyn VectorStoreApi>,
        store_name: impl Into<String>,
    ) -> Self {
        Self {
            state,
            api,
            store_name: store_name.into(),
            provisioning: Mutex::new(()),
        }
    }

    /// Persisted handle if one is usable, otherwise a freshly created store.
    pub async fn get_or_create(&self) -> Result<StoreHandle, ProvisioningError> {
        let _guard = self.provisioning.lock().await;

        match self.state.load().await {
            Ok(Some(handle)) if handle.is_usable() => return Ok(handle),
            Ok(Some(_)) => {
                tracing::warn!(
                    event = "store_handle_unusable",
                    "Persisted store handle has an empty id; provisioning a new store"
                );
            }
            Ok(None) => {}
            Err(err @ StateStoreError::Corrupt { .. }) => {
                tracing::warn!(
                    event = "store_handle_corrupt",
                    error = %err,
                    "Persisted store handle is unreadable; provisioning a new store"
                );
            }
            Err(err) => return Err(ProvisioningError::Load(err)),
        }

        let id = self
            .api
            .create_vector_store(&self.store_name)
            .await
            .map_err(|err| {
                tracing::error!(
                    event = "vector_store_create_failed",
                    store_name = %self.store_name,
                    status = ?err.status(),
                    error = %err,
                    "Vector store creation failed"
                );
                ProvisioningError::Create(err)
            })?;

        let handle = StoreHandle::new(id, self.store_name.clone());
        self.state
            .save(&handle)
            .await
            .map_err(ProvisioningError::Persist)?;

        tracing::info!(
            event = "vector_store_provisioned",
            vector_store_id = %handle.id,
            store_name = %handle.name,
            "Provisioned and persisted a new vector store"
        );
        Ok(handle)
    }
}
