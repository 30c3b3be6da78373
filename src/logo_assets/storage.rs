//! Durable bytes by key
//!
//! The backend is chosen once at startup from `storage.backend` and never
//! changes for the lifetime of the process.

pub mod local;
pub mod remote;

pub use local::LocalStorage;
pub use remote::RemoteStorage;

use uuid::Uuid;

use crate::config::{BackendKind, Config};
use crate::errors::{AppResult, StorageResult};
use crate::models::{DeleteOutcome, Descriptor, OutputFormat};

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Local(LocalStorage),
    Remote(RemoteStorage),
}

impl StorageBackend {
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        match config.storage.backend {
            BackendKind::Local => {
                let storage = LocalStorage::new(config.storage.local_path.clone());
                storage.ensure_storage_dir().await?;
                Ok(Self::Local(storage))
            }
            BackendKind::Remote => Ok(Self::Remote(RemoteStorage::new(&config.remote)?)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Local(_) => BackendKind::Local,
            Self::Remote(_) => BackendKind::Remote,
        }
    }

    /// Fresh key for a new upload; every upload gets its own key
    pub fn generate_key(&self, format: OutputFormat) -> String {
        match self {
            Self::Local(_) => format!("{}.{}", Uuid::new_v4(), format.extension()),
            Self::Remote(remote) => remote.generate_key(),
        }
    }

    /// Store `bytes` under `key`, replacing anything already there
    pub async fn put(&self, key: &str, bytes: &[u8], format: OutputFormat) -> StorageResult<Descriptor> {
        match self {
            Self::Local(local) => local.put(key, bytes).await,
            Self::Remote(remote) => remote.put(key, bytes, format).await,
        }
    }

    /// Bytes stored under `key`; the remote host needs `format` to build the
    /// delivery URL
    pub async fn get(&self, key: &str, format: OutputFormat) -> StorageResult<Vec<u8>> {
        match self {
            Self::Local(local) => local.get(key).await,
            Self::Remote(remote) => remote.get(key, format).await,
        }
    }

    /// Remove `key`; an absent key is reported as `Missing`, not an error
    pub async fn delete(&self, key: &str) -> StorageResult<DeleteOutcome> {
        match self {
            Self::Local(local) => local.delete(key).await,
            Self::Remote(remote) => remote.delete(key).await,
        }
    }
}
