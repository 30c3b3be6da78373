use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::errors::{StorageError, StorageResult};
use crate::models::{DeleteOutcome, Descriptor};
use crate::utils::fs::write_atomic;

/// Logo bytes kept as files under a single directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_storage_dir(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))
    }

    /// Map a key onto a path inside the storage root.
    ///
    /// Keys are relative paths; anything that could escape the root is
    /// rejected before the filesystem is touched.
    pub fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::invalid_key(key, "key is empty"));
        }
        if key.contains('\0') {
            return Err(StorageError::invalid_key(key, "key contains NUL"));
        }
        if key.starts_with('/') || key.starts_with('\\') || Path::new(key).is_absolute() {
            return Err(StorageError::invalid_key(key, "key must be relative"));
        }

        for component in Path::new(key).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(StorageError::invalid_key(key, "key must not contain '..'"));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::invalid_key(key, "key must be relative"));
                }
            }
        }
        if key.split(['/', '\\']).any(|part| part == "..") {
            return Err(StorageError::invalid_key(key, "key must not contain '..'"));
        }

        Ok(self.root.join(key))
    }

    pub async fn put(&self, key: &str, bytes: &[u8]) -> StorageResult<Descriptor> {
        let path = self.resolve(key)?;
        let data = bytes.to_vec();
        let target = path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&target, &data))
            .await
            .map_err(|e| StorageError::io(&path, std::io::Error::other(e)))?
            .map_err(|e| StorageError::io(&path, e))?;

        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(Descriptor {
            key: key.to_string(),
            url: None,
        })
    }

    pub async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    pub async fn delete(&self, key: &str) -> StorageResult<DeleteOutcome> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DeleteOutcome::Missing),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }
}
