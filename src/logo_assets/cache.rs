//! Read-through byte cache in front of the remote backend
//!
//! Entries are named `{id}_{hash}.{ext}` where `hash` is derived from the
//! record's storage key. A reupload always changes the key, so a stale entry
//! can never be served for the new bytes even before it is invalidated.

use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::registry::LogoRegistry;
use super::storage::StorageBackend;
use crate::errors::{AppError, AppResult, StorageError};
use crate::models::{LogoBytes, LogoId, LogoRecord};
use crate::utils::fs::write_atomic;

#[derive(Debug, Clone)]
pub struct LogoCache {
    dir: PathBuf,
    registry: Arc<LogoRegistry>,
    backend: StorageBackend,
}

impl LogoCache {
    pub fn new(dir: PathBuf, registry: Arc<LogoRegistry>, backend: StorageBackend) -> Self {
        Self {
            dir,
            registry,
            backend,
        }
    }

    pub async fn ensure_cache_dir(&self) -> AppResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?;
        Ok(())
    }

    pub fn entry_path(&self, record: &LogoRecord) -> PathBuf {
        let digest = hex::encode(Sha256::digest(record.storage_key.as_bytes()));
        self.dir.join(format!(
            "{}_{}.{}",
            record.id,
            &digest[..16],
            record.format.extension()
        ))
    }

    /// Bytes of the current version of `id`, from disk when possible
    pub async fn fetch(&self, id: LogoId) -> AppResult<LogoBytes> {
        let record = self
            .registry
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("logo", id))?;
        let path = self.entry_path(&record);

        match fs::read(&path).await {
            Ok(bytes) => {
                debug!("Cache hit for logo {} ({})", id, path.display());
                return Ok(LogoBytes {
                    record,
                    bytes,
                    from_cache: true,
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Ignoring unreadable cache entry {}: {}", path.display(), e),
        }

        debug!("Cache miss for logo {}, fetching {}", id, record.storage_key);
        let (record, bytes) = read_current_bytes(&self.registry, &self.backend, record).await?;
        let path = self.entry_path(&record);

        // Best effort: the caller gets the bytes either way
        let contents = bytes.clone();
        let target = path.clone();
        match tokio::task::spawn_blocking(move || write_atomic(&target, &contents)).await {
            Ok(Ok(())) => debug!("Cached logo {} at {}", id, path.display()),
            Ok(Err(e)) => warn!("Failed to cache logo {} at {}: {}", id, path.display(), e),
            Err(e) => warn!("Cache write task for logo {} failed: {}", id, e),
        }

        Ok(LogoBytes {
            record,
            bytes,
            from_cache: false,
        })
    }

    /// Remove every entry for `id`, returning how many were removed
    pub async fn invalidate(&self, id: LogoId) -> usize {
        let prefix = format!("{id}_");
        let removed = self.remove_matching(|name| name.starts_with(&prefix)).await;
        if removed > 0 {
            debug!("Invalidated {} cache entries for logo {}", removed, id);
        }
        removed
    }

    /// Remove every cache entry
    pub async fn clear_all(&self) -> AppResult<usize> {
        if !fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Ok(0);
        }
        let removed = self.remove_matching(|_| true).await;
        info!("Cleared {} cached logos from {}", removed, self.dir.display());
        Ok(removed)
    }

    async fn remove_matching<F>(&self, matches: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!("Failed to read cache directory {}: {}", self.dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read cache directory {}: {}", self.dir.display(), e);
                    break;
                }
            };

            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !matches(name) {
                continue;
            }
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => {}
                _ => continue,
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                // Removed concurrently by another worker
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove cache entry {}: {}", entry.path().display(), e),
            }
        }
        removed
    }
}

/// How many times a read follows a record to a newer key
const KEY_FOLLOW_LIMIT: usize = 4;

/// Backend bytes for `record`.
///
/// A reupload commits its new key and only then deletes the old bytes, so a
/// reader holding the previous record can find its key gone. In that case
/// the record is resolved again and the read follows it to the current key.
/// Bytes missing under the key the registry still holds are a dangling
/// record and are reported as such.
pub(crate) async fn read_current_bytes(
    registry: &LogoRegistry,
    backend: &StorageBackend,
    mut record: LogoRecord,
) -> AppResult<(LogoRecord, Vec<u8>)> {
    for _ in 0..KEY_FOLLOW_LIMIT {
        let key = match backend.get(&record.storage_key, record.format).await {
            Ok(bytes) => return Ok((record, bytes)),
            Err(StorageError::NotFound { key }) => key,
            Err(e) => return Err(e.into()),
        };

        match registry.get(record.id).await? {
            Some(current) if current.storage_key != record.storage_key => {
                debug!(
                    "Logo {} moved from {} to {} during read",
                    record.id, record.storage_key, current.storage_key
                );
                record = current;
            }
            Some(_) => {
                error!("Logo {} points at missing bytes {}", record.id, key);
                return Err(StorageError::NotFound { key }.into());
            }
            None => return Err(AppError::not_found("logo", record.id)),
        }
    }

    warn!(
        "Logo {} kept changing while being read, giving up at {}",
        record.id, record.storage_key
    );
    Err(StorageError::not_found(record.storage_key).into())
}
