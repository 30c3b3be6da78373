//! Metadata registry: the durable mapping from logo id to stored asset
//!
//! The registry is one JSON document, `{"next_id": n, "logos": [...]}`, that
//! is rewritten atomically on every mutation. Several worker processes may
//! share the document, so writers serialize on an in-process mutex and then on
//! an exclusive lock file next to the document, and always re-read the file
//! under the lock before applying their change. Readers never lock; they
//! answer from the last committed snapshot and reload it when the file's
//! modification stamp shows another process committed since.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::errors::{RegistryError, RegistryResult};
use crate::models::{LogoId, LogoRecord, NewLogo, OutputFormat};
use crate::utils::fs::{FileLock, write_atomic};

/// On-disk document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    /// Next id to hand out; only ever grows, so ids are never reused
    pub next_id: LogoId,
    pub logos: Vec<LogoRecord>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            next_id: 1,
            logos: Vec::new(),
        }
    }
}

impl RegistryDocument {
    fn normalize(&mut self) {
        self.logos.sort_by_key(|record| record.id);
        let floor = self.logos.last().map(|record| record.id + 1).unwrap_or(1);
        self.next_id = self.next_id.max(floor);
    }

    fn position(&self, id: LogoId) -> Option<usize> {
        self.logos.binary_search_by_key(&id, |record| record.id).ok()
    }
}

/// Entry of the flat array written by earlier releases
#[derive(Debug, Deserialize)]
struct LegacyRecord {
    id: LogoId,
    public_id: String,
    #[serde(default)]
    original_name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredDocument {
    Current(RegistryDocument),
    Legacy(Vec<LegacyRecord>),
}

impl From<StoredDocument> for RegistryDocument {
    fn from(stored: StoredDocument) -> Self {
        let mut document = match stored {
            StoredDocument::Current(document) => document,
            StoredDocument::Legacy(records) => {
                let now = Utc::now();
                RegistryDocument {
                    next_id: 1,
                    logos: records
                        .into_iter()
                        .map(|legacy| LogoRecord {
                            id: legacy.id,
                            original_name: legacy.original_name,
                            storage_key: legacy.public_id,
                            url: legacy.url,
                            format: OutputFormat::Png,
                            created_at: now,
                            updated_at: now,
                        })
                        .collect(),
                }
            }
        };
        document.normalize();
        document
    }
}

/// Cheap change detector for the document file. Every commit renames a
/// fresh file into place, so the inode changes even when a same-length
/// commit lands within the filesystem's mtime granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
    inode: Option<u64>,
}

impl FileStamp {
    fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        let inode = {
            use std::os::unix::fs::MetadataExt;
            Some(metadata.ino())
        };
        #[cfg(not(unix))]
        let inode = None;

        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            inode,
        }
    }
}

/// Parsed document file
#[derive(Debug)]
struct LoadedDocument {
    document: RegistryDocument,
    stamp: FileStamp,
    /// Read from the legacy array layout; not yet written back
    migrated: bool,
}

#[derive(Debug)]
struct Snapshot {
    document: Arc<RegistryDocument>,
    stamp: Option<FileStamp>,
}

#[derive(Debug)]
pub struct LogoRegistry {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    lock_retries: u32,
    writer: Mutex<()>,
    snapshot: RwLock<Snapshot>,
}

impl LogoRegistry {
    pub async fn from_config(config: &StorageConfig) -> RegistryResult<Self> {
        Self::open(
            config.registry_path.clone(),
            config.lock_timeout,
            config.lock_retries,
        )
        .await
    }

    /// Load the document, creating an empty one when none exists yet.
    ///
    /// A document that exists but cannot be parsed is an error: starting
    /// with an empty registry would orphan every stored asset.
    pub async fn open(path: PathBuf, lock_timeout: Duration, lock_retries: u32) -> RegistryResult<Self> {
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");

        let registry = Self {
            lock_path: PathBuf::from(lock_path),
            path,
            lock_timeout,
            lock_retries,
            writer: Mutex::new(()),
            snapshot: RwLock::new(Snapshot {
                document: Arc::new(RegistryDocument::default()),
                stamp: None,
            }),
        };

        match read_document(&registry.path).await? {
            Some(loaded) if loaded.migrated => {
                info!(
                    "Migrating legacy registry {} with {} logos",
                    registry.path.display(),
                    loaded.document.logos.len()
                );
                // Written once so every worker agrees on the migrated timestamps
                registry.mutate(|_| ((), true)).await?;
            }
            Some(loaded) => {
                info!(
                    "Loaded registry {} with {} logos (next id {})",
                    registry.path.display(),
                    loaded.document.logos.len(),
                    loaded.document.next_id
                );
                *registry.snapshot.write().await = Snapshot {
                    document: Arc::new(loaded.document),
                    stamp: Some(loaded.stamp),
                };
            }
            None => {
                info!("Creating empty registry at {}", registry.path.display());
                // Commits an unchanged document, which writes the file
                registry.mutate(|_| ((), true)).await?;
            }
        }

        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Assign the next id and insert the record built for it
    pub async fn create_with<F>(&self, build: F) -> RegistryResult<LogoRecord>
    where
        F: FnOnce(LogoId) -> NewLogo,
    {
        self.mutate(|document| {
            let id = document.next_id;
            document.next_id += 1;

            let new = build(id);
            let now = Utc::now();
            let record = LogoRecord {
                id,
                original_name: new.original_name,
                storage_key: new.storage_key,
                url: new.url,
                format: new.format,
                created_at: now,
                updated_at: now,
            };
            document.logos.push(record.clone());
            (record, true)
        })
        .await
    }

    pub async fn create(&self, new: NewLogo) -> RegistryResult<LogoRecord> {
        self.create_with(|_| new).await
    }

    /// Apply `mutator` to an existing record and bump `updated_at`.
    ///
    /// Returns `None` without writing when the id is unknown.
    pub async fn update<F>(&self, id: LogoId, mutator: F) -> RegistryResult<Option<LogoRecord>>
    where
        F: FnOnce(&mut LogoRecord),
    {
        self.mutate(|document| match document.position(id) {
            Some(index) => {
                let record = &mut document.logos[index];
                mutator(record);
                record.id = id;
                record.updated_at = Utc::now();
                (Some(record.clone()), true)
            }
            None => (None, false),
        })
        .await
    }

    /// Remove a record; `None` when it was not there
    pub async fn delete(&self, id: LogoId) -> RegistryResult<Option<LogoRecord>> {
        self.mutate(|document| match document.position(id) {
            Some(index) => (Some(document.logos.remove(index)), true),
            None => (None, false),
        })
        .await
    }

    /// Put back a record removed by [`delete`](Self::delete), keeping its id.
    ///
    /// Used to roll back a delete whose backend step failed. An existing
    /// record with the same id is left untouched.
    pub async fn restore(&self, record: LogoRecord) -> RegistryResult<()> {
        self.mutate(|document| {
            if document.position(record.id).is_some() {
                warn!("Not restoring logo {}: id is already present", record.id);
                return ((), false);
            }
            document.next_id = document.next_id.max(record.id + 1);
            document.logos.push(record);
            document.normalize();
            ((), true)
        })
        .await
    }

    pub async fn get(&self, id: LogoId) -> RegistryResult<Option<LogoRecord>> {
        let document = self.current().await?;
        Ok(document
            .position(id)
            .map(|index| document.logos[index].clone()))
    }

    /// All records ordered by id
    pub async fn list(&self) -> RegistryResult<Vec<LogoRecord>> {
        Ok(self.current().await?.logos.clone())
    }

    /// Latest committed document, reloaded if another writer changed the file
    async fn current(&self) -> RegistryResult<Arc<RegistryDocument>> {
        let stamp = file_stamp(&self.path).await?;
        {
            let snapshot = self.snapshot.read().await;
            if snapshot.stamp == stamp {
                return Ok(snapshot.document.clone());
            }
        }

        debug!("Registry {} changed on disk, reloading", self.path.display());
        let (document, stamp) = match read_document(&self.path).await? {
            Some(loaded) => (loaded.document, Some(loaded.stamp)),
            None => (RegistryDocument::default(), None),
        };

        let document = Arc::new(document);
        let mut snapshot = self.snapshot.write().await;
        *snapshot = Snapshot {
            document: document.clone(),
            stamp,
        };
        Ok(document)
    }

    /// Run one read-modify-write cycle under both writer locks.
    ///
    /// `change` returns its result and whether the document must be written.
    async fn mutate<T, F>(&self, change: F) -> RegistryResult<T>
    where
        F: FnOnce(&mut RegistryDocument) -> (T, bool),
    {
        let _writer = self.writer.lock().await;
        let _file_lock = FileLock::acquire(&self.lock_path, self.lock_timeout, self.lock_retries)
            .await
            .map_err(|e| RegistryError::io(&self.lock_path, e))?
            .ok_or_else(|| RegistryError::LockTimeout {
                path: self.lock_path.clone(),
                attempts: self.lock_retries.max(1),
            })?;

        let (mut document, stamp, migrated) = match read_document(&self.path).await? {
            Some(loaded) => (loaded.document, Some(loaded.stamp), loaded.migrated),
            None => (RegistryDocument::default(), None, false),
        };

        let (result, dirty) = change(&mut document);
        let dirty = dirty || migrated;

        let stamp = if dirty {
            let contents = serde_json::to_vec_pretty(&document)?;
            let path = self.path.clone();
            tokio::task::spawn_blocking(move || write_atomic(&path, &contents))
                .await
                .map_err(|e| RegistryError::io(&self.path, std::io::Error::other(e)))?
                .map_err(|e| RegistryError::io(&self.path, e))?;
            file_stamp(&self.path).await?
        } else {
            stamp
        };

        *self.snapshot.write().await = Snapshot {
            document: Arc::new(document),
            stamp,
        };
        Ok(result)
    }
}

async fn file_stamp(path: &Path) -> RegistryResult<Option<FileStamp>> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(Some(FileStamp::from_metadata(&metadata))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RegistryError::io(path, e)),
    }
}

async fn read_document(path: &Path) -> RegistryResult<Option<LoadedDocument>> {
    let Some(stamp) = file_stamp(path).await? else {
        return Ok(None);
    };

    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RegistryError::io(path, e)),
    };

    let stored: StoredDocument =
        serde_json::from_slice(&contents).map_err(|e| RegistryError::corrupt(path, e))?;
    let migrated = matches!(stored, StoredDocument::Legacy(_));
    Ok(Some(LoadedDocument {
        document: stored.into(),
        stamp,
        migrated,
    }))
}
