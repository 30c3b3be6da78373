use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::cache::{LogoCache, read_current_bytes};
use super::export::{BackupArchive, BackupExporter, LogoSource};
use super::locks::IdLocks;
use super::registry::LogoRegistry;
use super::storage::StorageBackend;
use super::transform::{ImageTransformer, TransformedImage};
use crate::config::{BackendKind, Config};
use crate::errors::{AppError, AppResult, StorageError};
use crate::models::{
    DeleteOutcome, Descriptor, LogoBytes, LogoId, LogoRecord, NewLogo, UploadOutcome,
    UploadRequest,
};
use crate::utils::{generate_logo_url, sanitize_filename};

/// Fallback display name when the upload carried none worth keeping
const DEFAULT_ORIGINAL_NAME: &str = "logo";

/// Orchestrates transform, storage, registry and cache for every logo operation
#[derive(Debug, Clone)]
pub struct LogoAssetService {
    transformer: Arc<ImageTransformer>,
    backend: StorageBackend,
    registry: Arc<LogoRegistry>,
    cache: Option<LogoCache>,
    locks: Arc<IdLocks>,
    exporter: BackupExporter,
    base_url: String,
    max_upload_size: u64,
}

impl LogoAssetService {
    /// Build every component from validated configuration, creating the data
    /// directories the selected backend needs
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        for dir in [&config.storage.data_path, &config.storage.lock_path] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::io(dir, e))?;
        }

        let backend = StorageBackend::from_config(config).await?;
        let registry = Arc::new(LogoRegistry::from_config(&config.storage).await?);

        let cache = if config.cache_active() {
            let cache = LogoCache::new(config.cache.path.clone(), registry.clone(), backend.clone());
            cache.ensure_cache_dir().await?;
            Some(cache)
        } else {
            None
        };

        info!(
            "Logo service ready: backend={}, cache={}, canvas={}x{} {}",
            backend.kind(),
            if cache.is_some() { "enabled" } else { "disabled" },
            config.transform.width,
            config.transform.height,
            config.transform.format
        );

        Ok(Self {
            transformer: Arc::new(ImageTransformer::new(config.transform.clone())),
            backend,
            registry,
            cache,
            locks: Arc::new(IdLocks::new(
                config.storage.lock_path.clone(),
                config.storage.lock_timeout,
                config.storage.lock_retries,
            )),
            exporter: BackupExporter::new(config.export.item_timeout),
            base_url: config.web.base_url.clone(),
            max_upload_size: config.web.max_upload_size,
        })
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Store a new logo, or replace the bytes of `target_id` when given
    pub async fn create(&self, request: UploadRequest) -> AppResult<UploadOutcome> {
        if request.bytes.is_empty() {
            return Err(AppError::validation("uploaded file is empty"));
        }
        if request.bytes.len() as u64 > self.max_upload_size {
            return Err(AppError::validation(format!(
                "uploaded file is {} bytes, the limit is {}",
                request.bytes.len(),
                self.max_upload_size
            )));
        }

        let original_name = match sanitize_filename(&request.original_name) {
            name if name.is_empty() => DEFAULT_ORIGINAL_NAME.to_string(),
            name => name,
        };

        let image = self.transform(request.bytes).await?;

        match request.target_id {
            None => self.create_new(original_name, image).await,
            Some(id) => self.reupload(id, original_name, image).await,
        }
    }

    async fn transform(&self, bytes: Vec<u8>) -> AppResult<TransformedImage> {
        let transformer = self.transformer.clone();
        let image = tokio::task::spawn_blocking(move || transformer.transform(&bytes))
            .await
            .map_err(|e| AppError::internal(format!("transform task failed: {e}")))??;
        Ok(image)
    }

    async fn create_new(&self, original_name: String, image: TransformedImage) -> AppResult<UploadOutcome> {
        let key = self.backend.generate_key(image.format);
        let descriptor = self.backend.put(&key, &image.bytes, image.format).await?;

        let created = self
            .registry
            .create_with(|id| NewLogo {
                original_name: original_name.clone(),
                storage_key: descriptor.key.clone(),
                url: self.public_url(&descriptor, id),
                format: image.format,
            })
            .await;

        let record = match created {
            Ok(record) => record,
            Err(e) => {
                self.discard_key(&descriptor.key, "registry create failed").await;
                return Err(e.into());
            }
        };

        info!(
            "Created logo {} from '{}' ({} bytes, key {})",
            record.id,
            record.original_name,
            image.bytes.len(),
            record.storage_key
        );
        Ok(UploadOutcome {
            id: record.id,
            url: record.url,
            replaced: false,
        })
    }

    async fn reupload(
        &self,
        id: LogoId,
        original_name: String,
        image: TransformedImage,
    ) -> AppResult<UploadOutcome> {
        let _guard = self.locks.lock(id).await?;

        let existing = self
            .registry
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("logo", id))?;

        // New bytes go under a fresh key, so readers of the old record keep
        // finding bytes until the registry points at the new ones
        let key = self.backend.generate_key(image.format);
        let descriptor = self.backend.put(&key, &image.bytes, image.format).await?;
        let url = self.public_url(&descriptor, id);

        let updated = self
            .registry
            .update(id, |record| {
                record.original_name = original_name;
                record.storage_key = descriptor.key.clone();
                record.url = url;
                record.format = image.format;
            })
            .await;

        let record = match updated {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.discard_key(&descriptor.key, "logo disappeared during reupload").await;
                return Err(AppError::not_found("logo", id));
            }
            Err(e) => {
                self.discard_key(&descriptor.key, "registry update failed").await;
                return Err(e.into());
            }
        };

        if existing.storage_key != record.storage_key {
            match self.backend.delete(&existing.storage_key).await {
                Ok(DeleteOutcome::Deleted) => {
                    debug!("Removed previous bytes {} of logo {}", existing.storage_key, id)
                }
                Ok(DeleteOutcome::Missing) => warn!(
                    "Previous bytes {} of logo {} were already gone",
                    existing.storage_key, id
                ),
                Err(e) => warn!(
                    "Failed to remove previous bytes {} of logo {}: {}",
                    existing.storage_key, id, e
                ),
            }
        }
        self.invalidate_cache(id).await;

        info!(
            "Replaced logo {} with '{}' (key {} -> {})",
            id, record.original_name, existing.storage_key, record.storage_key
        );
        Ok(UploadOutcome {
            id,
            url: record.url,
            replaced: true,
        })
    }

    /// URL handed to clients: the host's own URL, or our image route
    fn public_url(&self, descriptor: &Descriptor, id: LogoId) -> String {
        descriptor
            .url
            .clone()
            .unwrap_or_else(|| generate_logo_url(&self.base_url, id))
    }

    /// Roll back a put whose registry step failed
    async fn discard_key(&self, key: &str, reason: &str) {
        warn!("Discarding stored bytes {} ({})", key, reason);
        if let Err(e) = self.backend.delete(key).await {
            error!("Failed to discard stored bytes {}: {}", key, e);
        }
    }

    async fn invalidate_cache(&self, id: LogoId) {
        if let Some(cache) = &self.cache {
            cache.invalidate(id).await;
        }
    }

    /// Current bytes of a logo, through the cache when it is enabled
    pub async fn get(&self, id: LogoId) -> AppResult<LogoBytes> {
        if let Some(cache) = &self.cache {
            return cache.fetch(id).await;
        }

        let record = self.record(id).await?;
        let (record, bytes) = read_current_bytes(&self.registry, &self.backend, record).await?;
        Ok(LogoBytes {
            record,
            bytes,
            from_cache: false,
        })
    }

    pub async fn record(&self, id: LogoId) -> AppResult<LogoRecord> {
        self.registry
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("logo", id))
    }

    pub async fn list(&self) -> AppResult<Vec<LogoRecord>> {
        Ok(self.registry.list().await?)
    }

    /// Where clients can still fetch a logo when this process cannot serve
    /// its bytes; only the remote host has such a URL
    pub async fn fallback_url(&self, id: LogoId) -> Option<String> {
        if self.backend.kind() != BackendKind::Remote {
            return None;
        }
        match self.registry.get(id).await {
            Ok(Some(record)) => Some(record.url),
            _ => None,
        }
    }

    /// Remove a logo's record and bytes together.
    ///
    /// An unknown id yields `Missing`. When the backend refuses the delete the
    /// record is put back so it never points at nothing by accident.
    pub async fn delete(&self, id: LogoId) -> AppResult<DeleteOutcome> {
        let guard = self.locks.lock(id).await?;

        let Some(record) = self.registry.delete(id).await? else {
            debug!("Delete of unknown logo {}", id);
            return Ok(DeleteOutcome::Missing);
        };

        let removed = self.backend.delete(&record.storage_key).await;
        match removed {
            Ok(DeleteOutcome::Deleted) => {}
            Ok(DeleteOutcome::Missing) => warn!(
                "Bytes {} of logo {} were already gone",
                record.storage_key, id
            ),
            Err(e) => {
                warn!("Backend delete of logo {} failed, restoring record: {}", id, e);
                if let Err(restore_err) = self.registry.restore(record).await {
                    error!("Failed to restore record of logo {}: {}", id, restore_err);
                }
                return Err(e.into());
            }
        }

        self.invalidate_cache(id).await;
        self.locks.retire(id, &guard).await;
        info!("Deleted logo {} ({})", id, record.storage_key);
        Ok(DeleteOutcome::Deleted)
    }

    /// Purge the byte cache; zero when no cache is in use
    pub async fn clear_cache(&self) -> AppResult<usize> {
        match &self.cache {
            Some(cache) => cache.clear_all().await,
            None => Ok(0),
        }
    }

    pub async fn export(&self) -> AppResult<BackupArchive> {
        self.exporter.export(self).await
    }
}

#[async_trait]
impl LogoSource for LogoAssetService {
    async fn logo_ids(&self) -> AppResult<Vec<LogoId>> {
        Ok(self.list().await?.into_iter().map(|record| record.id).collect())
    }

    async fn fetch_logo(&self, id: LogoId) -> AppResult<LogoBytes> {
        self.get(id).await
    }
}
