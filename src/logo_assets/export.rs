//! Backup archives
//!
//! The exporter walks the registry, fetches the current bytes of every logo
//! and packs them into a zip archive together with a `manifest.json` that
//! accounts for every id, exported or skipped. One unreachable logo never
//! fails the whole backup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::time::Duration;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::{AppError, AppResult};
use crate::models::{LogoBytes, LogoId};

/// Download name of the backup archive
pub const BACKUP_FILE_NAME: &str = "tv_logos_backup.zip";

/// Name of the manifest entry inside the archive
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Where the exporter reads logos from
#[async_trait]
pub trait LogoSource: Send + Sync {
    /// Ids to export, in order
    async fn logo_ids(&self) -> AppResult<Vec<LogoId>>;

    /// Current bytes of one logo, resolving its record afresh
    async fn fetch_logo(&self, id: LogoId) -> AppResult<LogoBytes>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedEntry {
    pub id: LogoId,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub id: LogoId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub created_at: DateTime<Utc>,
    pub exported: Vec<ExportedEntry>,
    pub skipped: Vec<SkippedEntry>,
}

impl BackupManifest {
    pub fn total(&self) -> usize {
        self.exported.len() + self.skipped.len()
    }
}

#[derive(Debug, Clone)]
pub struct BackupArchive {
    pub bytes: Vec<u8>,
    pub manifest: BackupManifest,
}

#[derive(Debug, Clone)]
pub struct BackupExporter {
    item_timeout: Duration,
}

impl BackupExporter {
    pub fn new(item_timeout: Duration) -> Self {
        Self { item_timeout }
    }

    pub async fn export<S>(&self, source: &S) -> AppResult<BackupArchive>
    where
        S: LogoSource + ?Sized,
    {
        let ids = source.logo_ids().await?;
        let mut entries = Vec::with_capacity(ids.len());
        let mut manifest = BackupManifest {
            created_at: Utc::now(),
            exported: Vec::new(),
            skipped: Vec::new(),
        };

        for id in ids {
            match tokio::time::timeout(self.item_timeout, source.fetch_logo(id)).await {
                Ok(Ok(logo)) => {
                    let file_name = logo.record.download_name();
                    manifest.exported.push(ExportedEntry {
                        id,
                        file_name: file_name.clone(),
                    });
                    entries.push((file_name, logo.bytes));
                }
                Ok(Err(e)) => {
                    warn!("Skipping logo {} in backup: {}", id, e);
                    let reason = if e.is_not_found() {
                        format!("not found: {e}")
                    } else {
                        e.to_string()
                    };
                    manifest.skipped.push(SkippedEntry { id, reason });
                }
                Err(_) => {
                    warn!(
                        "Skipping logo {} in backup: fetch timed out after {:?}",
                        id, self.item_timeout
                    );
                    manifest.skipped.push(SkippedEntry {
                        id,
                        reason: format!("timed out after {}", humantime::format_duration(self.item_timeout)),
                    });
                }
            }
        }

        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| AppError::internal(format!("failed to serialize backup manifest: {e}")))?;

        let bytes = tokio::task::spawn_blocking(move || write_archive(entries, manifest_json))
            .await
            .map_err(|e| AppError::internal(format!("backup task failed: {e}")))??;

        info!(
            "Built backup archive: {} exported, {} skipped, {} bytes",
            manifest.exported.len(),
            manifest.skipped.len(),
            bytes.len()
        );

        Ok(BackupArchive { bytes, manifest })
    }
}

fn write_archive(entries: Vec<(String, Vec<u8>)>, manifest_json: Vec<u8>) -> AppResult<Vec<u8>> {
    let zip_error = |e: zip::result::ZipError| AppError::internal(format!("failed to write backup archive: {e}"));
    let io_error = |e: std::io::Error| AppError::internal(format!("failed to write backup archive: {e}"));

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in entries {
        writer.start_file(name, options).map_err(zip_error)?;
        writer.write_all(&bytes).map_err(io_error)?;
    }

    writer.start_file(MANIFEST_ENTRY, options).map_err(zip_error)?;
    writer.write_all(&manifest_json).map_err(io_error)?;

    Ok(writer.finish().map_err(zip_error)?.into_inner())
}
