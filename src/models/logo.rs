use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identifier of a logo, assigned once by the registry
pub type LogoId = u64;

/// Output encodings the transformer can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }

    /// Whether the encoding can carry an alpha channel
    pub fn supports_transparency(&self) -> bool {
        !matches!(self, OutputFormat::Jpeg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Webp => "webp",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::Webp),
            other => Err(format!("unsupported output format '{other}'")),
        }
    }
}

/// Durable registry entry mapping a stable id to its stored bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoRecord {
    pub id: LogoId,
    pub original_name: String,
    /// Backend locator: relative path (local) or public id (remote)
    pub storage_key: String,
    /// Public locator handed back to clients
    pub url: String,
    pub format: OutputFormat,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LogoRecord {
    /// File name used for downloads and backup entries
    pub fn download_name(&self) -> String {
        let stem = std::path::Path::new(&self.original_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("logo");
        format!("{}_{}.{}", self.id, stem, self.format.extension())
    }
}

/// Fields of a record before the registry assigns its id
#[derive(Debug, Clone)]
pub struct NewLogo {
    pub original_name: String,
    pub storage_key: String,
    pub url: String,
    pub format: OutputFormat,
}

/// Backend-specific locator returned by a successful store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub key: String,
    /// Public URL when the backend serves the bytes itself; local bytes are
    /// only reachable through the service's image route
    pub url: Option<String>,
}

/// Upload input accepted by the logo service
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub original_name: String,
    /// Reupload into an existing id instead of creating a new one
    pub target_id: Option<LogoId>,
}

/// Result of a successful create or reupload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub id: LogoId,
    pub url: String,
    pub replaced: bool,
}

/// Bytes of a logo together with the record they belong to
#[derive(Debug, Clone)]
pub struct LogoBytes {
    pub record: LogoRecord,
    pub bytes: Vec<u8>,
    pub from_cache: bool,
}

impl LogoBytes {
    pub fn content_type(&self) -> &'static str {
        self.record.format.mime_type()
    }
}

/// Outcome of a delete; a missing target is not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    Missing,
}

/// Listing entry exposed over HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoSummary {
    pub id: LogoId,
    pub original_name: String,
    pub url: String,
    pub format: OutputFormat,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LogoRecord> for LogoSummary {
    fn from(record: LogoRecord) -> Self {
        Self {
            id: record.id,
            original_name: record.original_name,
            url: record.url,
            format: record.format,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
