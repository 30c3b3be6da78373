use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod credentials;
pub mod defaults;
pub mod duration_serde;

pub use credentials::RemoteCredentials;
use credentials::{PartialCredentials, load_saved_credentials, resolve_credentials};
use defaults::*;

use crate::errors::{AppError, AppResult};
use crate::models::OutputFormat;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_upload_size", with = "duration_serde::byte_size")]
    pub max_upload_size: u64,
}

/// Which storage backend variant holds the logo bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,
    /// JSON file saved by the setup form
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_lock_timeout", with = "duration_serde::duration")]
    pub lock_timeout: Duration,
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default = "default_canvas_width")]
    pub width: u32,
    #[serde(default = "default_canvas_height")]
    pub height: u32,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default)]
    pub png_compression: PngCompression,
    /// Solid fill used when the output encoding has no alpha channel
    #[serde(default = "default_background")]
    pub background: [u8; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub cloud_name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default = "default_remote_folder")]
    pub folder: String,
    #[serde(default = "default_remote_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_remote_delivery_base_url")]
    pub delivery_base_url: String,
    #[serde(default = "default_remote_request_timeout", with = "duration_serde::duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_remote_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_remote_initial_backoff", with = "duration_serde::duration")]
    pub initial_backoff: Duration,
    #[serde(default = "default_remote_max_backoff", with = "duration_serde::duration")]
    pub max_backoff: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_item_timeout", with = "duration_serde::duration")]
    pub item_timeout: Duration,
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_max_upload_size() -> u64 {
    duration_serde::byte_size::parse(DEFAULT_MAX_UPLOAD_SIZE).unwrap_or(10 * 1024 * 1024)
}

// Storage defaults
fn default_data_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_PATH)
}

fn default_local_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOCAL_PATH)
}

fn default_registry_path() -> PathBuf {
    PathBuf::from(DEFAULT_REGISTRY_PATH)
}

fn default_lock_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOCK_PATH)
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from(DEFAULT_CREDENTIALS_PATH)
}

fn default_lock_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_LOCK_TIMEOUT).unwrap_or(Duration::from_secs(5))
}

fn default_lock_retries() -> u32 {
    DEFAULT_LOCK_RETRIES
}

// Cache defaults
fn default_cache_enabled() -> bool {
    DEFAULT_CACHE_ENABLED
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_PATH)
}

// Transform defaults
fn default_canvas_width() -> u32 {
    DEFAULT_CANVAS_WIDTH
}

fn default_canvas_height() -> u32 {
    DEFAULT_CANVAS_HEIGHT
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_background() -> [u8; 3] {
    DEFAULT_BACKGROUND
}

// Remote defaults
fn default_remote_folder() -> String {
    DEFAULT_REMOTE_FOLDER.to_string()
}

fn default_remote_api_base_url() -> String {
    DEFAULT_REMOTE_API_BASE_URL.to_string()
}

fn default_remote_delivery_base_url() -> String {
    DEFAULT_REMOTE_DELIVERY_BASE_URL.to_string()
}

fn default_remote_request_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_REMOTE_REQUEST_TIMEOUT).unwrap_or(Duration::from_secs(30))
}

fn default_remote_max_attempts() -> u32 {
    DEFAULT_REMOTE_MAX_ATTEMPTS
}

fn default_remote_initial_backoff() -> Duration {
    humantime::parse_duration(DEFAULT_REMOTE_INITIAL_BACKOFF).unwrap_or(Duration::from_millis(200))
}

fn default_remote_max_backoff() -> Duration {
    humantime::parse_duration(DEFAULT_REMOTE_MAX_BACKOFF).unwrap_or(Duration::from_secs(2))
}

// Export defaults
fn default_export_item_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_EXPORT_ITEM_TIMEOUT).unwrap_or(Duration::from_secs(30))
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_path: default_data_path(),
            local_path: default_local_path(),
            registry_path: default_registry_path(),
            lock_path: default_lock_path(),
            credentials_path: default_credentials_path(),
            lock_timeout: default_lock_timeout(),
            lock_retries: default_lock_retries(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            path: default_cache_path(),
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_width(),
            height: default_canvas_height(),
            format: OutputFormat::default(),
            jpeg_quality: default_jpeg_quality(),
            png_compression: PngCompression::default(),
            background: default_background(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            cloud_name: None,
            api_key: None,
            api_secret: None,
            folder: default_remote_folder(),
            api_base_url: default_remote_api_base_url(),
            delivery_base_url: default_remote_delivery_base_url(),
            request_timeout: default_remote_request_timeout(),
            max_attempts: default_remote_max_attempts(),
            initial_backoff: default_remote_initial_backoff(),
            max_backoff: default_remote_max_backoff(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            item_timeout: default_export_item_timeout(),
        }
    }
}

impl TransformConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(AppError::configuration("canvas dimensions must be non-zero"));
        }
        if self.width > MAX_CANVAS_DIMENSION || self.height > MAX_CANVAS_DIMENSION {
            return Err(AppError::configuration(format!(
                "canvas dimensions must not exceed {MAX_CANVAS_DIMENSION}px"
            )));
        }
        if u64::from(self.width) * 3 != u64::from(self.height) * 4 {
            return Err(AppError::configuration(format!(
                "canvas {}x{} is not 4:3",
                self.width, self.height
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AppError::configuration("jpeg_quality must be between 1 and 100"));
        }
        Ok(())
    }
}

impl RemoteConfig {
    fn environment_credentials(&self) -> PartialCredentials {
        PartialCredentials::new(
            self.cloud_name.clone(),
            self.api_key.clone(),
            self.api_secret.clone(),
        )
    }

    /// Credentials after precedence resolution, if any were configured
    pub fn credentials(&self) -> Option<RemoteCredentials> {
        self.environment_credentials().complete()
    }
}

impl Config {
    /// Build the configuration once: defaults, then the TOML file, then the
    /// environment. Remote credentials are resolved against the saved setup
    /// file and the whole result is validated before it is returned.
    pub fn load_from_file(config_file: &str) -> AppResult<Self> {
        let path = Path::new(config_file);
        if path.exists() {
            info!("Loading configuration from {}", path.display());
        } else {
            info!(
                "Configuration file {} not found, using defaults and environment",
                path.display()
            );
        }

        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;

        config.resolve_remote_credentials()?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_remote_credentials(&mut self) -> AppResult<()> {
        let environment = PartialCredentials::from_legacy_env().or(self.remote.environment_credentials());
        let saved = load_saved_credentials(&self.storage.credentials_path);

        if let Some(credentials) = resolve_credentials(environment, saved)? {
            self.remote.cloud_name = Some(credentials.cloud_name);
            self.remote.api_key = Some(credentials.api_key);
            self.remote.api_secret = Some(credentials.api_secret);
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        self.transform.validate()?;

        if self.storage.lock_retries == 0 {
            return Err(AppError::configuration("storage.lock_retries must be at least 1"));
        }
        if self.web.max_upload_size == 0 {
            return Err(AppError::configuration("web.max_upload_size must be non-zero"));
        }

        if self.storage.backend == BackendKind::Remote {
            if self.remote.credentials().is_none() {
                return Err(AppError::configuration(
                    "remote backend selected but cloud_name, api_key and api_secret are not all set",
                ));
            }
            if self.remote.max_attempts == 0 {
                return Err(AppError::configuration("remote.max_attempts must be at least 1"));
            }
            for (name, value) in [
                ("remote.api_base_url", &self.remote.api_base_url),
                ("remote.delivery_base_url", &self.remote.delivery_base_url),
            ] {
                url::Url::parse(value)
                    .map_err(|e| AppError::configuration(format!("{name} is invalid: {e}")))?;
            }
        }
        Ok(())
    }

    /// Whether reads go through the local byte cache
    pub fn cache_active(&self) -> bool {
        self.storage.backend == BackendKind::Remote && self.cache.enabled
    }
}
