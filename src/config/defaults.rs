/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_MAX_UPLOAD_SIZE: &str = "10MB";

// Storage defaults
pub const DEFAULT_DATA_PATH: &str = "./data";
pub const DEFAULT_LOCAL_PATH: &str = "./data/images";
pub const DEFAULT_REGISTRY_PATH: &str = "./data/logos.json";
pub const DEFAULT_LOCK_PATH: &str = "./data/locks";
pub const DEFAULT_CREDENTIALS_PATH: &str = "./data/config.json";
pub const DEFAULT_LOCK_TIMEOUT: &str = "5s";
pub const DEFAULT_LOCK_RETRIES: u32 = 3;

// Cache defaults
pub const DEFAULT_CACHE_ENABLED: bool = true;
pub const DEFAULT_CACHE_PATH: &str = "./data/cache";

// Transform defaults (4:3 canvas)
pub const DEFAULT_CANVAS_WIDTH: u32 = 720;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 540;
pub const MAX_CANVAS_DIMENSION: u32 = 8192;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;
pub const DEFAULT_BACKGROUND: [u8; 3] = [255, 255, 255];

// Remote asset host defaults
pub const DEFAULT_REMOTE_FOLDER: &str = "tv-logos";
pub const DEFAULT_REMOTE_API_BASE_URL: &str = "https://api.cloudinary.com/v1_1";
pub const DEFAULT_REMOTE_DELIVERY_BASE_URL: &str = "https://res.cloudinary.com";
pub const DEFAULT_REMOTE_REQUEST_TIMEOUT: &str = "30s";
pub const DEFAULT_REMOTE_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_REMOTE_INITIAL_BACKOFF: &str = "200ms";
pub const DEFAULT_REMOTE_MAX_BACKOFF: &str = "2s";

// Export defaults
pub const DEFAULT_EXPORT_ITEM_TIMEOUT: &str = "30s";

// Legacy credential variables written by the original setup instructions
pub const ENV_CLOUD_NAME: &str = "CLOUDINARY_CLOUD_NAME";
pub const ENV_API_KEY: &str = "CLOUDINARY_API_KEY";
pub const ENV_API_SECRET: &str = "CLOUDINARY_API_SECRET";

/// Prefix for structured environment overrides, e.g. `TVLOGO_STORAGE__BACKEND`
pub const ENV_PREFIX: &str = "TVLOGO_";
