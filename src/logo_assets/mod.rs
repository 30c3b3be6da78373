//! The logo pipeline: transform, storage, registry, cache and export, tied
//! together by [`LogoAssetService`].

pub mod cache;
pub mod export;
pub mod locks;
pub mod registry;
pub mod service;
pub mod storage;
pub mod transform;

pub use cache::LogoCache;
pub use export::{BACKUP_FILE_NAME, BackupArchive, BackupExporter, BackupManifest, LogoSource};
pub use registry::LogoRegistry;
pub use service::LogoAssetService;
pub use storage::StorageBackend;
pub use transform::{ImageTransformer, TransformedImage};
