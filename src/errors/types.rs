//! Error type definitions for the TV Logo Manager
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system so callers can tell validation,
//! image, storage and registry failures apart.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level application error type
///
/// Every operation of the logo pipeline returns this type. The variants map
/// one-to-one onto the HTTP status codes chosen in `web::responses`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or missing input
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Image transformation errors (decode or encode)
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Metadata registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Image transformer errors
#[derive(Error, Debug)]
pub enum TransformError {
    /// Unreadable, corrupt or unsupported source image
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// The target encoding failed or is unsupported in this configuration
    #[error("Failed to encode image as {format}: {message}")]
    Encode { format: String, message: String },
}

/// Storage backend errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// No bytes stored under the key
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// Key rejected before touching the backend
    #[error("Invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Local filesystem failures
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote host rejected the request (auth, quota, bad request); never retried
    #[error("Remote storage rejected {operation}: HTTP {status} - {message}")]
    Rejected {
        operation: String,
        status: u16,
        message: String,
    },

    /// Transient remote failure (5xx, 429, connection reset)
    #[error("Remote storage unavailable during {operation}: {message}")]
    Unavailable { operation: String, message: String },

    /// Remote request exceeded its deadline
    #[error("Remote storage timed out during {operation}")]
    Timeout { operation: String },

    /// Remote host answered with something we cannot interpret
    #[error("Unexpected remote response during {operation}: {message}")]
    InvalidResponse { operation: String, message: String },
}

/// Metadata registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The durable document exists but cannot be parsed
    #[error("Registry document {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// Reading or writing the document failed
    #[error("Registry I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not serialize the document
    #[error("Registry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The writer lock was held by someone else for too long
    #[error("Timed out acquiring lock {path} after {attempts} attempts")]
    LockTimeout { path: PathBuf, attempts: u32 },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: ToString>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is the expected "nothing there" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Storage(StorageError::NotFound { .. })
        )
    }
}

impl TransformError {
    pub fn decode<S: ToString>(message: S) -> Self {
        Self::Decode {
            message: message.to_string(),
        }
    }

    pub fn encode<F: ToString, S: ToString>(format: F, message: S) -> Self {
        Self::Encode {
            format: format.to_string(),
            message: message.to_string(),
        }
    }
}

impl StorageError {
    /// Create an I/O error bound to the path it happened on
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn not_found<K: Into<String>>(key: K) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn invalid_key<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected<O: Into<String>, M: Into<String>>(operation: O, status: u16, message: M) -> Self {
        Self::Rejected {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }

    pub fn unavailable<O: Into<String>, M: Into<String>>(operation: O, message: M) -> Self {
        Self::Unavailable {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Transient failures are retried by the remote backend; everything else is final
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

impl RegistryError {
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt<P: Into<PathBuf>, M: ToString>(path: P, message: M) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
