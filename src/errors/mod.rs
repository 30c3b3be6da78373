//! Centralized error handling for the TV Logo Manager
//!
//! # Error Categories
//!
//! - **Validation Errors**: malformed or missing input, no state change
//! - **Transform Errors**: image decode/encode failures, no state change
//! - **Storage Errors**: backend failures after the retry budget is spent
//! - **Registry Errors**: unreadable document or lock acquisition timeouts
//! - **Not Found**: expected outcome for unknown ids
//!
//! # Usage
//!
//! ```rust
//! use tv_logo_manager::errors::{AppError, AppResult};
//!
//! fn example_function(bytes: &[u8]) -> AppResult<usize> {
//!     if bytes.is_empty() {
//!         return Err(AppError::validation("empty upload"));
//!     }
//!     Ok(bytes.len())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for storage backend Results
pub type StorageResult<T> = Result<T, StorageError>;

/// Convenience type alias for registry Results
pub type RegistryResult<T> = Result<T, RegistryError>;

