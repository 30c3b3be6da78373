//! Utility functions for the TV Logo Manager
//!
//! This module provides various helper functions including:
//! - URL sanitization and logo URL generation
//! - Upload file name sanitization
//! - Retry with exponential backoff (`utils::retry`)
//! - Atomic file writes and advisory file locks (`utils::fs`)

pub mod fs;
pub mod jitter;
pub mod retry;

use crate::models::LogoId;

/// Sanitize a base URL by removing trailing slashes and ensuring proper format
pub fn sanitize_base_url(base_url: &str) -> String {
    let mut url = base_url.trim().to_string();

    // Remove trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Ensure we have a scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("http://{}", url);
    }

    url
}

/// Relative route serving the bytes of a logo
pub fn logo_image_path(logo_id: LogoId) -> String {
    format!("/cached-image/{}", logo_id)
}

/// Absolute URL of the image route for a logo
pub fn generate_logo_url(base_url: &str, logo_id: LogoId) -> String {
    format!("{}{}", sanitize_base_url(base_url), logo_image_path(logo_id))
}

/// Reduce an uploaded file name to a safe display name.
///
/// Directory components are dropped, whitespace becomes `_`, and anything
/// outside `[A-Za-z0-9._-]` is removed. Leading dots are stripped so the
/// result can never name a hidden file or a parent directory.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    cleaned.trim_start_matches(['.', '_']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_base_url() {
        assert_eq!(sanitize_base_url("localhost:5000/"), "http://localhost:5000");
        assert_eq!(sanitize_base_url(" https://logos.example.com// "), "https://logos.example.com");
    }

    #[test]
    fn test_generate_logo_url() {
        assert_eq!(
            generate_logo_url("http://localhost:5000/", 12),
            "http://localhost:5000/cached-image/12"
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\logos\\BBC One HD.png"), "BBC_One_HD.png");
        assert_eq!(sanitize_filename(".hidden.png"), "hidden.png");
        assert_eq!(sanitize_filename("ñandú<>.jpg"), "and.jpg");
        assert_eq!(sanitize_filename(""), "");
    }
}
