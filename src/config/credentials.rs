//! Remote asset host credentials and their precedence rules
//!
//! Credentials can come from two places: the environment (either the legacy
//! `CLOUDINARY_*` variables or `TVLOGO_REMOTE__*` / the TOML file merged into
//! [`RemoteConfig`](super::RemoteConfig)), and the JSON file saved by the setup
//! form. The environment wins, but when both sources carry a complete set that
//! disagrees, startup is refused until the operator resolves the conflict.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

use super::defaults::{ENV_API_KEY, ENV_API_SECRET, ENV_CLOUD_NAME};
use crate::errors::{AppError, AppResult};

/// Complete credential set for the remote backend
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Possibly incomplete credential set from one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialCredentials {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

/// On-disk layout written by the setup form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedCredentialsFile {
    #[serde(rename = "CLOUDINARY_CLOUD_NAME", default)]
    pub cloud_name: Option<String>,
    #[serde(rename = "CLOUDINARY_API_KEY", default)]
    pub api_key: Option<String>,
    #[serde(rename = "CLOUDINARY_API_SECRET", default)]
    pub api_secret: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl PartialCredentials {
    pub fn new(
        cloud_name: Option<String>,
        api_key: Option<String>,
        api_secret: Option<String>,
    ) -> Self {
        Self {
            cloud_name: non_empty(cloud_name),
            api_key: non_empty(api_key),
            api_secret: non_empty(api_secret),
        }
    }

    /// Read the legacy `CLOUDINARY_*` variables
    pub fn from_legacy_env() -> Self {
        Self::new(
            std::env::var(ENV_CLOUD_NAME).ok(),
            std::env::var(ENV_API_KEY).ok(),
            std::env::var(ENV_API_SECRET).ok(),
        )
    }

    /// Fill unset fields from `other`
    pub fn or(self, other: PartialCredentials) -> Self {
        Self {
            cloud_name: self.cloud_name.or(other.cloud_name),
            api_key: self.api_key.or(other.api_key),
            api_secret: self.api_secret.or(other.api_secret),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cloud_name.is_none() && self.api_key.is_none() && self.api_secret.is_none()
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.cloud_name.is_none() {
            missing.push("cloud_name");
        }
        if self.api_key.is_none() {
            missing.push("api_key");
        }
        if self.api_secret.is_none() {
            missing.push("api_secret");
        }
        missing
    }

    /// Convert to a complete set, or `None` when any field is missing
    pub fn complete(&self) -> Option<RemoteCredentials> {
        Some(RemoteCredentials {
            cloud_name: self.cloud_name.clone()?,
            api_key: self.api_key.clone()?,
            api_secret: self.api_secret.clone()?,
        })
    }
}

/// Load the credentials saved by the setup form.
///
/// A missing file yields `None`. An unreadable or incomplete file is reported
/// with a warning and ignored, since it is the lower-precedence source.
pub fn load_saved_credentials(path: &Path) -> Option<RemoteCredentials> {
    if !path.exists() {
        debug!("No saved credentials file at {}", path.display());
        return None;
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Ignoring unreadable credentials file {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<SavedCredentialsFile>(&contents) {
        Ok(file) => {
            let partial = PartialCredentials::new(file.cloud_name, file.api_key, file.api_secret);
            let complete = partial.complete();
            if complete.is_none() {
                warn!(
                    "Ignoring incomplete credentials file {} (missing: {})",
                    path.display(),
                    partial.missing_fields().join(", ")
                );
            }
            complete
        }
        Err(e) => {
            warn!("Ignoring invalid credentials file {}: {}", path.display(), e);
            None
        }
    }
}

/// Apply the precedence rules between environment and saved credentials
pub fn resolve_credentials(
    environment: PartialCredentials,
    saved: Option<RemoteCredentials>,
) -> AppResult<Option<RemoteCredentials>> {
    if environment.is_empty() {
        return Ok(saved);
    }

    let Some(env_credentials) = environment.complete() else {
        return Err(AppError::configuration(format!(
            "remote credentials are partially set in the environment (missing: {})",
            environment.missing_fields().join(", ")
        )));
    };

    if let Some(saved) = saved {
        let mut conflicts = Vec::new();
        if saved.cloud_name != env_credentials.cloud_name {
            conflicts.push("cloud_name");
        }
        if saved.api_key != env_credentials.api_key {
            conflicts.push("api_key");
        }
        if saved.api_secret != env_credentials.api_secret {
            conflicts.push("api_secret");
        }
        if !conflicts.is_empty() {
            return Err(AppError::configuration(format!(
                "environment and saved setup credentials disagree on {}; remove one of them",
                conflicts.join(", ")
            )));
        }
    }

    Ok(Some(env_credentials))
}
