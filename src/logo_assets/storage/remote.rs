//! Remote asset host backend speaking the Cloudinary upload API
//!
//! Uploads and deletions are signed form posts against the admin API; reads go
//! through the public delivery URL. Transient failures (connection errors,
//! timeouts, HTTP 5xx and 429) are retried with backoff. Everything else the
//! host rejects is final.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{RemoteConfig, RemoteCredentials};
use crate::errors::{AppError, AppResult, StorageError, StorageResult};
use crate::models::{DeleteOutcome, Descriptor, OutputFormat};
use crate::utils::retry::{RetryConfig, with_retry};

const USER_AGENT: &str = concat!("tv-logo-manager/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Clone)]
pub struct RemoteStorage {
    client: Client,
    credentials: RemoteCredentials,
    folder: String,
    api_base_url: String,
    delivery_base_url: String,
    retry: RetryConfig,
}

impl RemoteStorage {
    pub fn new(config: &RemoteConfig) -> AppResult<Self> {
        let credentials = config.credentials().ok_or_else(|| {
            AppError::configuration("remote backend requires cloud_name, api_key and api_secret")
        })?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::configuration(format!("failed to build HTTP client: {e}")))?;

        info!(
            "Remote storage configured for cloud '{}' (folder '{}')",
            credentials.cloud_name, config.folder
        );

        Ok(Self {
            client,
            credentials,
            folder: config.folder.trim_matches('/').to_string(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            delivery_base_url: config.delivery_base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::new(
                config.max_attempts,
                config.initial_backoff,
                config.max_backoff,
            ),
        })
    }

    /// Fresh public id inside the configured folder
    pub fn generate_key(&self) -> String {
        let id = Uuid::new_v4();
        if self.folder.is_empty() {
            id.to_string()
        } else {
            format!("{}/{}", self.folder, id)
        }
    }

    /// Public URL the host serves `key` under
    pub fn delivery_url(&self, key: &str, format: OutputFormat) -> String {
        format!(
            "{}/{}/image/upload/{}.{}",
            self.delivery_base_url,
            self.credentials.cloud_name,
            key,
            format.extension()
        )
    }

    fn api_url(&self, action: &str) -> String {
        format!(
            "{}/{}/image/{}",
            self.api_base_url, self.credentials.cloud_name, action
        )
    }

    /// Signed parameters plus the authentication fields every admin call carries
    fn signed_form(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        params.push(("timestamp", chrono::Utc::now().timestamp().to_string()));
        let signature = sign_params(&params, &self.credentials.api_secret);
        params.push(("api_key", self.credentials.api_key.clone()));
        params.push(("signature", signature));
        params.push(("signature_algorithm", "sha256".to_string()));
        params
    }

    pub async fn put(&self, key: &str, bytes: &[u8], format: OutputFormat) -> StorageResult<Descriptor> {
        let data_uri = format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes));
        let data_uri = data_uri.as_str();

        let uploaded = with_retry(
            &self.retry,
            || async move { self.upload_once(key, data_uri).await },
            "remote upload",
        )
        .await?;

        debug!("Uploaded {} bytes as {}", bytes.len(), uploaded.public_id);
        Ok(Descriptor {
            key: uploaded.public_id,
            url: Some(uploaded.secure_url),
        })
    }

    async fn upload_once(&self, key: &str, data_uri: &str) -> StorageResult<UploadResponse> {
        let mut form = self.signed_form(vec![
            ("overwrite", "true".to_string()),
            ("public_id", key.to_string()),
        ]);
        form.push(("file", data_uri.to_string()));

        let response = self
            .client
            .post(self.api_url("upload"))
            .form(&form)
            .send()
            .await
            .map_err(|e| transport_error("upload", e))?;
        let response = check_status("upload", response).await?;

        response
            .json::<UploadResponse>()
            .await
            .map_err(|e| invalid_response("upload", e))
    }

    pub async fn get(&self, key: &str, format: OutputFormat) -> StorageResult<Vec<u8>> {
        let url = self.delivery_url(key, format);
        let url = url.as_str();

        with_retry(
            &self.retry,
            || async move { self.download_once(key, url).await },
            "remote download",
        )
        .await
    }

    async fn download_once(&self, key: &str, url: &str) -> StorageResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error("download", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::not_found(key));
        }
        let response = check_status("download", response).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error("download", e))?;
        Ok(bytes.to_vec())
    }

    pub async fn delete(&self, key: &str) -> StorageResult<DeleteOutcome> {
        let outcome = with_retry(
            &self.retry,
            || async move { self.destroy_once(key).await },
            "remote delete",
        )
        .await?;

        debug!("Remote delete of {}: {:?}", key, outcome);
        Ok(outcome)
    }

    async fn destroy_once(&self, key: &str) -> StorageResult<DeleteOutcome> {
        let form = self.signed_form(vec![("public_id", key.to_string())]);

        let response = self
            .client
            .post(self.api_url("destroy"))
            .form(&form)
            .send()
            .await
            .map_err(|e| transport_error("delete", e))?;
        let response = check_status("delete", response).await?;

        let body = response
            .json::<DestroyResponse>()
            .await
            .map_err(|e| invalid_response("delete", e))?;

        match body.result.as_str() {
            "ok" => Ok(DeleteOutcome::Deleted),
            "not found" => Ok(DeleteOutcome::Missing),
            other => Err(StorageError::InvalidResponse {
                operation: "delete".to_string(),
                message: format!("unexpected result '{other}'"),
            }),
        }
    }
}

/// SHA-256 signature over the sorted `key=value` pairs followed by the secret
pub(crate) fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let payload = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Sort an unsuccessful status into retryable and final failures
pub(crate) fn classify_status(operation: &str, status: StatusCode, message: String) -> StorageError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StorageError::unavailable(operation, format!("HTTP {}: {}", status.as_u16(), message))
    } else {
        StorageError::rejected(operation, status.as_u16(), message)
    }
}

async fn check_status(operation: &str, response: reqwest::Response) -> StorageResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    Err(classify_status(operation, status, message))
}

fn transport_error(operation: &str, err: reqwest::Error) -> StorageError {
    if err.is_timeout() {
        StorageError::Timeout {
            operation: operation.to_string(),
        }
    } else {
        StorageError::unavailable(operation, err.to_string())
    }
}

fn invalid_response(operation: &str, err: reqwest::Error) -> StorageError {
    StorageError::InvalidResponse {
        operation: operation.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_config() -> RemoteConfig {
        RemoteConfig {
            cloud_name: Some("demo".to_string()),
            api_key: Some("1234".to_string()),
            api_secret: Some("abcd".to_string()),
            delivery_base_url: "https://res.example.com/".to_string(),
            ..RemoteConfig::default()
        }
    }

    #[test]
    fn test_signature_sorts_parameters() {
        let params = vec![
            ("timestamp", "1315060510".to_string()),
            ("public_id", "tv-logos/sample".to_string()),
            ("overwrite", "true".to_string()),
        ];
        assert_eq!(
            sign_params(&params, "abcd"),
            "34efe87b690e600e5d936e74ea4ca0d613fa2d95e4189d3cbc85c53f3ecc3464"
        );
    }

    #[test]
    fn test_status_classification() {
        for status in [500, 502, 503, 429] {
            let status = StatusCode::from_u16(status).unwrap();
            assert!(classify_status("upload", status, String::new()).is_transient());
        }
        for status in [400, 401, 403, 420] {
            let status = StatusCode::from_u16(status).unwrap();
            let err = classify_status("upload", status, "nope".to_string());
            assert!(!err.is_transient());
            assert!(matches!(err, StorageError::Rejected { .. }));
        }
    }

    #[test]
    fn test_keys_and_urls() {
        let storage = RemoteStorage::new(&remote_config()).unwrap();

        let key = storage.generate_key();
        assert!(key.starts_with("tv-logos/"));
        assert_ne!(key, storage.generate_key());

        assert_eq!(
            storage.delivery_url("tv-logos/abc", OutputFormat::Jpeg),
            "https://res.example.com/demo/image/upload/tv-logos/abc.jpg"
        );
    }

    #[test]
    fn test_missing_credentials_is_configuration_error() {
        let config = RemoteConfig::default();
        assert!(matches!(
            RemoteStorage::new(&config),
            Err(AppError::Configuration { .. })
        ));
    }
}
