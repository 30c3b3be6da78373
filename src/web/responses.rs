//! HTTP response types and utilities
//!
//! Successful endpoints return their payload directly; failures share one
//! JSON shape built from [`ApiResponse`] and a status chosen by
//! [`handle_error`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::errors::{AppError, RegistryError, StorageError, TransformError};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the operation was successful
    pub success: bool,
    /// Response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Status code for an application error
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Validation { .. } => StatusCode::BAD_REQUEST,
        AppError::Transform(TransformError::Decode { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::Transform(TransformError::Encode { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::Storage(storage) => match storage {
            StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
            StorageError::InvalidKey { .. } => StatusCode::BAD_REQUEST,
            StorageError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            StorageError::Rejected { .. }
            | StorageError::Unavailable { .. }
            | StorageError::Timeout { .. }
            | StorageError::InvalidResponse { .. } => StatusCode::BAD_GATEWAY,
        },
        AppError::Registry(RegistryError::LockTimeout { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Configuration { .. } | AppError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Convert AppError to appropriate HTTP response
pub fn handle_error(error: AppError) -> Response {
    let status = status_for(&error);
    let message = match &error {
        AppError::NotFound { resource, id } => format!("{} with id '{}' not found", resource, id),
        other => other.to_string(),
    };

    if status.is_server_error() {
        error!("Request failed ({}): {}", status.as_u16(), message);
    } else if status == StatusCode::NOT_FOUND {
        debug!("Request for missing resource: {}", message);
    } else {
        warn!("Request rejected ({}): {}", status.as_u16(), message);
    }

    (status, Json(ApiResponse::<()>::error(message))).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        handle_error(self)
    }
}

/// Success response helper
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(message.to_string())),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&AppError::validation("bad")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&TransformError::decode("garbage").into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&StorageError::rejected("upload", 401, "bad key").into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&StorageError::not_found("k").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(
                &RegistryError::LockTimeout {
                    path: "logos.json.lock".into(),
                    attempts: 3
                }
                .into()
            ),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for(&AppError::not_found("logo", 3)), StatusCode::NOT_FOUND);
    }
}
