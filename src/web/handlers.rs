use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::AppState;
use super::responses::{self, handle_error};
use crate::logo_assets::BACKUP_FILE_NAME;
use crate::models::LogoId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
    pub cache_enabled: bool,
    pub logos: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearCacheResponse {
    pub cleared: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    let service = &state.logo_service;
    match service.list().await {
        Ok(records) => Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            backend: service.backend_kind().to_string(),
            cache_enabled: service.cache_enabled(),
            logos: records.len(),
            timestamp: chrono::Utc::now(),
        })
        .into_response(),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(responses::ApiResponse::<()>::error(e.to_string())),
            )
                .into_response()
        }
    }
}

/// Serve the bytes of a logo.
///
/// With the remote backend, a failed fetch falls back to redirecting the
/// client to the host's own URL for the logo.
pub async fn serve_logo_image(State(state): State<AppState>, Path(id): Path<LogoId>) -> Response {
    match state.logo_service.get(id).await {
        Ok(logo) => Response::builder()
            .header(header::CONTENT_TYPE, logo.content_type())
            .header(header::CACHE_CONTROL, "public, max-age=3600")
            .header("x-cache", if logo.from_cache { "HIT" } else { "MISS" })
            .body(Body::from(logo.bytes))
            .unwrap_or_else(|e| {
                handle_error(crate::errors::AppError::internal(format!(
                    "failed to build image response: {e}"
                )))
            }),
        Err(e) if e.is_not_found() => handle_error(e),
        Err(e) => match state.logo_service.fallback_url(id).await {
            Some(url) => {
                warn!("Serving logo {} by redirect after fetch failure: {}", id, e);
                (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
            }
            None => handle_error(e),
        },
    }
}

pub async fn clear_cache(State(state): State<AppState>) -> Response {
    match state.logo_service.clear_cache().await {
        Ok(cleared) => Json(ClearCacheResponse { cleared }).into_response(),
        Err(e) => handle_error(e),
    }
}

/// Download every logo as a zip archive
pub async fn backup_logos(State(state): State<AppState>) -> Response {
    let archive = match state.logo_service.export().await {
        Ok(archive) => archive,
        Err(e) => return handle_error(e),
    };

    if archive.manifest.total() == 0 {
        return responses::not_found("No logos to back up.");
    }

    info!(
        "Serving backup with {} logos ({} skipped)",
        archive.manifest.exported.len(),
        archive.manifest.skipped.len()
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{BACKUP_FILE_NAME}\""),
            ),
        ],
        archive.bytes,
    )
        .into_response()
}
