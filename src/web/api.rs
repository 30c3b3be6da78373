//! Logo API handlers
//!
//! Thin wrappers over [`LogoAssetService`](crate::logo_assets::LogoAssetService):
//! extract, delegate, map the result.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::AppState;
use super::responses::{self, handle_error, status_for};
use crate::errors::{AppError, AppResult};
use crate::models::{DeleteOutcome, LogoId, LogoSummary, UploadRequest};

/// One uploaded file from a multipart request
#[derive(Debug)]
struct UploadedFile {
    file_name: String,
    bytes: Vec<u8>,
}

/// Per-file result of `POST /upload`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadResult {
    Uploaded {
        message: String,
        id: LogoId,
        url: String,
        replaced: bool,
    },
    Failed {
        error: String,
        file: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub id: LogoId,
}

async fn read_upload_form(mut multipart: Multipart) -> AppResult<(Vec<UploadedFile>, Option<LogoId>)> {
    let mut files = Vec::new();
    let mut target_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("failed to read uploaded file: {e}")))?;
                // Browsers send an empty part when nothing was selected
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                files.push(UploadedFile {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            Some("id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation(format!("failed to read id field: {e}")))?;
                let text = text.trim();
                if !text.is_empty() {
                    let id = text
                        .parse::<LogoId>()
                        .map_err(|_| AppError::validation(format!("invalid logo id '{text}'")))?;
                    target_id = Some(id);
                }
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok((files, target_id))
}

/// Create logos from uploaded files, or replace one when `id` is given
pub async fn upload_logos(State(state): State<AppState>, multipart: Multipart) -> Response {
    let (mut files, target_id) = match read_upload_form(multipart).await {
        Ok(form) => form,
        Err(e) => return handle_error(e),
    };

    if files.is_empty() {
        return handle_error(AppError::validation("no files selected"));
    }
    if target_id.is_some() && files.len() > 1 {
        return handle_error(AppError::validation(
            "a reupload accepts exactly one file",
        ));
    }

    // A single file reports its own status; batches report per-file results
    if files.len() == 1 {
        let file = files.remove(0);
        let file_name = file.file_name.clone();
        let request = UploadRequest {
            bytes: file.bytes,
            original_name: file.file_name,
            target_id,
        };
        return match state.logo_service.create(request).await {
            Ok(outcome) => (
                StatusCode::OK,
                Json(UploadResult::Uploaded {
                    message: uploaded_message(outcome.replaced),
                    id: outcome.id,
                    url: outcome.url,
                    replaced: outcome.replaced,
                }),
            )
                .into_response(),
            Err(e) => {
                let status = status_for(&e);
                warn!("Upload failed for '{}': {}", file_name, e);
                (
                    status,
                    Json(UploadResult::Failed {
                        error: e.to_string(),
                        file: file_name,
                    }),
                )
                    .into_response()
            }
        };
    }

    let mut results = Vec::with_capacity(files.len());
    let mut first_error_status = None;
    for file in files {
        let request = UploadRequest {
            bytes: file.bytes,
            original_name: file.file_name.clone(),
            target_id: None,
        };
        match state.logo_service.create(request).await {
            Ok(outcome) => results.push(UploadResult::Uploaded {
                message: uploaded_message(false),
                id: outcome.id,
                url: outcome.url,
                replaced: false,
            }),
            Err(e) => {
                warn!("Upload failed for '{}': {}", file.file_name, e);
                first_error_status.get_or_insert(status_for(&e));
                results.push(UploadResult::Failed {
                    error: e.to_string(),
                    file: file.file_name,
                });
            }
        }
    }

    let any_uploaded = results
        .iter()
        .any(|result| matches!(result, UploadResult::Uploaded { .. }));
    let status = if any_uploaded {
        StatusCode::OK
    } else {
        first_error_status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    };

    info!(
        "Processed upload batch of {} files ({})",
        results.len(),
        if any_uploaded { "at least one stored" } else { "all failed" }
    );
    (status, Json(results)).into_response()
}

fn uploaded_message(replaced: bool) -> String {
    if replaced {
        "File replaced".to_string()
    } else {
        "File uploaded".to_string()
    }
}

/// List every logo ordered by id
pub async fn list_logos(State(state): State<AppState>) -> Result<Json<Vec<LogoSummary>>, AppError> {
    let records = state.logo_service.list().await?;
    Ok(Json(records.into_iter().map(LogoSummary::from).collect()))
}

pub async fn get_logo(
    State(state): State<AppState>,
    Path(id): Path<LogoId>,
) -> Result<Json<LogoSummary>, AppError> {
    let record = state.logo_service.record(id).await?;
    Ok(Json(record.into()))
}

pub async fn delete_logo(State(state): State<AppState>, Path(id): Path<LogoId>) -> Response {
    match state.logo_service.delete(id).await {
        Ok(DeleteOutcome::Deleted) => responses::ok(DeleteResponse {
            message: "Logo deleted".to_string(),
            id,
        }),
        Ok(DeleteOutcome::Missing) => responses::not_found("Logo not found"),
        Err(e) => handle_error(e),
    }
}
