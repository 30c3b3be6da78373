//! Remote backend against an in-process stand-in for the asset host

use axum::{
    Form, Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use tv_logo_manager::{
    config::{BackendKind, Config},
    errors::{AppError, StorageError},
    logo_assets::LogoAssetService,
    models::{DeleteOutcome, UploadRequest},
    web::{AppState, create_router},
};

const CLOUD: &str = "demo";
const API_KEY: &str = "key-123";
const API_SECRET: &str = "secret-456";

#[derive(Default)]
struct HostState {
    objects: HashMap<String, Vec<u8>>,
    upload_calls: u32,
    destroy_calls: u32,
    failing_uploads: u32,
    rejecting_destroys: bool,
    delivery_broken: bool,
}

#[derive(Clone)]
struct MockHost {
    state: Arc<Mutex<HostState>>,
    addr: SocketAddr,
}

fn expected_signature(form: &HashMap<String, String>) -> String {
    let mut signed: Vec<_> = form
        .iter()
        .filter(|(k, _)| {
            !matches!(
                k.as_str(),
                "file" | "api_key" | "signature" | "signature_algorithm"
            )
        })
        .collect();
    signed.sort();
    let payload = signed
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(API_SECRET.as_bytes());
    hex::encode(hasher.finalize())
}

fn check_auth(form: &HashMap<String, String>) -> Option<Response> {
    let valid = form.get("api_key").map(String::as_str) == Some(API_KEY)
        && form.get("signature") == Some(&expected_signature(form));
    if valid {
        None
    } else {
        Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": { "message": "Invalid Signature" } })),
            )
                .into_response(),
        )
    }
}

async fn upload(
    State(host): State<MockHost>,
    Path(cloud): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    host.state.lock().unwrap().upload_calls += 1;
    if let Some(rejection) = check_auth(&form) {
        return rejection;
    }

    let mut state = host.state.lock().unwrap();
    if state.failing_uploads > 0 {
        state.failing_uploads -= 1;
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": { "message": "try again" } })),
        )
            .into_response();
    }

    let public_id = form["public_id"].clone();
    let encoded = form["file"].split_once(";base64,").unwrap().1;
    state
        .objects
        .insert(public_id.clone(), STANDARD.decode(encoded).unwrap());

    Json(json!({
        "public_id": public_id,
        "secure_url": format!("http://{}/delivery/{}/image/upload/{}.png", host.addr, cloud, public_id),
    }))
    .into_response()
}

async fn destroy(State(host): State<MockHost>, Form(form): Form<HashMap<String, String>>) -> Response {
    let rejecting = {
        let mut state = host.state.lock().unwrap();
        state.destroy_calls += 1;
        state.rejecting_destroys
    };
    if rejecting {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "Invalid api_key" } })),
        )
            .into_response();
    }
    if let Some(rejection) = check_auth(&form) {
        return rejection;
    }
    let removed = host.state.lock().unwrap().objects.remove(&form["public_id"]);
    let result = if removed.is_some() { "ok" } else { "not found" };
    Json(json!({ "result": result })).into_response()
}

async fn deliver(State(host): State<MockHost>, Path((_cloud, path)): Path<(String, String)>) -> Response {
    let state = host.state.lock().unwrap();
    if state.delivery_broken {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let key = path.rsplit_once('.').map(|(key, _)| key).unwrap_or(&path);
    match state.objects.get(key) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn start_mock_host() -> MockHost {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = MockHost {
        state: Arc::new(Mutex::new(HostState::default())),
        addr: listener.local_addr().unwrap(),
    };

    let app = Router::new()
        .route("/api/{cloud}/image/upload", post(upload))
        .route("/api/{cloud}/image/destroy", post(destroy))
        .route("/delivery/{cloud}/image/upload/{*path}", get(deliver))
        .with_state(host.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    host
}

fn remote_config(root: &std::path::Path, host: &MockHost, secret: &str) -> Config {
    let mut config = Config::default();
    config.storage.backend = BackendKind::Remote;
    config.storage.data_path = root.to_path_buf();
    config.storage.local_path = root.join("images");
    config.storage.registry_path = root.join("logos.json");
    config.storage.lock_path = root.join("locks");
    config.storage.credentials_path = root.join("config.json");
    config.cache.path = root.join("cache");
    config.remote.cloud_name = Some(CLOUD.to_string());
    config.remote.api_key = Some(API_KEY.to_string());
    config.remote.api_secret = Some(secret.to_string());
    config.remote.api_base_url = format!("http://{}/api", host.addr);
    config.remote.delivery_base_url = format!("http://{}/delivery", host.addr);
    config.remote.request_timeout = Duration::from_secs(5);
    config.remote.max_attempts = 3;
    config.remote.initial_backoff = Duration::from_millis(10);
    config.remote.max_backoff = Duration::from_millis(40);
    config
}

async fn remote_service(secret: &str) -> (LogoAssetService, MockHost, TempDir) {
    let host = start_mock_host().await;
    let dir = tempfile::tempdir().unwrap();
    let config = remote_config(dir.path(), &host, secret);
    let service = LogoAssetService::from_config(&config).await.unwrap();
    (service, host, dir)
}

fn png() -> Vec<u8> {
    let image = RgbaImage::from_pixel(40, 30, Rgba([10, 120, 10, 255]));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn request(target_id: Option<u64>) -> UploadRequest {
    UploadRequest {
        bytes: png(),
        original_name: "channel4.png".to_string(),
        target_id,
    }
}

#[tokio::test]
async fn test_remote_round_trip_through_cache() {
    let (service, host, dir) = remote_service(API_SECRET).await;
    assert!(service.cache_enabled());

    let outcome = service.create(request(None)).await.unwrap();
    let record = service.record(outcome.id).await.unwrap();
    assert!(record.storage_key.starts_with("tv-logos/"));
    assert_eq!(
        outcome.url,
        format!(
            "http://{}/delivery/{}/image/upload/{}.png",
            host.addr, CLOUD, record.storage_key
        )
    );

    let first = service.get(outcome.id).await.unwrap();
    assert!(!first.from_cache);
    let second = service.get(outcome.id).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(first.bytes, second.bytes);
    assert_eq!(std::fs::read_dir(dir.path().join("cache")).unwrap().count(), 1);

    assert_eq!(service.delete(outcome.id).await.unwrap(), DeleteOutcome::Deleted);
    assert!(host.state.lock().unwrap().objects.is_empty());
    assert_eq!(std::fs::read_dir(dir.path().join("cache")).unwrap().count(), 0);
    assert!(service.get(outcome.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_transient_upload_failure_is_retried() {
    let (service, host, _dir) = remote_service(API_SECRET).await;
    host.state.lock().unwrap().failing_uploads = 2;

    let outcome = service.create(request(None)).await.unwrap();
    assert_eq!(outcome.id, 1);
    assert_eq!(host.state.lock().unwrap().upload_calls, 3);
}

#[tokio::test]
async fn test_exhausted_retries_leave_no_record() {
    let (service, host, _dir) = remote_service(API_SECRET).await;
    host.state.lock().unwrap().failing_uploads = 10;

    let err = service.create(request(None)).await.unwrap_err();
    assert!(matches!(err, AppError::Storage(StorageError::Unavailable { .. })));
    assert_eq!(host.state.lock().unwrap().upload_calls, 3);
    assert!(service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_credentials_are_not_retried() {
    let (service, host, _dir) = remote_service("wrong-secret").await;

    let err = service.create(request(None)).await.unwrap_err();
    match err {
        AppError::Storage(StorageError::Rejected { status, message, .. }) => {
            assert_eq!(status, 401);
            assert!(message.contains("Invalid Signature"));
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert_eq!(host.state.lock().unwrap().upload_calls, 1);
    assert!(service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_remote_delete_keeps_record_and_bytes() {
    let (service, host, _dir) = remote_service(API_SECRET).await;
    let created = service.create(request(None)).await.unwrap();
    let before = service.record(created.id).await.unwrap();
    host.state.lock().unwrap().rejecting_destroys = true;

    let err = service.delete(created.id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Storage(StorageError::Rejected { status: 401, .. })
    ));
    assert_eq!(host.state.lock().unwrap().destroy_calls, 1);

    let after = service.record(created.id).await.unwrap();
    assert_eq!(after.storage_key, before.storage_key);
    assert_eq!(after, before);
    assert!(
        host.state
            .lock()
            .unwrap()
            .objects
            .contains_key(&before.storage_key)
    );

    let logo = service.get(created.id).await.unwrap();
    assert!(!logo.bytes.is_empty());
    assert_eq!(service.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reupload_replaces_remote_object() {
    let (service, host, _dir) = remote_service(API_SECRET).await;

    let created = service.create(request(None)).await.unwrap();
    let old_key = service.record(created.id).await.unwrap().storage_key;
    service.get(created.id).await.unwrap();

    let replaced = service.create(request(Some(created.id))).await.unwrap();
    assert!(replaced.replaced);
    let new_key = service.record(created.id).await.unwrap().storage_key;
    assert_ne!(old_key, new_key);

    {
        let state = host.state.lock().unwrap();
        assert_eq!(state.objects.len(), 1);
        assert!(state.objects.contains_key(&new_key));
    }

    // The cached copy of the old bytes is gone
    assert!(!service.get(created.id).await.unwrap().from_cache);
}

#[tokio::test]
async fn test_image_route_redirects_when_host_fails() {
    let (service, host, _dir) = remote_service(API_SECRET).await;
    let created = service.create(request(None)).await.unwrap();
    host.state.lock().unwrap().delivery_broken = true;

    let router = create_router(AppState { logo_service: service }, 5 * 1024 * 1024);
    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/cached-image/{}", created.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], created.url.as_str());
}

#[tokio::test]
async fn test_record_without_remote_bytes_reports_missing_bytes() {
    let (service, host, _dir) = remote_service(API_SECRET).await;
    let created = service.create(request(None)).await.unwrap();
    let record = service.record(created.id).await.unwrap();
    host.state.lock().unwrap().objects.clear();

    let err = service.get(created.id).await.unwrap_err();
    match err {
        AppError::Storage(StorageError::NotFound { key }) => assert_eq!(key, record.storage_key),
        other => panic!("expected missing bytes, got {other:?}"),
    }
    // The record itself is untouched
    assert_eq!(service.record(created.id).await.unwrap(), record);
}
