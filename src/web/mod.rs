//! Web layer module
//!
//! This module provides the HTTP interface for the TV Logo Manager. Handlers
//! are thin: they extract request data, delegate to the logo service and map
//! the result onto a response.

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{config::Config, logo_assets::LogoAssetService};

pub mod api;
pub mod handlers;
pub mod responses;

pub use responses::{ApiResponse, handle_error};

const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &Config, logo_service: LogoAssetService) -> Result<Self> {
        let app = create_router(
            AppState { logo_service },
            config.web.max_upload_size,
        );
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;

        Ok(Self { app, addr })
    }

    /// Start the web server and run until a shutdown signal arrives
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Listening on http://{}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    /// Get the host address
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Build the router with all routes and middleware
pub fn create_router(state: AppState, max_upload_size: u64) -> Router {
    // Headroom for multipart framing so oversized files reach the service's
    // own size check
    let body_limit = usize::try_from(max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/upload", post(api::upload_logos))
        .route("/api/logos", get(api::list_logos))
        .route(
            "/api/logos/{id}",
            get(api::get_logo).delete(api::delete_logo),
        )
        .route("/cached-image/{id}", get(handlers::serve_logo_image))
        .route(
            "/clear-cache",
            get(handlers::clear_cache).post(handlers::clear_cache),
        )
        .route("/backup", get(handlers::backup_logos))
        // Middleware (applied in reverse order)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub logo_service: LogoAssetService,
}
