//! # metafuse-api
//!
//! The HTTP surface the kernel driver and the management UI talk to.
//!
//! Stateless dispatch over the projection: every handler validates its
//! input, performs a single lookup (or a rule-store operation), and maps
//! the outcome onto plain JSON responses. The filesystem endpoints live in
//! [`fuse`], rule management in [`rules`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use metafuse_rules::RuleConfigStore;
use metafuse_state::StateService;
use metafuse_vfs::Vfs;

pub mod fuse;
pub mod rules;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub vfs: Arc<Vfs>,
    pub service: Arc<StateService>,
    pub rules_store: Arc<RuleConfigStore>,
    /// Root the upstream files live under, for preview source paths
    pub files_root: String,
    /// Handlers answer 503 until bootstrap finishes or this much time has
    /// passed since startup (zero serves immediately)
    pub startup_grace: Duration,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        vfs: Arc<Vfs>,
        service: Arc<StateService>,
        rules_store: Arc<RuleConfigStore>,
        files_root: String,
        startup_grace: Duration,
    ) -> Self {
        Self {
            vfs,
            service,
            rules_store,
            files_root,
            startup_grace,
            started_at: Instant::now(),
        }
    }

    /// Projection availability gate for the filesystem endpoints.
    fn ensure_ready(&self) -> Result<(), ApiError> {
        if !self.service.is_ready() && self.started_at.elapsed() < self.startup_grace {
            return Err(ApiError::Unavailable);
        }
        Ok(())
    }
}

/// User-visible request failures.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Validation(Vec<String>),
    Unavailable,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not found" })),
            )
                .into_response(),
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "errors": errors })),
            )
                .into_response(),
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "projection is still starting" })),
            )
                .into_response(),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response(),
        }
    }
}

/// Build the full route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(fuse::health))
        .route("/api/fuse/health", get(fuse::health))
        .route("/api/fuse/stats", get(fuse::stats))
        .route("/api/fuse/readdir", post(fuse::readdir))
        .route("/api/fuse/getattr", post(fuse::getattr))
        .route("/api/fuse/exists", post(fuse::exists))
        .route("/api/fuse/read", post(fuse::read))
        .route("/api/fuse/metadata", post(fuse::metadata))
        .route("/api/fuse/files", get(fuse::files))
        .route("/api/fuse/directories", get(fuse::directories))
        .route("/api/fuse/refresh", post(fuse::refresh))
        .route("/api/fuse/rules", get(rules::get_rules).put(rules::put_rules))
        .route("/api/fuse/rules/preview", post(rules::preview))
        .route("/api/fuse/rules/validate", post(rules::validate))
        .route("/api/fuse/rules/variables", get(rules::variables))
        .with_state(state)
}

/// Bind and serve until the listener errors out.
pub async fn serve(state: AppState, host: &str, port: u16) -> metafuse_core::Result<()> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("api listening on {addr}");
    axum::serve(listener, app)
        .await
        .map_err(metafuse_core::Error::Io)?;
    Ok(())
}
