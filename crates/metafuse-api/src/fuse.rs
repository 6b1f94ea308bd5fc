//! Filesystem query endpoints.
//!
//! These are the calls the kernel driver issues on every lookup. Each one
//! validates the path, takes a single read on the projection, and maps a
//! miss to 404.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use metafuse_core::{EventId, PropertyMap};
use metafuse_vfs::{FileAttributes, ReadResolution};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

impl PathRequest {
    /// Reject anything that is not an absolute virtual path.
    fn validated(&self) -> Result<&str, ApiError> {
        let path = self.path.trim();
        if path.is_empty() {
            return Err(ApiError::BadRequest("path must not be empty".to_string()));
        }
        if !path.starts_with('/') {
            return Err(ApiError::BadRequest("path must be absolute".to_string()));
        }
        Ok(path)
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "metafuse",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    file_count: u64,
    directory_count: u64,
    total_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_refresh: Option<chrono::DateTime<Utc>>,
    events_processed: u64,
    properties_fetched: u64,
    properties_skipped: u64,
    files_completed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_event_id: Option<EventId>,
    connected: bool,
    ready: bool,
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let vfs = state.vfs.stats().await;
    let events = state.service.stats().await;
    Json(StatsResponse {
        file_count: vfs.file_count,
        directory_count: vfs.directory_count,
        total_size: vfs.total_size,
        last_refresh: vfs.last_refresh,
        events_processed: events.events_processed,
        properties_fetched: events.properties_fetched,
        properties_skipped: events.properties_skipped,
        files_completed: events.files_completed,
        last_event_id: events.last_event_id,
        connected: state.service.is_connected(),
        ready: state.service.is_ready(),
    })
}

pub async fn readdir(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Result<Json<Value>, ApiError> {
    state.ensure_ready()?;
    let path = request.validated()?;
    let entries = state.vfs.readdir(path).await.ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "entries": entries })))
}

pub async fn getattr(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Result<Json<FileAttributes>, ApiError> {
    state.ensure_ready()?;
    let path = request.validated()?;
    let attrs = state.vfs.getattr(path).await.ok_or(ApiError::NotFound)?;
    Ok(Json(attrs))
}

pub async fn exists(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Result<Json<Value>, ApiError> {
    state.ensure_ready()?;
    let path = request.validated()?;
    Ok(Json(json!({ "exists": state.vfs.exists(path).await })))
}

pub async fn read(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Result<Json<ReadResolution>, ApiError> {
    state.ensure_ready()?;
    let path = request.validated()?;
    let resolution = state
        .vfs
        .resolve_read(path)
        .await
        .ok_or(ApiError::NotFound)?;
    Ok(Json(resolution))
}

pub async fn metadata(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Result<Json<PropertyMap>, ApiError> {
    state.ensure_ready()?;
    let path = request.validated()?;
    let snapshot = state.vfs.metadata(path).await.ok_or(ApiError::NotFound)?;
    Ok(Json(snapshot))
}

pub async fn files(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.ensure_ready()?;
    Ok(Json(json!({ "files": state.vfs.all_files().await })))
}

pub async fn directories(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.ensure_ready()?;
    Ok(Json(json!({ "directories": state.vfs.all_directories().await })))
}

pub async fn refresh(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.service.refresh().await {
        Ok(()) => Ok(Json(json!({ "status": "ok" }))),
        Err(e) => {
            warn!("refresh failed: {e}");
            Err(ApiError::Internal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metafuse_rules::{default_config, RuleConfigStore};
    use metafuse_state::{StateService, StateServiceConfig};
    use metafuse_store::MemoryStore;
    use metafuse_vfs::{Vfs, VfsConfig};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn state_with(store: MemoryStore) -> (AppState, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let rule_config = default_config();
        let vfs = Arc::new(Vfs::new(VfsConfig::default(), &rule_config));
        let rules_store = Arc::new(RuleConfigStore::new(dir.path()));
        let service = Arc::new(StateService::new(
            Arc::new(store),
            Arc::clone(&vfs),
            Arc::clone(&rules_store),
            &rule_config,
            StateServiceConfig::default(),
        ));
        let state = AppState::new(
            vfs,
            service,
            rules_store,
            "/files".to_string(),
            Duration::ZERO,
        );
        (state, dir)
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.append_set("abc", "filePath", "Movies/Inception.mkv");
        store.append_set("abc", "title", "Inception");
        store.append_set("abc", "movieYear", "2010");
        store.append_set("abc", "fileType", "video");
        store.append_set("abc", "extension", "mkv");
        store
    }

    #[tokio::test]
    async fn test_health_shape() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "metafuse");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_readdir_after_refresh() {
        let (state, _dir) = state_with(seeded_store()).await;
        state.service.refresh().await.unwrap();

        let Json(body) = readdir(
            State(state),
            Json(PathRequest {
                path: "/Movies".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body["entries"], json!(["Inception (2010)"]));
    }

    #[tokio::test]
    async fn test_readdir_missing_is_not_found() {
        let (state, _dir) = state_with(MemoryStore::new()).await;
        let result = readdir(
            State(state),
            Json(PathRequest {
                path: "/nope".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn test_relative_path_is_bad_request() {
        let (state, _dir) = state_with(MemoryStore::new()).await;
        let result = exists(
            State(state),
            Json(PathRequest {
                path: "Movies".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_empty_path_is_bad_request() {
        let (state, _dir) = state_with(MemoryStore::new()).await;
        let result = getattr(
            State(state),
            Json(PathRequest {
                path: "   ".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_read_returns_source_path() {
        let (state, _dir) = state_with(seeded_store()).await;
        state.service.refresh().await.unwrap();

        let Json(resolution) = read(
            State(state),
            Json(PathRequest {
                path: "/Movies/Inception (2010)/Inception (2010).mkv".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(resolution.source_path, "/files/Movies/Inception.mkv");
    }

    #[tokio::test]
    async fn test_stats_reflects_consumption() {
        let (state, _dir) = state_with(seeded_store()).await;
        state.service.refresh().await.unwrap();

        let Json(stats) = stats(State(state)).await;
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.events_processed, 5);
        assert!(stats.last_refresh.is_some());
    }

    #[tokio::test]
    async fn test_refresh_endpoint_ok() {
        let (state, _dir) = state_with(seeded_store()).await;
        let Json(body) = refresh(State(state.clone())).await.unwrap();
        assert_eq!(body["status"], "ok");
        assert!(state.vfs.exists("/Movies").await);
    }
}
