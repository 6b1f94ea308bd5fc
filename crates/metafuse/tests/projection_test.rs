//! Integration tests for the full projection pipeline.
//!
//! Tests the complete flow: event log → state builder → projection →
//! query surface, driven through the in-memory store playing the writer's
//! role.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use tempfile::TempDir;

use metafuse_api::fuse::{self, PathRequest};
use metafuse_api::rules::{self, PreviewRequest, PutRulesRequest};
use metafuse_api::AppState;
use metafuse_core::FileId;
use metafuse_rules::{RuleConfig, RuleConfigStore};
use metafuse_state::{StateService, StateServiceConfig};
use metafuse_store::MemoryStore;
use metafuse_vfs::{Vfs, VfsConfig};

struct Stack {
    store: MemoryStore,
    vfs: Arc<Vfs>,
    service: Arc<StateService>,
    state: AppState,
    _dir: TempDir,
}

/// Build the whole component stack over an in-memory store, optionally
/// pre-saving a rule config (otherwise the built-in defaults seed).
fn stack_with_rules(rule_config: Option<RuleConfig>) -> Stack {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let rules_store = Arc::new(RuleConfigStore::new(dir.path()));

    if let Some(config) = rule_config {
        rules_store.save(config).unwrap();
    }
    let rule_config = rules_store.load();

    let vfs = Arc::new(Vfs::new(VfsConfig::default(), &rule_config));
    let service = Arc::new(StateService::new(
        Arc::new(store.clone()),
        Arc::clone(&vfs),
        Arc::clone(&rules_store),
        &rule_config,
        StateServiceConfig {
            tail_timeout: Duration::from_millis(50),
            ..StateServiceConfig::default()
        },
    ));
    let state = AppState::new(
        Arc::clone(&vfs),
        Arc::clone(&service),
        rules_store,
        "/files".to_string(),
        Duration::ZERO,
    );
    Stack {
        store,
        vfs,
        service,
        state,
        _dir: dir,
    }
}

fn stack() -> Stack {
    stack_with_rules(None)
}

fn emit_movie(store: &MemoryStore) {
    store.append_set("abc", "filePath", "Movies/Inception.mkv");
    store.append_set("abc", "title", "Inception");
    store.append_set("abc", "year", "2010");
    store.append_set("abc", "fileType", "video");
    store.append_set("abc", "extension", "mkv");
    store.append_set("abc", "movieYear", "2010");
}

async fn readdir(state: &AppState, path: &str) -> Vec<String> {
    let Json(body) = fuse::readdir(
        State(state.clone()),
        Json(PathRequest {
            path: path.to_string(),
        }),
    )
    .await
    .unwrap();
    serde_json::from_value(body["entries"].clone()).unwrap()
}

// ==================== Scenario: bootstrap to complete ====================

#[tokio::test]
async fn test_bootstrap_to_complete() {
    let stack = stack();
    emit_movie(&stack.store);
    stack.service.refresh().await.unwrap();

    assert!(readdir(&stack.state, "/").await.contains(&"Movies".to_string()));
    assert!(readdir(&stack.state, "/Movies")
        .await
        .contains(&"Inception (2010)".to_string()));

    let file_path = "/Movies/Inception (2010)/Inception (2010).mkv";
    let Json(attrs) = fuse::getattr(
        State(stack.state.clone()),
        Json(PathRequest {
            path: file_path.to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(attrs.mode & 0o170000, 0o100000, "regular file bit");
    assert_eq!(attrs.size, 0, "size was never emitted");

    let Json(read) = fuse::read(
        State(stack.state.clone()),
        Json(PathRequest {
            path: file_path.to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(read.source_path, "/files/Movies/Inception.mkv");
}

// ==================== Scenario: move on property update ====================

#[tokio::test]
async fn test_move_on_property_update() {
    let stack = stack();
    emit_movie(&stack.store);
    stack.service.refresh().await.unwrap();

    stack.store.append_set("abc", "movieYear", "2011");
    stack.service.refresh().await.unwrap();

    let entries = readdir(&stack.state, "/Movies").await;
    assert!(!entries.contains(&"Inception (2010)".to_string()));
    assert!(entries.contains(&"Inception (2011)".to_string()));

    let Json(snapshot) = fuse::metadata(
        State(stack.state.clone()),
        Json(PathRequest {
            path: "/Movies/Inception (2011)/Inception (2011).mkv".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(snapshot.get("movieYear").map(String::as_str), Some("2011"));
}

// ==================== Scenario: delete on filePath removal ====================

#[tokio::test]
async fn test_delete_on_file_path_removal() {
    let stack = stack();
    emit_movie(&stack.store);
    stack.service.refresh().await.unwrap();
    assert!(stack.vfs.exists("/Movies").await);

    stack.store.append_del("abc", "filePath");
    stack.service.refresh().await.unwrap();

    assert!(!stack.vfs.exists("/Movies/Inception (2010)").await);
    assert!(!stack.vfs.exists("/Movies").await, "empty ancestors pruned");
    assert!(stack.vfs.path_of(&FileId::from("abc")).await.is_none());
}

// ==================== Scenario: TV with season and episode ====================

#[tokio::test]
async fn test_tv_with_season_and_episode() {
    let stack = stack();
    stack.store.append_set("xyz", "filePath", "tv/bb/s01e01.mkv");
    stack.store.append_set("xyz", "titles/eng", "Breaking Bad");
    stack.store.append_set("xyz", "season", "1");
    stack.store.append_set("xyz", "episode", "1");
    stack.store.append_set("xyz", "fileType", "video");
    stack.store.append_set("xyz", "extension", "mkv");
    stack.service.refresh().await.unwrap();

    assert!(stack
        .vfs
        .exists("/TV Shows/Breaking Bad/S01/Breaking Bad S01E01.mkv")
        .await);
}

// ==================== Scenario: rule relevance ====================

#[tokio::test]
async fn test_irrelevant_property_is_never_fetched() {
    // A rule set referencing only title (plus the core properties).
    let minimal: RuleConfig = serde_json::from_value(serde_json::json!({
        "version": 1,
        "rules": [{
            "id": "flat", "name": "flat",
            "template": "ByTitle/{title}"
        }]
    }))
    .unwrap();
    let stack = stack_with_rules(Some(minimal));

    stack.store.append_set("q", "unrelated", "whatever");
    stack.service.refresh().await.unwrap();

    let stats = stack.service.stats().await;
    assert_eq!(stats.properties_skipped, 1);
    assert_eq!(stats.properties_fetched, 0, "no GET for irrelevant keys");
    assert!(stack.vfs.all_files().await.is_empty());
}

// ==================== Scenario: refresh after rule change ====================

#[tokio::test]
async fn test_refresh_after_rule_change() {
    let by_title: RuleConfig = serde_json::from_value(serde_json::json!({
        "version": 1,
        "rules": [{
            "id": "r1", "name": "by title",
            "template": "ByTitle/{title}.{extension}"
        }]
    }))
    .unwrap();
    let stack = stack_with_rules(Some(by_title));
    emit_movie(&stack.store);
    stack.service.refresh().await.unwrap();

    let r1_path = "/ByTitle/Inception.mkv";
    assert!(stack.vfs.exists(r1_path).await);

    // Replace R1 with R2 through the management endpoint.
    let by_year: RuleConfig = serde_json::from_value(serde_json::json!({
        "version": 1,
        "rules": [{
            "id": "r2", "name": "by year",
            "template": "ByYear/{movieYear}/{title}.{extension}"
        }]
    }))
    .unwrap();
    let Json(body) = rules::put_rules(
        State(stack.state.clone()),
        Json(PutRulesRequest { config: by_year }),
    )
    .await
    .unwrap();
    assert_eq!(body["success"], serde_json::json!(true));
    assert_eq!(body["refreshed"], serde_json::json!(true));

    let r2_path = "/ByYear/2010/Inception.mkv";
    let gone = fuse::getattr(
        State(stack.state.clone()),
        Json(PathRequest {
            path: r1_path.to_string(),
        }),
    )
    .await;
    assert!(gone.is_err(), "old path answers 404");
    assert!(stack.vfs.exists(r2_path).await);
    assert_eq!(
        stack.vfs.path_of(&FileId::from("abc")).await.as_deref(),
        Some(r2_path)
    );
}

// ==================== Idempotence properties ====================

#[tokio::test]
async fn test_duplicate_set_is_noop() {
    let stack = stack();
    emit_movie(&stack.store);
    stack.service.refresh().await.unwrap();
    let before = stack.vfs.stats().await;

    // Re-emit the same value; the projection must not change.
    stack.store.append_set("abc", "movieYear", "2010");
    stack.service.refresh().await.unwrap();
    let after = stack.vfs.stats().await;

    assert_eq!(before.file_count, after.file_count);
    assert_eq!(before.directory_count, after.directory_count);
    assert_eq!(before.total_size, after.total_size);
}

#[tokio::test]
async fn test_refresh_with_same_config_is_stable() {
    let stack = stack();
    emit_movie(&stack.store);
    stack.service.refresh().await.unwrap();

    let files_before = stack.vfs.all_files().await;
    let dirs_before = stack.vfs.all_directories().await;

    stack.service.refresh().await.unwrap();

    assert_eq!(stack.vfs.all_files().await, files_before);
    assert_eq!(stack.vfs.all_directories().await, dirs_before);
}

// ==================== Live tail handoff ====================

#[tokio::test]
async fn test_bootstrap_then_live_tail_ordering() {
    let stack = stack();
    emit_movie(&stack.store);

    let handle = metafuse_state::spawn(Arc::clone(&stack.service));
    for _ in 0..200 {
        if stack.service.is_ready() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(stack.service.is_ready());
    assert!(stack.vfs.exists("/Movies/Inception (2010)").await);

    // Events appended after bootstrap flow through the tail in order.
    stack.store.append_set("abc", "movieYear", "2012");
    stack.store.append_set("abc", "movieYear", "2013");
    for _ in 0..200 {
        if stack.vfs.exists("/Movies/Inception (2013)").await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(stack.vfs.exists("/Movies/Inception (2013)").await);
    assert!(!stack.vfs.exists("/Movies/Inception (2012)").await);

    stack.service.stop();
    let _ = handle.await;
}

// ==================== Preview ====================

#[tokio::test]
async fn test_preview_does_not_mutate() {
    let stack = stack();
    emit_movie(&stack.store);
    stack.service.refresh().await.unwrap();

    let candidate: Vec<metafuse_rules::Rule> = serde_json::from_value(serde_json::json!([
        {"id": "flat", "name": "flat", "template": "Flat/{fileName}"}
    ]))
    .unwrap();

    let Json(body) = rules::preview(
        State(stack.state.clone()),
        Json(PreviewRequest {
            rules: Some(candidate),
            limit: None,
        }),
    )
    .await;

    let previews = body["previews"].as_array().unwrap();
    assert_eq!(previews.len(), 1);
    assert_eq!(previews[0]["sourcePath"], "/files/Movies/Inception.mkv");
    assert_eq!(
        previews[0]["currentVirtualPath"],
        "/Movies/Inception (2010)/Inception (2010).mkv"
    );
    assert_eq!(previews[0]["newVirtualPath"], "/Flat/Inception.mkv");
    assert_eq!(previews[0]["matchedRuleId"], "flat");
    assert_eq!(body["total"], serde_json::json!(1));
    assert_eq!(body["limited"], serde_json::json!(false));

    // The projection itself is untouched.
    assert!(stack
        .vfs
        .exists("/Movies/Inception (2010)/Inception (2010).mkv")
        .await);
}
