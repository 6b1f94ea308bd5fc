//! Rule management endpoints.
//!
//! Everything the management UI needs: fetch and replace the config,
//! preview a candidate rule list against the known files, validate a
//! single rule, and enumerate the template variables.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::warn;

use metafuse_core::{FileMetadata, PropertyMap};
use metafuse_rules::{validate_config, validate_rule, Rule, RuleConfig, RuleSet};
use metafuse_vfs::paths;

use crate::{ApiError, AppState};

const DEFAULT_PREVIEW_LIMIT: usize = 100;

pub async fn get_rules(State(state): State<AppState>) -> Json<Value> {
    let config = state.rules_store.load();
    let last_modified = config.last_modified;
    Json(json!({
        "config": config,
        "lastModified": last_modified,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PutRulesRequest {
    pub config: RuleConfig,
}

pub async fn put_rules(
    State(state): State<AppState>,
    Json(request): Json<PutRulesRequest>,
) -> Result<Json<Value>, ApiError> {
    let validation = validate_config(&request.config);
    if !validation.is_valid() {
        return Err(ApiError::Validation(validation.errors));
    }

    let saved = state.rules_store.save(request.config).map_err(|e| {
        warn!("rule save failed: {e}");
        ApiError::Internal
    })?;
    state.vfs.set_rules(&saved).await;

    let refreshed = match state.service.refresh().await {
        Ok(()) => true,
        Err(e) => {
            warn!("refresh after rule save failed: {e}");
            false
        }
    };

    Ok(Json(json!({ "success": true, "refreshed": refreshed })))
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    /// Candidate rules; the saved config's rules when omitted
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewEntry {
    source_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_virtual_path: Option<String>,
    new_virtual_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    matched_rule_id: Option<String>,
}

pub async fn preview(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> Json<Value> {
    let mut config = state.rules_store.load();
    if let Some(rules) = request.rules {
        config.rules = rules;
    }
    let rule_set = RuleSet::compile(&config);

    let limit = request.limit.unwrap_or(DEFAULT_PREVIEW_LIMIT);
    let (snapshots, total) = state.service.snapshots(Some(limit)).await;

    let mut previews = Vec::with_capacity(snapshots.len());
    for (id, snapshot) in &snapshots {
        let Some(meta) = FileMetadata::from_properties(snapshot) else {
            continue;
        };
        let resolved = rule_set.resolve(&meta);
        previews.push(PreviewEntry {
            source_path: paths::resolve_source_path(&state.files_root, &meta.file_path),
            current_virtual_path: state.vfs.path_of(id).await,
            new_virtual_path: paths::sanitize(&resolved.path),
            matched_rule_id: resolved.rule_id,
        });
    }

    let limited = total > previews.len();
    Json(json!({
        "previews": previews,
        "total": total,
        "limited": limited,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub rule: Rule,
    #[serde(default)]
    pub sample_metadata: Option<HashMap<String, Value>>,
}

pub async fn validate(Json(request): Json<ValidateRequest>) -> Json<Value> {
    let validation = validate_rule(&request.rule);

    let sample_output = request
        .sample_metadata
        .filter(|_| validation.is_valid())
        .and_then(|sample| sample_output(&request.rule, &sample));

    Json(json!({
        "valid": validation.is_valid(),
        "errors": validation.errors,
        "warnings": validation.warnings,
        "sampleOutput": sample_output,
    }))
}

/// Run one rule against caller-supplied sample metadata. `None` when the
/// sample is incomplete, the conditions miss, or the template fails.
fn sample_output(rule: &Rule, sample: &HashMap<String, Value>) -> Option<String> {
    let props: PropertyMap = sample
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (metafuse_core::normalize_property_path(k), value)
        })
        .collect();
    let meta = FileMetadata::from_properties(&props)?;

    let config = RuleConfig {
        version: 0,
        rules: vec![rule.clone()],
        default_rule: None,
        last_modified: None,
        is_default: false,
    };
    let resolved = RuleSet::compile(&config).resolve(&meta);
    // The built-in unsorted fallback means "this rule did not place it".
    resolved.rule_id.as_ref()?;
    Some(paths::sanitize(&resolved.path))
}

#[derive(Debug, Serialize)]
struct VariableInfo {
    name: &'static str,
    description: &'static str,
}

const VARIABLES: &[(&str, &str)] = &[
    ("filePath", "Source location below the files root"),
    ("fileName", "Base name, derived from filePath when absent"),
    ("extension", "File extension without the dot"),
    ("fileType", "Classification: video, subtitle, torrent, image, document"),
    ("size", "Size in bytes (aliases: fileSize, sizeByte)"),
    ("mtime", "Modification time"),
    ("ctime", "Change time"),
    ("title", "Display title"),
    ("titles.<lang>", "Per-language titles, e.g. titles.eng"),
    ("originalTitle", "Title in the original language"),
    ("season", "Season number"),
    ("episode", "Episode number"),
    ("extra", "True for extras/bonus material"),
    ("movieYear", "Release year of a movie"),
    ("year", "Generic year"),
    ("version", "Cut or edition label"),
    ("subtitleLanguage", "Language of a subtitle file"),
];

pub async fn variables() -> Json<Value> {
    let list: Vec<VariableInfo> = VARIABLES
        .iter()
        .map(|&(name, description)| VariableInfo { name, description })
        .collect();
    Json(json!({ "variables": list }))
}
