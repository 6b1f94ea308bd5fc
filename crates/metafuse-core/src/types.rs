//! Core types for metafuse.
//!
//! This module contains the shared data structures used across metafuse:
//!
//! ## Identity
//! - [`FileId`]: opaque content identifier, the row key in the store
//! - [`EventId`]: monotonic id of an event-log entry (`<ms>-<seq>`)
//!
//! ## Event Log
//! - [`StreamEntry`]: one property mutation read from the log
//! - [`StreamBatch`]: a page of entries plus the resume cursor
//! - [`EventKind`]: `set` or `del`
//!
//! ## Metadata
//! - [`FileMetadata`]: typed view over a file's raw property map
//! - [`FileKind`]: coarse file classification, inferred when absent
//! - [`PropertyMap`]: the raw per-file string properties

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Raw per-file properties as read from the store, keyed by dot-normalized
/// property path.
pub type PropertyMap = HashMap<String, String>;

// ============================================================================
// Identity
// ============================================================================

/// Opaque content identifier used as the row key in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of an event-log entry, `<ms>-<seq>`.
///
/// Ordering follows the numeric components, not the string form, so
/// `100-2 < 1000-0` holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Cursor pointing before the first entry of a stream.
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric `(ms, seq)` components; a bare number is `(ms, 0)`.
    fn parts(&self) -> (u64, u64) {
        match self.0.split_once('-') {
            Some((ms, seq)) => (
                ms.parse().unwrap_or(0),
                seq.parse().unwrap_or(0),
            ),
            None => (self.0.parse().unwrap_or(0), 0),
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialOrd for EventId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.parts().cmp(&other.parts())
    }
}

// ============================================================================
// Event Log
// ============================================================================

/// Kind of a property mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Set,
    Del,
}

/// One entry of the ordered change log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Monotonic entry id
    pub id: EventId,
    /// Mutation kind
    pub kind: EventKind,
    /// Store key the mutation applied to (`file:<id>/<prop>`)
    pub key: String,
    /// Writer-side timestamp, epoch milliseconds
    pub ts: i64,
}

/// A page of stream entries.
#[derive(Debug, Clone, Default)]
pub struct StreamBatch {
    pub entries: Vec<StreamEntry>,
    /// Id of the last entry in this batch; `None` when the batch is empty.
    pub last_id: Option<EventId>,
}

impl StreamBatch {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a store key of the form `file:<id>/<prop>` into its parts.
///
/// The property path keeps its raw form (slashes included); callers
/// normalize with [`normalize_property_path`] before comparisons. Keys with
/// any other shape (`file:__index__`, foreign prefixes) return `None`.
pub fn parse_property_key(key: &str) -> Option<(FileId, String)> {
    let rest = key.strip_prefix("file:")?;
    let (id, prop) = rest.split_once('/')?;
    if id.is_empty() || prop.is_empty() {
        return None;
    }
    Some((FileId::new(id), prop.to_string()))
}

/// Normalize a property path to dot form (`titles/eng` → `titles.eng`).
pub fn normalize_property_path(path: &str) -> String {
    path.replace('/', ".")
}

// ============================================================================
// File classification
// ============================================================================

/// Coarse file classification used by rule conditions.
///
/// Stored as the `fileType` property; inferred from the extension when the
/// writer did not emit one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Video,
    Subtitle,
    Torrent,
    Image,
    Document,
    Unknown,
}

impl FileKind {
    /// Infer the kind from a file extension (lowercased before matching).
    pub fn from_extension(ext: &str) -> FileKind {
        match ext.to_ascii_lowercase().as_str() {
            "mkv" | "mp4" | "avi" | "mov" | "wmv" | "flv" | "webm" | "m4v" => FileKind::Video,
            "srt" | "ass" | "ssa" | "sub" | "idx" | "vtt" => FileKind::Subtitle,
            "torrent" => FileKind::Torrent,
            _ => FileKind::Unknown,
        }
    }

    /// Parse a stored `fileType` label.
    pub fn from_label(label: &str) -> FileKind {
        match label.to_ascii_lowercase().as_str() {
            "video" => FileKind::Video,
            "subtitle" => FileKind::Subtitle,
            "torrent" => FileKind::Torrent,
            "image" => FileKind::Image,
            "document" => FileKind::Document,
            _ => FileKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FileKind::Video => "video",
            FileKind::Subtitle => "subtitle",
            FileKind::Torrent => "torrent",
            FileKind::Image => "image",
            FileKind::Document => "document",
            FileKind::Unknown => "unknown",
        }
    }
}

// ============================================================================
// Typed metadata
// ============================================================================

/// Typed view over a file's raw property map.
///
/// The store only holds strings; this record parses the fields the
/// projection needs (sizes, timestamps, classification) and keeps the full
/// raw map so rules can reference arbitrary properties by path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Source location relative to the files root (required for visibility)
    pub file_path: String,
    /// Base name, synthesized from `file_path` when not stored
    pub file_name: String,
    /// Extension without the dot, synthesized from `file_name` when absent
    pub extension: Option<String>,
    /// Size in bytes, from `size` / `fileSize` / `sizeByte` (first present)
    pub size: Option<u64>,
    pub mtime: Option<DateTime<Utc>>,
    pub ctime: Option<DateTime<Utc>>,
    pub kind: FileKind,
    /// Full dot-normalized raw property map
    pub properties: PropertyMap,
}

impl FileMetadata {
    /// Build the typed record from a raw property map.
    ///
    /// Returns `None` when `filePath` is missing: such a file is not
    /// eligible for projection.
    pub fn from_properties(props: &PropertyMap) -> Option<FileMetadata> {
        let file_path = props.get("filePath")?.clone();

        let file_name = props
            .get("fileName")
            .cloned()
            .unwrap_or_else(|| basename(&file_path).to_string());

        let extension = props
            .get("extension")
            .cloned()
            .or_else(|| extension_of(&file_name).map(str::to_string));

        let size = ["size", "fileSize", "sizeByte"]
            .iter()
            .find_map(|k| props.get(*k))
            .and_then(|v| v.parse::<u64>().ok());

        let mtime = props.get("mtime").and_then(|v| parse_timestamp(v));
        let ctime = props.get("ctime").and_then(|v| parse_timestamp(v));

        let kind = match props.get("fileType") {
            Some(label) => FileKind::from_label(label),
            None => extension
                .as_deref()
                .map(FileKind::from_extension)
                .unwrap_or(FileKind::Unknown),
        };

        Some(FileMetadata {
            file_path,
            file_name,
            extension,
            size,
            mtime,
            ctime,
            kind,
            properties: props.clone(),
        })
    }

    /// Look up a field by dot- or slash-delimited path.
    ///
    /// Raw properties win; derived values (`fileName`, `extension`,
    /// `fileType`, the size aliases) fill in when the writer never emitted
    /// them. Used by both template interpolation and condition evaluation.
    pub fn field(&self, path: &str) -> Option<String> {
        let path = normalize_property_path(path);
        if let Some(v) = self.properties.get(&path) {
            return Some(v.clone());
        }
        match path.as_str() {
            "fileName" => Some(self.file_name.clone()),
            "extension" => self.extension.clone(),
            "fileType" if self.kind != FileKind::Unknown => {
                Some(self.kind.as_str().to_string())
            }
            "size" | "fileSize" | "sizeByte" => self.size.map(|s| s.to_string()),
            _ => None,
        }
    }
}

/// Last path segment of a slash-delimited path.
pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// Extension of a file name, without the dot. Dotfiles have none.
pub fn extension_of(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Parse a stored timestamp: epoch seconds, epoch milliseconds, a float
/// seconds value, or RFC 3339.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(n) = value.parse::<i64>() {
        // Heuristic: values past ~Nov 2286 in seconds are milliseconds.
        return if n.abs() >= 10_000_000_000 {
            Utc.timestamp_millis_opt(n).single()
        } else {
            Utc.timestamp_opt(n, 0).single()
        };
    }
    if let Ok(f) = value.parse::<f64>() {
        return Utc.timestamp_opt(f.trunc() as i64, (f.fract() * 1e9) as u32).single();
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
