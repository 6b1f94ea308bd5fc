//! The projected directory tree and its indices.
//!
//! One [`Vfs`] instance holds the whole projection: a path-keyed node map
//! rooted at `/`, a fileId → path index, and a sourcePath → path index.
//! The event task is the only writer (through the [`StateObserver`] impl);
//! API handlers read concurrently through the same lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use metafuse_core::{FileId, FileMetadata, PropertyMap, StateObserver};
use metafuse_rules::{RuleConfig, RuleSet};

use crate::paths;

/// Directory-bit for attribute modes, as the kernel driver expects.
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;

/// Static projection parameters.
#[derive(Debug, Clone)]
pub struct VfsConfig {
    /// Root the upstream files live under
    pub files_root: String,
    /// External share base URL, enables `webdavUrl` in read resolutions
    pub webdav_base: Option<String>,
    /// Permission bits for file nodes
    pub file_mode: u32,
    /// Permission bits for directory nodes
    pub dir_mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            files_root: "/files".to_string(),
            webdav_base: None,
            file_mode: 0o644,
            dir_mode: 0o755,
            uid: 0,
            gid: 0,
        }
    }
}

/// Attributes returned to the filesystem driver. Timestamps are float
/// seconds since the epoch.
#[derive(Debug, Clone, Serialize)]
pub struct FileAttributes {
    pub size: u64,
    pub mode: u32,
    pub mtime: f64,
    pub atime: f64,
    pub ctime: f64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
}

/// Where a file's bytes actually live.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResolution {
    pub source_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webdav_url: Option<String>,
    pub size: u64,
}

/// Projection counters.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VfsStats {
    pub file_count: u64,
    pub directory_count: u64,
    pub total_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum Node {
    Directory(DirNode),
    File(FileNode),
}

#[derive(Debug)]
struct DirNode {
    /// Child names in insertion order
    children: Vec<String>,
}

#[derive(Debug)]
struct FileNode {
    file_id: FileId,
    source_path: String,
    size: u64,
    mtime: Option<DateTime<Utc>>,
    ctime: Option<DateTime<Utc>>,
    snapshot: PropertyMap,
}

struct VfsInner {
    /// Absolute virtual path → node, root included
    nodes: HashMap<String, Node>,
    /// fileId → virtual path
    file_index: HashMap<FileId, String>,
    /// upstream source path → virtual path
    source_index: HashMap<String, String>,
    rules: RuleSet,
    stats: VfsStats,
}

/// The in-memory virtual filesystem.
pub struct Vfs {
    config: VfsConfig,
    inner: RwLock<VfsInner>,
}

impl Vfs {
    pub fn new(config: VfsConfig, rule_config: &RuleConfig) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            "/".to_string(),
            Node::Directory(DirNode {
                children: Vec::new(),
            }),
        );
        Self {
            config,
            inner: RwLock::new(VfsInner {
                nodes,
                file_index: HashMap::new(),
                source_index: HashMap::new(),
                rules: RuleSet::compile(rule_config),
                stats: VfsStats::default(),
            }),
        }
    }

    /// Swap in a recompiled rule set (after a config save).
    pub async fn set_rules(&self, rule_config: &RuleConfig) {
        let mut inner = self.inner.write().await;
        inner.rules = RuleSet::compile(rule_config);
    }

    /// Stamp the last-refresh time.
    pub async fn mark_refreshed(&self) {
        let mut inner = self.inner.write().await;
        inner.stats.last_refresh = Some(Utc::now());
    }

    // ------------------------------------------------------------------
    // Writer side (driven by the event task)
    // ------------------------------------------------------------------

    /// Place or re-place a complete file.
    pub async fn apply_complete(&self, id: &FileId, snapshot: &PropertyMap) {
        let Some(meta) = FileMetadata::from_properties(snapshot) else {
            // Defensive: an incomplete snapshot cannot be placed.
            warn!(%id, "apply_complete without filePath, ignoring");
            return;
        };

        let mut inner = self.inner.write().await;
        let resolved = inner.rules.resolve(&meta);
        let new_path = paths::sanitize(&resolved.path);
        let source_path = paths::resolve_source_path(&self.config.files_root, &meta.file_path);

        // Unchanged location: refresh the node in place.
        if inner.file_index.get(id).is_some_and(|p| *p == new_path) {
            let updated = match inner.nodes.get_mut(&new_path) {
                Some(Node::File(file)) => {
                    let old_size = file.size;
                    let old_source =
                        std::mem::replace(&mut file.source_path, source_path.clone());
                    file.size = meta.size.unwrap_or(0);
                    file.mtime = meta.mtime;
                    file.ctime = meta.ctime;
                    file.snapshot = snapshot.clone();
                    Some((old_size, old_source))
                }
                _ => None,
            };
            let Some((old_size, old_source)) = updated else {
                return;
            };
            inner.stats.total_size =
                inner.stats.total_size - old_size + meta.size.unwrap_or(0);
            if old_source != source_path {
                inner.source_index.remove(&old_source);
                inner.source_index.insert(source_path, new_path);
            }
            return;
        }

        // Moved (or first seen): drop the old node, then place the new one.
        if let Some(old_path) = inner.file_index.get(id).cloned() {
            debug!(%id, from = %old_path, to = %new_path, "file moved");
            remove_file_node(&mut inner, &old_path);
        }

        // A different file already at the target loses the spot
        // (last-writer-wins).
        match inner.nodes.get(&new_path) {
            Some(Node::File(existing)) if existing.file_id != *id => {
                debug!(path = %new_path, evicted = %existing.file_id, "path collision");
                remove_file_node(&mut inner, &new_path);
            }
            Some(Node::Directory(_)) => {
                warn!(path = %new_path, %id, "virtual path collides with a directory, skipping");
                inner.file_index.remove(id);
                return;
            }
            _ => {}
        }

        let Some(parent) = paths::parent_of(&new_path).map(str::to_string) else {
            warn!(path = %new_path, %id, "file resolves to the root itself, skipping");
            inner.file_index.remove(id);
            return;
        };
        ensure_directories(&mut inner, &parent);

        let name = paths::basename_of(&new_path).to_string();
        if let Some(Node::Directory(dir)) = inner.nodes.get_mut(&parent) {
            if !dir.children.contains(&name) {
                dir.children.push(name);
            }
        }

        inner.stats.file_count += 1;
        inner.stats.total_size += meta.size.unwrap_or(0);
        inner.nodes.insert(
            new_path.clone(),
            Node::File(FileNode {
                file_id: id.clone(),
                source_path: source_path.clone(),
                size: meta.size.unwrap_or(0),
                mtime: meta.mtime,
                ctime: meta.ctime,
                snapshot: snapshot.clone(),
            }),
        );
        inner.file_index.insert(id.clone(), new_path.clone());
        inner.source_index.insert(source_path, new_path);
    }

    /// Remove a file and prune newly-empty ancestors.
    pub async fn apply_delete(&self, id: &FileId) {
        let mut inner = self.inner.write().await;
        let Some(path) = inner.file_index.get(id).cloned() else {
            return;
        };
        debug!(%id, %path, "file removed");
        remove_file_node(&mut inner, &path);
    }

    /// Drop every file whose id is not in `seen`. Used by refresh to
    /// reconcile the projection without ever emptying it.
    pub async fn retain_files(&self, seen: &HashSet<FileId>) {
        let stale: Vec<FileId> = {
            let inner = self.inner.read().await;
            inner
                .file_index
                .keys()
                .filter(|id| !seen.contains(*id))
                .cloned()
                .collect()
        };
        for id in &stale {
            self.apply_delete(id).await;
        }
        if !stale.is_empty() {
            debug!(removed = stale.len(), "refresh pruned stale files");
        }
    }

    // ------------------------------------------------------------------
    // Reader side
    // ------------------------------------------------------------------

    /// Child names of a directory, insertion order.
    pub async fn readdir(&self, path: &str) -> Option<Vec<String>> {
        let inner = self.inner.read().await;
        match inner.nodes.get(path)? {
            Node::Directory(dir) => Some(dir.children.clone()),
            Node::File(_) => None,
        }
    }

    pub async fn getattr(&self, path: &str) -> Option<FileAttributes> {
        let inner = self.inner.read().await;
        let attrs = match inner.nodes.get(path)? {
            Node::Directory(_) => FileAttributes {
                size: 0,
                mode: S_IFDIR | self.config.dir_mode,
                mtime: 0.0,
                atime: 0.0,
                ctime: 0.0,
                nlink: 2,
                uid: self.config.uid,
                gid: self.config.gid,
            },
            Node::File(file) => {
                let mtime = to_epoch(file.mtime);
                FileAttributes {
                    size: file.size,
                    mode: S_IFREG | self.config.file_mode,
                    mtime,
                    atime: mtime,
                    ctime: file.ctime.map_or(mtime, |t| to_epoch(Some(t))),
                    nlink: 1,
                    uid: self.config.uid,
                    gid: self.config.gid,
                }
            }
        };
        Some(attrs)
    }

    pub async fn exists(&self, path: &str) -> bool {
        self.inner.read().await.nodes.contains_key(path)
    }

    /// Resolve a file to its upstream location. Directories resolve to
    /// nothing; the projection never serves bytes.
    pub async fn resolve_read(&self, path: &str) -> Option<ReadResolution> {
        let inner = self.inner.read().await;
        match inner.nodes.get(path)? {
            Node::File(file) => {
                let webdav_url = self.config.webdav_base.as_deref().map(|base| {
                    let relative = file
                        .snapshot
                        .get("filePath")
                        .cloned()
                        .unwrap_or_default();
                    paths::share_url(base, &relative)
                });
                Some(ReadResolution {
                    source_path: file.source_path.clone(),
                    webdav_url,
                    size: file.size,
                })
            }
            Node::Directory(_) => None,
        }
    }

    /// The stored property snapshot of a file.
    pub async fn metadata(&self, path: &str) -> Option<PropertyMap> {
        let inner = self.inner.read().await;
        match inner.nodes.get(path)? {
            Node::File(file) => Some(file.snapshot.clone()),
            Node::Directory(_) => None,
        }
    }

    /// All file paths, sorted.
    pub async fn all_files(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut files: Vec<String> = inner.file_index.values().cloned().collect();
        files.sort();
        files
    }

    /// All directory paths except the root, sorted.
    pub async fn all_directories(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut dirs: Vec<String> = inner
            .nodes
            .iter()
            .filter(|(path, node)| matches!(node, Node::Directory(_)) && path.as_str() != "/")
            .map(|(path, _)| path.clone())
            .collect();
        dirs.sort();
        dirs
    }

    pub async fn stats(&self) -> VfsStats {
        self.inner.read().await.stats.clone()
    }

    /// Current virtual path of a file id, if projected.
    pub async fn path_of(&self, id: &FileId) -> Option<String> {
        self.inner.read().await.file_index.get(id).cloned()
    }

    /// Virtual path currently backed by an upstream source path. The share
    /// gateway uses this to translate its own notifications.
    pub async fn path_for_source(&self, source_path: &str) -> Option<String> {
        self.inner.read().await.source_index.get(source_path).cloned()
    }

    /// Pairs of (fileId, virtual path), enumeration order unspecified.
    pub async fn projected_files(&self) -> Vec<(FileId, String)> {
        let inner = self.inner.read().await;
        inner
            .file_index
            .iter()
            .map(|(id, path)| (id.clone(), path.clone()))
            .collect()
    }
}

fn to_epoch(t: Option<DateTime<Utc>>) -> f64 {
    t.map_or(0.0, |t| t.timestamp_millis() as f64 / 1000.0)
}

/// Create any missing directories down to `dir_path`, linking each new one
/// into its parent's children.
fn ensure_directories(inner: &mut VfsInner, dir_path: &str) {
    if inner.nodes.contains_key(dir_path) {
        return;
    }
    let mut current = String::from("/");
    for component in paths::components(dir_path) {
        let child_path = paths::join(&current, component);
        if !inner.nodes.contains_key(&child_path) {
            inner.nodes.insert(
                child_path.clone(),
                Node::Directory(DirNode {
                    children: Vec::new(),
                }),
            );
            inner.stats.directory_count += 1;
            if let Some(Node::Directory(parent)) = inner.nodes.get_mut(&current) {
                if !parent.children.contains(&component.to_string()) {
                    parent.children.push(component.to_string());
                }
            }
        }
        current = child_path;
    }
}

/// Remove a file node, all its index entries, and any ancestor directory
/// left empty (never the root).
fn remove_file_node(inner: &mut VfsInner, path: &str) {
    let Some(Node::File(file)) = inner.nodes.remove(path) else {
        return;
    };
    inner.file_index.remove(&file.file_id);
    inner.source_index.remove(&file.source_path);
    inner.stats.file_count = inner.stats.file_count.saturating_sub(1);
    inner.stats.total_size = inner.stats.total_size.saturating_sub(file.size);

    detach_from_parent(inner, path);
    prune_empty_ancestors(inner, path);
}

fn detach_from_parent(inner: &mut VfsInner, path: &str) {
    let Some(parent) = paths::parent_of(path).map(str::to_string) else {
        return;
    };
    let name = paths::basename_of(path).to_string();
    if let Some(Node::Directory(dir)) = inner.nodes.get_mut(&parent) {
        dir.children.retain(|child| *child != name);
    }
}

fn prune_empty_ancestors(inner: &mut VfsInner, path: &str) {
    let mut current = paths::parent_of(path).map(str::to_string);
    while let Some(dir_path) = current {
        if dir_path == "/" {
            break;
        }
        let empty = matches!(
            inner.nodes.get(&dir_path),
            Some(Node::Directory(dir)) if dir.children.is_empty()
        );
        if !empty {
            break;
        }
        inner.nodes.remove(&dir_path);
        inner.stats.directory_count = inner.stats.directory_count.saturating_sub(1);
        detach_from_parent(inner, &dir_path);
        current = paths::parent_of(&dir_path).map(str::to_string);
    }
}

#[async_trait]
impl StateObserver for Vfs {
    async fn on_file_complete(&self, id: &FileId, snapshot: &PropertyMap) {
        self.apply_complete(id, snapshot).await;
    }

    async fn on_file_delete(&self, id: &FileId) {
        self.apply_delete(id).await;
    }
}
