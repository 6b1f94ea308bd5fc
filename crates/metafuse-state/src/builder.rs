//! Per-file property state, built one event at a time.
//!
//! The builder consumes log entries in order. For every `set` it decides
//! relevance, lazily fetches the value, and updates the per-file map; for
//! every `del` it shrinks or drops the map. Completeness transitions (a map
//! gaining or keeping `filePath`) are reported to the observer, which is
//! how the projection learns about files at all.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use metafuse_core::{
    normalize_property_path, parse_property_key, EventId, EventKind, FileId, MetaStore,
    PropertyMap, StateObserver, StoreError, StreamEntry,
};
use metafuse_rules::RelevanceSet;

/// Consumption counters, exposed through the stats endpoint.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStats {
    pub events_processed: u64,
    pub properties_fetched: u64,
    pub properties_skipped: u64,
    pub files_completed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<EventId>,
}

/// Stateful consumer of the property event log.
pub struct StateBuilder {
    store: Arc<dyn MetaStore>,
    relevance: RelevanceSet,
    files: HashMap<FileId, PropertyMap>,
    stats: StateStats,
}

impl StateBuilder {
    pub fn new(store: Arc<dyn MetaStore>, relevance: RelevanceSet) -> Self {
        Self {
            store,
            relevance,
            files: HashMap::new(),
            stats: StateStats::default(),
        }
    }

    pub fn stats(&self) -> &StateStats {
        &self.stats
    }

    /// Resume cursor for the live tail.
    pub fn cursor(&self) -> EventId {
        self.stats
            .last_event_id
            .clone()
            .unwrap_or_else(EventId::zero)
    }

    /// Replace the relevance set (after a rule-config change).
    pub fn set_relevance(&mut self, relevance: RelevanceSet) {
        self.relevance = relevance;
    }

    /// Wipe all per-file state and the resume cursor for a full replay.
    /// Counters keep accumulating; the projection is untouched.
    pub fn clear(&mut self) {
        self.files.clear();
        self.stats.last_event_id = None;
    }

    pub fn tracked_files(&self) -> usize {
        self.files.len()
    }

    /// Up to `limit` (id, property-map) pairs plus the total count.
    /// Enumeration order is unspecified.
    pub fn snapshots(&self, limit: Option<usize>) -> (Vec<(FileId, PropertyMap)>, usize) {
        let total = self.files.len();
        let taken = self
            .files
            .iter()
            .take(limit.unwrap_or(total))
            .map(|(id, map)| (id.clone(), map.clone()))
            .collect();
        (taken, total)
    }

    /// Apply one log entry.
    ///
    /// A transport failure during the value fetch leaves the builder
    /// untouched (the cursor does not advance), so the caller can retry
    /// the same entry without reordering.
    pub async fn apply(
        &mut self,
        entry: &StreamEntry,
        observer: &dyn StateObserver,
    ) -> Result<(), StoreError> {
        let Some((id, raw_prop)) = parse_property_key(&entry.key) else {
            trace!(key = %entry.key, "ignoring non-property key");
            self.advance(entry);
            return Ok(());
        };
        let prop = normalize_property_path(&raw_prop);

        match entry.kind {
            EventKind::Del => {
                self.advance(entry);
                self.handle_delete(&id, &prop, observer).await;
            }
            EventKind::Set => {
                if !self.relevance.is_relevant(&prop) {
                    trace!(%id, %prop, "skipping irrelevant property");
                    self.stats.properties_skipped += 1;
                    self.advance(entry);
                    return Ok(());
                }
                // Fetch before mutating anything so a transport error can
                // be retried cleanly.
                let value = self.store.get(&entry.key).await?;
                self.advance(entry);
                match value {
                    Some(value) => {
                        self.stats.properties_fetched += 1;
                        self.handle_set(&id, &prop, &value, observer).await;
                    }
                    None => {
                        // Deleted between emit and fetch; the matching del
                        // event is on its way.
                        debug!(%id, %prop, "set event with no value, skipping");
                    }
                }
            }
        }
        Ok(())
    }

    fn advance(&mut self, entry: &StreamEntry) {
        self.stats.events_processed += 1;
        self.stats.last_event_id = Some(entry.id.clone());
    }

    async fn handle_set(
        &mut self,
        id: &FileId,
        prop: &str,
        value: &str,
        observer: &dyn StateObserver,
    ) {
        let map = self.files.entry(id.clone()).or_default();
        let was_complete = map.contains_key("filePath");
        map.insert(prop.to_string(), value.to_string());
        let is_complete = map.contains_key("filePath");

        if is_complete {
            if !was_complete {
                self.stats.files_completed += 1;
            }
            let snapshot = &self.files[id];
            observer.on_file_complete(id, snapshot).await;
        }
        observer.on_property_change(id, prop, value).await;
    }

    async fn handle_delete(&mut self, id: &FileId, prop: &str, observer: &dyn StateObserver) {
        let Some(map) = self.files.get_mut(id) else {
            return;
        };
        map.remove(prop);

        if prop == "filePath" || map.is_empty() {
            self.files.remove(id);
            observer.on_file_delete(id).await;
            return;
        }

        observer.on_property_delete(id, prop).await;
        // Property removal can change the computed path; a still-complete
        // file is re-reported as an update.
        if map.contains_key("filePath") {
            let snapshot = &self.files[id];
            observer.on_file_complete(id, snapshot).await;
        }
    }
}
