//! In-memory store for testing without a Redis server.
//!
//! This module provides a [`MemoryStore`] that keeps the keyspace and the
//! event log in memory. It's useful for:
//! - Unit and integration tests that replay scripted event sequences
//! - Development builds without a running store
//!
//! The `append_*` helpers mutate the keyspace and append the matching log
//! entry in one step, the same way the external writer does.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::pin::pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use metafuse_core::{
    EventId, EventKind, MetaStore, StoreError, StreamBatch, StreamEntry,
};

#[derive(Default)]
struct Inner {
    kv: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
    log: Vec<StreamEntry>,
    next_seq: u64,
}

/// In-memory metadata store for tests.
///
/// # Example
///
/// ```rust
/// use metafuse_store::MemoryStore;
/// use metafuse_core::{EventId, MetaStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// store.append_set("abc", "filePath", "Movies/Inception.mkv");
///
/// let batch = store.read_stream("meta:events", &EventId::zero(), 100).await?;
/// assert_eq!(batch.entries.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property and append the matching `set` event.
    pub fn append_set(&self, file_id: &str, prop: &str, value: &str) -> EventId {
        let key = format!("file:{file_id}/{prop}");
        let mut inner = self.inner.lock().unwrap();
        inner.kv.insert(key.clone(), value.to_string());
        let id = push_entry(&mut inner, EventKind::Set, key);
        drop(inner);
        self.notify.notify_waiters();
        id
    }

    /// Delete a property and append the matching `del` event.
    pub fn append_del(&self, file_id: &str, prop: &str) -> EventId {
        let key = format!("file:{file_id}/{prop}");
        let mut inner = self.inner.lock().unwrap();
        inner.kv.remove(&key);
        let id = push_entry(&mut inner, EventKind::Del, key);
        drop(inner);
        self.notify.notify_waiters();
        id
    }

    /// Append a log entry without touching the keyspace. Used to script
    /// skew scenarios: a `set` event whose value is already gone.
    pub fn append_event(&self, kind: EventKind, key: &str) -> EventId {
        let mut inner = self.inner.lock().unwrap();
        let id = push_entry(&mut inner, kind, key.to_string());
        drop(inner);
        self.notify.notify_waiters();
        id
    }

    /// Add members to a set key (the writer maintains `file:__index__`).
    pub fn sadd(&self, key: &str, members: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        let set = inner.sets.entry(key.to_string()).or_default();
        for member in members {
            set.insert(member.to_string());
        }
    }

    /// Number of log entries appended so far.
    pub fn log_len(&self) -> usize {
        self.inner.lock().unwrap().log.len()
    }
}

fn push_entry(inner: &mut Inner, kind: EventKind, key: String) -> EventId {
    inner.next_seq += 1;
    let id = EventId::new(format!("{}-0", inner.next_seq));
    inner.log.push(StreamEntry {
        id: id.clone(),
        kind,
        key,
        ts: Utc::now().timestamp_millis(),
    });
    id
}

#[async_trait]
impl MetaStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().unwrap().kv.get(key).cloned())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut keys: Vec<String> = inner
            .kv
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn read_stream(
        &self,
        _stream: &str,
        from_id: &EventId,
        max_count: usize,
    ) -> Result<StreamBatch, StoreError> {
        let inner = self.inner.lock().unwrap();
        let entries: Vec<StreamEntry> = inner
            .log
            .iter()
            .filter(|e| e.id > *from_id)
            .take(max_count)
            .cloned()
            .collect();
        let last_id = entries.last().map(|e| e.id.clone());
        Ok(StreamBatch { entries, last_id })
    }

    async fn read_stream_blocking(
        &self,
        stream: &str,
        from_id: &EventId,
        max_count: usize,
        timeout: Duration,
    ) -> Result<StreamBatch, StoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register for wakeups before checking, so an append between
            // the check and the wait is not lost.
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            let batch = self.read_stream(stream, from_id, max_count).await?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(StreamBatch::default());
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Ok(StreamBatch::default());
                }
            }
        }
    }
}
