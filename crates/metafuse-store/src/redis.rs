//! Redis-backed store adapter.
//!
//! Wraps a [`redis::aio::ConnectionManager`], which owns the reconnect
//! policy (exponential backoff, capped). While the connection is down every
//! command fails fast with [`StoreError::Transport`]; the event loop treats
//! that as pause-and-retry, so no event is ever skipped.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use metafuse_core::{
    EventId, EventKind, MetaStore, StoreError, StreamBatch, StreamEntry,
};

/// Store adapter speaking to a Redis-compatible server.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://store:6379`). `prefix` is prepended
    /// to every key and stream name, matching the writer's keyspace layout.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(transport)?;
        let manager = ConnectionManager::new(client).await.map_err(transport)?;
        debug!(%url, "connected to metadata store");
        Ok(Self {
            manager,
            prefix: prefix.into(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn strip(&self, key: String) -> String {
        key.strip_prefix(&self.prefix)
            .map(str::to_string)
            .unwrap_or(key)
    }
}

fn transport(e: redis::RedisError) -> StoreError {
    StoreError::Transport(e.to_string())
}

/// Convert one raw `(id, fields)` stream entry. Entries missing the
/// mandatory fields are dropped with a warning rather than poisoning the
/// whole batch.
fn decode_entry(id: String, fields: HashMap<String, String>) -> Option<StreamEntry> {
    let kind = match fields.get("type").map(String::as_str) {
        Some("set") => EventKind::Set,
        Some("del") => EventKind::Del,
        other => {
            warn!(%id, ?other, "stream entry with unknown type, dropping");
            return None;
        }
    };
    let Some(key) = fields.get("key") else {
        warn!(%id, "stream entry without key, dropping");
        return None;
    };
    let ts = fields
        .get("ts")
        .and_then(|t| t.parse().ok())
        .unwrap_or_default();
    Some(StreamEntry {
        id: EventId::new(id),
        kind,
        key: key.clone(),
        ts,
    })
}

fn batch_from(raw: Vec<(String, HashMap<String, String>)>) -> StreamBatch {
    let entries: Vec<StreamEntry> = raw
        .into_iter()
        .filter_map(|(id, fields)| decode_entry(id, fields))
        .collect();
    let last_id = entries.last().map(|e| e.id.clone());
    StreamBatch { entries, last_id }
}

#[async_trait]
impl MetaStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        conn.get(self.key(key)).await.map_err(transport)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        conn.smembers(self.key(key)).await.map_err(transport)
    }

    async fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", self.key(prefix));
        let mut keys = Vec::new();
        {
            let mut iter: redis::AsyncIter<'_, String> =
                conn.scan_match(&pattern).await.map_err(transport)?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        Ok(keys.into_iter().map(|k| self.strip(k)).collect())
    }

    async fn read_stream(
        &self,
        stream: &str,
        from_id: &EventId,
        max_count: usize,
    ) -> Result<StreamBatch, StoreError> {
        let mut conn = self.manager.clone();
        // XRANGE start is inclusive; "(" makes the resume cursor exclusive.
        let start = if from_id.as_str() == "0" {
            "-".to_string()
        } else {
            format!("({from_id}")
        };
        let raw: Vec<(String, HashMap<String, String>)> = redis::cmd("XRANGE")
            .arg(self.key(stream))
            .arg(start)
            .arg("+")
            .arg("COUNT")
            .arg(max_count)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(batch_from(raw))
    }

    async fn read_stream_blocking(
        &self,
        stream: &str,
        from_id: &EventId,
        max_count: usize,
        timeout: Duration,
    ) -> Result<StreamBatch, StoreError> {
        let mut conn = self.manager.clone();
        // XREAD is exclusive of the passed id and returns Nil on timeout.
        let raw: Option<Vec<(String, Vec<(String, HashMap<String, String>)>)>> =
            redis::cmd("XREAD")
                .arg("COUNT")
                .arg(max_count)
                .arg("BLOCK")
                .arg(timeout.as_millis() as u64)
                .arg("STREAMS")
                .arg(self.key(stream))
                .arg(from_id.as_str())
                .query_async(&mut conn)
                .await
                .map_err(transport)?;

        let raw = match raw {
            Some(mut streams) if !streams.is_empty() => streams.swap_remove(0).1,
            _ => return Ok(StreamBatch::default()),
        };
        Ok(batch_from(raw))
    }
}
