//! Core traits for metafuse components.
//!
//! - [`MetaStore`]: read-only adapter over the external key-value store
//! - [`StateObserver`]: callbacks the state builder emits as files change
//!
//! These traits are the seams between the store transport, the event
//! consumer, and the projection; swapping an implementation (Redis vs. the
//! in-memory test store, the live projection vs. a tracking wrapper) does
//! not touch the rest of the system.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;
use crate::types::{EventId, FileId, PropertyMap, StreamBatch};

// ============================================================================
// Store access
// ============================================================================

/// Read-only adapter over the external key-value store.
///
/// All operations are point reads; nothing in metafuse writes back. Stream
/// reads return entries strictly after `from_id` (pass [`EventId::zero`] to
/// start at the beginning).
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Point GET on a string key.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Members of a set key. Missing keys yield an empty vec.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// All keys starting with `prefix`.
    async fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Read up to `max_count` entries after `from_id`, returning immediately.
    async fn read_stream(
        &self,
        stream: &str,
        from_id: &EventId,
        max_count: usize,
    ) -> Result<StreamBatch, StoreError>;

    /// Like [`read_stream`](Self::read_stream) but blocks up to `timeout`
    /// waiting for new entries. A timeout yields an empty batch, not an
    /// error.
    async fn read_stream_blocking(
        &self,
        stream: &str,
        from_id: &EventId,
        max_count: usize,
        timeout: Duration,
    ) -> Result<StreamBatch, StoreError>;
}

// ============================================================================
// State change notifications
// ============================================================================

/// Callbacks emitted by the state builder as property events are applied.
///
/// The projection implements this; refresh wraps it in a tracking variant.
/// Calls arrive from a single event task in log order.
#[async_trait]
pub trait StateObserver: Send + Sync {
    /// A file gained or changed a complete property map (contains
    /// `filePath`). Fired for new files and for every subsequent update; the
    /// projection re-derives the virtual path on each call.
    async fn on_file_complete(&self, id: &FileId, snapshot: &PropertyMap);

    /// A file lost its `filePath` or its last property; remove it.
    async fn on_file_delete(&self, id: &FileId);

    /// A single property changed value. Informational; the projection keys
    /// off [`on_file_complete`](Self::on_file_complete).
    async fn on_property_change(&self, _id: &FileId, _prop: &str, _value: &str) {}

    /// A single property was removed while the file stayed complete.
    async fn on_property_delete(&self, _id: &FileId, _prop: &str) {}
}
