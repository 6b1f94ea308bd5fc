//! Bootstrap, live tail, and refresh orchestration.
//!
//! One [`StateService`] owns the event-processing side of the system: it
//! replays the log from position zero at startup, hands off to a blocking
//! live tail at the exact cursor the bootstrap finished on, and serializes
//! rule-triggered refreshes against the tail through the builder lock.
//! Readers never wait on any of this; they query the projection directly.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use metafuse_core::{
    EventId, FileId, MetaStore, PropertyMap, Result, StateObserver, StreamBatch,
};
use metafuse_rules::{RelevanceSet, RuleConfig, RuleConfigStore};
use metafuse_vfs::Vfs;

use crate::builder::{StateBuilder, StateStats};

/// Tuning for the event loops.
#[derive(Debug, Clone)]
pub struct StateServiceConfig {
    /// Stream key holding the change log
    pub stream: String,
    /// Entries per bootstrap read
    pub batch_size: usize,
    /// Block timeout for live-tail reads
    pub tail_timeout: Duration,
    /// First retry delay after a transport error
    pub retry_base: Duration,
    /// Retry delay ceiling
    pub retry_cap: Duration,
}

impl Default for StateServiceConfig {
    fn default() -> Self {
        Self {
            stream: "meta:events".to_string(),
            batch_size: 100,
            tail_timeout: Duration::from_secs(5),
            retry_base: Duration::from_secs(1),
            retry_cap: Duration::from_secs(30),
        }
    }
}

/// The event-processing service.
pub struct StateService {
    store: Arc<dyn MetaStore>,
    vfs: Arc<Vfs>,
    rules_store: Arc<RuleConfigStore>,
    builder: Mutex<StateBuilder>,
    config: StateServiceConfig,
    running: AtomicBool,
    ready: AtomicBool,
    connected: AtomicBool,
}

impl StateService {
    pub fn new(
        store: Arc<dyn MetaStore>,
        vfs: Arc<Vfs>,
        rules_store: Arc<RuleConfigStore>,
        rule_config: &RuleConfig,
        config: StateServiceConfig,
    ) -> Self {
        let relevance = RelevanceSet::from_config(rule_config);
        debug!(relevant = relevance.len(), "computed relevance set");
        Self {
            builder: Mutex::new(StateBuilder::new(Arc::clone(&store), relevance)),
            store,
            vfs,
            rules_store,
            config,
            running: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            connected: AtomicBool::new(false),
        }
    }

    /// Bootstrap complete, live tail running.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Last store interaction succeeded.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Ask the event loop to wind down after its current read.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("state service stopping");
    }

    pub async fn stats(&self) -> StateStats {
        self.builder.lock().await.stats().clone()
    }

    /// Property-map snapshots for previews: up to `limit` files plus the
    /// total tracked count. Enumeration order is unspecified.
    pub async fn snapshots(&self, limit: Option<usize>) -> (Vec<(FileId, PropertyMap)>, usize) {
        self.builder.lock().await.snapshots(limit)
    }

    /// Run bootstrap then the live tail until [`stop`](Self::stop).
    pub async fn run(self: Arc<Self>) {
        let last = self.bootstrap().await;
        self.ready.store(true, Ordering::SeqCst);
        info!(cursor = %last, "bootstrap complete, entering live tail");
        self.log_index_diagnostic().await;
        self.tail().await;
        info!("event loop exited");
    }

    /// Compare the writer's optional `file:__index__` set against what the
    /// replay produced. Purely diagnostic; a mismatch usually means the log
    /// was trimmed or the writer is mid-batch.
    async fn log_index_diagnostic(&self) {
        match self.store.smembers("file:__index__").await {
            Ok(index) if !index.is_empty() => {
                let tracked = self.builder.lock().await.tracked_files();
                if index.len() != tracked {
                    warn!(
                        indexed = index.len(),
                        tracked, "writer index and replayed state disagree"
                    );
                } else {
                    debug!(files = tracked, "writer index matches replayed state");
                }
            }
            Ok(_) => {}
            Err(e) => debug!("no index diagnostic available: {e}"),
        }
    }

    /// Replay the whole log from position zero. Returns the id of the last
    /// applied entry (the live-tail starting cursor).
    async fn bootstrap(&self) -> EventId {
        let mut builder = self.builder.lock().await;
        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let cursor = builder.cursor();
            let batch = match self
                .store
                .read_stream(&self.config.stream, &cursor, self.config.batch_size)
                .await
            {
                Ok(batch) => {
                    self.connected.store(true, Ordering::SeqCst);
                    batch
                }
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    warn!("bootstrap read failed, retrying: {e}");
                    tokio::time::sleep(self.config.retry_base).await;
                    continue;
                }
            };
            if batch.is_empty() {
                break;
            }
            self.apply_batch(&mut builder, batch, self.vfs.as_ref()).await;
        }
        builder.cursor()
    }

    /// Consume new entries as they are appended, resuming from the
    /// bootstrap cursor. Timeouts just loop; transport errors back off and
    /// retry from the same cursor.
    async fn tail(&self) {
        let mut backoff = self.config.retry_base;
        while self.running.load(Ordering::SeqCst) {
            let cursor = { self.builder.lock().await.cursor() };
            let batch = match self
                .store
                .read_stream_blocking(
                    &self.config.stream,
                    &cursor,
                    self.config.batch_size,
                    self.config.tail_timeout,
                )
                .await
            {
                Ok(batch) => {
                    self.connected.store(true, Ordering::SeqCst);
                    backoff = self.config.retry_base;
                    batch
                }
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    warn!("tail read failed, retrying in {backoff:?}: {e}");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.retry_cap);
                    continue;
                }
            };
            if batch.is_empty() {
                continue;
            }
            let mut builder = self.builder.lock().await;
            self.apply_batch(&mut builder, batch, self.vfs.as_ref()).await;
        }
    }

    /// Apply a batch in order. Each entry is retried on transport error
    /// until it lands; the cursor only moves on success, so ordering is
    /// never broken.
    async fn apply_batch(
        &self,
        builder: &mut StateBuilder,
        batch: StreamBatch,
        observer: &dyn StateObserver,
    ) {
        for entry in &batch.entries {
            // A refresh may have replayed past this batch already.
            if Some(&entry.id) <= builder.stats().last_event_id.as_ref() {
                continue;
            }
            let mut backoff = self.config.retry_base;
            loop {
                match builder.apply(entry, observer).await {
                    Ok(()) => break,
                    Err(e) => {
                        if !self.running.load(Ordering::SeqCst) {
                            return;
                        }
                        self.connected.store(false, Ordering::SeqCst);
                        warn!(id = %entry.id, "apply failed, retrying in {backoff:?}: {e}");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.config.retry_cap);
                    }
                }
            }
        }
    }

    /// Rebuild property state from the full log under the current rule
    /// config, then reconcile the projection.
    ///
    /// The projection keeps serving throughout; only identities that
    /// disappeared from the replay are removed at the end.
    pub async fn refresh(&self) -> Result<()> {
        info!("refresh started");
        let rule_config = self.rules_store.load();
        let relevance = RelevanceSet::from_config(&rule_config);
        self.vfs.set_rules(&rule_config).await;

        let tracker = TrackingObserver::new(Arc::clone(&self.vfs));
        {
            // Holding the builder lock stalls the live tail for the whole
            // replay; config saves and refreshes stay serialized.
            let mut builder = self.builder.lock().await;
            builder.clear();
            builder.set_relevance(relevance);
            loop {
                let cursor = builder.cursor();
                let batch = self
                    .store
                    .read_stream(&self.config.stream, &cursor, self.config.batch_size)
                    .await?;
                if batch.is_empty() {
                    break;
                }
                self.apply_batch(&mut builder, batch, &tracker).await;
            }
        }

        let seen = tracker.seen().await;
        self.vfs.retain_files(&seen).await;
        self.vfs.mark_refreshed().await;
        info!(files = seen.len(), "refresh complete");
        Ok(())
    }
}

/// Observer wrapper that forwards to the projection while recording which
/// file ids the replay touched.
struct TrackingObserver {
    vfs: Arc<Vfs>,
    seen: Mutex<HashSet<FileId>>,
}

impl TrackingObserver {
    fn new(vfs: Arc<Vfs>) -> Self {
        Self {
            vfs,
            seen: Mutex::new(HashSet::new()),
        }
    }

    async fn seen(&self) -> HashSet<FileId> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl StateObserver for TrackingObserver {
    async fn on_file_complete(&self, id: &FileId, snapshot: &PropertyMap) {
        self.seen.lock().await.insert(id.clone());
        self.vfs.on_file_complete(id, snapshot).await;
    }

    async fn on_file_delete(&self, id: &FileId) {
        self.seen.lock().await.remove(id);
        self.vfs.on_file_delete(id).await;
    }
}

/// Spawn the event loop onto the runtime. The handle resolves when the
/// service is stopped.
pub fn spawn(service: Arc<StateService>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(service.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metafuse_rules::default_config;
    use metafuse_store::MemoryStore;
    use metafuse_vfs::{Vfs, VfsConfig};
    use tempfile::tempdir;

    fn service(store: MemoryStore, dir: &std::path::Path) -> Arc<StateService> {
        let rule_config = default_config();
        let vfs = Arc::new(Vfs::new(VfsConfig::default(), &rule_config));
        let rules_store = Arc::new(RuleConfigStore::new(dir));
        Arc::new(StateService::new(
            Arc::new(store),
            vfs,
            rules_store,
            &rule_config,
            StateServiceConfig {
                tail_timeout: Duration::from_millis(50),
                ..StateServiceConfig::default()
            },
        ))
    }

    fn seed_movie(store: &MemoryStore, id: &str) {
        store.append_set(id, "filePath", "Movies/Inception.mkv");
        store.append_set(id, "title", "Inception");
        store.append_set(id, "movieYear", "2010");
        store.append_set(id, "fileType", "video");
        store.append_set(id, "extension", "mkv");
    }

    #[tokio::test]
    async fn test_bootstrap_builds_projection() {
        let store = MemoryStore::new();
        let dir = tempdir().unwrap();
        seed_movie(&store, "abc");

        let svc = service(store, dir.path());
        let cursor = svc.bootstrap().await;

        assert_eq!(cursor, EventId::new("5-0"));
        let stats = svc.stats().await;
        assert_eq!(stats.events_processed, 5);
        assert!(svc
            .vfs
            .exists("/Movies/Inception (2010)/Inception (2010).mkv")
            .await);
    }

    #[tokio::test]
    async fn test_live_tail_picks_up_appends() {
        let store = MemoryStore::new();
        let dir = tempdir().unwrap();
        seed_movie(&store, "abc");

        let svc = service(store.clone(), dir.path());
        let handle = spawn(Arc::clone(&svc));

        // Wait for readiness, then append live.
        for _ in 0..100 {
            if svc.is_ready() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(svc.is_ready());

        store.append_set("abc", "movieYear", "2011");
        for _ in 0..100 {
            if svc.vfs.exists("/Movies/Inception (2011)/Inception (2011).mkv").await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(svc.vfs.exists("/Movies/Inception (2011)/Inception (2011).mkv").await);
        assert!(!svc.vfs.exists("/Movies/Inception (2010)").await);

        svc.stop();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent_on_same_config() {
        let store = MemoryStore::new();
        let dir = tempdir().unwrap();
        seed_movie(&store, "abc");

        let svc = service(store, dir.path());
        svc.bootstrap().await;

        let files_before = svc.vfs.all_files().await;
        svc.refresh().await.unwrap();
        let files_after = svc.vfs.all_files().await;

        assert_eq!(files_before, files_after);
        assert!(svc.vfs.stats().await.last_refresh.is_some());
    }

    #[tokio::test]
    async fn test_refresh_prunes_files_gone_from_log_state() {
        let store = MemoryStore::new();
        let dir = tempdir().unwrap();
        seed_movie(&store, "abc");

        let svc = service(store.clone(), dir.path());
        svc.bootstrap().await;
        assert_eq!(svc.vfs.all_files().await.len(), 1);

        // The file loses its path in the log, then a refresh replays.
        store.append_del("abc", "filePath");
        svc.refresh().await.unwrap();

        assert!(svc.vfs.all_files().await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_expose_tracked_files() {
        let store = MemoryStore::new();
        let dir = tempdir().unwrap();
        seed_movie(&store, "abc");
        seed_movie(&store, "xyz");

        let svc = service(store, dir.path());
        svc.bootstrap().await;

        let (snapshots, total) = svc.snapshots(Some(1)).await;
        assert_eq!(total, 2);
        assert_eq!(snapshots.len(), 1);

        let (all, _) = svc.snapshots(None).await;
        assert_eq!(all.len(), 2);
    }
}
