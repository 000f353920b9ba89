//! Sync Engine
//!
//! Replays the pending mutation queue against the API. [`SyncEngine::sync_data`]
//! is the only entry point; at most one drain runs at a time.
//!
//! A drain works on a snapshot of the queue taken when it starts. Items are
//! replayed strictly in snapshot order. A failed item is kept for the next
//! cycle and the drain moves on to the next one; items that succeeded are gone
//! for good even if a later item fails.
//!
//! Ordering is only guaranteed within a snapshot. A mutation sent directly
//! while online can land before an older mutation that is still queued from an
//! earlier offline period, and the server then sees them out of order. Queued
//! mutations are applied last-write-wins in replay order; nothing here detects
//! that the target was changed server-side in the meantime.

use crate::cache::ResponseCache;
use crate::client::transport::{send_with_timeout, ApiRequest, Transport};
use crate::config::WriteBackPolicy;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::error::OfflineResult;
use crate::store::{load, save, KeyValueStore, LAST_SYNC_KEY};
use crate::sync::queue::{QueueItem, SyncQueue};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Point-in-time view of the sync subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub is_online: bool,
    /// True only while a drain is running.
    pub is_pending_sync: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub pending_sync_count: usize,
}

/// Outcome of one drain cycle
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Items in the snapshot.
    pub attempted: usize,
    pub pushed: usize,
    pub failed: usize,
    /// Queue length after write-back, including items queued during the drain.
    pub remaining: usize,
    /// Cache keys removed because their mutation was confirmed.
    pub invalidated: Vec<String>,
    pub errors: Vec<String>,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Clears the draining flag however the drain ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncEngine {
    queue: Arc<SyncQueue>,
    cache: ResponseCache,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn Transport>,
    monitor: Arc<ConnectivityMonitor>,
    write_back: WriteBackPolicy,
    request_timeout: Duration,
    draining: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<SyncQueue>,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        monitor: Arc<ConnectivityMonitor>,
        write_back: WriteBackPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            cache: ResponseCache::new(store.clone()),
            store,
            transport,
            monitor,
            write_back,
            request_timeout,
            draining: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub async fn last_sync_time(&self) -> OfflineResult<Option<DateTime<Utc>>> {
        let millis: Option<i64> = load(self.store.as_ref(), LAST_SYNC_KEY).await?;
        Ok(millis.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }

    pub async fn state(&self) -> OfflineResult<SyncState> {
        Ok(SyncState {
            is_online: self.monitor.is_online(),
            is_pending_sync: self.is_draining(),
            last_sync_time: self.last_sync_time().await?,
            pending_sync_count: self.queue.pending_count(),
        })
    }

    /// Run one drain cycle.
    ///
    /// Returns `Ok(None)` without doing anything when offline or when another
    /// drain is already running. Per-item replay failures are logged and
    /// reported, never returned; only a store failure while reading the
    /// snapshot or writing back the queue is an error.
    pub async fn sync_data(&self) -> OfflineResult<Option<DrainReport>> {
        if !self.monitor.is_online() {
            debug!("Offline, skipping sync");
            return Ok(None);
        }

        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress");
            return Ok(None);
        }
        let _guard = DrainGuard(&self.draining);

        let snapshot = self.queue.snapshot().await?;
        let mut report = DrainReport {
            attempted: snapshot.len(),
            ..Default::default()
        };

        if snapshot.is_empty() {
            self.record_sync_time().await?;
            debug!("Nothing to sync");
            return Ok(Some(report));
        }

        info!("Syncing {} pending mutations", snapshot.len());
        let snapshot_ids: HashSet<String> = snapshot.iter().map(|i| i.id.clone()).collect();
        let mut retained: Vec<QueueItem> = Vec::new();

        for item in snapshot {
            match self.replay(&item).await {
                Ok(()) => {
                    report.pushed += 1;
                    if let Some(key) = &item.local_data_key {
                        match self.cache.invalidate(key).await {
                            Ok(()) => report.invalidated.push(key.clone()),
                            Err(e) => {
                                warn!("Could not invalidate cache entry '{}': {}", key, e);
                                report.errors.push(format!("invalidate {}: {}", key, e));
                            }
                        }
                    }
                    if self.write_back == WriteBackPolicy::PerItem {
                        self.queue.remove(&item.id).await?;
                    }
                }
                Err(e) => {
                    warn!(
                        "Replay of {} {} (id {}) failed, keeping it queued: {}",
                        item.method, item.url, item.id, e
                    );
                    report
                        .errors
                        .push(format!("{} {}: {}", item.method, item.url, e));
                    retained.push(item);
                }
            }
        }

        report.failed = retained.len();
        report.remaining = self.queue.complete_drain(&snapshot_ids, retained).await?;
        self.record_sync_time().await?;

        info!(
            "Sync finished: {} pushed, {} failed, {} pending",
            report.pushed, report.failed, report.remaining
        );
        Ok(Some(report))
    }

    async fn replay(&self, item: &QueueItem) -> OfflineResult<()> {
        let request = ApiRequest::from(item);
        send_with_timeout(self.transport.as_ref(), &request, self.request_timeout).await?;
        Ok(())
    }

    async fn record_sync_time(&self) -> OfflineResult<()> {
        let now = Utc::now().timestamp_millis();
        save(self.store.as_ref(), LAST_SYNC_KEY, &now).await
    }

    /// Drain the queue on every transition to online.
    ///
    /// Each transition starts its own drain; overlapping ones are turned into
    /// no-ops by the draining flag. The task ends when the engine is dropped.
    pub fn spawn_auto_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.monitor.subscribe();
        let engine: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectivityEvent::Online) => {
                        let Some(engine) = engine.upgrade() else {
                            break;
                        };
                        tokio::spawn(async move {
                            if let Err(e) = engine.sync_data().await {
                                error!("Sync after reconnect failed: {}", e);
                            }
                        });
                    }
                    Ok(ConnectivityEvent::Offline) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Missed {} connectivity events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Auto sync stopped");
        })
    }
}
