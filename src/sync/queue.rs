//! Pending mutation queue
//!
//! The queue is a single JSON array persisted under [`QUEUE_KEY`]. Array order
//! is replay order. Every change is a read-modify-write of the whole array
//! under the queue lock, so a partially updated list is never persisted.

use crate::error::{OfflineError, OfflineResult};
use crate::store::{load, save, KeyValueStore, QUEUE_KEY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Only mutations are ever queued.
    pub fn is_queueable(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Method {
    type Err = OfflineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => Err(OfflineError::InvalidRequest(format!(
                "unsupported method: {}",
                other
            ))),
        }
    }
}

/// One mutation waiting to be replayed against the API.
///
/// Body and headers are captured when the item is created. The bearer token
/// is not: it is resolved again when the item is replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub url: String,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_data_key: Option<String>,
    /// Creation time in unix milliseconds. Informational only.
    pub timestamp: i64,
}

impl QueueItem {
    pub fn new(
        method: Method,
        url: &str,
        body: Option<Value>,
        mut headers: BTreeMap<String, String>,
        local_data_key: Option<String>,
    ) -> OfflineResult<Self> {
        if !method.is_queueable() {
            return Err(OfflineError::InvalidRequest(format!(
                "{} requests are never queued",
                method
            )));
        }

        headers.retain(|name, _| !name.eq_ignore_ascii_case("authorization"));

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            method,
            body,
            headers,
            local_data_key,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }
}

/// Durable FIFO of [`QueueItem`]s.
pub struct SyncQueue {
    store: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
    pending: AtomicUsize,
}

impl SyncQueue {
    /// Open the queue persisted in `store`.
    pub async fn open(store: Arc<dyn KeyValueStore>) -> OfflineResult<Self> {
        let queue = Self {
            store,
            lock: Mutex::new(()),
            pending: AtomicUsize::new(0),
        };
        let items = queue.read().await?;
        queue.pending.store(items.len(), Ordering::Release);
        if !items.is_empty() {
            info!("Found {} mutations pending sync", items.len());
        }
        Ok(queue)
    }

    async fn read(&self) -> OfflineResult<Vec<QueueItem>> {
        Ok(load(self.store.as_ref(), QUEUE_KEY).await?.unwrap_or_default())
    }

    async fn write(&self, items: &[QueueItem]) -> OfflineResult<()> {
        save(self.store.as_ref(), QUEUE_KEY, items).await?;
        self.pending.store(items.len(), Ordering::Release);
        Ok(())
    }

    /// Append an item. The item is persisted before this returns.
    pub async fn enqueue(&self, item: QueueItem) -> OfflineResult<()> {
        let _guard = self.lock.lock().await;
        let mut items = self.read().await?;
        info!(
            "Queued {} {} for sync (id {})",
            item.method, item.url, item.id
        );
        items.push(item);
        self.write(&items).await
    }

    /// The full persisted list, in replay order. Refreshes the pending count.
    pub async fn snapshot(&self) -> OfflineResult<Vec<QueueItem>> {
        let _guard = self.lock.lock().await;
        let items = self.read().await?;
        self.pending.store(items.len(), Ordering::Release);
        Ok(items)
    }

    /// Overwrite the whole list.
    pub async fn replace(&self, items: &[QueueItem]) -> OfflineResult<()> {
        let _guard = self.lock.lock().await;
        self.write(items).await
    }

    /// Drop a single item, leaving the rest in order.
    pub async fn remove(&self, id: &str) -> OfflineResult<()> {
        let _guard = self.lock.lock().await;
        let mut items = self.read().await?;
        items.retain(|item| item.id != id);
        self.write(&items).await
    }

    /// Finish a drain cycle.
    ///
    /// The new list is `retained` followed by every persisted item that was not
    /// part of the drained snapshot, i.e. items enqueued while the drain ran.
    /// Returns the resulting queue length.
    pub async fn complete_drain(
        &self,
        snapshot_ids: &HashSet<String>,
        retained: Vec<QueueItem>,
    ) -> OfflineResult<usize> {
        let _guard = self.lock.lock().await;
        let current = self.read().await?;

        let late: Vec<QueueItem> = current
            .into_iter()
            .filter(|item| !snapshot_ids.contains(&item.id))
            .collect();
        if !late.is_empty() {
            debug!("{} mutations were queued during the drain", late.len());
        }

        let mut items = retained;
        items.extend(late);
        self.write(&items).await?;
        Ok(items.len())
    }

    /// Number of items currently persisted.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}
