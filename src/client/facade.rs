//! Offline-aware request façade
//!
//! Every feature performs its network I/O through [`OfflineClient`], which
//! decides per call between the network, the response cache and the sync
//! queue:
//!
//! 1. Online: send the request. On success, cache the response under
//!    `local_data_key` (if set) and return it. On failure, fall through to
//!    offline handling when `queue_offline` is set, otherwise return the error.
//! 2. Offline handling:
//!    - GET with a `local_data_key`: serve the cached entry if there is one.
//!    - Mutation with `queue_offline`: persist a [`QueueItem`] and hand back
//!      `offline_data` as the optimistic result.
//!    - Anything else: [`OfflineError::Offline`].

use super::transport::{send_with_timeout, ApiRequest, Transport};
use crate::cache::ResponseCache;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{OfflineError, OfflineResult};
use crate::store::KeyValueStore;
use crate::sync::engine::{DrainReport, SyncEngine, SyncState};
use crate::sync::queue::{Method, QueueItem, SyncQueue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-call request settings
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Extra headers. Captured into the queue item if the call gets queued.
    pub headers: BTreeMap<String, String>,
    /// Overrides the client-wide request timeout.
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}

/// How a call behaves when the network is not available.
#[derive(Debug, Clone)]
pub struct OfflineOptions<T> {
    pub queue_offline: bool,
    pub local_data_key: Option<String>,
    /// Returned in place of the server response when the call is queued.
    pub offline_data: Option<T>,
}

impl<T> Default for OfflineOptions<T> {
    fn default() -> Self {
        Self {
            queue_offline: false,
            local_data_key: None,
            offline_data: None,
        }
    }
}

impl<T> OfflineOptions<T> {
    /// Queue the call for later replay if it cannot reach the server.
    pub fn queued() -> Self {
        Self {
            queue_offline: true,
            ..Self::default()
        }
    }

    /// Serve and refresh the cache entry `key`.
    pub fn cached(key: &str) -> Self {
        Self::default().with_key(key)
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.local_data_key = Some(key.to_string());
        self
    }

    pub fn with_offline_data(mut self, data: T) -> Self {
        self.offline_data = Some(data);
        self
    }
}

/// Where a response came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<T> {
    /// Fresh from the server.
    Live(T),
    /// Last known server response, served while offline.
    Cached(T),
    /// Accepted into the sync queue; the server has not seen it yet.
    Pending {
        item_id: String,
        optimistic: Option<T>,
    },
}

impl<T> Delivery<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Delivery::Pending { .. })
    }

    /// The carried value. A pending delivery without optimistic data becomes
    /// [`OfflineError::PendingSync`].
    pub fn into_value(self) -> OfflineResult<T> {
        match self {
            Delivery::Live(value) | Delivery::Cached(value) => Ok(value),
            Delivery::Pending {
                optimistic: Some(value),
                ..
            } => Ok(value),
            Delivery::Pending { item_id, .. } => Err(OfflineError::PendingSync { item_id }),
        }
    }
}

pub struct OfflineClient {
    cache: ResponseCache,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
    transport: Arc<dyn Transport>,
    request_timeout: Duration,
}

impl OfflineClient {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        monitor: Arc<ConnectivityMonitor>,
        engine: Arc<SyncEngine>,
        transport: Arc<dyn Transport>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            cache: ResponseCache::new(store),
            monitor,
            engine,
            transport,
            request_timeout,
        }
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        self.engine.queue()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Perform a request and return the value, optimistic or real.
    pub async fn request<T: DeserializeOwned>(
        &self,
        url: &str,
        method: Method,
        body: Option<Value>,
        config: Option<RequestConfig>,
        options: OfflineOptions<T>,
    ) -> OfflineResult<T> {
        self.send(url, method, body, config, options)
            .await?
            .into_value()
    }

    /// Perform a request and report where the answer came from.
    pub async fn send<T: DeserializeOwned>(
        &self,
        url: &str,
        method: Method,
        body: Option<Value>,
        config: Option<RequestConfig>,
        options: OfflineOptions<T>,
    ) -> OfflineResult<Delivery<T>> {
        let config = config.unwrap_or_default();

        if self.monitor.is_online() {
            let request = ApiRequest {
                method,
                url: url.to_string(),
                headers: config.headers.clone(),
                body: body.clone(),
            };
            let timeout = config.timeout.unwrap_or(self.request_timeout);

            match send_with_timeout(self.transport.as_ref(), &request, timeout).await {
                Ok(response) => {
                    if let Some(key) = &options.local_data_key {
                        self.cache.put(key, &response).await?;
                    }
                    return Ok(Delivery::Live(serde_json::from_value(response)?));
                }
                Err(e) if options.queue_offline => {
                    warn!("{} {} failed, handling offline: {}", method, url, e);
                }
                Err(e) => return Err(e),
            }
        }

        self.handle_offline(url, method, body, config, options)
            .await
    }

    async fn handle_offline<T: DeserializeOwned>(
        &self,
        url: &str,
        method: Method,
        body: Option<Value>,
        config: RequestConfig,
        options: OfflineOptions<T>,
    ) -> OfflineResult<Delivery<T>> {
        if method == Method::Get {
            if let Some(key) = &options.local_data_key {
                if let Some(cached) = self.cache.get(key).await? {
                    debug!("Serving '{}' from cache", key);
                    return Ok(Delivery::Cached(serde_json::from_value(cached)?));
                }
            }
            return Err(OfflineError::Offline);
        }

        if options.queue_offline {
            let item = QueueItem::new(method, url, body, config.headers, options.local_data_key)?;
            let item_id = item.id.clone();
            self.engine.queue().enqueue(item).await?;
            return Ok(Delivery::Pending {
                item_id,
                optimistic: options.offline_data,
            });
        }

        Err(OfflineError::Offline)
    }

    /// Fetch `url` and keep the response under `key` for offline use.
    pub async fn prefetch(&self, url: &str, key: &str) -> OfflineResult<Delivery<Value>> {
        self.send(url, Method::Get, None, None, OfflineOptions::cached(key))
            .await
    }

    /// Drain the sync queue now.
    pub async fn sync_now(&self) -> OfflineResult<Option<DrainReport>> {
        self.engine.sync_data().await
    }

    pub async fn sync_state(&self) -> OfflineResult<SyncState> {
        self.engine.state().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delivery_into_value() {
        assert_eq!(Delivery::Live(1).into_value().unwrap(), 1);
        assert_eq!(Delivery::Cached(2).into_value().unwrap(), 2);

        let pending = Delivery::Pending {
            item_id: "q1".to_string(),
            optimistic: Some(3),
        };
        assert!(pending.is_pending());
        assert_eq!(pending.into_value().unwrap(), 3);

        let pending: Delivery<i32> = Delivery::Pending {
            item_id: "q2".to_string(),
            optimistic: None,
        };
        match pending.into_value() {
            Err(OfflineError::PendingSync { item_id }) => assert_eq!(item_id, "q2"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_option_builders() {
        let opts = OfflineOptions::queued()
            .with_key("checklist-7")
            .with_offline_data(json!({"id": -1}));
        assert!(opts.queue_offline);
        assert_eq!(opts.local_data_key.as_deref(), Some("checklist-7"));
        assert_eq!(opts.offline_data, Some(json!({"id": -1})));

        let opts: OfflineOptions<Value> = OfflineOptions::cached("templates");
        assert!(!opts.queue_offline);
        assert_eq!(opts.local_data_key.as_deref(), Some("templates"));

        let config = RequestConfig::default().header("X-Unit-Serial", "SN-1");
        assert_eq!(config.headers["X-Unit-Serial"], "SN-1");
    }
}
