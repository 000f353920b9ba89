use super::auth::{SharedToken, TokenProvider};
use super::facade::OfflineClient;
use super::transport::{HttpTransport, Transport};
use crate::config::ClientConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::OfflineResult;
use crate::store::{KeyValueStore, SqliteStore};
use crate::sync::engine::SyncEngine;
use crate::sync::queue::SyncQueue;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Wires store, transport, connectivity monitor and sync engine into an
/// [`OfflineClient`].
///
/// Anything not supplied is built from the [`ClientConfig`]: a SQLite store in
/// `data_dir` and an HTTP transport against `api_url`.
pub struct OfflineClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
    tokens: Option<Arc<dyn TokenProvider>>,
    initially_online: bool,
}

impl OfflineClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            store: None,
            transport: None,
            tokens: None,
            initially_online: true,
        }
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Connectivity state at startup.
    pub fn online(mut self, online: bool) -> Self {
        self.initially_online = online;
        self
    }

    /// Build the client. Must be called inside a tokio runtime when
    /// `auto_sync` or `probe_interval_secs` is configured.
    pub async fn build(self) -> OfflineResult<OfflineClient> {
        let config = self.config;

        let store: Arc<dyn KeyValueStore> = match self.store {
            Some(store) => store,
            None => {
                info!("Opening offline store in {}", config.data_dir.display());
                Arc::new(SqliteStore::open_in_dir(&config.data_dir)?)
            }
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let tokens: Arc<dyn TokenProvider> = match self.tokens {
                    Some(tokens) => tokens,
                    None => Arc::new(SharedToken::new(config.api_token.clone())),
                };
                Arc::new(HttpTransport::new(
                    &config.api_url,
                    tokens,
                    config.request_timeout(),
                )?)
            }
        };

        let monitor = Arc::new(ConnectivityMonitor::new(self.initially_online));
        let queue = Arc::new(SyncQueue::open(store.clone()).await?);
        let engine = Arc::new(SyncEngine::new(
            queue,
            store.clone(),
            transport.clone(),
            monitor.clone(),
            config.write_back,
            config.request_timeout(),
        ));

        if config.auto_sync {
            engine.spawn_auto_sync();
        }
        if let Some(secs) = config.probe_interval_secs.filter(|s| *s > 0) {
            monitor.spawn_probe(transport.clone(), Duration::from_secs(secs));
        }

        Ok(OfflineClient::new(
            store,
            monitor,
            engine,
            transport,
            config.request_timeout(),
        ))
    }
}
