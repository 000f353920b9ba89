//! Last-known server responses, keyed by caller-chosen `localDataKey`.
//!
//! An entry is overwritten whole on every successful fetch and removed when a
//! mutation carrying its key is confirmed by the server. Entries are never
//! merged.

use crate::error::OfflineResult;
use crate::store::{KeyValueStore, CACHE_PREFIX};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn store_key(key: &str) -> String {
        format!("{}{}", CACHE_PREFIX, key)
    }

    pub async fn get(&self, key: &str) -> OfflineResult<Option<Value>> {
        self.store.get(&Self::store_key(key)).await
    }

    pub async fn put(&self, key: &str, value: &Value) -> OfflineResult<()> {
        self.store.set(&Self::store_key(key), value).await?;
        debug!("Cached response under '{}'", key);
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) -> OfflineResult<()> {
        self.store.delete(&Self::store_key(key)).await?;
        debug!("Invalidated cache entry '{}'", key);
        Ok(())
    }

    /// Remove one entry, or every cached entry when `key` is `None`.
    ///
    /// Only cache entries are touched; the sync queue and sync metadata are kept.
    pub async fn clear(&self, key: Option<&str>) -> OfflineResult<usize> {
        if let Some(key) = key {
            self.invalidate(key).await?;
            return Ok(1);
        }

        let keys = self.store.keys(CACHE_PREFIX).await?;
        for store_key in &keys {
            self.store.delete(store_key).await?;
        }
        debug!("Cleared {} cache entries", keys.len());
        Ok(keys.len())
    }

    /// Cache keys currently held, without the storage prefix.
    pub async fn keys(&self) -> OfflineResult<Vec<String>> {
        let keys = self.store.keys(CACHE_PREFIX).await?;
        Ok(keys
            .into_iter()
            .map(|k| k[CACHE_PREFIX.len()..].to_string())
            .collect())
    }
}
