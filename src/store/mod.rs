//! Durable key-value storage
//!
//! Every persistent byte this crate writes goes through [`KeyValueStore`]:
//! the sync queue, the last sync timestamp and cached API responses. Values
//! are arbitrary JSON documents stored under string keys.
//!
//! There are no cross-key transactions. Callers that need an atomic update of
//! a composite value (the sync queue) write the whole value back in a single
//! [`KeyValueStore::set`].

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::OfflineResult;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Reserved key holding the pending mutation list.
pub const QUEUE_KEY: &str = "sync:queue";
/// Reserved key holding the completion time of the last drain cycle.
pub const LAST_SYNC_KEY: &str = "sync:last_sync_time";
/// Prefix under which cached API responses are stored.
pub const CACHE_PREFIX: &str = "cache:";

/// Persistent JSON key-value store.
///
/// Implementations must surface every failure; a write is never silently dropped.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> OfflineResult<Option<Value>>;

    async fn set(&self, key: &str, value: &Value) -> OfflineResult<()>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> OfflineResult<()>;

    /// All keys starting with `prefix`, in lexical order.
    async fn keys(&self, prefix: &str) -> OfflineResult<Vec<String>>;
}

/// Read and deserialize a typed value.
pub async fn load<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> OfflineResult<Option<T>> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and write a typed value.
pub async fn save<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> OfflineResult<()> {
    let value = serde_json::to_value(value)?;
    store.set(key, &value).await
}
