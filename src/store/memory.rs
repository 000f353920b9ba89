//! In-process key-value store
//!
//! Nothing survives the process. Useful for tests and for sessions that
//! should leave no trace on disk.

use super::KeyValueStore;
use crate::error::OfflineResult;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> OfflineResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> OfflineResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> OfflineResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> OfflineResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{load, save};
    use serde_json::json;

    #[tokio::test]
    async fn test_typed_helpers() {
        let store = MemoryStore::new();
        save(&store, "numbers", &vec![1, 2, 3]).await.unwrap();

        let numbers: Option<Vec<i32>> = load(&store, "numbers").await.unwrap();
        assert_eq!(numbers, Some(vec![1, 2, 3]));

        let missing: Option<Vec<i32>> = load(&store, "nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error() {
        let store = MemoryStore::new();
        store.set("numbers", &json!("not a list")).await.unwrap();

        let result: OfflineResult<Option<Vec<i32>>> = load(&store, "numbers").await;
        assert!(result.is_err());
    }
}
