//! SQLite-backed key-value store
//!
//! One table, one row per key. Values are stored as JSON text.

use super::KeyValueStore;
use crate::error::{OfflineError, OfflineResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use tokio::sync::Mutex;

/// Local storage backend using SQLite
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> OfflineResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a store that lives only as long as this value
    pub fn open_in_memory() -> OfflineResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    /// Open `offline.db` inside `data_dir`, creating the directory if needed
    pub fn open_in_dir<P: AsRef<Path>>(data_dir: P) -> OfflineResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).map_err(|e| {
            OfflineError::Store(format!("cannot create {}: {}", data_dir.display(), e))
        })?;
        Self::open(data_dir.join("offline.db"))
    }

    fn with_connection(conn: Connection) -> OfflineResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> OfflineResult<Option<Value>> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> OfflineResult<()> {
        let text = serde_json::to_string(value)?;
        let now = chrono::Utc::now().timestamp_millis();

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             updated_at = excluded.updated_at",
            params![key, text, now],
        )?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> OfflineResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> OfflineResult<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT key FROM kv_store
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key",
        )?;

        let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;
        let keys = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}
