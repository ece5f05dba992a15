use crate::error::{Result, StoreError};
use crate::model::{BrowseProgress, ScanData, now_millis};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const KEY_SCANNING: &str = "scanning";
pub const KEY_AUTO_BROWSING: &str = "autoBrowsing";
pub const KEY_SCAN_DATA: &str = "scanData";
pub const KEY_AUTO_BROWSE_PROGRESS: &str = "autoBrowseProgress";

/// External key-value storage holding JSON values.
///
/// Keys are independent; there is no transaction spanning a read and a later
/// write, so read-modify-write callers can interleave.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// SQLite-backed durable store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let db = Database {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let value = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        Ok(value)
    }

    pub fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_millis()],
        )?;
        Ok(())
    }

    pub fn remove_raw(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.set_raw(key, &serde_json::to_string(&value)?)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.remove_raw(key)
    }
}

/// Process-local store. Backs tests and the session-scoped handoff slot.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Value>>> {
        self.entries
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Typed view over the engine's persisted keys. Missing keys read as their
/// documented defaults.
#[derive(Clone)]
pub struct PersistedState {
    store: Arc<dyn KeyValueStore>,
}

impl PersistedState {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    async fn read<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        match self.store.get(key).await? {
            None | Some(Value::Null) => Ok(T::default()),
            Some(value) => Ok(serde_json::from_value(value)?),
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.store.set(key, serde_json::to_value(value)?).await
    }

    pub async fn scanning(&self) -> Result<bool> {
        self.read(KEY_SCANNING).await
    }

    pub async fn set_scanning(&self, scanning: bool) -> Result<()> {
        self.write(KEY_SCANNING, &scanning).await
    }

    pub async fn auto_browsing(&self) -> Result<bool> {
        self.read(KEY_AUTO_BROWSING).await
    }

    pub async fn set_auto_browsing(&self, browsing: bool) -> Result<()> {
        self.write(KEY_AUTO_BROWSING, &browsing).await
    }

    pub async fn scan_data(&self) -> Result<ScanData> {
        self.read(KEY_SCAN_DATA).await
    }

    pub async fn set_scan_data(&self, data: &ScanData) -> Result<()> {
        self.write(KEY_SCAN_DATA, data).await
    }

    pub async fn progress(&self) -> Result<Option<BrowseProgress>> {
        self.read(KEY_AUTO_BROWSE_PROGRESS).await
    }

    pub async fn set_progress(&self, progress: Option<BrowseProgress>) -> Result<()> {
        self.write(KEY_AUTO_BROWSE_PROGRESS, &progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(
            store.get("k").await.unwrap(),
            Some(serde_json::json!({"a": 1}))
        );

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_persisted_state_defaults() {
        let state = PersistedState::new(Arc::new(MemoryStore::new()));
        assert!(!state.scanning().await.unwrap());
        assert!(!state.auto_browsing().await.unwrap());
        assert_eq!(state.scan_data().await.unwrap(), ScanData::default());
        assert_eq!(state.progress().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_progress_null_reads_as_none() {
        let state = PersistedState::new(Arc::new(MemoryStore::new()));
        state
            .set_progress(Some(BrowseProgress {
                current: 2,
                total: 5,
            }))
            .await
            .unwrap();
        assert_eq!(
            state.progress().await.unwrap(),
            Some(BrowseProgress {
                current: 2,
                total: 5
            })
        );

        state.set_progress(None).await.unwrap();
        assert_eq!(
            state.store().get(KEY_AUTO_BROWSE_PROGRESS).await.unwrap(),
            Some(Value::Null)
        );
        assert_eq!(state.progress().await.unwrap(), None);
    }
}
