//! Key-value stores for correlation entries
//!
//! [`MemoryStore`] keeps entries for the life of the process.
//! [`SqliteStore`] writes them to a database file so that a request
//! persisted before a redirect is still there when the callback arrives in
//! a later process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{PassportError, Result};
use crate::platform::KeyValueStore;

/// In-process store backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Store backed by a SQLite database file
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Create a store in the user's data directory
    ///
    /// `PASSPORT_SPA_STORE` overrides the database path.
    ///
    /// # Errors
    ///
    /// Returns error if the data directory cannot be determined or created,
    /// or the schema cannot be initialized
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("PASSPORT_SPA_STORE") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "passport-spa", "passport-spa")
            .ok_or_else(|| PassportError::Storage("Could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| PassportError::Storage(e.to_string()))?;

        Self::new_with_path(data_dir.join("correlation.db"))
    }

    /// Create a store using the specified database path
    ///
    /// # Examples
    ///
    /// ```
    /// use passport_spa::platform::{KeyValueStore, SqliteStore};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SqliteStore::new_with_path(dir.path().join("kv.db")).unwrap();
    /// store.set("lpjs.abc", "{}").unwrap();
    /// assert_eq!(store.get("lpjs.abc").unwrap().as_deref(), Some("{}"));
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| PassportError::Storage(e.to_string()))?;
        }

        let store = Self { db_path };
        store.init()?;
        Ok(store)
    }

    /// Path of the database file
    pub fn path(&self) -> &std::path::Path {
        &self.db_path
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS correlation (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| PassportError::Storage(e.to_string()))?;
        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| PassportError::Storage(e.to_string()).into())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT value FROM correlation WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to read entry")
        .map_err(|e| PassportError::Storage(e.to_string()).into())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO correlation (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .context("Failed to write entry")
        .map_err(|e| PassportError::Storage(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute("DELETE FROM correlation WHERE key = ?1", params![key])
            .context("Failed to delete entry")
            .map_err(|e| PassportError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
        assert_eq!(store.len(), 1);

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_memory_store_remove_missing_is_ok() {
        let store = MemoryStore::new();
        assert!(store.remove("missing").is_ok());
    }

    #[test]
    fn test_sqlite_store_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::new_with_path(tmp.path().join("kv.db")).unwrap();

        store.set("lpjs.a", "one").unwrap();
        store.set("lpjs.a", "two").unwrap();
        assert_eq!(store.get("lpjs.a").unwrap(), Some("two".to_string()));

        store.remove("lpjs.a").unwrap();
        assert_eq!(store.get("lpjs.a").unwrap(), None);
    }

    #[test]
    fn test_sqlite_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("kv.db");

        {
            let store = SqliteStore::new_with_path(&path).unwrap();
            store.set("lpjs.state", r#"{"v":"verifier","s":"*"}"#).unwrap();
        }

        let reopened = SqliteStore::new_with_path(&path).unwrap();
        assert_eq!(
            reopened.get("lpjs.state").unwrap().as_deref(),
            Some(r#"{"v":"verifier","s":"*"}"#)
        );
    }
}
