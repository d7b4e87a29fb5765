//! Processed alert-evidence keys, so a rerun does not acquire the same
//! file twice for the same alert.
//!
//! Keys are `alert_id` immediately followed by the evidence sha256.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{ResponseError, Result};

pub trait ProcessedStore: Send + Sync {
    fn contains(&self, key: &str) -> Result<bool>;
    fn insert(&self, key: &str) -> Result<()>;
}

pub fn processed_key(alert_id: &str, sha256: &str) -> String {
    format!("{alert_id}{sha256}")
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

/// Key: processed key. Value: unix seconds when it was first seen.
const PROCESSED: TableDefinition<&str, i64> = TableDefinition::new("processed");

fn store_err(e: impl std::fmt::Display) -> ResponseError {
    ResponseError::Store(e.to_string())
}

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(PROCESSED).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }
}

impl ProcessedStore for RedbStore {
    fn contains(&self, key: &str) -> Result<bool> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(PROCESSED).map_err(store_err)?;
        Ok(table.get(key).map_err(store_err)?.is_some())
    }

    fn insert(&self, key: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(PROCESSED).map_err(store_err)?;
            table.insert(key, now).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Non-persistent store for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    keys: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessedStore for MemoryStore {
    fn contains(&self, key: &str) -> Result<bool> {
        let keys = self
            .keys
            .lock()
            .map_err(|_| store_err("memory store lock poisoned"))?;
        Ok(keys.contains(key))
    }

    fn insert(&self, key: &str) -> Result<()> {
        self.keys
            .lock()
            .map_err(|_| store_err("memory store lock poisoned"))?
            .insert(key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn redb_insert_then_contains() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("processed.redb")).unwrap();
        let key = processed_key("da637", "abc");
        assert!(!store.contains(&key).unwrap());
        store.insert(&key).unwrap();
        assert!(store.contains(&key).unwrap());
        store.insert(&key).unwrap();
        assert!(store.contains(&key).unwrap());
    }

    #[test]
    fn redb_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/processed.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store.insert("k1").unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        assert!(store.contains("k1").unwrap());
        assert!(!store.contains("k2").unwrap());
    }

    #[test]
    fn memory_store_is_idempotent() {
        let store = MemoryStore::new();
        store.insert("k").unwrap();
        store.insert("k").unwrap();
        assert!(store.contains("k").unwrap());
        assert!(!store.contains("other").unwrap());
    }
}
