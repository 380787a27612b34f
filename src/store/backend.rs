use crate::errors::{ReplayError, Result};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Durable keyed byte storage under the mapping store.
///
/// Calls are blocking; the store moves them off the async runtime.
pub trait MappingBackend: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Returns true if the key existed.
    fn delete(&self, key: &str) -> Result<bool>;

    fn list(&self) -> Result<Vec<(String, Vec<u8>)>>;
}

const MAPPINGS_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("domain_mappings");

/// One redb file, one table, one row per domain.
#[derive(Debug, Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path.as_ref()).map_err(ReplayError::storage)?;
        Self::new(Arc::new(db))
    }

    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write().map_err(ReplayError::storage)?;
        write_txn
            .open_table(MAPPINGS_TABLE)
            .map_err(ReplayError::storage)?;
        write_txn.commit().map_err(ReplayError::storage)?;

        Ok(Self { db })
    }
}

impl MappingBackend for RedbBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(ReplayError::storage)?;
        {
            let mut table = write_txn
                .open_table(MAPPINGS_TABLE)
                .map_err(ReplayError::storage)?;
            table.insert(key, value).map_err(ReplayError::storage)?;
        }
        write_txn.commit().map_err(ReplayError::storage)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(ReplayError::storage)?;
        let table = read_txn
            .open_table(MAPPINGS_TABLE)
            .map_err(ReplayError::storage)?;

        Ok(table
            .get(key)
            .map_err(ReplayError::storage)?
            .map(|value| value.value().to_vec()))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let write_txn = self.db.begin_write().map_err(ReplayError::storage)?;
        let existed = {
            let mut table = write_txn
                .open_table(MAPPINGS_TABLE)
                .map_err(ReplayError::storage)?;
            let removed = table.remove(key).map_err(ReplayError::storage)?;
            removed.is_some()
        };
        write_txn.commit().map_err(ReplayError::storage)?;
        Ok(existed)
    }

    fn list(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let read_txn = self.db.begin_read().map_err(ReplayError::storage)?;
        let table = read_txn
            .open_table(MAPPINGS_TABLE)
            .map_err(ReplayError::storage)?;

        let mut items = Vec::new();
        for item in table.iter().map_err(ReplayError::storage)? {
            let (key, value) = item.map_err(ReplayError::storage)?;
            items.push((key.value().to_string(), value.value().to_vec()));
        }
        Ok(items)
    }
}

/// Process-local backend for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingBackend for MemoryBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.rows
            .write()
            .map_err(ReplayError::storage)?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.rows.read().map_err(ReplayError::storage)?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .rows
            .write()
            .map_err(ReplayError::storage)?
            .remove(key)
            .is_some())
    }

    fn list(&self) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .rows
            .read()
            .map_err(ReplayError::storage)?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
