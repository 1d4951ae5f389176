//! Redb-backed persistent state.
//!
//! Implements [`Store`] on top of the redb embedded database. Every key lives
//! in a single table; values are JSON-encoded bytes.

use super::Store;
use crate::error::StoreError;
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

const STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("state");

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(db_err)?;

        // Create the table up front so readers never see "table does not exist".
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            write_txn.open_table(STATE_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl Store for RedbStore {
    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(STATE_TABLE).map_err(db_err)?;
        let Some(bytes) = table.get(key).map_err(db_err)? else {
            return Err(StoreError::NotFound(key.to_string()));
        };
        Ok(serde_json::from_slice(bytes.value())?)
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&value)?;
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(STATE_TABLE).map_err(db_err)?;
            table.insert(key, bytes.as_slice()).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(STATE_TABLE).map_err(db_err)?;
            table.remove(key).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Value>, StoreError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(STATE_TABLE).map_err(db_err)?;
        let mut values = Vec::new();
        for item in table.iter().map_err(db_err)? {
            let (_k, v) = item.map_err(db_err)?;
            values.push(serde_json::from_slice(v.value())?);
        }
        Ok(values)
    }
}
