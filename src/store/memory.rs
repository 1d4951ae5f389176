//! In-memory store.
//!
//! Used by tests and by the `memory` storage backend. Nothing survives a
//! restart.

use super::Store;
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` currently holds a value.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.entries
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Value>, StoreError> {
        Ok(self.entries.lock().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(store.get("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemoryStore::new();
        store.put("a", json!([1, 2])).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), json!([1, 2]));
        assert!(store.contains("a"));
        store.delete("a").await.unwrap();
        assert!(!store.contains("a"));
        store.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn list_all_in_key_order() {
        let store = MemoryStore::new();
        store.put("b", json!(2)).await.unwrap();
        store.put("a", json!(1)).await.unwrap();
        assert_eq!(store.list_all().await.unwrap(), vec![json!(1), json!(2)]);
    }
}
