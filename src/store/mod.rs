//! Durable key-value state.
//!
//! Values are JSON documents. A missing key is reported as
//! [`StoreError::NotFound`] so callers can tell "start from empty" apart from
//! a genuine storage failure.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;

pub mod memory;
pub mod redb;

pub use memory::MemoryStore;
pub use redb::RedbStore;

/// Ordered array of queued users.
pub const QUEUE_KEY: &str = "queue::queuedUsers";
/// Array of storage keys for sessions that have not ended.
pub const ACTIVE_SESSIONS_KEY: &str = "sessions::activeSessions";
/// Bounded history of finished sessions.
pub const PREVIOUS_LOGS_KEY: &str = "sessions::previousLogs";

/// Storage key of the snapshot for the session living in `channel`.
pub fn session_key(channel: &str) -> String {
    format!("session::{channel}")
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a value. Missing keys yield [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<Value, StoreError>;

    /// Insert or replace a value.
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Remove a value. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Every stored value, in key order.
    async fn list_all(&self) -> Result<Vec<Value>, StoreError>;
}

/// Fetch and decode a typed value.
pub async fn get_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<T, StoreError> {
    let value = store.get(key).await?;
    Ok(serde_json::from_value(value)?)
}

/// Fetch and decode a typed value, treating a missing key as `T::default()`.
pub async fn get_json_or_default<T: DeserializeOwned + Default>(
    store: &dyn Store,
    key: &str,
) -> Result<T, StoreError> {
    match get_json(store, key).await {
        Err(StoreError::NotFound(_)) => Ok(T::default()),
        other => other,
    }
}

/// Encode and store a typed value.
pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn Store,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    store.put(key, serde_json::to_value(value)?).await
}
