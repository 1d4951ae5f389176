//! Bounded history of finished sessions.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::state::PreviousLog;
use crate::error::StoreError;
use crate::store::{PREVIOUS_LOGS_KEY, Store, get_json_or_default, put_json};

/// Entries kept; the oldest is evicted first.
pub const MAX_PREVIOUS_LOGS: usize = 10;

pub struct LogHistory {
    store: Arc<dyn Store>,
    entries: Mutex<Vec<PreviousLog>>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl LogHistory {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            entries: Mutex::new(Vec::new()),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the in-memory history with the persisted one.
    pub async fn load(&self) -> Result<(), StoreError> {
        let entries: Vec<PreviousLog> =
            get_json_or_default(self.store.as_ref(), PREVIOUS_LOGS_KEY).await?;
        debug!(entries = entries.len(), "Loaded previous session logs");
        *self.entries.lock() = entries;
        Ok(())
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<PreviousLog> {
        self.entries.lock().clone()
    }

    /// Append `entry` in memory, evicting the oldest beyond the limit.
    pub fn push(&self, entry: PreviousLog) {
        let mut entries = self.entries.lock();
        entries.push(entry);
        let excess = entries.len().saturating_sub(MAX_PREVIOUS_LOGS);
        entries.drain(..excess);
    }

    pub async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.persist_lock.lock().await;
        let entries = self.entries();
        put_json(self.store.as_ref(), PREVIOUS_LOGS_KEY, &entries).await
    }
}
