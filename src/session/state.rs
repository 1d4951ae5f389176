//! Persisted session records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything needed to resume a session after a restart.
///
/// Stored under [`session_key`](crate::store::session_key) and rewritten
/// after every transcript line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub chan: String,
    pub staff: String,
    pub user: String,
    pub reason: String,
    pub time: DateTime<Utc>,
    pub color: String,
    pub log: Vec<String>,
}

/// A finished session, as listed by `!logs`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousLog {
    pub user: String,
    pub staff: String,
    pub time: DateTime<Utc>,
    pub paste: String,
}
