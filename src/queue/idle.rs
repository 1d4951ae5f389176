//! Idle timers for users sitting in the support channel without queuing.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// A pending nag-then-kick task. Dropping the timer aborts the task.
#[derive(Debug)]
pub struct IdleTimer {
    id: u64,
    nick: String,
    handle: JoinHandle<()>,
}

impl IdleTimer {
    /// Allocate an id to pass into the task before spawning it.
    pub fn next_id() -> u64 {
        NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed)
    }

    pub fn spawn<F>(id: u64, nick: &str, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            id,
            nick: nick.to_string(),
            handle: tokio::spawn(task),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Nick as last seen, used in the nag and the kick.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn rename(&mut self, nick: &str) {
        self.nick = nick.to_string();
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
