//! Subscriber lists for facade events.
//!
//! Each registration returns a [`Subscription`]; calling
//! [`Subscription::cancel`] removes exactly that handler. Dropping the handle
//! keeps the handler registered.

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Future returned by an event handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

pub(crate) type Handler<A> = Arc<dyn Fn(A) -> HandlerFuture + Send + Sync>;

/// Ordered list of handlers for one event category.
pub struct HandlerList<A> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Handler<A>)>>,
}

impl<A: Send + 'static> HandlerList<A> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        })
    }

    /// Register a handler at the end of the list.
    pub fn add<F, Fut>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: Handler<A> = Arc::new(move |arg| Box::pin(handler(arg)));
        self.entries.lock().push((id, handler));

        let list = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                list.remove(id);
            }
        })
    }

    fn remove(&self, id: u64) {
        self.entries.lock().retain(|(entry_id, _)| *entry_id != id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Handlers in registration order, detached from the lock.
    pub(crate) fn snapshot(&self) -> Vec<Handler<A>> {
        self.entries.lock().iter().map(|(_, h)| h.clone()).collect()
    }
}

/// Handle to a registered handler.
#[must_use = "keep the subscription to be able to cancel it"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Unregister the handler.
    pub fn cancel(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let list = HandlerList::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = seen.clone();
            let _sub = list.add(move |n| {
                seen.lock().push(format!("{tag}:{n}"));
                async { Ok(()) }
            });
        }
        for handler in list.snapshot() {
            handler(7).await.unwrap();
        }
        assert_eq!(*seen.lock(), vec!["first:7", "second:7"]);
    }

    #[test]
    fn cancel_removes_only_its_handler() {
        let list = HandlerList::<()>::new();
        let a = list.add(|_| async { Ok(()) });
        let _b = list.add(|_| async { Ok(()) });
        assert_eq!(list.len(), 2);
        a.cancel();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn dropping_handle_keeps_handler() {
        let list = HandlerList::<()>::new();
        drop(list.add(|_| async { Ok(()) }));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn cancel_after_list_dropped_is_harmless() {
        let list = HandlerList::<()>::new();
        let sub = list.add(|_| async { Ok(()) });
        drop(list);
        sub.cancel();
    }
}
