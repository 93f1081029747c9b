//! Cancellation token for cooperative cancellation.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

/// A callback invoked with the cancellation reason.
pub type CancelCallback = Box<dyn Fn(&str) + Send + Sync>;

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent: only the first reason is kept. Tokens form a
/// tree through [`child`](Self::child); cancelling a parent cancels every
/// live child with the parent's reason, never the other way round.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: Mutex<Vec<CancelCallback>>,
    notify: Notify,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a child token that is cancelled whenever `self` is.
    #[must_use]
    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        let child = Arc::new(Self::new());
        let weak = Arc::downgrade(&child);
        self.on_cancel(move |reason| {
            if let Some(child) = weak.upgrade() {
                child.cancel(reason);
            }
        });
        child
    }

    /// Requests cancellation with a reason.
    ///
    /// Callbacks run synchronously on the cancelling thread. Panics in
    /// callbacks are logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut slot = self.reason.write();
            if slot.is_some() {
                return;
            }
            *slot = Some(reason.clone());
            self.cancelled.store(true, Ordering::SeqCst);
        }
        self.notify.notify_waiters();

        let callbacks: Vec<CancelCallback> = std::mem::take(&mut *self.callbacks.lock());
        for callback in &callbacks {
            invoke(callback.as_ref(), &reason);
        }
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.lock();
        if self.is_cancelled() {
            drop(callbacks);
            invoke(&callback, &self.reason().unwrap_or_default());
        } else {
            callbacks.push(Box::new(callback));
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Completes once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

fn invoke(callback: &(dyn Fn(&str) + Send + Sync), reason: &str) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(reason))) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        token.cancel("First reason");
        token.cancel("Second reason");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("First reason".to_string()));
    }

    #[test]
    fn test_on_cancel_receives_reason() {
        let token = CancellationToken::new();
        let seen = Arc::new(RwLock::new(String::new()));
        let seen_clone = seen.clone();

        token.on_cancel(move |reason| {
            *seen_clone.write() = reason.to_string();
        });
        assert!(seen.read().is_empty());

        token.cancel("operator abort");
        assert_eq!(*seen.read(), "operator abort");
    }

    #[test]
    fn test_on_cancel_after_cancellation() {
        let token = CancellationToken::new();
        token.cancel("test");

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        token.on_cancel(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_panic_suppressed() {
        let token = CancellationToken::new();
        token.on_cancel(|_| panic!("Intentional panic"));

        token.cancel("test");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_child_follows_parent_only() {
        let parent = Arc::new(CancellationToken::new());
        let child = parent.child();
        let sibling = parent.child();

        child.cancel("sibling failed");
        assert!(!parent.is_cancelled());
        assert!(!sibling.is_cancelled());

        parent.cancel("run cancelled");
        assert_eq!(sibling.reason(), Some("run cancelled".to_string()));
        assert_eq!(child.reason(), Some("sibling failed".to_string()));
    }

    #[test]
    fn test_child_of_cancelled_parent_starts_cancelled() {
        let parent = Arc::new(CancellationToken::new());
        parent.cancel("gone");
        assert!(parent.child().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_wakes() {
        let token = Arc::new(CancellationToken::new());
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("stop");

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_cancelled_pending_until_cancel() {
        let token = CancellationToken::new();
        let mut waiter = tokio_test::task::spawn(token.cancelled());

        tokio_test::assert_pending!(waiter.poll());
        token.cancel("stop");
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel("done");
        token.cancelled().await;
    }
}
