//! Cooperative cancellation token shared by the executor, workflow runs,
//! transports and async tasks (spec.md §5: "cooperative cancellation via a
//! process-standard context value propagated by-parameter").

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once `cancel()` has been called. Poll this inside
    /// `tokio::select!` alongside the real work to unblock promptly.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }

    /// Derive a child token: canceling the parent cancels every child, but
    /// cancelling a child never propagates upward. Used by parallel
    /// workflow branches (§5: "a canceled peer cancels all siblings
    /// through a shared derived context").
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        let parent = self.clone();
        let child_cancel = child.clone();
        tokio::spawn(async move {
            parent.cancelled().await;
            child_cancel.cancel();
        });
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_unblocks_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn child_token_cancels_with_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        parent.cancel();
        child.cancelled().await;
        assert!(child.is_cancelled());
    }
}
