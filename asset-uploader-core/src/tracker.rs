//! Completion tracking for a batch of uploads.
//!
//! [`CompletionTracker::register`] increments the pending count and hands back
//! a [`CompletionGuard`]. Dropping the guard decrements the count exactly once,
//! whichever way the unit ends (success, failure, cancellation, or a panic
//! unwinding through the worker). [`CompletionTracker::wait`] resolves once
//! the count is back at zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    pending: AtomicUsize,
    drained: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionTracker {
    inner: Arc<Inner>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more unit of work.
    pub fn register(&self) -> CompletionGuard {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        CompletionGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Wait until every registered guard has been dropped.
    ///
    /// Returns immediately when nothing is pending.
    pub async fn wait(&self) {
        loop {
            // Register interest before checking, so a decrement to zero between
            // the check and the await still wakes us.
            let drained = self.inner.drained.notified();
            if self.pending() == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// Marks one unit of work as outstanding until dropped.
#[derive(Debug)]
#[must_use = "dropping the guard marks the unit as complete"]
pub struct CompletionGuard {
    inner: Arc<Inner>,
}

impl CompletionGuard {
    /// Mark the unit complete. Same as dropping the guard.
    pub fn complete(self) {}
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}
