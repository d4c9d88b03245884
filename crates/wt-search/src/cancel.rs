//! Cooperative cancellation shared between a search and its callers.

use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable cancellation flag.
///
/// Cancellation is one-way and sticky: once tripped the token stays
/// cancelled for every clone. Waiters observe it either by polling
/// [`is_cancelled`](CancelToken::is_cancelled) at checkpoints or by
/// racing [`cancelled`](CancelToken::cancelled) against other futures
/// in a `select!`.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trips the token and wakes every waiter
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled. Safe to call from any
    /// number of tasks, before or after the trip.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        // the sender lives inside self, so changed() only fails after a
        // trip has been observed
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
