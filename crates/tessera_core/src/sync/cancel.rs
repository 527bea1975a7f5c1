//! Cooperative cancellation.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared cancellation flag.
///
/// Clones observe the same flag. Cancelling is idempotent and cannot be
/// undone.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Creates a token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fires the token, waking every waiter.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once [`CancelToken::cancel`] was called.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes when the token fires.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
