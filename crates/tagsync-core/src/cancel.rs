//! Cooperative cancellation
//!
//! One [`CancelSignal`] is shared by the paginator, the transport and the
//! worker pool. Nothing is aborted mid-request: each component checks the
//! flag at its own safe points.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared, explicit cancellation flag
///
/// Once cancelled, no further page is requested, backoff waits end early
/// and workers take no new records.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    /// Create signal in the not-cancelled state
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Check if cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
