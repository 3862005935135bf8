//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Coordinates shutdown across the listener and every session task.
///
/// Session tokens are children of [`ShutdownCoordinator::token`], so one
/// `shutdown()` ends every push stream and session handler.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel, stop accepting tasks, and wait up to `timeout` for the
    /// tracked ones. Returns `false` if the wait timed out.
    pub async fn graceful_shutdown(&self, tracker: &TaskTracker, timeout: Duration) -> bool {
        self.shutdown();
        let _ = tracker.close();
        info!(
            task_count = tracker.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for session tasks to complete"
        );

        if tokio::time::timeout(timeout, tracker.wait()).await.is_err() {
            warn!(remaining = tracker.len(), "shutdown timed out after {timeout:?}");
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
