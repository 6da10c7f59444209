//! Graceful shutdown coordination utilities.
//!
//! A [`ShutdownCoordinator`] is handed explicitly to the rate limiter, the API
//! client and the ingestion runner so that Ctrl+C interrupts long sleeps
//! (quota waits, 429 cooldowns, retry backoff) without leaving a half-written
//! ledger behind. Every ledger write is atomic, so stopping between stages or
//! between checkpoints is always safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// Coordinates graceful shutdown across the ingestion task.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    is_shutdown: AtomicBool,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            is_shutdown: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request shutdown. Notifies all registered waiters exactly once.
    pub fn request_shutdown(&self) {
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested. Returns immediately if already set.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.notify.notified();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }
}

/// Whether an optional coordinator has been triggered.
pub fn is_requested(shutdown: Option<&SharedShutdown>) -> bool {
    shutdown.is_some_and(|s| s.is_shutdown_requested())
}

/// Sleep for `duration` unless shutdown is requested first.
///
/// Returns `true` when the full duration elapsed and `false` when the sleep
/// was cut short by shutdown.
pub async fn sleep_unless_shutdown(duration: Duration, shutdown: Option<&SharedShutdown>) -> bool {
    match shutdown {
        Some(coordinator) => {
            if coordinator.is_shutdown_requested() {
                return false;
            }
            tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = coordinator.wait_for_shutdown() => false,
            }
        }
        None => {
            tokio::time::sleep(duration).await;
            true
        }
    }
}
