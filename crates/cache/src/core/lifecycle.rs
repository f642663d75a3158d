//! Shutdown of background activity

use std::sync::atomic::Ordering;
use std::time::Duration;

use super::types::Cache;

/// How long shutdown waits for queued background tasks
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

impl Cache {
    /// Stop the cleanup timer and memory monitoring and drain the worker
    /// pool. Cache operations keep working afterwards. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(handle) = self.inner.cleanup_handle.write().take() {
            handle.abort();
        }

        let detector = self.inner.detector.read().clone();
        if let Some(detector) = detector {
            detector.stop_monitoring();
        }

        let pool = self.inner.workers.read().clone();
        if let Some(pool) = pool {
            if !pool.shutdown(SHUTDOWN_GRACE).await {
                tracing::warn!(cache = %self.inner.name, "Background tasks abandoned at shutdown");
            }
        }

        tracing::debug!(cache = %self.inner.name, "Cache shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }
}
