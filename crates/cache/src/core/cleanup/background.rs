//! Background cleanup task management

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::core::types::Cache;
use crate::workers::TaskKind;

/// Start the background cleanup task.
///
/// With background workers enabled each tick hands a cleanup task to the
/// pool; otherwise the sweep runs on the timer task itself.
pub(crate) fn start_cleanup_task(cache: &Cache) {
    let cleanup_interval = cache.inner.config.cleanup_interval;

    // Zero disables the timer (useful for tests)
    if cleanup_interval == Duration::ZERO || !cache.inner.config.enabled {
        return;
    }

    let inner = Arc::downgrade(&cache.inner);
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };

            let pool = inner.workers.read().clone();
            match pool {
                Some(pool) => {
                    if let Err(e) = pool.submit(TaskKind::Cleanup, Vec::new()) {
                        tracing::warn!(error = %e, "Failed to schedule background cleanup");
                    }
                }
                None => {
                    if let Err(e) = inner.run_cleanup().await {
                        tracing::warn!(cache = %inner.name, error = %e, "Cache cleanup error");
                    }
                }
            }
        }
    });

    *cache.inner.cleanup_handle.write() = Some(handle);
}
