//! Metrics and statistics tracking for circuit breaker.

use super::types::{CircuitBreakerStats, CircuitState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::time::Instant;

/// State guarded as one unit so transitions are linearizable
#[derive(Debug)]
pub struct CoreState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub opened_at: Option<Instant>,
    pub last_failure: Option<Instant>,
    pub last_state_change: Instant,
    pub last_failure_time: Option<SystemTime>,
    pub last_success_time: Option<SystemTime>,
    pub generation: u64,
}

/// Internal state tracking for circuit breaker metrics
#[derive(Debug)]
pub struct MetricsState {
    pub core: Mutex<CoreState>,
    pub requests: AtomicU64,
    pub rejected: AtomicU64,
    pub total_successes: AtomicU64,
    pub total_failures: AtomicU64,
}

impl MetricsState {
    /// Create new metrics state
    pub fn new() -> Self {
        Self {
            core: Mutex::new(CoreState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
                last_failure: None,
                last_state_change: Instant::now(),
                last_failure_time: None,
                last_success_time: None,
                generation: 0,
            }),
            requests: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current circuit breaker statistics
    pub fn stats(&self) -> CircuitBreakerStats {
        let core = self.core.lock();
        let total_successes = self.total_successes.load(Ordering::Relaxed);
        let total_failures = self.total_failures.load(Ordering::Relaxed);
        let executed = total_successes + total_failures;

        CircuitBreakerStats {
            state: core.state,
            failures: core.failure_count,
            successes: core.success_count,
            requests: self.requests.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            total_successes,
            total_failures,
            last_failure_time: core.last_failure_time,
            last_success_time: core.last_success_time,
            success_rate: if executed == 0 {
                1.0
            } else {
                total_successes as f64 / executed as f64
            },
        }
    }
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}
