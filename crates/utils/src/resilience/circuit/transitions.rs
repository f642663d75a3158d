//! State transition logic for circuit breaker.

use super::config::CircuitBreakerConfig;
use super::metrics::{CoreState, MetricsState};
use super::types::CircuitState;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Handles state transitions for circuit breaker
pub struct StateTransitions {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    metrics: Arc<MetricsState>,
}

impl StateTransitions {
    /// Create new state transitions handler
    pub fn new(name: Arc<str>, config: CircuitBreakerConfig, metrics: Arc<MetricsState>) -> Self {
        Self {
            name,
            config,
            metrics,
        }
    }

    fn transition(&self, core: &mut CoreState, to: CircuitState, now: Instant) {
        if core.state == to {
            return;
        }
        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %core.state,
                failures = core.failure_count,
                "Circuit breaker opening"
            ),
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, "Circuit breaker entering half-open state")
            }
            CircuitState::Closed => tracing::info!(breaker = %self.name, "Circuit breaker closing"),
        }

        core.state = to;
        core.last_state_change = now;
        core.generation += 1;
        core.failure_count = 0;
        core.success_count = 0;
        core.opened_at = if to == CircuitState::Open {
            Some(now)
        } else {
            None
        };
    }

    /// Decide whether a call may run.
    ///
    /// Returns the generation the call runs in, or the remaining open time
    /// when the call must be rejected. An open circuit whose timeout elapsed
    /// moves to half-open here, before the admitted call executes.
    pub fn admit(&self) -> Result<u64, Duration> {
        let mut core = self.metrics.core.lock();
        if core.state == CircuitState::Open {
            let now = Instant::now();
            let opened_at = core.opened_at.unwrap_or(core.last_state_change);
            let elapsed = now.saturating_duration_since(opened_at);
            if elapsed < self.config.timeout {
                return Err(self.config.timeout - elapsed);
            }
            self.transition(&mut core, CircuitState::HalfOpen, now);
        }
        Ok(core.generation)
    }

    /// Record a successful call and handle state transitions
    pub fn record_success(&self, generation: u64) {
        self.metrics.total_successes.fetch_add(1, Ordering::Relaxed);
        let mut core = self.metrics.core.lock();
        core.last_success_time = Some(SystemTime::now());

        // Results from calls admitted before the last transition are stale
        if generation != core.generation {
            return;
        }

        match core.state {
            CircuitState::Closed => {
                core.success_count = core.success_count.saturating_add(1);
                core.failure_count = 0;
                core.last_failure = None;
            }
            CircuitState::HalfOpen => {
                core.success_count += 1;
                if core.success_count >= self.config.effective_success_threshold() {
                    self.transition(&mut core, CircuitState::Closed, Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call and handle state transitions
    pub fn record_failure(&self, generation: u64) {
        self.metrics.total_failures.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut core = self.metrics.core.lock();
        core.last_failure_time = Some(SystemTime::now());

        if generation != core.generation {
            return;
        }

        match core.state {
            CircuitState::Closed => {
                let within_window = core
                    .last_failure
                    .map(|last| now.saturating_duration_since(last) <= self.config.monitoring_window)
                    .unwrap_or(false);
                core.failure_count = if within_window {
                    core.failure_count.saturating_add(1)
                } else {
                    1
                };
                core.last_failure = Some(now);

                let threshold = self.config.failure_threshold;
                if threshold > 0 && core.failure_count >= threshold {
                    self.transition(&mut core, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => {
                // Any failure while probing reopens and restarts the timeout clock
                core.last_failure = Some(now);
                self.transition(&mut core, CircuitState::Open, now);
            }
            CircuitState::Open => {}
        }
    }

    /// Force the circuit closed and clear counters
    pub fn reset(&self) {
        let mut core = self.metrics.core.lock();
        self.transition(&mut core, CircuitState::Closed, Instant::now());
        core.failure_count = 0;
        core.success_count = 0;
        core.last_failure = None;
    }
}
