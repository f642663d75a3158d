//! Configuration for circuit breaker behavior.

use std::time::Duration;

/// Default number of failures before the circuit opens
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default number of half-open successes needed to close the circuit
const DEFAULT_SUCCESS_THRESHOLD: u32 = 3;

/// Default delay before an open circuit lets a probe through (30s)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default window in which consecutive failures accumulate (60s)
const DEFAULT_MONITORING_WINDOW: Duration = Duration::from_secs(60);

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of failures within the monitoring window before opening.
    /// Zero disables opening entirely.
    pub failure_threshold: u32,
    /// Consecutive half-open successes required to close the circuit
    pub success_threshold: u32,
    /// How long the circuit stays open before the next call probes recovery
    pub timeout: Duration,
    /// Failures further apart than this restart the failure count at one
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            monitoring_window: DEFAULT_MONITORING_WINDOW,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a config tuned for local storage I/O: trips quickly, recovers quickly
    pub fn for_storage() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(10),
            monitoring_window: Duration::from_secs(30),
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }

    /// Success threshold as applied by the breaker (never below one)
    pub(crate) fn effective_success_threshold(&self) -> u32 {
        self.success_threshold.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(3)
            .with_timeout(Duration::from_millis(100));

        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.timeout, Duration::from_millis(100));
        assert_eq!(config.success_threshold, DEFAULT_SUCCESS_THRESHOLD);
    }

    #[test]
    fn test_zero_success_threshold_is_clamped() {
        let config = CircuitBreakerConfig::default().with_success_threshold(0);
        assert_eq!(config.effective_success_threshold(), 1);
    }
}
