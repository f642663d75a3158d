//! Core types and enums for circuit breaker functionality.

use std::fmt;
use std::time::{Duration, SystemTime};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed - requests pass through normally
    Closed,
    /// Circuit is open - requests fail immediately
    Open,
    /// Circuit is half-open - requests probe whether the operation recovered
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics about circuit breaker state
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    /// Failures counted toward opening in the current window
    pub failures: u32,
    /// Successes counted in the current state
    pub successes: u32,
    /// Every call made through the breaker, rejected ones included
    pub requests: u64,
    /// Calls rejected without running because the circuit was open
    pub rejected: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub last_failure_time: Option<SystemTime>,
    pub last_success_time: Option<SystemTime>,
    /// Ratio of successful to executed calls, 1.0 before any call ran
    pub success_rate: f64,
}

/// Error returned by a call made through a circuit breaker
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit is open and the operation was not invoked
    #[error("circuit breaker is open, retry after {retry_after:?}")]
    Open { retry_after: Duration },

    /// The caller-supplied deadline elapsed before the operation finished
    #[error("operation timed out after {after:?}")]
    Timeout { after: Duration },

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// The operation panicked
    #[error("operation panicked: {message}")]
    Panicked { message: String },

    /// The operation itself failed
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitError<E> {
    /// True when the call was rejected by an open circuit
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    /// Return the operation's own error, if that is what failed
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            _ => None,
        }
    }
}
