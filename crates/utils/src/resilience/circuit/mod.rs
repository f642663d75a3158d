//! Circuit breaker for guarding fallible async operations
//!
//! The breaker moves between three states:
//!
//! - `Closed`: calls run; failures inside the monitoring window accumulate and
//!   open the circuit once they reach the failure threshold.
//! - `Open`: calls are rejected with [`CircuitError::Open`] without running.
//!   After the timeout the next call is let through as a probe.
//! - `HalfOpen`: calls run; enough consecutive successes close the circuit,
//!   any failure reopens it and restarts the timeout clock.
//!
//! ## Architecture
//!
//! - [`types`] - `CircuitState`, `CircuitError` and statistics
//! - [`config`] - Thresholds and timings
//! - [`metrics`] - Shared counters and the lock-guarded core state
//! - [`transitions`] - State transition logic
//! - [`state`] - The `CircuitBreaker` itself
//!
//! ## Example
//!
//! ```rust,no_run
//! use warden_utils::resilience::circuit::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() {
//! let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
//!
//! let result = cb
//!     .call(|| async { Ok::<_, std::io::Error>("success".to_string()) })
//!     .await;
//! # let _ = result;
//! # }
//! ```

pub mod config;
pub mod metrics;
pub mod state;
pub mod transitions;
pub mod types;

// Re-export public API
pub use config::CircuitBreakerConfig;
pub use state::CircuitBreaker;
pub use types::{CircuitBreakerStats, CircuitError, CircuitState};
