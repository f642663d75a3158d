//! Resilience patterns like circuit breakers.
//!
//! ## Key Components
//!
//! - **`circuit`**: Implements the circuit breaker pattern to prevent
//!   repeatedly calling an operation that is known to be failing.
//! - **`cancel`**: Cooperative cancellation tokens that guarded operations
//!   can race against.

pub mod cancel;
pub mod circuit;

pub use cancel::CancellationToken;
pub use circuit::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitError, CircuitState,
};
