//! Shared utilities for warden
//!
//! This crate provides building blocks with no knowledge of the cache:
//! the circuit breaker and cancellation tokens used to guard I/O, atomic
//! file writes, and tracing initialisation.

pub mod atomic_file;
pub mod resilience;
pub mod tracing;

pub use atomic_file::*;
pub use resilience::*;
