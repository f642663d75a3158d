//! The cache façade
//!
//! [`Cache`] combines the rest of the crate. Every backend call runs through
//! the cache's circuit breaker; entries are compressed and checksummed on
//! write, verified and decompressed on read, and kept in a bounded memory
//! tier. Expired entries are never returned, whether or not cleanup has
//! removed them yet.

mod builder;
mod cleanup;
mod events;
mod guard;
mod internal;
mod lifecycle;
mod operations;
mod pressure;
mod tasks;
mod types;

pub use builder::CacheBuilder;
pub use events::{OperationEvent, OperationKind};
pub use lifecycle::SHUTDOWN_GRACE;
pub use operations::misc::{CacheStats, CircuitBreakerSummary};
pub use types::{BatchResult, Cache, CallContext, SetOptions};

#[cfg(test)]
mod tests;
