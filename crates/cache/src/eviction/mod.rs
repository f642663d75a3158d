//! Eviction strategies dispatched under memory pressure
//!
//! Strategies are registered with the memory pressure detector and run in
//! descending priority order. The built-in strategies act on an
//! [`EvictionTarget`], which the cache implements.

mod policies;
mod traits;

pub use policies::{ExpiredEntriesStrategy, LfuStrategy, LruStrategy};
pub use traits::{EvictionCandidate, EvictionStrategy, EvictionTarget, StrategyOutcome};
