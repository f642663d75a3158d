//! Core eviction trait definitions

use crate::errors::Result;
use crate::monitoring::PressureLevel;
use async_trait::async_trait;

/// What one strategy run released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyOutcome {
    pub items_evicted: u64,
    pub memory_freed: u64,
}

impl StrategyOutcome {
    pub fn merge(&mut self, other: StrategyOutcome) {
        self.items_evicted += other.items_evicted;
        self.memory_freed += other.memory_freed;
    }
}

/// Pluggable policy invoked by the memory pressure detector.
///
/// Names are unique within a detector; registering a second strategy with
/// the same name replaces the first.
#[async_trait]
pub trait EvictionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs first
    fn priority(&self) -> i32;

    async fn execute(&self, level: PressureLevel) -> Result<StrategyOutcome>;
}

/// Memory-tier entry as seen by eviction strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub key: String,
    pub size: u64,
    pub access_count: u64,
    pub last_accessed: u64,
}

/// What the built-in strategies act on
#[async_trait]
pub trait EvictionTarget: Send + Sync {
    /// Delete expired entries everywhere
    async fn evict_expired(&self) -> Result<StrategyOutcome>;

    /// Snapshot of the in-memory tier
    fn memory_candidates(&self) -> Vec<EvictionCandidate>;

    /// Drop entries from the in-memory tier only
    fn evict_from_memory(&self, keys: &[String]) -> StrategyOutcome;
}
