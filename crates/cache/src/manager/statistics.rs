//! Statistics across every cache of a manager

use crate::core::CacheStats;
use serde::Serialize;
use std::collections::BTreeMap;

/// Totals over a set of caches, plus each cache's own snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub caches: usize,
    pub memory_entries: usize,
    pub total_size: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub total_writes: u64,
    pub total_deletes: u64,
    pub expired_entries: u64,
    pub checksum_failures: u64,
    pub corrupt_entries: u64,
    /// Caches whose breaker is not closed
    pub open_breakers: usize,
    pub per_cache: BTreeMap<String, CacheStats>,
}

impl AggregateStats {
    pub fn from_stats(stats: impl IntoIterator<Item = (String, CacheStats)>) -> Self {
        let mut aggregate = Self::default();
        for (name, cache) in stats {
            aggregate.record(&cache);
            aggregate.per_cache.insert(name, cache);
        }
        aggregate.caches = aggregate.per_cache.len();
        aggregate
    }

    fn record(&mut self, stats: &CacheStats) {
        self.memory_entries += stats.memory_entries;
        self.total_size += stats.total_size;
        self.total_hits += stats.total_hits;
        self.total_misses += stats.total_misses;
        self.total_writes += stats.total_writes;
        self.total_deletes += stats.total_deletes;
        self.expired_entries += stats.expired_entries;
        self.checksum_failures += stats.checksum_failures;
        self.corrupt_entries += stats.corrupt_entries;
        if stats
            .circuit_breaker
            .as_ref()
            .is_some_and(|breaker| breaker.state != "CLOSED")
        {
            self.open_breakers += 1;
        }
    }

    /// Hits over lookups across all caches
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_hits + self.total_misses;
        if total == 0 {
            0.0
        } else {
            self.total_hits as f64 / total as f64
        }
    }
}
