//! Cache statistics

use serde::Serialize;
use std::sync::atomic::Ordering;

use crate::core::types::Cache;

/// Breaker figures included in [`CacheStats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerSummary {
    /// `CLOSED`, `OPEN` or `HALF_OPEN`
    pub state: String,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub success_rate: f64,
}

/// Point-in-time statistics of one cache
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub memory_entries: usize,
    /// Uncompressed bytes held in the memory tier
    pub total_size: u64,
    pub hit_rate: f64,
    /// Stored bytes over uncompressed bytes for the memory tier; 1.0 when empty
    pub compression_ratio: f64,
    /// Creation time of the oldest entry in memory, epoch milliseconds
    pub oldest_entry: Option<u64>,
    pub newest_entry: Option<u64>,
    pub total_hits: u64,
    pub total_misses: u64,
    pub total_writes: u64,
    pub total_deletes: u64,
    pub expired_entries: u64,
    pub checksum_failures: u64,
    pub atomic_op_failures: u64,
    pub corrupt_entries: u64,
    pub circuit_breaker: Option<CircuitBreakerSummary>,
}

impl Cache {
    /// Current statistics. Reading them never changes cache state.
    pub fn stats(&self) -> CacheStats {
        let inner = &self.inner;
        let counters = &inner.counters;
        let entries = inner.memory.snapshot();

        let total_size: u64 = entries.iter().map(|e| e.size()).sum();
        let stored_size: u64 = entries.iter().map(|e| e.stored_size).sum();
        let compression_ratio = if total_size == 0 {
            1.0
        } else {
            stored_size as f64 / total_size as f64
        };

        let circuit_breaker = inner.breaker.as_ref().map(|breaker| {
            let stats = breaker.stats();
            CircuitBreakerSummary {
                state: stats.state.as_str().to_string(),
                failure_count: stats.failures,
                success_count: stats.successes,
                total_requests: stats.requests,
                rejected_requests: stats.rejected,
                success_rate: stats.success_rate,
            }
        });

        CacheStats {
            memory_entries: entries.len(),
            total_size,
            hit_rate: counters.hit_rate(),
            compression_ratio,
            oldest_entry: entries.iter().map(|e| e.timestamp).min(),
            newest_entry: entries.iter().map(|e| e.timestamp).max(),
            total_hits: counters.hits.load(Ordering::Relaxed),
            total_misses: counters.misses.load(Ordering::Relaxed),
            total_writes: counters.writes.load(Ordering::Relaxed),
            total_deletes: counters.deletes.load(Ordering::Relaxed),
            expired_entries: counters.expired.load(Ordering::Relaxed),
            checksum_failures: counters.checksum_failures.load(Ordering::Relaxed),
            atomic_op_failures: counters.atomic_op_failures.load(Ordering::Relaxed),
            corrupt_entries: counters.corrupt_entries.load(Ordering::Relaxed),
            circuit_breaker,
        }
    }
}
