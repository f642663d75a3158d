//! Expired entry cleanup

mod background;

pub(crate) use background::start_cleanup_task;

use crate::entry::CacheEntry;
use crate::errors::{Error, Result};
use crate::eviction::StrategyOutcome;
use crate::storage::PartitionInfo;
use std::time::Instant;

use super::events::OperationKind;
use super::types::{Cache, CacheInner, CallContext};

impl Cache {
    /// Remove expired entries everywhere; returns how many were removed.
    ///
    /// Undecodable entries are removed too but only logged, not counted.
    pub async fn cleanup(&self) -> Result<usize> {
        if !self.inner.config.enabled {
            return Ok(0);
        }
        self.inner.run_cleanup().await
    }

    /// Clean a single partition. Fails when partitioning is disabled.
    pub async fn cleanup_partition(&self, id: usize) -> Result<usize> {
        let inner = &self.inner;
        let Some(partitions) = &inner.partitions else {
            return Err(Error::configuration("partitioning is not enabled"));
        };

        let started = Instant::now();
        let ctx = CallContext::default();
        let result: Result<usize> = async {
            let keys = inner
                .guarded(&ctx, || partitions.keys_in_partition(id))
                .await?;
            let outcome = inner.sweep(Some(keys), &ctx).await?;
            partitions.mark_cleaned(id, inner.clock.now_ms())?;
            Ok(outcome.items_evicted as usize)
        }
        .await;

        inner.emit(OperationKind::Cleanup, None, started, result.as_ref().err());
        if let Ok(removed) = result {
            tracing::debug!(partition = id, removed, "Partition cleanup finished");
        }
        result
    }

    /// Partition snapshots; empty when partitioning is disabled
    pub fn partitions(&self) -> Vec<PartitionInfo> {
        self.inner
            .partitions
            .as_ref()
            .map(|p| p.partitions())
            .unwrap_or_default()
    }
}

impl CacheInner {
    pub(crate) async fn run_cleanup(&self) -> Result<usize> {
        let started = Instant::now();
        let result = self
            .sweep(None, &CallContext::default())
            .await
            .map(|outcome| outcome.items_evicted as usize);
        self.emit(OperationKind::Cleanup, None, started, result.as_ref().err());
        result
    }

    /// Remove expired entries among `keys` (storage keys), or among every
    /// stored key when `None`
    pub(crate) async fn sweep(
        &self,
        keys: Option<Vec<String>>,
        ctx: &CallContext,
    ) -> Result<StrategyOutcome> {
        let now = self.clock.now_ms();
        let ttl = self.default_ttl_ms();

        // Stored counterparts are counted below
        for (key, entry) in self.memory.expired(now, ttl) {
            self.memory.remove_exact(&key, &entry);
        }

        let keys = match keys {
            Some(keys) => keys,
            None => {
                let backend = &self.backend;
                self.guarded(ctx, || backend.list()).await?
            }
        };

        let mut outcome = StrategyOutcome::default();
        for key in keys {
            match self.sweep_key(&key, now, ttl, ctx).await {
                Ok(Some(freed)) => {
                    outcome.items_evicted += 1;
                    outcome.memory_freed += freed;
                }
                Ok(None) => {}
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => tracing::warn!(key = %key, error = %e, "Cleanup skipped entry"),
            }
        }

        self.counters.record_expired(outcome.items_evicted);
        if outcome.items_evicted > 0 {
            tracing::info!(
                cache = %self.name,
                removed = outcome.items_evicted,
                bytes = outcome.memory_freed,
                "Removed expired cache entries"
            );
        } else {
            tracing::debug!(cache = %self.name, "Cleanup found no expired entries");
        }
        Ok(outcome)
    }

    /// Returns the freed size when the entry was expired and removed.
    ///
    /// The decision and the delete happen under the key lock, and the delete
    /// only applies to the bytes that were inspected.
    async fn sweep_key(
        &self,
        key: &str,
        now: u64,
        ttl: u64,
        ctx: &CallContext,
    ) -> Result<Option<u64>> {
        let _lock = self.key_locks.lock(key).await;
        let Some(raw) = self.read_raw(key, ctx).await? else {
            return Ok(None);
        };

        let backend = &self.backend;
        match CacheEntry::decode(key, &raw) {
            Ok(entry) if entry.is_expired(now, ttl) => {
                if !self.guarded(ctx, || backend.remove_if(key, &raw)).await? {
                    return Ok(None);
                }
                self.memory.remove(key);
                Ok(Some(entry.original_size))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                if self.guarded(ctx, || backend.remove_if(key, &raw)).await? {
                    tracing::warn!(key = %key, error = %e, "Removed undecodable cache entry");
                    self.counters.record_corrupt();
                    self.memory.remove(key);
                }
                Ok(None)
            }
        }
    }
}
