//! Background task handling for the worker pool

use crate::entry::{storage_key, CacheEntry};
use crate::errors::{Error, Result};
use crate::workers::{BackgroundTask, TaskHandler, TaskKind, WorkerPool};
use async_trait::async_trait;
use std::sync::Weak;

use super::operations::get::Loaded;
use super::types::{Cache, CacheInner, CallContext};

/// Runs pool tasks against a cache it does not keep alive
pub(crate) struct CacheTaskHandler {
    pub inner: Weak<CacheInner>,
}

#[async_trait]
impl TaskHandler for CacheTaskHandler {
    async fn handle(&self, task: &BackgroundTask) -> Result<u64> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(|| Error::worker_pool("cache has been dropped"))?;

        // Task keys are caller keys; an empty list means every entry
        let keys = if task.keys.is_empty() {
            None
        } else {
            Some(task.keys.iter().map(|key| storage_key(key)).collect())
        };
        let ctx = CallContext::default();

        match task.kind {
            TaskKind::Cleanup => inner
                .sweep(keys, &ctx)
                .await
                .map(|outcome| outcome.items_evicted),
            TaskKind::Validation => inner.validate_entries(keys, &ctx).await,
            TaskKind::Compression => inner.compress_entries(keys, &ctx).await,
        }
    }
}

impl CacheInner {
    async fn resolve_keys(&self, keys: Option<Vec<String>>, ctx: &CallContext) -> Result<Vec<String>> {
        match keys {
            Some(keys) => Ok(keys),
            None => {
                let backend = &self.backend;
                self.guarded(ctx, || backend.list()).await
            }
        }
    }

    /// Re-verify stored entries, deleting those that fail. Returns the
    /// number of entries checked.
    pub(crate) async fn validate_entries(
        &self,
        keys: Option<Vec<String>>,
        ctx: &CallContext,
    ) -> Result<u64> {
        let mut checked = 0;
        let mut removed = 0;

        for key in self.resolve_keys(keys, ctx).await? {
            let _lock = self.key_locks.lock(&key).await;
            let Some(raw) = self.read_raw(&key, ctx).await? else {
                continue;
            };
            checked += 1;

            let Loaded::Corrupt(defect) = self.inspect(&key, &raw, ctx).await? else {
                continue;
            };
            let backend = &self.backend;
            if self.guarded(ctx, || backend.remove_if(&key, &raw)).await? {
                self.record_defect(&key, &defect);
                self.memory.remove(&key);
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::warn!(cache = %self.name, checked, removed, "Validation removed corrupt entries");
        } else {
            tracing::debug!(cache = %self.name, checked, "Validation found no corrupt entries");
        }
        Ok(checked)
    }

    /// Compress stored entries that were written uncompressed. Returns the
    /// number of entries rewritten.
    ///
    /// A rewrite only replaces the exact bytes that were read, so a write
    /// that lands meanwhile is never overwritten.
    pub(crate) async fn compress_entries(
        &self,
        keys: Option<Vec<String>>,
        ctx: &CallContext,
    ) -> Result<u64> {
        if self.compressor.is_none() {
            return Ok(0);
        }

        let mut rewritten = 0;
        for key in self.resolve_keys(keys, ctx).await? {
            let _lock = self.key_locks.lock(&key).await;
            let Some(raw) = self.read_raw(&key, ctx).await? else {
                continue;
            };
            let Ok(mut entry) = CacheEntry::decode(&key, &raw) else {
                continue;
            };
            if entry.compressed {
                continue;
            }

            let Some((algorithm, compressed)) =
                self.compress_payload(&entry.key, &entry.data, ctx).await?
            else {
                continue;
            };
            entry.size = compressed.len() as u64;
            entry.data = compressed;
            entry.compressed = true;
            entry.compression = Some(algorithm);

            let encoded = entry.encode()?;
            let backend = &self.backend;
            if self
                .guarded(ctx, || backend.replace_if(&key, &raw, encoded))
                .await?
            {
                rewritten += 1;
            } else {
                tracing::debug!(key = %key, "Entry changed while compressing, skipped rewrite");
            }
        }

        tracing::debug!(cache = %self.name, rewritten, "Background compression finished");
        Ok(rewritten)
    }
}

impl Cache {
    /// The background worker pool, when enabled
    pub fn worker_pool(&self) -> Option<WorkerPool> {
        self.inner.workers.read().clone()
    }

    /// Queue background work over caller keys; an empty list covers every
    /// entry. Fails when background workers are disabled or the queue is full.
    pub fn submit_background(&self, kind: TaskKind, keys: Vec<String>) -> Result<u64> {
        match self.worker_pool() {
            Some(pool) => pool.submit(kind, keys),
            None => Err(Error::worker_pool("background workers are not enabled")),
        }
    }
}
