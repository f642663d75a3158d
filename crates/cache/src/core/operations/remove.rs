//! Cache remove operations

use crate::entry::{storage_key, validate_key};
use crate::errors::Result;
use std::time::Instant;

use crate::core::events::OperationKind;
use crate::core::types::{Cache, CacheInner, CallContext};

impl Cache {
    /// Remove an entry; returns whether it existed
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.delete_with(key, &CallContext::default()).await
    }

    pub async fn delete_with(&self, key: &str, ctx: &CallContext) -> Result<bool> {
        if !self.inner.config.enabled {
            return Ok(false);
        }

        let started = Instant::now();
        let result = match validate_key(key) {
            Ok(()) => self.inner.remove_entry(&storage_key(key), ctx).await,
            Err(e) => Err(e),
        };
        self.inner
            .emit(OperationKind::Delete, Some(key), started, result.as_ref().err());
        result
    }
}

impl CacheInner {
    /// Remove from the memory tier and the backing store
    pub(crate) async fn remove_entry(&self, storage_key: &str, ctx: &CallContext) -> Result<bool> {
        let _lock = self.key_locks.lock(storage_key).await;
        let in_memory = self.memory.remove(storage_key).is_some();
        let backend = &self.backend;
        let stored = self.guarded(ctx, || backend.remove(storage_key)).await?;

        if in_memory || stored {
            self.counters.record_delete();
        }
        Ok(in_memory || stored)
    }
}
