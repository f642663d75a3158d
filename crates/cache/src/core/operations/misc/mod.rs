//! Miscellaneous cache operations

mod stats;

pub use stats::{CacheStats, CircuitBreakerSummary};

use crate::config::CacheConfig;
use crate::entry::{storage_key, validate_key};
use crate::errors::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use super::get::Loaded;
use crate::core::events::{OperationEvent, OperationKind};
use crate::core::internal::MemoryEntry;
use crate::core::types::{Cache, CallContext};

impl Cache {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Digest of a logical input for [`Cache::get_with`] and
    /// [`crate::core::SetOptions::input_hash`]
    pub fn hash_input<T: Serialize + ?Sized>(input: &T) -> Result<String> {
        crate::entry::hash_input(input)
    }

    /// Subscribe to operation events
    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.inner.events.subscribe()
    }

    /// Whether a live entry exists. Does not count as a hit or miss.
    pub async fn has(&self, key: &str) -> Result<bool> {
        if !self.inner.config.enabled {
            return Ok(false);
        }

        let started = Instant::now();
        let result = self.contains(key).await;
        self.inner
            .emit(OperationKind::Has, Some(key), started, result.as_ref().err());
        result
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;

        let inner = &self.inner;
        let skey = storage_key(key);
        let now = inner.clock.now_ms();
        let ttl = inner.default_ttl_ms();

        if let Some(hot) = inner.memory.get(&skey) {
            return Ok(self.contains_hot(skey, hot, now, ttl));
        }

        let _lock = inner.key_locks.lock(&skey).await;
        if let Some(hot) = inner.memory.get(&skey) {
            return Ok(self.contains_hot(skey, hot, now, ttl));
        }

        match inner.load_entry(&skey, &CallContext::default()).await {
            Ok(Loaded::Found { entry, payload }) => {
                if entry.is_expired(now, ttl) {
                    inner.counters.record_expired(1);
                    self.remove_in_background(skey, None);
                    return Ok(false);
                }
                let hot = Arc::new(MemoryEntry::from_entry(&entry, payload));
                inner.memory.touch(&hot, now);
                inner.memory.insert(skey, hot);
                Ok(true)
            }
            Ok(Loaded::Corrupt(_)) => {
                self.remove_in_background(skey, None);
                Ok(false)
            }
            Ok(Loaded::Missing) => Ok(false),
            Err(e @ (Error::Storage { .. } | Error::Io { .. })) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, reporting absent");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn contains_hot(&self, skey: String, hot: Arc<MemoryEntry>, now: u64, ttl: u64) -> bool {
        let inner = &self.inner;
        if hot.is_expired(now, ttl) {
            inner.memory.remove_exact(&skey, &hot);
            inner.counters.record_expired(1);
            self.remove_in_background(skey, None);
            return false;
        }
        inner.memory.touch(&hot, now);
        true
    }

    /// Remove every entry from memory and the backing store; returns how
    /// many stored entries were removed
    pub async fn clear(&self) -> Result<usize> {
        if !self.inner.config.enabled {
            return Ok(0);
        }

        let started = Instant::now();
        let inner = &self.inner;
        let in_memory = inner.memory.clear();
        let backend = &inner.backend;
        let result = inner
            .guarded(&CallContext::default(), || backend.clear())
            .await;

        match &result {
            Ok(removed) => tracing::info!(
                cache = %inner.name,
                removed,
                in_memory,
                "Cleared cache"
            ),
            Err(e) => tracing::warn!(cache = %inner.name, error = %e, "Failed to clear backing store"),
        }
        inner.emit(OperationKind::Clear, None, started, result.as_ref().err());
        result
    }
}
