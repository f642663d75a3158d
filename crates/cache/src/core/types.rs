//! Core cache types and structures

use crate::checksum::ChecksumCodec;
use crate::clock::SharedClock;
use crate::config::CacheConfig;
use crate::errors::Result;
use crate::monitoring::{MemoryPressureDetector, MemorySampler};
use crate::storage::{Compressor, PartitionedStorage, SharedBackend};
use crate::workers::WorkerPool;
use parking_lot::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use warden_utils::{CancellationToken, CircuitBreaker};

use super::events::OperationEvent;
use super::internal::{Counters, KeyLocks, MemoryTier};

/// Resilient cache handle. Clones share the same cache.
#[derive(Clone)]
pub struct Cache {
    pub(crate) inner: Arc<CacheInner>,
}

pub(crate) struct CacheInner {
    pub name: String,
    pub config: CacheConfig,
    pub clock: SharedClock,
    /// Store every entry is persisted to; partitioned when enabled
    pub backend: SharedBackend,
    pub partitions: Option<Arc<PartitionedStorage>>,
    /// Guards every backend call; `None` when the breaker is disabled
    pub breaker: Option<CircuitBreaker>,
    pub codec: Option<ChecksumCodec>,
    pub compressor: Option<Compressor>,
    pub memory: MemoryTier,
    /// Held by every write, delete and maintenance step of a key
    pub key_locks: KeyLocks,
    pub counters: Counters,
    pub events: broadcast::Sender<OperationEvent>,
    pub sampler: Option<Arc<dyn MemorySampler>>,
    pub detector: RwLock<Option<MemoryPressureDetector>>,
    pub workers: RwLock<Option<WorkerPool>>,
    /// Background cleanup task handle
    pub cleanup_handle: RwLock<Option<JoinHandle<()>>>,
    pub shut_down: AtomicBool,
}

impl CacheInner {
    pub fn default_ttl_ms(&self) -> u64 {
        self.config.ttl.as_millis() as u64
    }
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.get_mut().take() {
            handle.abort();
        }
        if let Some(detector) = self.detector.get_mut().take() {
            detector.stop_monitoring();
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("backend", &self.inner.backend.name())
            .field("memory_entries", &self.inner.memory.len())
            .finish()
    }
}

/// Per-call deadline and cancellation.
///
/// Deadline expiry and cancellation abort the storage call and count as a
/// circuit breaker failure. Without a deadline the configured
/// `operation_timeout` applies.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub deadline: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Options of a single write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Overrides the cache-wide TTL
    pub ttl: Option<Duration>,
    /// Digest of the logical input, from [`Cache::hash_input`]
    pub input_hash: Option<String>,
}

impl SetOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            input_hash: None,
        }
    }

    pub fn with_input_hash(mut self, hash: impl Into<String>) -> Self {
        self.input_hash = Some(hash.into());
        self
    }
}

/// Per-item outcome of a batch operation
#[derive(Debug)]
pub struct BatchResult<T> {
    pub key: String,
    pub result: Result<T>,
}

impl<T> BatchResult<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
