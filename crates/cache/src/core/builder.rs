//! Cache builder and initialization

use crate::checksum::ChecksumCodec;
use crate::clock::{system_clock, SharedClock};
use crate::config::CacheConfig;
use crate::errors::Result;
use crate::monitoring::MemorySampler;
use crate::storage::{Compressor, FileSystemBackend, MemoryBackend, PartitionedStorage, SharedBackend};
use crate::workers::WorkerPool;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::broadcast;
use warden_utils::CircuitBreaker;

use super::cleanup::start_cleanup_task;
use super::internal::{Counters, KeyLocks, MemoryTier};
use super::tasks::CacheTaskHandler;
use super::types::{Cache, CacheInner};

/// Assembles a [`Cache`] from configuration and collaborators
pub struct CacheBuilder {
    name: String,
    config: CacheConfig,
    backend: Option<SharedBackend>,
    clock: Option<SharedClock>,
    sampler: Option<Arc<dyn MemorySampler>>,
}

impl CacheBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: CacheConfig::default(),
            backend: None,
            clock: None,
            sampler: None,
        }
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Backing store; defaults to an in-process [`MemoryBackend`]
    pub fn backend(mut self, backend: SharedBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Memory source for pressure detection; defaults to the system sampler
    pub fn memory_sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Validate the configuration and start the cache with its timers.
    /// Must be called inside a Tokio runtime.
    pub async fn build(self) -> Result<Cache> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(system_clock);
        let base = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()));

        let (backend, partitions) = if config.enable_partitioning {
            let partitioned = Arc::new(PartitionedStorage::new(base, config.partition_count)?);
            partitioned.rescan().await?;
            let backend: SharedBackend = partitioned.clone();
            (backend, Some(partitioned))
        } else {
            (base, None)
        };

        let breaker = config
            .circuit_breaker_config()
            .map(|breaker| CircuitBreaker::with_name(format!("cache:{}", self.name), breaker));

        let codec = config.enable_checksum.then(|| {
            let mut codec = ChecksumCodec::new()
                .with_secondary(config.enable_secondary_checksum)
                .with_clock(Arc::clone(&clock));
            if let Some(secret) = &config.checksum_secret {
                codec = codec.with_secret(secret);
            }
            codec
        });

        let compressor = config.compression_config().map(Compressor::new);
        let (events, _) = broadcast::channel(config.event_capacity);

        let inner = Arc::new(CacheInner {
            name: self.name,
            memory: MemoryTier::new(config.max_memory_entries, config.max_size),
            key_locks: KeyLocks::new(),
            config,
            clock,
            backend,
            partitions,
            breaker,
            codec,
            compressor,
            counters: Counters::default(),
            events,
            sampler: self.sampler,
            detector: RwLock::new(None),
            workers: RwLock::new(None),
            cleanup_handle: RwLock::new(None),
            shut_down: AtomicBool::new(false),
        });

        let cache = Cache { inner };

        if cache.inner.config.enabled {
            if cache.inner.config.enable_background_workers {
                let handler = Arc::new(CacheTaskHandler {
                    inner: Arc::downgrade(&cache.inner),
                });
                let pool = WorkerPool::start(cache.inner.config.worker_pool_config(), handler)?;
                *cache.inner.workers.write() = Some(pool);
            }

            if cache.inner.config.enable_memory_pressure_detection {
                cache.enable_memory_pressure_detection()?;
            }

            start_cleanup_task(&cache);
        }

        tracing::debug!(
            cache = %cache.inner.name,
            backend = cache.inner.backend.name(),
            "Cache initialized"
        );
        Ok(cache)
    }
}

impl Cache {
    pub fn builder(name: impl Into<String>) -> CacheBuilder {
        CacheBuilder::new(name)
    }

    /// In-memory cache with the given configuration
    pub async fn new(config: CacheConfig) -> Result<Self> {
        CacheBuilder::new("default").config(config).build().await
    }

    /// Cache persisted under `dir`
    pub async fn open(dir: impl Into<PathBuf>, config: CacheConfig) -> Result<Self> {
        let backend = FileSystemBackend::new(dir).await?;
        CacheBuilder::new("default")
            .config(config)
            .backend(Arc::new(backend))
            .build()
            .await
    }
}
