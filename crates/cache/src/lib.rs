//! Resilient cache engine for warden
//!
//! This crate provides a self-protecting cache with features like:
//! - Checksummed, optionally compressed entries with per-entry TTL
//! - A circuit breaker around every storage call
//! - Memory pressure detection with pluggable eviction strategies
//! - Key-hash partitioned storage and background maintenance workers
//! - Batch operations and operation events

pub mod checksum;
pub mod clock;
pub mod config;
pub mod core;
pub mod entry;
pub mod errors;
pub mod eviction;
pub mod manager;
pub mod monitoring;
pub mod storage;
pub mod workers;

pub use checksum::{ChecksumCodec, ChecksumResult};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{CacheConfig, CacheConfigLoader};
pub use core::{
    BatchResult, Cache, CacheBuilder, CacheStats, CallContext, OperationEvent, OperationKind,
    SetOptions,
};
pub use entry::CacheEntry;
pub use errors::{CacheError, Error, RecoveryHint, Result};
pub use manager::{AggregateStats, CacheManager};
pub use monitoring::{MemoryPressureDetector, PressureEvent, PressureLevel};
pub use storage::{FileSystemBackend, MemoryBackend, PartitionedStorage, StorageBackend};

pub use warden_utils::{CancellationToken, CircuitState};
