//! Core error types for the cache engine

use crate::checksum::DigestKind;
use std::path::PathBuf;
use std::time::Duration;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Re-export CacheError as Error for convenience
pub use CacheError as Error;

/// Error type for cache operations
#[derive(Debug)]
pub enum CacheError {
    /// The circuit breaker guarding the backing store is open
    CircuitOpen {
        breaker: String,
        retry_after: Duration,
        recovery_hint: RecoveryHint,
    },

    /// Stored bytes no longer match their recorded checksum
    ChecksumMismatch {
        key: String,
        digest: DigestKind,
        recovery_hint: RecoveryHint,
    },

    /// Encoding or decoding a value or entry failed
    Serialization {
        key: String,
        operation: SerializationOp,
        source: Box<dyn std::error::Error + Send + Sync>,
        recovery_hint: RecoveryHint,
    },

    /// The backing store reported a failure
    Storage {
        operation: &'static str,
        key: String,
        source: Box<dyn std::error::Error + Send + Sync>,
        recovery_hint: RecoveryHint,
    },

    /// An eviction strategy failed while handling memory pressure
    EvictionStrategy {
        strategy: String,
        message: String,
        recovery_hint: RecoveryHint,
    },

    /// Compression or decompression failed
    Compression {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
        recovery_hint: RecoveryHint,
    },

    /// Invalid cache key
    InvalidKey {
        key: String,
        reason: String,
        recovery_hint: RecoveryHint,
    },

    /// A value does not fit in the configured capacity
    CapacityExceeded {
        requested_bytes: u64,
        available_bytes: u64,
        recovery_hint: RecoveryHint,
    },

    /// The caller deadline expired before the operation finished
    Timeout {
        operation: &'static str,
        duration: Duration,
        recovery_hint: RecoveryHint,
    },

    /// The caller cancelled the operation
    Cancelled {
        operation: &'static str,
        recovery_hint: RecoveryHint,
    },

    /// Configuration error
    Configuration {
        message: String,
        recovery_hint: RecoveryHint,
    },

    /// I/O errors outside the storage path, such as reading configuration
    Io {
        path: PathBuf,
        operation: &'static str,
        source: std::io::Error,
        recovery_hint: RecoveryHint,
    },

    /// Reading process or system memory failed
    MemorySampling {
        message: String,
        recovery_hint: RecoveryHint,
    },

    /// The background worker pool rejected or lost a task
    WorkerPool {
        message: String,
        recovery_hint: RecoveryHint,
    },
}

/// Recovery hints for error handling
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryHint {
    /// Retry the operation after a delay
    Retry { after: Duration },

    /// Retry with exponential backoff
    RetryWithBackoff {
        initial_delay_ms: u64,
        max_retries: u32,
        backoff_multiplier: f64,
    },

    /// Skip the cache and go to the source of truth
    BypassCache,

    /// Drop the entry and recompute it
    ClearAndRetry,

    /// Increase cache capacity
    IncreaseCapacity { suggested_bytes: u64 },

    /// Check file permissions
    CheckPermissions { path: PathBuf },

    /// Update cache configuration
    UpdateConfiguration,

    /// Operation can be safely ignored
    Ignore,

    /// No automated recovery possible
    Manual { instructions: String },
}

/// Serialization operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationOp {
    Encode,
    Decode,
}

impl SerializationOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Encode => "encode",
            Self::Decode => "decode",
        }
    }
}

impl CacheError {
    /// Storage failure with the default retry hint
    pub fn storage(
        operation: &'static str,
        key: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Storage {
            operation,
            key: key.into(),
            source: source.into(),
            recovery_hint: RecoveryHint::Retry {
                after: Duration::from_millis(100),
            },
        }
    }

    pub fn serialization(
        key: impl Into<String>,
        operation: SerializationOp,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Serialization {
            key: key.into(),
            operation,
            source: source.into(),
            recovery_hint: RecoveryHint::ClearAndRetry,
        }
    }

    pub fn compression(
        operation: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Compression {
            operation,
            source: source.into(),
            recovery_hint: RecoveryHint::ClearAndRetry,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            recovery_hint: RecoveryHint::UpdateConfiguration,
        }
    }

    pub fn worker_pool(message: impl Into<String>) -> Self {
        Self::WorkerPool {
            message: message.into(),
            recovery_hint: RecoveryHint::Retry {
                after: Duration::from_millis(50),
            },
        }
    }
}
