//! Recovery utilities for cache errors

use super::types::{CacheError, RecoveryHint};

impl CacheError {
    /// Get the recovery hint for this error
    #[must_use]
    pub const fn recovery_hint(&self) -> &RecoveryHint {
        match self {
            Self::CircuitOpen { recovery_hint, .. }
            | Self::ChecksumMismatch { recovery_hint, .. }
            | Self::Serialization { recovery_hint, .. }
            | Self::Storage { recovery_hint, .. }
            | Self::EvictionStrategy { recovery_hint, .. }
            | Self::Compression { recovery_hint, .. }
            | Self::InvalidKey { recovery_hint, .. }
            | Self::CapacityExceeded { recovery_hint, .. }
            | Self::Timeout { recovery_hint, .. }
            | Self::Cancelled { recovery_hint, .. }
            | Self::Configuration { recovery_hint, .. }
            | Self::Io { recovery_hint, .. }
            | Self::MemorySampling { recovery_hint, .. }
            | Self::WorkerPool { recovery_hint, .. } => recovery_hint,
        }
    }

    /// Check if this error is transient and can be retried
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.recovery_hint(),
            RecoveryHint::Retry { .. } | RecoveryHint::RetryWithBackoff { .. }
        )
    }

    /// True when the cache refused to serve the request because its circuit
    /// is open. Distinct from a miss: callers should go to the source of truth.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this error indicates data corruption
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. }
                | Self::Serialization {
                    operation: super::types::SerializationOp::Decode,
                    ..
                }
        )
    }
}
