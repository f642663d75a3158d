//! Display implementation for cache errors

use super::types::CacheError;
use std::fmt;

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen {
                breaker,
                retry_after,
                ..
            } => write!(
                f,
                "Cache unavailable: circuit '{breaker}' is open, retry after {retry_after:?}"
            ),
            Self::ChecksumMismatch { key, digest, .. } => {
                write!(f, "Checksum mismatch for key '{key}' ({digest} digest)")
            }
            Self::Serialization {
                key,
                operation,
                source,
                ..
            } => write!(
                f,
                "Serialization error for key '{key}' during {}: {source}",
                operation.as_str()
            ),
            Self::Storage {
                operation,
                key,
                source,
                ..
            } => write!(f, "Storage error during {operation} of '{key}': {source}"),
            Self::EvictionStrategy {
                strategy, message, ..
            } => write!(f, "Eviction strategy '{strategy}' failed: {message}"),
            Self::Compression {
                operation, source, ..
            } => write!(f, "Compression error during {operation}: {source}"),
            Self::InvalidKey { key, reason, .. } => {
                write!(f, "Invalid cache key '{key}': {reason}")
            }
            Self::CapacityExceeded {
                requested_bytes,
                available_bytes,
                ..
            } => write!(
                f,
                "Cache capacity exceeded: requested {requested_bytes} bytes, available {available_bytes} bytes"
            ),
            Self::Timeout {
                operation,
                duration,
                ..
            } => write!(f, "Timeout during {operation} after {duration:?}"),
            Self::Cancelled { operation, .. } => write!(f, "Operation {operation} was cancelled"),
            Self::Configuration { message, .. } => {
                write!(f, "Cache configuration error: {message}")
            }
            Self::Io {
                path,
                operation,
                source,
                ..
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
            Self::MemorySampling { message, .. } => {
                write!(f, "Memory sampling failed: {message}")
            }
            Self::WorkerPool { message, .. } => write!(f, "Worker pool error: {message}"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialization { source, .. }
            | Self::Storage { source, .. }
            | Self::Compression { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
