//! Error conversion utilities

use super::types::{CacheError, RecoveryHint, SerializationOp};
use std::path::PathBuf;
use warden_utils::CircuitError;

impl From<std::io::Error> for CacheError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let recovery_hint = match error.kind() {
            ErrorKind::PermissionDenied => RecoveryHint::CheckPermissions {
                path: PathBuf::from("."),
            },
            ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
                RecoveryHint::RetryWithBackoff {
                    initial_delay_ms: 100,
                    max_retries: 3,
                    backoff_multiplier: 2.0,
                }
            }
            _ => RecoveryHint::Manual {
                instructions: "Inspect the underlying I/O error".to_string(),
            },
        };

        Self::Io {
            path: PathBuf::from("."),
            operation: "unknown",
            source: error,
            recovery_hint,
        }
    }
}

/// Configuration files are JSON
impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::Configuration {
            message: error.to_string(),
            recovery_hint: RecoveryHint::UpdateConfiguration,
        }
    }
}

impl From<bincode::Error> for CacheError {
    fn from(error: bincode::Error) -> Self {
        Self::serialization(String::new(), SerializationOp::Decode, error)
    }
}

/// Map circuit breaker outcomes onto cache errors
impl From<CircuitError<CacheError>> for CacheError {
    fn from(error: CircuitError<CacheError>) -> Self {
        match error {
            CircuitError::Open { retry_after } => Self::CircuitOpen {
                breaker: "cache".to_string(),
                retry_after,
                recovery_hint: RecoveryHint::BypassCache,
            },
            CircuitError::Timeout { after } => Self::Timeout {
                operation: "storage",
                duration: after,
                recovery_hint: RecoveryHint::Retry { after },
            },
            CircuitError::Cancelled => Self::Cancelled {
                operation: "storage",
                recovery_hint: RecoveryHint::Ignore,
            },
            CircuitError::Panicked { message } => Self::storage("guarded", String::new(), message),
            CircuitError::Inner(inner) => inner,
        }
    }
}
