//! Operation events for external observability

use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Get,
    Set,
    Delete,
    Has,
    Clear,
    Cleanup,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Has => "has",
            Self::Clear => "clear",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published after every cache operation.
///
/// Delivery is best effort: slow subscribers lag and lose events, and the
/// publishing operation never waits for them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationEvent {
    pub operation: OperationKind,
    /// Caller key; `None` for whole-cache operations
    pub key: Option<String>,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<String>,
}
