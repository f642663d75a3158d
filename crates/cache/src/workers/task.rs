use crate::errors::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Kinds of background work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Remove expired entries
    Cleanup,
    /// Re-verify checksums and delete corrupt entries
    Validation,
    /// Compress entries stored uncompressed
    Compression,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cleanup => "cleanup",
            Self::Validation => "validation",
            Self::Compression => "compression",
        };
        f.write_str(name)
    }
}

/// A unit of background work. An empty key list means every entry.
#[derive(Debug, Clone)]
pub struct BackgroundTask {
    pub id: u64,
    pub kind: TaskKind,
    pub keys: Vec<String>,
}

/// Outcome of one task
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: u64,
    pub kind: TaskKind,
    pub success: bool,
    pub error: Option<String>,
    pub items_processed: u64,
    pub execution_time: Duration,
}

/// Executes tasks on behalf of the pool
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Returns the number of items processed
    async fn handle(&self, task: &BackgroundTask) -> Result<u64>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    pub max_workers: usize,
    pub queue_size: usize,
    /// Keys per batch for `submit_keys`
    pub batch_size: usize,
    /// Partial batches are flushed at this period
    pub flush_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            queue_size: 1024,
            batch_size: 100,
            flush_interval: Duration::from_secs(1),
        }
    }
}
