//! Background workers for cleanup, validation and compression
//!
//! Tasks go through a bounded queue to a fixed number of executors. Keys can
//! be submitted individually and are grouped into batches that are flushed
//! when full or on a timer. A failing task produces a failed [`TaskResult`]
//! and never takes down the pool.

mod pool;
mod task;

pub use pool::{WorkerPool, WorkerPoolStats};
pub use task::{BackgroundTask, TaskHandler, TaskKind, TaskResult, WorkerPoolConfig};
