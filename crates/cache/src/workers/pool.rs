//! Bounded worker pool

use super::task::{BackgroundTask, TaskHandler, TaskKind, TaskResult, WorkerPoolConfig};
use crate::errors::{Error, Result};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

/// Pool counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
    pub queued: u64,
    pub in_flight: u64,
    pub pending_keys: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    in_flight: AtomicU64,
}

struct PoolInner {
    config: WorkerPoolConfig,
    sender: Mutex<Option<mpsc::Sender<BackgroundTask>>>,
    next_id: AtomicU64,
    counters: Arc<Counters>,
    results: broadcast::Sender<TaskResult>,
    pending: Mutex<HashMap<TaskKind, Vec<String>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        if let Some(handle) = self.flusher.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.dispatcher.get_mut().take() {
            handle.abort();
        }
    }
}

/// Fixed-size pool executing [`BackgroundTask`]s from a bounded queue
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl WorkerPool {
    /// Start the pool. Must be called inside a Tokio runtime.
    pub fn start(config: WorkerPoolConfig, handler: Arc<dyn TaskHandler>) -> Result<Self> {
        if config.max_workers == 0 || config.queue_size == 0 || config.batch_size == 0 {
            return Err(Error::configuration(
                "worker pool needs at least one worker, queue slot and batch item",
            ));
        }

        let (sender, receiver) = mpsc::channel(config.queue_size);
        let (results, _) = broadcast::channel(config.queue_size.max(16));
        let counters = Arc::new(Counters::default());

        let dispatcher = tokio::spawn(dispatch_loop(
            receiver,
            handler,
            Arc::new(Semaphore::new(config.max_workers)),
            Arc::clone(&counters),
            results.clone(),
        ));

        let inner = Arc::new(PoolInner {
            config,
            sender: Mutex::new(Some(sender)),
            next_id: AtomicU64::new(1),
            counters,
            results,
            pending: Mutex::new(HashMap::new()),
            dispatcher: Mutex::new(Some(dispatcher)),
            flusher: Mutex::new(None),
        });

        if !inner.config.flush_interval.is_zero() {
            let flusher = tokio::spawn(flush_loop(
                Arc::downgrade(&inner),
                inner.config.flush_interval,
            ));
            *inner.flusher.lock() = Some(flusher);
        }

        Ok(Self { inner })
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.inner.config
    }

    /// Queue a task, returning its id. Fails when the queue is full or the
    /// pool has been shut down.
    pub fn submit(&self, kind: TaskKind, keys: Vec<String>) -> Result<u64> {
        self.inner.submit(kind, keys)
    }

    /// Add keys to the pending batch of `kind`, submitting every full batch.
    /// Returns the ids of submitted tasks.
    pub fn submit_keys(&self, kind: TaskKind, keys: impl IntoIterator<Item = String>) -> Result<Vec<u64>> {
        let batches = {
            let mut pending = self.inner.pending.lock();
            let buffer = pending.entry(kind).or_default();
            buffer.extend(keys);

            let batch_size = self.inner.config.batch_size;
            let mut batches = Vec::new();
            while buffer.len() >= batch_size {
                batches.push(buffer.drain(..batch_size).collect::<Vec<_>>());
            }
            batches
        };

        batches
            .into_iter()
            .map(|batch| self.inner.submit(kind, batch))
            .collect()
    }

    /// Submit every partial batch now
    pub fn flush(&self) -> Result<Vec<u64>> {
        self.inner.flush()
    }

    pub fn subscribe_results(&self) -> broadcast::Receiver<TaskResult> {
        self.inner.results.subscribe()
    }

    pub fn stats(&self) -> WorkerPoolStats {
        let counters = &self.inner.counters;
        let queued = self
            .inner
            .sender
            .lock()
            .as_ref()
            .map(|s| (s.max_capacity() - s.capacity()) as u64)
            .unwrap_or(0);
        let pending_keys = self
            .inner
            .pending
            .lock()
            .values()
            .map(|keys| keys.len() as u64)
            .sum();

        WorkerPoolStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            queued,
            in_flight: counters.in_flight.load(Ordering::Relaxed),
            pending_keys,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.sender.lock().is_some()
    }

    /// Stop accepting work, flush partial batches and wait up to `grace` for
    /// queued and in-flight tasks. Work still running after the grace period
    /// is aborted. Returns whether everything drained. Idempotent.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        if let Err(e) = self.inner.flush() {
            tracing::debug!(error = %e, "Could not flush pending batches during shutdown");
        }
        if let Some(flusher) = self.inner.flusher.lock().take() {
            flusher.abort();
        }

        // Closing the channel lets the dispatcher drain and exit
        self.inner.sender.lock().take();

        let Some(mut dispatcher) = self.inner.dispatcher.lock().take() else {
            return true;
        };

        match tokio::time::timeout(grace, &mut dispatcher).await {
            Ok(_) => {
                tracing::debug!("Worker pool drained");
                true
            }
            Err(_) => {
                dispatcher.abort();
                tracing::warn!(grace_ms = grace.as_millis() as u64, "Worker pool did not drain within grace period");
                false
            }
        }
    }
}

impl PoolInner {
    fn submit(&self, kind: TaskKind, keys: Vec<String>) -> Result<u64> {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Error::worker_pool("worker pool is shut down"));
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match sender.try_send(BackgroundTask { id, kind, keys }) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(Error::worker_pool(format!(
                    "queue is full ({} tasks)",
                    self.config.queue_size
                )))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(Error::worker_pool("worker pool is shut down"))
            }
        }
    }

    fn flush(&self) -> Result<Vec<u64>> {
        let batches: Vec<(TaskKind, Vec<String>)> = self
            .pending
            .lock()
            .iter_mut()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(kind, keys)| (*kind, std::mem::take(keys)))
            .collect();

        batches
            .into_iter()
            .map(|(kind, keys)| self.submit(kind, keys))
            .collect()
    }
}

async fn dispatch_loop(
    mut receiver: mpsc::Receiver<BackgroundTask>,
    handler: Arc<dyn TaskHandler>,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
    results: broadcast::Sender<TaskResult>,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "Worker task aborted");
                }
            }
            task = receiver.recv() => {
                let Some(task) = task else { break };
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let handler = Arc::clone(&handler);
                let counters = Arc::clone(&counters);
                let results = results.clone();
                in_flight.spawn(async move {
                    let _permit = permit;
                    execute(task, handler, counters, results).await;
                });
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "Worker task aborted");
        }
    }
}

async fn execute(
    task: BackgroundTask,
    handler: Arc<dyn TaskHandler>,
    counters: Arc<Counters>,
    results: broadcast::Sender<TaskResult>,
) {
    counters.in_flight.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();

    let outcome = AssertUnwindSafe(handler.handle(&task)).catch_unwind().await;
    let (success, error, items_processed) = match outcome {
        Ok(Ok(items)) => (true, None, items),
        Ok(Err(e)) => (false, Some(e.to_string()), 0),
        Err(_) => (false, Some("task panicked".to_string()), 0),
    };

    counters.in_flight.fetch_sub(1, Ordering::Relaxed);
    if success {
        counters.completed.fetch_add(1, Ordering::Relaxed);
    } else {
        counters.failed.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            task_id = task.id,
            kind = %task.kind,
            error = error.as_deref().unwrap_or_default(),
            "Background task failed"
        );
    }

    let result = TaskResult {
        task_id: task.id,
        kind: task.kind,
        success,
        error,
        items_processed,
        execution_time: started.elapsed(),
    };
    if results.send(result).is_err() {
        tracing::trace!(task_id = task.id, "No task result subscribers");
    }
}

async fn flush_loop(inner: Weak<PoolInner>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if let Err(e) = inner.flush() {
            tracing::debug!(error = %e, "Periodic batch flush failed");
        }
    }
}
