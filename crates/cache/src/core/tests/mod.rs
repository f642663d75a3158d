//! Cache façade tests

mod background;
mod basic;

use crate::clock::ManualClock;
use crate::config::CacheConfig;
use crate::core::Cache;
use crate::errors::{Error, Result};
use crate::storage::{MemoryBackend, SharedBackend, StorageBackend};
use crate::workers::TaskResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Defaults without the cleanup timer
pub(super) fn test_config() -> CacheConfig {
    CacheConfig {
        cleanup_interval: Duration::ZERO,
        ..CacheConfig::default()
    }
}

pub(super) fn worker_config() -> CacheConfig {
    CacheConfig {
        enable_background_workers: true,
        max_background_workers: 2,
        ..test_config()
    }
}

pub(super) async fn wait_for_task(
    results: &mut broadcast::Receiver<TaskResult>,
    task_id: u64,
) -> TaskResult {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let result = results.recv().await.unwrap();
            if result.task_id == task_id {
                return result;
            }
        }
    })
    .await
    .unwrap()
}

pub(super) async fn build(
    config: CacheConfig,
    clock: &Arc<ManualClock>,
    backend: SharedBackend,
) -> Cache {
    warden_utils::tracing::init_for_tests();
    Cache::builder("test")
        .config(config)
        .clock(clock.clone())
        .backend(backend)
        .build()
        .await
        .unwrap()
}

/// Memory backend with switchable failures and latency
#[derive(Debug, Default)]
pub(super) struct FlakyBackend {
    pub inner: MemoryBackend,
    pub failing: AtomicBool,
    pub atomic_failing: AtomicBool,
    pub delay_ms: AtomicU64,
    /// Stall after a read has captured its value
    pub read_delay_ms: AtomicU64,
    pub calls: AtomicUsize,
}

impl FlakyBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stall_reads(&self, ms: u64) {
        self.read_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, operation: &'static str, key: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::storage(operation, key, "backend offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.enter("put", key).await?;
        self.inner.put(key, bytes).await
    }

    async fn put_atomic(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        if self.atomic_failing.load(Ordering::SeqCst) {
            return Err(Error::storage("put_atomic", key, "rename failed"));
        }
        self.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.enter("get", key).await?;
        let value = self.inner.get(key).await?;
        let stall = self.read_delay_ms.load(Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(Duration::from_millis(stall)).await;
        }
        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.enter("remove", key).await?;
        self.inner.remove(key).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        self.enter("list", "").await?;
        self.inner.list().await
    }
}
