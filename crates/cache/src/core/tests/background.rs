//! Timers, worker pool tasks, memory pressure and shutdown

use super::{build, test_config, wait_for_task, worker_config};
use crate::clock::ManualClock;
use crate::config::{CacheConfig, CompressionSetting};
use crate::core::{Cache, OperationKind};
use crate::entry::{storage_key, CacheEntry};
use crate::errors::Error;
use crate::monitoring::{ManualMemorySampler, PressureLevel};
use crate::storage::{MemoryBackend, StorageBackend};
use crate::workers::TaskKind;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_critical_pressure_evicts_memory_tier() {
    let clock = ManualClock::new(0);
    let sampler = Arc::new(ManualMemorySampler::new(0, 1_000_000));
    let cache = Cache::builder("pressure")
        .config(CacheConfig {
            enable_memory_pressure_detection: true,
            memory_monitoring_interval: Duration::from_secs(60),
            max_memory: Some(1_000_000),
            ..test_config()
        })
        .clock(clock.clone())
        .memory_sampler(sampler.clone())
        .build()
        .await
        .unwrap();

    for i in 0..8u32 {
        cache.set(&format!("k{i}"), &i, None).await.unwrap();
    }

    let detector = cache.memory_pressure_detector().unwrap();
    assert!(detector.is_monitoring());
    assert_eq!(
        detector.strategy_names(),
        vec!["expired-entries".to_string(), "lfu".to_string(), "lru".to_string()]
    );

    let stats = detector.check_memory().await.unwrap();
    assert_eq!(stats.tracked_bytes, cache.stats().total_size);

    let result = detector.trigger_eviction(PressureLevel::Critical).await;
    assert_eq!(result.strategies_executed, 3);
    assert!(result.failed_strategies.is_empty());
    assert_eq!(result.total_items_evicted, 6);
    assert_eq!(cache.stats().memory_entries, 2);

    // Eviction only releases memory; the store still answers
    for i in 0..8u32 {
        assert_eq!(cache.get::<u32>(&format!("k{i}")).await.unwrap(), Some(i));
    }
}

#[tokio::test]
async fn test_enabling_pressure_detection_twice_returns_same_detector() {
    let clock = ManualClock::new(0);
    let cache = Cache::builder("pressure")
        .config(test_config())
        .clock(clock.clone())
        .memory_sampler(Arc::new(ManualMemorySampler::new(0, 1_000)))
        .build()
        .await
        .unwrap();
    assert!(cache.memory_pressure_detector().is_none());

    let first = cache.enable_memory_pressure_detection().unwrap();
    let second = cache.enable_memory_pressure_detection().unwrap();
    assert_eq!(first.strategy_names(), second.strategy_names());
    assert_eq!(first.strategy_names().len(), 3);
    assert!(second.is_monitoring());

    cache.shutdown().await;
    assert!(!first.is_monitoring());
}

#[tokio::test]
async fn test_validation_task_removes_corrupt_entries() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let cache = build(worker_config(), &clock, backend.clone()).await;

    for key in ["a", "b", "c"] {
        cache.set(key, key, None).await.unwrap();
    }
    assert!(backend.corrupt(&storage_key("b"), |bytes| bytes.truncate(4)));

    let pool = cache.worker_pool().unwrap();
    let mut results = pool.subscribe_results();
    let task_id = cache.submit_background(TaskKind::Validation, Vec::new()).unwrap();

    let result = wait_for_task(&mut results, task_id).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.kind, TaskKind::Validation);
    assert_eq!(result.items_processed, 3);
    assert_eq!(backend.len(), 2);
    assert!(backend.get(&storage_key("b")).await.unwrap().is_none());
    assert_eq!(cache.stats().corrupt_entries, 1);
}

#[tokio::test]
async fn test_compression_task_rewrites_uncompressed_entries() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let payload = "row,".repeat(2_000);

    let writer = build(
        CacheConfig {
            compression: CompressionSetting::Enabled(false),
            ..test_config()
        },
        &clock,
        backend.clone(),
    )
    .await;
    writer.set("report", &payload, None).await.unwrap();
    writer.set("note", "short", None).await.unwrap();

    let cache = build(worker_config(), &clock, backend.clone()).await;
    let mut results = cache.worker_pool().unwrap().subscribe_results();
    let task_id = cache
        .submit_background(TaskKind::Compression, vec!["report".to_string(), "note".to_string()])
        .unwrap();

    let result = wait_for_task(&mut results, task_id).await;
    assert!(result.success);
    assert_eq!(result.items_processed, 1);

    let raw = backend.get(&storage_key("report")).await.unwrap().unwrap();
    let entry = CacheEntry::decode("report", &raw).unwrap();
    assert!(entry.compressed);
    assert!(entry.size < entry.original_size);
    assert_eq!(cache.get::<String>("report").await.unwrap(), Some(payload));
}

#[tokio::test]
async fn test_background_tasks_require_workers() {
    let clock = ManualClock::new(0);
    let cache = build(test_config(), &clock, Arc::new(MemoryBackend::new())).await;

    assert!(cache.worker_pool().is_none());
    assert!(matches!(
        cache.submit_background(TaskKind::Cleanup, Vec::new()),
        Err(Error::WorkerPool { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_timer_sweeps_expired_entries() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let config = CacheConfig {
        ttl: Duration::from_millis(100),
        cleanup_interval: Duration::from_secs(1),
        ..CacheConfig::default()
    };
    let cache = build(config, &clock, backend.clone()).await;
    let mut events = cache.subscribe();

    cache.set("a", "a", None).await.unwrap();
    cache.set("b", "b", None).await.unwrap();
    clock.set(1_000);

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert!(backend.is_empty());
    assert_eq!(cache.stats().expired_entries, 2);

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.operation);
    }
    assert!(kinds.contains(&OperationKind::Cleanup));
}

#[tokio::test]
async fn test_cleanup_timer_delegates_to_worker_pool() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let config = CacheConfig {
        ttl: Duration::from_millis(100),
        cleanup_interval: Duration::from_millis(20),
        ..worker_config()
    };
    let cache = build(config, &clock, backend.clone()).await;
    let mut results = cache.worker_pool().unwrap().subscribe_results();

    cache.set("a", "a", None).await.unwrap();
    clock.set(1_000);

    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let result = results.recv().await.unwrap();
            if result.kind == TaskKind::Cleanup && result.items_processed > 0 {
                return result;
            }
        }
    })
    .await
    .unwrap();

    assert!(result.success);
    assert_eq!(result.items_processed, 1);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_keeps_cache_usable() {
    let clock = ManualClock::new(0);
    let config = CacheConfig {
        cleanup_interval: Duration::from_secs(60),
        ..worker_config()
    };
    let cache = build(config, &clock, Arc::new(MemoryBackend::new())).await;
    let pool = cache.worker_pool().unwrap();
    assert!(pool.is_running());

    cache.shutdown().await;
    cache.shutdown().await;

    assert!(cache.is_shut_down());
    assert!(!pool.is_running());
    assert!(cache.submit_background(TaskKind::Cleanup, Vec::new()).is_err());

    cache.set("k", "v", None).await.unwrap();
    assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("v"));
}
