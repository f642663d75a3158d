//! Basic cache operation tests

use super::{build, test_config};
use crate::clock::ManualClock;
use crate::config::{CacheConfig, CompressionSetting};
use crate::core::{Cache, CallContext, OperationKind, SetOptions};
use crate::entry::{storage_key, CacheEntry};
use crate::errors::Error;
use crate::storage::{CompressionAlgorithm, CompressionConfig, MemoryBackend, StorageBackend};
use std::sync::Arc;
use std::time::Duration;

async fn wait_until_removed(backend: &MemoryBackend, key: &str) {
    for _ in 0..100 {
        if backend.get(key).await.unwrap().is_none() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("entry {key} was not removed");
}

#[tokio::test]
async fn test_basic_operations() {
    let clock = ManualClock::new(0);
    let cache = build(test_config(), &clock, Arc::new(MemoryBackend::new())).await;

    cache.set("key1", "value1", None).await.unwrap();
    let value: Option<String> = cache.get("key1").await.unwrap();
    assert_eq!(value, Some("value1".to_string()));

    assert!(cache.has("key1").await.unwrap());
    assert!(!cache.has("key2").await.unwrap());

    assert!(cache.delete("key1").await.unwrap());
    assert!(!cache.delete("key1").await.unwrap());
    assert!(!cache.has("key1").await.unwrap());
    assert_eq!(cache.get::<String>("key1").await.unwrap(), None);
}

#[tokio::test]
async fn test_entries_expire_after_ttl() {
    let clock = ManualClock::new(0);
    let config = CacheConfig {
        ttl: Duration::from_millis(1000),
        ..test_config()
    };
    let cache = build(config, &clock, Arc::new(MemoryBackend::new())).await;

    cache.set("a", &1u32, None).await.unwrap();

    clock.set(500);
    assert_eq!(cache.get::<u32>("a").await.unwrap(), Some(1));
    clock.set(1000);
    assert_eq!(cache.get::<u32>("a").await.unwrap(), Some(1));
    clock.set(1001);
    assert_eq!(cache.get::<u32>("a").await.unwrap(), None);
    assert_eq!(cache.stats().expired_entries, 1);
}

#[tokio::test]
async fn test_expiry_applies_to_entries_read_from_store() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let config = CacheConfig {
        ttl: Duration::from_millis(1000),
        ..test_config()
    };
    let writer = build(config.clone(), &clock, backend.clone()).await;
    writer
        .set("a", "short", Some(Duration::from_millis(100)))
        .await
        .unwrap();
    writer.set("b", "default", None).await.unwrap();

    clock.set(500);
    let reader = build(config, &clock, backend.clone()).await;
    assert_eq!(reader.get::<String>("a").await.unwrap(), None);
    assert_eq!(
        reader.get::<String>("b").await.unwrap().as_deref(),
        Some("default")
    );
    wait_until_removed(&backend, &storage_key("a")).await;
}

#[tokio::test]
async fn test_input_hash_invalidates_entry() {
    let clock = ManualClock::new(0);
    let cache = build(test_config(), &clock, Arc::new(MemoryBackend::new())).await;
    let ctx = CallContext::default();

    let hash = Cache::hash_input(&("cargo build", 1)).unwrap();
    let options = SetOptions::default().with_input_hash(hash.clone());
    cache.set_with("build", "artifact", &options, &ctx).await.unwrap();

    let hit: Option<String> = cache.get_with("build", Some(&hash), &ctx).await.unwrap();
    assert_eq!(hit.as_deref(), Some("artifact"));
    let unchecked: Option<String> = cache.get_with("build", None, &ctx).await.unwrap();
    assert!(unchecked.is_some());

    let other = Cache::hash_input(&("cargo build", 2)).unwrap();
    let miss: Option<String> = cache.get_with("build", Some(&other), &ctx).await.unwrap();
    assert_eq!(miss, None);
}

#[tokio::test]
async fn test_large_payloads_are_compressed() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let payload = "compressible text ".repeat(500);

    for algorithm in [CompressionAlgorithm::Gzip, CompressionAlgorithm::Zstd] {
        let config = CacheConfig {
            compression_threshold: 64,
            compression: CompressionSetting::Options(CompressionConfig {
                algorithm,
                level: 3,
                ..CompressionConfig::default()
            }),
            ..test_config()
        };
        let writer = build(config.clone(), &clock, backend.clone()).await;
        writer.set("big", &payload, None).await.unwrap();
        assert!(writer.stats().compression_ratio < 0.5);

        let raw = backend.get(&storage_key("big")).await.unwrap().unwrap();
        let entry = CacheEntry::decode("big", &raw).unwrap();
        assert!(entry.compressed);
        assert_eq!(entry.compression, Some(algorithm));

        let reader = build(config, &clock, backend.clone()).await;
        assert_eq!(reader.get::<String>("big").await.unwrap(), Some(payload.clone()));
    }
}

#[tokio::test]
async fn test_small_payloads_stay_uncompressed() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let cache = build(test_config(), &clock, backend.clone()).await;

    cache.set("small", "tiny", None).await.unwrap();
    let raw = backend.get(&storage_key("small")).await.unwrap().unwrap();
    assert!(!CacheEntry::decode("small", &raw).unwrap().compressed);
    assert_eq!(cache.stats().compression_ratio, 1.0);
}

#[tokio::test]
async fn test_checksum_mismatch_is_a_miss() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let writer = build(test_config(), &clock, backend.clone()).await;
    writer.set("k", "value", None).await.unwrap();

    let skey = storage_key("k");
    let raw = backend.get(&skey).await.unwrap().unwrap();
    let mut entry = CacheEntry::decode(&skey, &raw).unwrap();
    entry.data = bincode::serialize("tampered").unwrap();
    entry.size = entry.data.len() as u64;
    backend.put(&skey, entry.encode().unwrap()).await.unwrap();

    let reader = build(test_config(), &clock, backend.clone()).await;
    assert_eq!(reader.get::<String>("k").await.unwrap(), None);

    let stats = reader.stats();
    assert_eq!(stats.checksum_failures, 1);
    assert_eq!(stats.total_misses, 1);
    wait_until_removed(&backend, &skey).await;
}

#[tokio::test]
async fn test_undecodable_entry_is_a_miss() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let writer = build(test_config(), &clock, backend.clone()).await;
    writer.set("k", "value", None).await.unwrap();
    assert!(backend.corrupt(&storage_key("k"), |bytes| bytes.truncate(3)));

    let reader = build(test_config(), &clock, backend.clone()).await;
    assert_eq!(reader.get::<String>("k").await.unwrap(), None);
    assert_eq!(reader.stats().corrupt_entries, 1);
}

#[tokio::test]
async fn test_hmac_secret_must_match() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let signed = CacheConfig {
        checksum_secret: Some("s3cret".to_string()),
        ..test_config()
    };
    let writer = build(signed.clone(), &clock, backend.clone()).await;
    writer.set("k", "value", None).await.unwrap();

    let same_secret = build(signed, &clock, backend.clone()).await;
    assert!(same_secret.get::<String>("k").await.unwrap().is_some());

    let other_secret = CacheConfig {
        checksum_secret: Some("other".to_string()),
        ..test_config()
    };
    let reader = build(other_secret, &clock, backend.clone()).await;
    assert_eq!(reader.get::<String>("k").await.unwrap(), None);
    assert_eq!(reader.stats().checksum_failures, 1);
}

#[tokio::test]
async fn test_disabled_cache_is_a_no_op() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let config = CacheConfig {
        enabled: false,
        ..test_config()
    };
    let cache = build(config, &clock, backend.clone()).await;

    cache.set("k", "value", None).await.unwrap();
    assert_eq!(cache.get::<String>("k").await.unwrap(), None);
    assert!(!cache.has("k").await.unwrap());
    assert!(!cache.delete("k").await.unwrap());
    assert_eq!(cache.clear().await.unwrap(), 0);
    assert_eq!(cache.cleanup().await.unwrap(), 0);
    assert!(backend.is_empty());
    assert_eq!(cache.stats().total_misses, 0);
}

#[tokio::test]
async fn test_oversized_payload_is_rejected() {
    let clock = ManualClock::new(0);
    let config = CacheConfig {
        max_size: 16,
        ..test_config()
    };
    let cache = build(config, &clock, Arc::new(MemoryBackend::new())).await;

    let err = cache.set("big", &vec![7u8; 100], None).await.unwrap_err();
    assert!(matches!(
        err,
        Error::CapacityExceeded {
            available_bytes: 16,
            ..
        }
    ));
    assert!(!cache.has("big").await.unwrap());
}

#[tokio::test]
async fn test_invalid_keys_are_rejected() {
    let clock = ManualClock::new(0);
    let cache = build(test_config(), &clock, Arc::new(MemoryBackend::new())).await;

    assert!(matches!(
        cache.get::<String>("").await,
        Err(Error::InvalidKey { .. })
    ));
    let long = "k".repeat(2000);
    assert!(matches!(
        cache.set(&long, "v", None).await,
        Err(Error::InvalidKey { .. })
    ));
}

#[tokio::test]
async fn test_clear_removes_memory_and_store() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let cache = build(test_config(), &clock, backend.clone()).await;

    for key in ["a", "b", "c"] {
        cache.set(key, key, None).await.unwrap();
    }
    assert_eq!(cache.clear().await.unwrap(), 3);
    assert!(backend.is_empty());
    assert_eq!(cache.stats().memory_entries, 0);
    assert_eq!(cache.get::<String>("a").await.unwrap(), None);
}

#[tokio::test]
async fn test_cleanup_removes_only_expired_entries() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let config = CacheConfig {
        ttl: Duration::from_millis(1000),
        ..test_config()
    };
    let cache = build(config, &clock, backend.clone()).await;

    cache.set("a", "a", None).await.unwrap();
    cache.set("b", "b", None).await.unwrap();
    cache
        .set("c", "c", Some(Duration::from_secs(10)))
        .await
        .unwrap();

    clock.set(2000);
    assert_eq!(cache.cleanup().await.unwrap(), 2);
    assert_eq!(backend.len(), 1);
    assert!(cache.has("c").await.unwrap());
    assert_eq!(cache.stats().expired_entries, 2);

    assert_eq!(cache.cleanup().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleanup_removes_undecodable_entries_without_counting_them() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryBackend::new());
    let cache = build(test_config(), &clock, backend.clone()).await;
    backend.put("garbage", vec![1, 2, 3]).await.unwrap();

    assert_eq!(cache.cleanup().await.unwrap(), 0);
    assert!(backend.is_empty());
    assert_eq!(cache.stats().corrupt_entries, 1);
}

#[tokio::test]
async fn test_operation_events() {
    let clock = ManualClock::new(0);
    let cache = build(test_config(), &clock, Arc::new(MemoryBackend::new())).await;
    let mut events = cache.subscribe();

    cache.set("k", "v", None).await.unwrap();
    let _ = cache.get::<String>("k").await.unwrap();
    cache.delete("k").await.unwrap();
    let _ = cache.get::<String>("").await;
    cache.cleanup().await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    let kinds: Vec<OperationKind> = received.iter().map(|e| e.operation).collect();
    assert_eq!(
        kinds,
        vec![
            OperationKind::Set,
            OperationKind::Get,
            OperationKind::Delete,
            OperationKind::Get,
            OperationKind::Cleanup,
        ]
    );
    assert!(received[..3].iter().all(|e| e.success));
    assert_eq!(received[0].key.as_deref(), Some("k"));
    assert!(!received[3].success);
    assert!(received[3].error.is_some());
    assert_eq!(received[4].key, None);
}

#[tokio::test]
async fn test_operations_do_not_wait_for_event_subscribers() {
    let clock = ManualClock::new(0);
    let config = CacheConfig {
        event_capacity: 1,
        ..test_config()
    };
    let cache = build(config, &clock, Arc::new(MemoryBackend::new())).await;
    let _idle = cache.subscribe();

    for i in 0..50 {
        cache.set(&format!("k{i}"), &i, None).await.unwrap();
    }
    assert_eq!(cache.stats().total_writes, 50);
}

#[tokio::test]
async fn test_memory_tier_is_bounded() {
    let clock = ManualClock::new(0);
    let config = CacheConfig {
        max_memory_entries: 2,
        ..test_config()
    };
    let cache = build(config, &clock, Arc::new(MemoryBackend::new())).await;

    for key in ["a", "b", "c"] {
        cache.set(key, key, None).await.unwrap();
    }
    assert_eq!(cache.stats().memory_entries, 2);
    // The store still has the displaced entry
    assert_eq!(cache.get::<String>("a").await.unwrap().as_deref(), Some("a"));
}

#[tokio::test]
async fn test_stats_track_hits_and_misses() {
    let clock = ManualClock::new(10);
    let cache = build(test_config(), &clock, Arc::new(MemoryBackend::new())).await;

    cache.set("a", "a", None).await.unwrap();
    clock.set(20);
    cache.set("b", "b", None).await.unwrap();
    cache.get::<String>("a").await.unwrap();
    cache.get::<String>("b").await.unwrap();
    cache.get::<String>("b").await.unwrap();
    cache.get::<String>("missing").await.unwrap();

    let stats = cache.stats();
    assert_eq!(stats.total_hits, 3);
    assert_eq!(stats.total_misses, 1);
    assert_eq!(stats.hit_rate, 0.75);
    assert_eq!(stats.memory_entries, 2);
    assert_eq!(stats.oldest_entry, Some(10));
    assert_eq!(stats.newest_entry, Some(20));

    let breaker = stats.circuit_breaker.unwrap();
    assert_eq!(breaker.state, "CLOSED");
    assert_eq!(breaker.failure_count, 0);

    // Reading stats twice gives the same answer
    assert_eq!(cache.stats(), cache.stats());
}

#[tokio::test]
async fn test_partitioned_cleanup() {
    let clock = ManualClock::new(0);
    let config = CacheConfig {
        enable_partitioning: true,
        partition_count: 4,
        ttl: Duration::from_millis(100),
        ..test_config()
    };
    let cache = build(config, &clock, Arc::new(MemoryBackend::new())).await;

    for i in 0..10 {
        cache.set(&format!("key-{i}"), &i, None).await.unwrap();
    }
    let stored: u64 = cache.partitions().iter().map(|p| p.file_count).sum();
    assert_eq!(stored, 10);

    clock.set(500);
    let mut removed = 0;
    for id in 0..4 {
        removed += cache.cleanup_partition(id).await.unwrap();
    }
    assert_eq!(removed, 10);
    assert!(cache
        .partitions()
        .iter()
        .all(|p| p.file_count == 0 && p.last_cleanup == Some(500)));

    assert!(matches!(
        cache.cleanup_partition(4).await,
        Err(Error::Configuration { .. })
    ));
}

#[tokio::test]
async fn test_cleanup_partition_requires_partitioning() {
    let clock = ManualClock::new(0);
    let cache = build(test_config(), &clock, Arc::new(MemoryBackend::new())).await;
    assert!(cache.partitions().is_empty());
    assert!(matches!(
        cache.cleanup_partition(0).await,
        Err(Error::Configuration { .. })
    ));
}

#[tokio::test]
async fn test_filesystem_backed_cache_survives_reopen() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    {
        let cache = Cache::open(temp_dir.path(), test_config()).await.unwrap();
        cache.set("persisted", &vec![1u32, 2, 3], None).await.unwrap();
        cache.shutdown().await;
    }

    let cache = Cache::open(temp_dir.path(), test_config()).await.unwrap();
    assert_eq!(
        cache.get::<Vec<u32>>("persisted").await.unwrap(),
        Some(vec![1, 2, 3])
    );
}
