//! Behaviour every backend must share

use super::*;
use std::sync::Arc;
use tempfile::TempDir;

async fn exercise_contract(backend: SharedBackend) {
    assert_eq!(backend.get("k1").await.unwrap(), None);
    assert!(!backend.remove("k1").await.unwrap());

    backend.put("k1", b"first".to_vec()).await.unwrap();
    backend.put_atomic("k2", b"second".to_vec()).await.unwrap();

    // Last write wins
    backend.put_atomic("k1", b"third".to_vec()).await.unwrap();
    assert_eq!(backend.get("k1").await.unwrap(), Some(b"third".to_vec()));

    let mut keys = backend.list().await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["k1".to_string(), "k2".to_string()]);

    assert!(backend.remove("k2").await.unwrap());
    assert_eq!(backend.list().await.unwrap(), vec!["k1".to_string()]);

    assert_eq!(backend.clear().await.unwrap(), 1);
    assert!(backend.list().await.unwrap().is_empty());

    exercise_conditional(backend).await;
}

async fn exercise_conditional(backend: SharedBackend) {
    assert!(!backend.remove_if("c", b"v1").await.unwrap());
    assert!(!backend.replace_if("c", b"v1", b"v2".to_vec()).await.unwrap());
    assert_eq!(backend.get("c").await.unwrap(), None);

    backend.put("c", b"v1".to_vec()).await.unwrap();
    assert!(!backend.replace_if("c", b"other", b"v2".to_vec()).await.unwrap());
    assert!(backend.replace_if("c", b"v1", b"v2".to_vec()).await.unwrap());
    assert_eq!(backend.get("c").await.unwrap(), Some(b"v2".to_vec()));

    // A value the caller never saw is left alone
    assert!(!backend.remove_if("c", b"v1").await.unwrap());
    assert_eq!(backend.get("c").await.unwrap(), Some(b"v2".to_vec()));
    assert!(backend.remove_if("c", b"v2").await.unwrap());
    assert_eq!(backend.get("c").await.unwrap(), None);
}

#[tokio::test]
async fn test_memory_backend_contract() {
    exercise_contract(Arc::new(MemoryBackend::new())).await;
}

#[tokio::test]
async fn test_filesystem_backend_contract() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FileSystemBackend::new(temp_dir.path()).await.unwrap();
    exercise_contract(Arc::new(backend)).await;
}

#[tokio::test]
async fn test_partitioned_backend_contract() {
    let inner: SharedBackend = Arc::new(MemoryBackend::new());
    exercise_contract(Arc::new(PartitionedStorage::new(inner, 8).unwrap())).await;
}

#[tokio::test]
async fn test_partitioned_filesystem_contract() {
    let temp_dir = TempDir::new().unwrap();
    let inner: SharedBackend = Arc::new(FileSystemBackend::new(temp_dir.path()).await.unwrap());
    exercise_contract(Arc::new(PartitionedStorage::new(inner, 3).unwrap())).await;
}
