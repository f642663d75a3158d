//! Key-hash sharding on top of any backend
//!
//! The partition of a key is `xxh3(key) % partition_count`, fixed for the
//! lifetime of the storage. Keys are stored in the inner backend under a
//! `p{id:04}/` prefix, so each partition can be listed and cleaned on its own.

use super::backend::{SharedBackend, StorageBackend};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Snapshot of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    pub partition_id: usize,
    /// Key prefix of the partition in the inner backend
    pub partition_dir: String,
    pub file_count: u64,
    pub total_size: u64,
    /// Epoch milliseconds of the last completed cleanup
    pub last_cleanup: Option<u64>,
}

#[derive(Debug, Default)]
struct PartitionState {
    sizes: HashMap<String, u64>,
    last_cleanup: Option<u64>,
}

#[derive(Debug)]
pub struct PartitionedStorage {
    inner: SharedBackend,
    partitions: Vec<Mutex<PartitionState>>,
}

impl PartitionedStorage {
    pub fn new(inner: SharedBackend, partition_count: usize) -> Result<Self> {
        if partition_count == 0 {
            return Err(Error::configuration("partition count must be at least 1"));
        }
        let partitions = (0..partition_count)
            .map(|_| Mutex::new(PartitionState::default()))
            .collect();
        Ok(Self { inner, partitions })
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition a key belongs to
    pub fn partition_of(&self, key: &str) -> usize {
        (xxh3_64(key.as_bytes()) % self.partitions.len() as u64) as usize
    }

    fn prefix(id: usize) -> String {
        format!("p{id:04}")
    }

    fn physical_key(&self, key: &str) -> (usize, String) {
        let id = self.partition_of(key);
        (id, format!("{}/{key}", Self::prefix(id)))
    }

    fn split_physical(physical: &str) -> Option<(usize, &str)> {
        let (prefix, key) = physical.split_once('/')?;
        let id = prefix.strip_prefix('p')?.parse().ok()?;
        Some((id, key))
    }

    fn check_id(&self, id: usize) -> Result<()> {
        if id >= self.partitions.len() {
            return Err(Error::configuration(format!(
                "partition {id} out of range (0..{})",
                self.partitions.len()
            )));
        }
        Ok(())
    }

    /// Rebuild per-partition bookkeeping from the inner backend
    pub async fn rescan(&self) -> Result<()> {
        let mut rebuilt: Vec<HashMap<String, u64>> = vec![HashMap::new(); self.partitions.len()];

        for physical in self.inner.list().await? {
            let Some((id, key)) = Self::split_physical(&physical) else {
                continue;
            };
            if id >= rebuilt.len() {
                tracing::warn!(key = %physical, "Key belongs to a partition outside the configured range");
                continue;
            }
            if let Some(bytes) = self.inner.get(&physical).await? {
                rebuilt[id].insert(key.to_string(), bytes.len() as u64);
            }
        }

        for (partition, sizes) in self.partitions.iter().zip(rebuilt) {
            partition.lock().sizes = sizes;
        }
        Ok(())
    }

    /// Logical keys stored in one partition, read from the inner backend
    pub async fn keys_in_partition(&self, id: usize) -> Result<Vec<String>> {
        self.check_id(id)?;
        Ok(self
            .inner
            .list()
            .await?
            .iter()
            .filter_map(|physical| Self::split_physical(physical))
            .filter(|(pid, _)| *pid == id)
            .map(|(_, key)| key.to_string())
            .collect())
    }

    /// Record that a partition finished a cleanup pass at `now_ms`
    pub fn mark_cleaned(&self, id: usize, now_ms: u64) -> Result<()> {
        self.check_id(id)?;
        self.partitions[id].lock().last_cleanup = Some(now_ms);
        Ok(())
    }

    pub fn partition_info(&self, id: usize) -> Result<PartitionInfo> {
        self.check_id(id)?;
        let state = self.partitions[id].lock();
        Ok(PartitionInfo {
            partition_id: id,
            partition_dir: Self::prefix(id),
            file_count: state.sizes.len() as u64,
            total_size: state.sizes.values().sum(),
            last_cleanup: state.last_cleanup,
        })
    }

    pub fn partitions(&self) -> Vec<PartitionInfo> {
        (0..self.partitions.len())
            .filter_map(|id| self.partition_info(id).ok())
            .collect()
    }
}

#[async_trait]
impl StorageBackend for PartitionedStorage {
    fn name(&self) -> &'static str {
        "partitioned"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let (id, physical) = self.physical_key(key);
        let size = bytes.len() as u64;
        self.inner.put(&physical, bytes).await?;
        self.partitions[id].lock().sizes.insert(key.to_string(), size);
        Ok(())
    }

    async fn put_atomic(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let (id, physical) = self.physical_key(key);
        let size = bytes.len() as u64;
        self.inner.put_atomic(&physical, bytes).await?;
        self.partitions[id].lock().sizes.insert(key.to_string(), size);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let (_, physical) = self.physical_key(key);
        self.inner.get(&physical).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let (id, physical) = self.physical_key(key);
        let removed = self.inner.remove(&physical).await?;
        self.partitions[id].lock().sizes.remove(key);
        Ok(removed)
    }

    async fn remove_if(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let (id, physical) = self.physical_key(key);
        let removed = self.inner.remove_if(&physical, expected).await?;
        if removed {
            self.partitions[id].lock().sizes.remove(key);
        }
        Ok(removed)
    }

    async fn replace_if(&self, key: &str, expected: &[u8], bytes: Vec<u8>) -> Result<bool> {
        let (id, physical) = self.physical_key(key);
        let size = bytes.len() as u64;
        let replaced = self.inner.replace_if(&physical, expected, bytes).await?;
        if replaced {
            self.partitions[id].lock().sizes.insert(key.to_string(), size);
        }
        Ok(replaced)
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .list()
            .await?
            .iter()
            .filter_map(|physical| Self::split_physical(physical))
            .map(|(_, key)| key.to_string())
            .collect())
    }
}
