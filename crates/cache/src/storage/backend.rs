//! The storage backend contract

use crate::errors::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Opaque byte store keyed by string
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Write so readers never observe a partial value. Backends without a
    /// cheaper path fall back to `put`.
    async fn put_atomic(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove a key; returns whether it existed
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Remove `key` only while it still holds `expected`; returns whether
    /// it was removed. The default compares and then removes, so it is
    /// only atomic against writers that share the caller's key lock.
    async fn remove_if(&self, key: &str, expected: &[u8]) -> Result<bool> {
        match self.get(key).await? {
            Some(current) if current == expected => self.remove(key).await,
            _ => Ok(false),
        }
    }

    /// Replace the value of `key` only while it still holds `expected`;
    /// returns whether it was replaced
    async fn replace_if(&self, key: &str, expected: &[u8], bytes: Vec<u8>) -> Result<bool> {
        match self.get(key).await? {
            Some(current) if current == expected => {
                self.put_atomic(key, bytes).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<String>>;

    /// Remove every key, returning how many were removed
    async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for key in self.list().await? {
            if self.remove(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

pub type SharedBackend = Arc<dyn StorageBackend>;
