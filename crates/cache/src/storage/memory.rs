use super::backend::StorageBackend;
use crate::errors::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// Backend that keeps everything in a concurrent map
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overwrite stored bytes in place, bypassing the cache
    pub fn corrupt(&self, key: &str, f: impl FnOnce(&mut Vec<u8>)) -> bool {
        match self.entries.get_mut(key) {
            Some(mut bytes) => {
                f(bytes.value_mut());
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|bytes| bytes.value().clone()))
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn remove_if(&self, key: &str, expected: &[u8]) -> Result<bool> {
        Ok(self
            .entries
            .remove_if(key, |_, current| current.as_slice() == expected)
            .is_some())
    }

    async fn replace_if(&self, key: &str, expected: &[u8], bytes: Vec<u8>) -> Result<bool> {
        match self.entries.get_mut(key) {
            Some(mut current) if current.value().as_slice() == expected => {
                *current.value_mut() = bytes;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }

    async fn clear(&self) -> Result<usize> {
        let removed = self.entries.len();
        self.entries.clear();
        Ok(removed)
    }
}
