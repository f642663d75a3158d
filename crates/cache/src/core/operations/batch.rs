//! Batch operations
//!
//! Each item goes through the single-key path concurrently. One item's
//! failure is reported in its own [`BatchResult`] and never aborts the rest.

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::core::types::{BatchResult, Cache};

impl Cache {
    pub async fn batch_get<T, K>(&self, keys: &[K]) -> Vec<BatchResult<Option<T>>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        join_all(keys.iter().map(|key| async move {
            let key = key.as_ref();
            BatchResult {
                key: key.to_string(),
                result: self.get(key).await,
            }
        }))
        .await
    }

    pub async fn batch_set<T, K>(
        &self,
        items: &[(K, T)],
        ttl: Option<Duration>,
    ) -> Vec<BatchResult<()>>
    where
        T: Serialize,
        K: AsRef<str>,
    {
        join_all(items.iter().map(|(key, value)| async move {
            let key = key.as_ref();
            BatchResult {
                key: key.to_string(),
                result: self.set(key, value, ttl).await,
            }
        }))
        .await
    }

    pub async fn batch_delete<K>(&self, keys: &[K]) -> Vec<BatchResult<bool>>
    where
        K: AsRef<str>,
    {
        join_all(keys.iter().map(|key| async move {
            let key = key.as_ref();
            BatchResult {
                key: key.to_string(),
                result: self.delete(key).await,
            }
        }))
        .await
    }

    pub async fn batch_has<K>(&self, keys: &[K]) -> Vec<BatchResult<bool>>
    where
        K: AsRef<str>,
    {
        join_all(keys.iter().map(|key| async move {
            let key = key.as_ref();
            BatchResult {
                key: key.to_string(),
                result: self.has(key).await,
            }
        }))
        .await
    }
}
