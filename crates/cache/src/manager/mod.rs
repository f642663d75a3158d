//! Named cache registry
//!
//! A [`CacheManager`] creates caches on first use and hands out shared
//! handles afterwards. Applications normally construct one and pass it where
//! it is needed; [`CacheManager::global`] exists for code that cannot.

mod statistics;

pub use statistics::AggregateStats;

use crate::config::CacheConfig;
use crate::core::Cache;
use crate::errors::{Error, Result};
use crate::storage::FileSystemBackend;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static GLOBAL: Lazy<RwLock<Arc<CacheManager>>> =
    Lazy::new(|| RwLock::new(Arc::new(CacheManager::new(CacheConfig::default()))));

/// Owns a set of named caches
pub struct CacheManager {
    defaults: CacheConfig,
    /// Caches are persisted under `<root>/<name>` when set
    storage_root: Option<PathBuf>,
    caches: RwLock<HashMap<String, Cache>>,
    /// Serializes cache construction so a name is only built once
    creating: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("storage_root", &self.storage_root)
            .field("caches", &self.names())
            .finish()
    }
}

impl CacheManager {
    /// Manager whose caches live in memory
    pub fn new(defaults: CacheConfig) -> Self {
        Self {
            defaults,
            storage_root: None,
            caches: RwLock::new(HashMap::new()),
            creating: tokio::sync::Mutex::new(()),
        }
    }

    /// Persist every cache in its own directory under `root`
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    pub fn defaults(&self) -> &CacheConfig {
        &self.defaults
    }

    pub fn storage_root(&self) -> Option<&Path> {
        self.storage_root.as_deref()
    }

    /// The process-wide manager, created with default configuration on
    /// first use
    pub fn global() -> Arc<CacheManager> {
        Arc::clone(&*GLOBAL.read())
    }

    /// Replace the process-wide manager with a fresh one and return the
    /// previous manager so its caches can be shut down
    pub fn reset_global() -> Arc<CacheManager> {
        let fresh = Arc::new(CacheManager::new(CacheConfig::default()));
        std::mem::replace(&mut *GLOBAL.write(), fresh)
    }

    /// The cache called `name`, creating it with `config` (or the manager
    /// defaults) if it does not exist yet. `config` is ignored for an
    /// existing cache.
    pub async fn get_or_create(&self, name: &str, config: Option<CacheConfig>) -> Result<Cache> {
        if let Some(cache) = self.get(name) {
            return Ok(cache);
        }

        let _guard = self.creating.lock().await;
        if let Some(cache) = self.get(name) {
            return Ok(cache);
        }

        validate_name(name)?;
        let config = config.unwrap_or_else(|| self.defaults.clone());
        let mut builder = Cache::builder(name).config(config);
        if let Some(root) = &self.storage_root {
            let backend = FileSystemBackend::new(root.join(name)).await?;
            builder = builder.backend(Arc::new(backend));
        }
        let cache = builder.build().await?;

        self.caches.write().insert(name.to_string(), cache.clone());
        tracing::debug!(cache = %name, "Created cache");
        Ok(cache)
    }

    pub fn get(&self, name: &str) -> Option<Cache> {
        self.caches.read().get(name).cloned()
    }

    /// Unregister a cache and shut it down. Stored entries are kept.
    pub async fn remove(&self, name: &str) -> bool {
        let removed = self.caches.write().remove(name);
        match removed {
            Some(cache) => {
                cache.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Registered cache names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Shut every cache down and forget them
    pub async fn shutdown_all(&self) {
        let caches: Vec<Cache> = self.caches.write().drain().map(|(_, cache)| cache).collect();
        let count = caches.len();
        futures::future::join_all(caches.iter().map(|cache| cache.shutdown())).await;
        tracing::info!(caches = count, "Shut down all caches");
    }

    pub fn aggregate_stats(&self) -> AggregateStats {
        let caches: Vec<(String, Cache)> = self
            .caches
            .read()
            .iter()
            .map(|(name, cache)| (name.clone(), cache.clone()))
            .collect();
        AggregateStats::from_stats(caches.into_iter().map(|(name, cache)| (name, cache.stats())))
    }
}

/// Cache names double as directory names
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "invalid cache name '{name}': use letters, digits, '-', '_' or '.'"
        )))
    }
}
