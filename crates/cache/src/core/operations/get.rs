//! Cache get operations

use crate::checksum::DigestKind;
use crate::entry::{deserialize_value, storage_key, validate_key, CacheEntry};
use crate::errors::{Error, Result};
use crate::storage::compression::decompress_bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;

use crate::core::events::OperationKind;
use crate::core::internal::MemoryEntry;
use crate::core::types::{Cache, CacheInner, CallContext};

/// Outcome of reading one stored entry
pub(crate) enum Loaded {
    Missing,
    Corrupt(Defect),
    Found { entry: CacheEntry, payload: Vec<u8> },
}

/// Why a stored entry cannot be served
pub(crate) enum Defect {
    Undecodable(Error),
    Decompression(Error),
    Checksum(DigestKind),
}

impl Cache {
    /// Get a value from the cache
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.get_with(key, None, &CallContext::default()).await
    }

    /// Get a value, treating it as a miss unless it was stored with
    /// `input_hash`.
    ///
    /// Storage failures degrade to a miss. An open circuit is reported as
    /// [`Error::CircuitOpen`] so callers can tell unavailability from absence.
    pub async fn get_with<T>(
        &self,
        key: &str,
        input_hash: Option<&str>,
        ctx: &CallContext,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        if !self.inner.config.enabled {
            return Ok(None);
        }

        let started = Instant::now();
        let result = match self.lookup(key, input_hash, ctx).await {
            Ok(Some(hot)) => deserialize_value(key, &hot.payload).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        self.inner
            .emit(OperationKind::Get, Some(key), started, result.as_ref().err());
        result
    }

    pub(crate) async fn lookup(
        &self,
        key: &str,
        input_hash: Option<&str>,
        ctx: &CallContext,
    ) -> Result<Option<Arc<MemoryEntry>>> {
        validate_key(key)?;

        let inner = &self.inner;
        let skey = storage_key(key);
        let now = inner.clock.now_ms();
        let ttl = inner.default_ttl_ms();

        if let Some(hot) = inner.memory.get(&skey) {
            return Ok(self.serve_hot(&skey, hot, input_hash, now, ttl));
        }

        // Loading into the memory tier must not interleave with a write or
        // delete of the same key, or a stale value could be reinstated
        let _lock = inner.key_locks.lock(&skey).await;
        if let Some(hot) = inner.memory.get(&skey) {
            return Ok(self.serve_hot(&skey, hot, input_hash, now, ttl));
        }

        let loaded = match inner.load_entry(&skey, ctx).await {
            Ok(loaded) => loaded,
            Err(e @ (Error::Storage { .. } | Error::Io { .. })) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                inner.counters.record_miss();
                return Ok(None);
            }
            Err(e) => {
                inner.counters.record_miss();
                return Err(e);
            }
        };

        match loaded {
            Loaded::Missing => {
                inner.counters.record_miss();
                Ok(None)
            }
            Loaded::Corrupt(_) => Ok(self.stale(skey, input_hash)),
            Loaded::Found { entry, payload } => {
                if entry.is_expired(now, ttl) {
                    inner.counters.record_expired(1);
                    return Ok(self.stale(skey, input_hash));
                }
                if !entry.matches_input(input_hash) {
                    tracing::debug!(key = %key, "Cached entry was computed from a different input");
                    return Ok(self.stale(skey, input_hash));
                }

                let hot = Arc::new(MemoryEntry::from_entry(&entry, payload));
                inner.memory.touch(&hot, now);
                inner.memory.insert(skey, Arc::clone(&hot));
                inner.counters.record_hit();
                Ok(Some(hot))
            }
        }
    }

    /// Serve a memory tier entry, or treat it as a stale miss
    fn serve_hot(
        &self,
        skey: &str,
        hot: Arc<MemoryEntry>,
        input_hash: Option<&str>,
        now: u64,
        ttl: u64,
    ) -> Option<Arc<MemoryEntry>> {
        let inner = &self.inner;
        if hot.is_expired(now, ttl) {
            inner.memory.remove_exact(skey, &hot);
            inner.counters.record_expired(1);
            return self.stale(skey.to_string(), input_hash);
        }
        if !hot.matches_input(input_hash) {
            inner.memory.remove_exact(skey, &hot);
            return self.stale(skey.to_string(), input_hash);
        }
        inner.memory.touch(&hot, now);
        inner.counters.record_hit();
        Some(hot)
    }

    /// Count a miss and delete the stale entry without waiting for it
    fn stale(&self, storage_key: String, input_hash: Option<&str>) -> Option<Arc<MemoryEntry>> {
        self.inner.counters.record_miss();
        self.remove_in_background(storage_key, input_hash.map(str::to_string));
        None
    }

    pub(crate) fn remove_in_background(&self, storage_key: String, input_hash: Option<String>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let removed = inner
                .remove_if_stale(&storage_key, input_hash.as_deref(), &CallContext::default())
                .await;
            if let Err(e) = removed {
                tracing::debug!(key = %storage_key, error = %e, "Failed to remove stale entry");
            }
        });
    }
}

impl CacheInner {
    /// Raw stored bytes of one entry
    pub(crate) async fn read_raw(&self, storage_key: &str, ctx: &CallContext) -> Result<Option<Vec<u8>>> {
        let backend = &self.backend;
        self.guarded(ctx, || backend.get(storage_key)).await
    }

    /// Read, decode, decompress and verify one stored entry, counting and
    /// logging defects
    pub(crate) async fn load_entry(&self, storage_key: &str, ctx: &CallContext) -> Result<Loaded> {
        let Some(raw) = self.read_raw(storage_key, ctx).await? else {
            return Ok(Loaded::Missing);
        };

        let loaded = self.inspect(storage_key, &raw, ctx).await?;
        if let Loaded::Corrupt(defect) = &loaded {
            self.record_defect(storage_key, defect);
        }
        Ok(loaded)
    }

    /// Decode, decompress and verify raw bytes without side effects
    pub(crate) async fn inspect(
        &self,
        storage_key: &str,
        raw: &[u8],
        ctx: &CallContext,
    ) -> Result<Loaded> {
        let entry = match CacheEntry::decode(storage_key, raw) {
            Ok(entry) => entry,
            Err(e) => return Ok(Loaded::Corrupt(Defect::Undecodable(e))),
        };

        let payload = match self.payload_of(&entry, ctx).await {
            Ok(payload) => payload,
            Err(e @ Error::Compression { .. }) => {
                return Ok(Loaded::Corrupt(Defect::Decompression(e)))
            }
            Err(e) => return Err(e),
        };

        if let (Some(codec), Some(checksum)) = (&self.codec, &entry.checksum) {
            if let Err(digest) = codec.verify_detailed(&payload, checksum) {
                return Ok(Loaded::Corrupt(Defect::Checksum(digest)));
            }
        }

        Ok(Loaded::Found { entry, payload })
    }

    pub(crate) fn record_defect(&self, storage_key: &str, defect: &Defect) {
        match defect {
            Defect::Undecodable(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Discarding undecodable cache entry");
                self.counters.record_corrupt();
            }
            Defect::Decompression(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Discarding cache entry that failed to decompress");
                self.counters.record_corrupt();
            }
            Defect::Checksum(digest) => {
                tracing::warn!(key = %storage_key, %digest, "Checksum mismatch, discarding cache entry");
                self.counters.record_checksum_failure();
            }
        }
    }

    /// Delete an entry that was served as stale, unless a write replaced it
    /// in the meantime. Returns whether it was removed.
    pub(crate) async fn remove_if_stale(
        &self,
        storage_key: &str,
        input_hash: Option<&str>,
        ctx: &CallContext,
    ) -> Result<bool> {
        let _lock = self.key_locks.lock(storage_key).await;
        let Some(raw) = self.read_raw(storage_key, ctx).await? else {
            return Ok(false);
        };

        let stale = match self.inspect(storage_key, &raw, ctx).await? {
            Loaded::Found { entry, .. } => {
                entry.is_expired(self.clock.now_ms(), self.default_ttl_ms())
                    || !entry.matches_input(input_hash)
            }
            Loaded::Corrupt(_) => true,
            Loaded::Missing => false,
        };
        if !stale {
            return Ok(false);
        }

        self.memory.remove(storage_key);
        let backend = &self.backend;
        self.guarded(ctx, || backend.remove_if(storage_key, &raw))
            .await
    }

    /// Uncompressed payload of an entry; decompression runs under the
    /// circuit breaker like any other storage step
    async fn payload_of(&self, entry: &CacheEntry, ctx: &CallContext) -> Result<Vec<u8>> {
        if !entry.compressed {
            return Ok(entry.data.clone());
        }

        let algorithm = entry.compression.ok_or_else(|| {
            Error::compression("decompress", "entry is marked compressed without an algorithm")
        })?;
        let data = entry.data.clone();
        let expected_size = entry.original_size;
        match &self.compressor {
            Some(compressor) => {
                self.guarded(ctx, || compressor.decompress(algorithm, data, expected_size))
                    .await
            }
            // Compression may have been switched off after the entry was written
            None => {
                self.guarded(ctx, || async { decompress_bytes(algorithm, &data, expected_size) })
                    .await
            }
        }
    }
}
