//! Cache put operations

use crate::entry::{serialize_value, storage_key, validate_key, CacheEntry};
use crate::errors::{Error, RecoveryHint, Result};
use crate::storage::CompressionAlgorithm;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::events::OperationKind;
use crate::core::internal::MemoryEntry;
use crate::core::types::{Cache, CacheInner, CallContext, SetOptions};

impl Cache {
    /// Store a value, optionally overriding the cache-wide TTL
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let options = SetOptions {
            ttl,
            input_hash: None,
        };
        self.set_with(key, value, &options, &CallContext::default())
            .await
    }

    /// Store a value with explicit options and call context.
    ///
    /// Write failures are returned so callers can retry or fall back.
    pub async fn set_with<T>(
        &self,
        key: &str,
        value: &T,
        options: &SetOptions,
        ctx: &CallContext,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        if !self.inner.config.enabled {
            return Ok(());
        }

        let started = Instant::now();
        let result = match validate_key(key).and_then(|()| serialize_value(key, value)) {
            Ok(payload) => self.inner.store(key, payload, options, ctx).await,
            Err(e) => Err(e),
        };
        self.inner
            .emit(OperationKind::Set, Some(key), started, result.as_ref().err());
        result
    }
}

impl CacheInner {
    /// Persist a serialized payload and refresh the memory tier
    pub(crate) async fn store(
        &self,
        key: &str,
        payload: Vec<u8>,
        options: &SetOptions,
        ctx: &CallContext,
    ) -> Result<()> {
        let requested = payload.len() as u64;
        if requested > self.config.max_size {
            return Err(Error::CapacityExceeded {
                requested_bytes: requested,
                available_bytes: self.config.max_size,
                recovery_hint: RecoveryHint::IncreaseCapacity {
                    suggested_bytes: requested.saturating_mul(2),
                },
            });
        }

        let now = self.clock.now_ms();
        let mut entry = CacheEntry::new(key, Vec::new(), now);
        entry.ttl = options.ttl.map(|ttl| ttl.as_millis() as u64);
        entry.hash = options.input_hash.clone();
        entry.original_size = requested;
        entry.checksum = self.codec.as_ref().map(|codec| codec.compute(&payload));

        match self.compress_payload(key, &payload, ctx).await? {
            Some((algorithm, compressed)) => {
                entry.size = compressed.len() as u64;
                entry.data = compressed;
                entry.compressed = true;
                entry.compression = Some(algorithm);
            }
            None => {
                entry.size = requested;
                entry.data = payload.clone();
            }
        }

        let skey = storage_key(key);
        let hot = Arc::new(MemoryEntry::from_entry(&entry, payload));
        let displaced = {
            let _lock = self.key_locks.lock(&skey).await;
            self.write_entry(&skey, &entry, ctx).await?;
            self.memory.insert(skey, hot)
        };
        self.counters.record_write();
        if displaced > 0 {
            tracing::debug!(displaced, "Memory tier over capacity, dropped least recently used entries");
        }

        tracing::debug!(
            key = %key,
            size = entry.size,
            compressed = entry.compressed,
            "Stored cache entry"
        );
        Ok(())
    }

    /// Compressed payload when compression is on, the payload reaches the
    /// threshold and compressing actually saves space.
    ///
    /// Compression runs under the circuit breaker. A failed compression
    /// falls back to storing uncompressed; an open circuit, timeout or
    /// cancellation is returned.
    pub(crate) async fn compress_payload(
        &self,
        key: &str,
        payload: &[u8],
        ctx: &CallContext,
    ) -> Result<Option<(CompressionAlgorithm, Vec<u8>)>> {
        let Some(compressor) = self.compressor.as_ref() else {
            return Ok(None);
        };
        if payload.len() < self.config.compression_threshold {
            return Ok(None);
        }

        let data = payload.to_vec();
        match self.guarded(ctx, || compressor.compress(data)).await {
            Ok(compressed) if compressed.len() < payload.len() => {
                Ok(Some((compressor.algorithm(), compressed)))
            }
            Ok(_) => Ok(None),
            Err(e @ Error::Compression { .. }) => {
                tracing::warn!(key = %key, error = %e, "Compression failed, storing uncompressed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Encode and write an envelope.
    ///
    /// With atomic operations enabled a failed atomic write is counted and
    /// retried as a direct write within the same guarded call.
    pub(crate) async fn write_entry(
        &self,
        storage_key: &str,
        entry: &CacheEntry,
        ctx: &CallContext,
    ) -> Result<()> {
        let encoded = entry.encode()?;
        let atomic = self.config.enable_atomic_ops;
        let backend = &self.backend;
        let counters = &self.counters;

        self.guarded(ctx, || async move {
            if atomic {
                match backend.put_atomic(storage_key, encoded.clone()).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        counters.record_atomic_failure();
                        tracing::warn!(
                            key = %storage_key,
                            error = %e,
                            "Atomic write failed, falling back to direct write"
                        );
                    }
                }
            }
            backend.put(storage_key, encoded).await
        })
        .await
    }
}
