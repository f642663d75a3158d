//! Stored record model
//!
//! A [`CacheEntry`] is the envelope persisted to the backing store. It is
//! encoded with bincode and carries the (possibly compressed) payload with
//! its checksum, expiry and access statistics.

use crate::checksum::ChecksumResult;
use crate::errors::{Error, RecoveryHint, Result, SerializationOp};
use crate::storage::compression::CompressionAlgorithm;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Longest accepted caller key, in bytes
pub const MAX_KEY_LEN: usize = 1024;

/// Persisted cache record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Caller key, kept so a storage key can be mapped back
    pub key: String,
    /// Serialized value, compressed when `compressed` is set
    pub data: Vec<u8>,
    /// Creation time, epoch milliseconds
    pub timestamp: u64,
    /// Entry-specific TTL in milliseconds; the cache default applies when unset
    pub ttl: Option<u64>,
    /// Digest of the logical input the value was computed from
    pub hash: Option<String>,
    /// Length of `data`
    pub size: u64,
    /// Length of the uncompressed payload
    pub original_size: u64,
    pub compressed: bool,
    pub compression: Option<CompressionAlgorithm>,
    /// Checksum of the uncompressed payload
    pub checksum: Option<ChecksumResult>,
    pub access_count: u64,
    pub last_accessed: u64,
}

impl CacheEntry {
    /// Uncompressed entry created at `now`
    pub fn new(key: impl Into<String>, data: Vec<u8>, now: u64) -> Self {
        let size = data.len() as u64;
        Self {
            key: key.into(),
            data,
            timestamp: now,
            ttl: None,
            hash: None,
            size,
            original_size: size,
            compressed: false,
            compression: None,
            checksum: None,
            access_count: 0,
            last_accessed: now,
        }
    }

    /// Effective TTL in milliseconds
    pub fn ttl_ms(&self, default_ttl_ms: u64) -> u64 {
        self.ttl.unwrap_or(default_ttl_ms)
    }

    /// Expired once strictly more than the TTL has passed since creation
    pub fn is_expired(&self, now: u64, default_ttl_ms: u64) -> bool {
        now.saturating_sub(self.timestamp) > self.ttl_ms(default_ttl_ms)
    }

    pub fn expires_at(&self, default_ttl_ms: u64) -> u64 {
        self.timestamp.saturating_add(self.ttl_ms(default_ttl_ms))
    }

    /// Whether the entry was produced from the given logical input
    pub fn matches_input(&self, input_hash: Option<&str>) -> bool {
        match input_hash {
            Some(expected) => self.hash.as_deref() == Some(expected),
            None => true,
        }
    }

    /// Record an access
    pub fn touch(&mut self, now: u64) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = now;
    }

    /// Encode the envelope for the backing store
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| Error::serialization(self.key.clone(), SerializationOp::Encode, e))
    }

    /// Decode an envelope read from the backing store
    pub fn decode(storage_key: &str, bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::serialization(storage_key, SerializationOp::Decode, e))
    }
}

/// Serialize a caller value into a payload
pub fn serialize_value<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::Serialization {
        key: key.to_string(),
        operation: SerializationOp::Encode,
        source: Box::new(e),
        recovery_hint: RecoveryHint::Manual {
            instructions: "Check that the value is serializable".to_string(),
        },
    })
}

/// Deserialize a payload into a caller value
pub fn deserialize_value<T: DeserializeOwned>(key: &str, data: &[u8]) -> Result<T> {
    bincode::deserialize(data)
        .map_err(|e| Error::serialization(key, SerializationOp::Decode, e))
}

/// Reject keys the cache cannot store
pub fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        "key must not be empty".to_string()
    } else if key.len() > MAX_KEY_LEN {
        format!("key is {} bytes, limit is {MAX_KEY_LEN}", key.len())
    } else {
        return Ok(());
    };

    Err(Error::InvalidKey {
        key: key.chars().take(64).collect(),
        reason,
        recovery_hint: RecoveryHint::Manual {
            instructions: "Use a non-empty key of at most 1024 bytes".to_string(),
        },
    })
}

/// Backend key for a caller key: SHA-256 hex, safe for any store
pub fn storage_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Digest of a logical input, used to invalidate entries when it changes
pub fn hash_input<T: Serialize + ?Sized>(input: &T) -> Result<String> {
    let serialized = serde_json::to_vec(input).map_err(|e| Error::Serialization {
        key: String::new(),
        operation: SerializationOp::Encode,
        source: Box::new(e),
        recovery_hint: RecoveryHint::Manual {
            instructions: "Check that the input is serializable".to_string(),
        },
    })?;
    Ok(hex::encode(Sha256::digest(&serialized)))
}
