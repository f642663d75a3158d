//! Integrity digests for serialized payloads
//!
//! Every payload gets a SHA-256 primary digest. An XXH3 secondary digest
//! guards against a collision in a single algorithm, and an HMAC-SHA256 is
//! added when a secret is configured so tampering can be told apart from
//! accidental corruption.

use crate::clock::{system_clock, SharedClock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Result of checksumming a payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumResult {
    pub primary: String,
    pub secondary: Option<String>,
    pub hmac: Option<String>,
    pub algorithm: String,
    pub timestamp: u64,
    pub data_size: u64,
}

/// Which part of a checksum failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestKind {
    Primary,
    Secondary,
    Hmac,
    DataSize,
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Primary => "sha256",
            Self::Secondary => "xxh3",
            Self::Hmac => "hmac-sha256",
            Self::DataSize => "size",
        };
        f.write_str(name)
    }
}

/// Computes and verifies [`ChecksumResult`]s
#[derive(Clone)]
pub struct ChecksumCodec {
    secret: Option<Vec<u8>>,
    secondary: bool,
    clock: SharedClock,
}

impl Default for ChecksumCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChecksumCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumCodec")
            .field("hmac", &self.secret.is_some())
            .field("secondary", &self.secondary)
            .finish()
    }
}

impl ChecksumCodec {
    /// Codec with the secondary digest enabled and no HMAC secret
    pub fn new() -> Self {
        Self {
            secret: None,
            secondary: true,
            clock: system_clock(),
        }
    }

    /// Add an HMAC-SHA256 digest keyed by `secret`. Empty secrets are ignored.
    pub fn with_secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        self.secret = (!secret.is_empty()).then(|| secret.to_vec());
        self
    }

    pub fn with_secondary(mut self, enabled: bool) -> Self {
        self.secondary = enabled;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn compute(&self, bytes: &[u8]) -> ChecksumResult {
        let primary = hex::encode(Sha256::digest(bytes));
        let secondary = self.secondary.then(|| secondary_digest(bytes));
        let hmac = self
            .secret
            .as_deref()
            .map(|secret| hex::encode(hmac_sha256(secret, bytes)));

        let mut algorithm = String::from("sha256");
        if secondary.is_some() {
            algorithm.push_str("+xxh3");
        }
        if hmac.is_some() {
            algorithm.push_str("+hmac-sha256");
        }

        ChecksumResult {
            primary,
            secondary,
            hmac,
            algorithm,
            timestamp: self.clock.now_ms(),
            data_size: bytes.len() as u64,
        }
    }

    pub fn verify(&self, bytes: &[u8], checksum: &ChecksumResult) -> bool {
        self.verify_detailed(bytes, checksum).is_ok()
    }

    /// Verify `bytes` against `checksum`, reporting the first digest that differs.
    ///
    /// A secondary digest is checked whenever the checksum carries one. When
    /// this codec holds a secret, the checksum must carry a matching HMAC.
    pub fn verify_detailed(&self, bytes: &[u8], checksum: &ChecksumResult) -> Result<(), DigestKind> {
        if checksum.data_size != bytes.len() as u64 {
            return Err(DigestKind::DataSize);
        }

        if hex::encode(Sha256::digest(bytes)) != checksum.primary {
            return Err(DigestKind::Primary);
        }

        if let Some(expected) = &checksum.secondary {
            if &secondary_digest(bytes) != expected {
                return Err(DigestKind::Secondary);
            }
        }

        match (&self.secret, &checksum.hmac) {
            (Some(secret), Some(expected)) => {
                let actual = hex::encode(hmac_sha256(secret, bytes));
                if !constant_time_compare(actual.as_bytes(), expected.as_bytes()) {
                    return Err(DigestKind::Hmac);
                }
            }
            // Stripped or unverifiable authentication
            (Some(_), None) | (None, Some(_)) => return Err(DigestKind::Hmac),
            (None, None) => {}
        }

        Ok(())
    }
}

fn secondary_digest(bytes: &[u8]) -> String {
    format!("{:016x}", xxh3_64(bytes))
}

/// HMAC-SHA256 (RFC 2104)
fn hmac_sha256(secret: &[u8], data: &[u8]) -> [u8; 32] {
    const BLOCK_SIZE: usize = 64;
    const IPAD: u8 = 0x36;
    const OPAD: u8 = 0x5C;

    let mut key_padded = [0u8; BLOCK_SIZE];
    if secret.len() > BLOCK_SIZE {
        key_padded[..32].copy_from_slice(&Sha256::digest(secret));
    } else {
        key_padded[..secret.len()].copy_from_slice(secret);
    }

    let ipad_key: Vec<u8> = key_padded.iter().map(|b| b ^ IPAD).collect();
    let opad_key: Vec<u8> = key_padded.iter().map(|b| b ^ OPAD).collect();

    let mut inner = Sha256::new();
    inner.update(&ipad_key);
    inner.update(data);
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(&opad_key);
    outer.update(inner_hash);

    let mut mac = [0u8; 32];
    mac.copy_from_slice(&outer.finalize());
    mac
}

/// Constant-time comparison; runtime depends only on the lengths
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
