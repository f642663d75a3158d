//! Payload compression
//!
//! Small payloads are compressed inline. With `use_workers` enabled, payloads
//! of at least `worker_threshold` bytes are handed to the blocking thread
//! pool, at most `max_workers` at a time.

use crate::errors::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Supported compression algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    Gzip,
    Zstd,
}

impl CompressionAlgorithm {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressionConfig {
    /// gzip: 0-9, zstd: 1-22
    pub level: u32,
    pub algorithm: CompressionAlgorithm,
    pub use_workers: bool,
    pub max_workers: usize,
    /// Minimum payload size offloaded to worker threads
    pub worker_threshold: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: 6,
            algorithm: CompressionAlgorithm::Gzip,
            use_workers: false,
            max_workers: 2,
            worker_threshold: 64 * 1024,
        }
    }
}

impl CompressionConfig {
    pub fn validate(&self) -> Result<()> {
        let valid_level = match self.algorithm {
            CompressionAlgorithm::Gzip => self.level <= 9,
            CompressionAlgorithm::Zstd => (1..=22).contains(&self.level),
        };
        if !valid_level {
            return Err(Error::configuration(format!(
                "compression level {} is out of range for {}",
                self.level,
                self.algorithm.as_str()
            )));
        }
        if self.use_workers && self.max_workers == 0 {
            return Err(Error::configuration(
                "compression.maxWorkers must be greater than zero when useWorkers is set",
            ));
        }
        Ok(())
    }
}

/// Compresses payloads according to a [`CompressionConfig`]
#[derive(Debug, Clone)]
pub struct Compressor {
    config: CompressionConfig,
    permits: Arc<Semaphore>,
}

impl Compressor {
    pub fn new(config: CompressionConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self { config, permits }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.config.algorithm
    }

    fn offload(&self, len: usize) -> bool {
        self.config.use_workers && len >= self.config.worker_threshold
    }

    pub async fn compress(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        let algorithm = self.config.algorithm;
        let level = self.config.level;

        if !self.offload(data.len()) {
            return compress_bytes(algorithm, level, &data);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::compression("acquire compression worker", e))?;

        tokio::task::spawn_blocking(move || compress_bytes(algorithm, level, &data))
            .await
            .map_err(|e| Error::compression("compression worker", e))?
    }

    /// Decompress `data`, refusing output larger than `expected_size`
    pub async fn decompress(
        &self,
        algorithm: CompressionAlgorithm,
        data: Vec<u8>,
        expected_size: u64,
    ) -> Result<Vec<u8>> {
        if !self.offload(data.len()) {
            return decompress_bytes(algorithm, &data, expected_size);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::compression("acquire decompression worker", e))?;

        tokio::task::spawn_blocking(move || decompress_bytes(algorithm, &data, expected_size))
            .await
            .map_err(|e| Error::compression("decompression worker", e))?
    }
}

pub fn compress_bytes(algorithm: CompressionAlgorithm, level: u32, data: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::Gzip => {
            let mut encoder = GzEncoder::new(
                Vec::with_capacity(data.len() / 2),
                flate2::Compression::new(level.min(9)),
            );
            encoder
                .write_all(data)
                .map_err(|e| Error::compression("gzip encode", e))?;
            encoder
                .finish()
                .map_err(|e| Error::compression("gzip finish", e))
        }
        CompressionAlgorithm::Zstd => zstd::stream::encode_all(data, level.clamp(1, 22) as i32)
            .map_err(|e| Error::compression("zstd encode", e)),
    }
}

pub fn decompress_bytes(
    algorithm: CompressionAlgorithm,
    data: &[u8],
    expected_size: u64,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_size.min(16 * 1024 * 1024) as usize);
    // One extra byte detects output that outgrows the recorded size
    let limit = expected_size.saturating_add(1);

    let read = match algorithm {
        CompressionAlgorithm::Gzip => GzDecoder::new(data).take(limit).read_to_end(&mut out),
        CompressionAlgorithm::Zstd => zstd::stream::read::Decoder::new(data)
            .and_then(|decoder| decoder.take(limit).read_to_end(&mut out)),
    };
    read.map_err(|e| Error::compression("decompress", e))?;

    if out.len() as u64 != expected_size {
        return Err(Error::compression(
            "decompress",
            format!(
                "decompressed {} bytes, expected {expected_size}",
                out.len()
            ),
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        b"the quick brown fox jumps over the lazy dog ".repeat(200)
    }

    #[tokio::test]
    async fn test_gzip_shrinks_repetitive_data() {
        let compressor = Compressor::new(CompressionConfig::default());
        let data = sample();
        let compressed = compressor.compress(data.clone()).await.unwrap();
        assert!(compressed.len() < data.len());

        let restored = compressor
            .decompress(CompressionAlgorithm::Gzip, compressed, data.len() as u64)
            .await
            .unwrap();
        assert_eq!(restored, data);
    }

    #[tokio::test]
    async fn test_zstd_on_worker_threads() {
        let compressor = Compressor::new(CompressionConfig {
            algorithm: CompressionAlgorithm::Zstd,
            level: 3,
            use_workers: true,
            max_workers: 1,
            worker_threshold: 16,
        });
        let data = sample();
        let compressed = compressor.compress(data.clone()).await.unwrap();
        let restored = compressor
            .decompress(CompressionAlgorithm::Zstd, compressed, data.len() as u64)
            .await
            .unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_decompress_rejects_size_mismatch() {
        let data = sample();
        let compressed = compress_bytes(CompressionAlgorithm::Gzip, 6, &data).unwrap();

        // Shorter limit: output outgrows the recorded size
        let result = decompress_bytes(CompressionAlgorithm::Gzip, &compressed, 10);
        assert!(matches!(result, Err(Error::Compression { .. })));

        let result = decompress_bytes(
            CompressionAlgorithm::Gzip,
            &compressed,
            data.len() as u64 + 5,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_input_fails() {
        let result = decompress_bytes(CompressionAlgorithm::Zstd, b"not zstd at all", 100);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_levels() {
        let mut config = CompressionConfig {
            level: 12,
            ..CompressionConfig::default()
        };
        assert!(config.validate().is_err());
        config.algorithm = CompressionAlgorithm::Zstd;
        assert!(config.validate().is_ok());
        config.level = 0;
        assert!(config.validate().is_err());
    }
}
