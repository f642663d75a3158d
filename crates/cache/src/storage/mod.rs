//! Backing stores for serialized cache entries
//!
//! The cache treats storage as an opaque byte store keyed by string:
//!
//! - **`MemoryBackend`**: process-local map, useful for tests and ephemeral caches
//! - **`FileSystemBackend`**: one file per key with atomic writes
//! - **`PartitionedStorage`**: shards any backend by key hash

mod backend;
pub mod compression;
mod filesystem;
mod memory;
mod partition;

#[cfg(test)]
mod tests;

pub use backend::{SharedBackend, StorageBackend};
pub use compression::{CompressionAlgorithm, CompressionConfig, Compressor};
pub use filesystem::FileSystemBackend;
pub use memory::MemoryBackend;
pub use partition::{PartitionInfo, PartitionedStorage};
