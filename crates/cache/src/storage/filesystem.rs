//! File-per-key backend
//!
//! Each `/`-separated key segment is hex encoded, so arbitrary keys map to
//! safe file names and key prefixes become subdirectories.

use super::backend::StorageBackend;
use crate::errors::{Error, RecoveryHint, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use warden_utils::atomic_file;

#[derive(Debug, Clone)]
pub struct FileSystemBackend {
    root: PathBuf,
}

impl FileSystemBackend {
    /// Create the backend, creating `root` if needed
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| Error::Io {
            path: root.clone(),
            operation: "create storage directory",
            source: e,
            recovery_hint: RecoveryHint::CheckPermissions { path: root.clone() },
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            path.push(hex::encode(segment.as_bytes()));
        }
        path
    }

    fn decode_segment(name: &str) -> Option<String> {
        let bytes = hex::decode(name).ok()?;
        String::from_utf8(bytes).ok()
    }
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        atomic_file::write_direct(&self.path_for(key), &bytes)
            .await
            .map_err(|e| Error::storage("put", key, e))
    }

    async fn put_atomic(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        atomic_file::write_atomic(&self.path_for(key), &bytes)
            .await
            .map_err(|e| Error::storage("put_atomic", key, e))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage("get", key, e)),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        atomic_file::remove_if_exists(&self.path_for(key))
            .await
            .map_err(|e| Error::storage("remove", key, e))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending: Vec<(PathBuf, String)> = vec![(self.root.clone(), String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::storage("list", prefix, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::storage("list", prefix.clone(), e))?
            {
                let file_name = entry.file_name();
                let name = file_name.to_string_lossy();
                if atomic_file::is_temp_file_name(&name) {
                    continue;
                }
                let Some(segment) = Self::decode_segment(&name) else {
                    tracing::debug!(file = %name, "Skipping foreign file in storage directory");
                    continue;
                };
                let key = if prefix.is_empty() {
                    segment
                } else {
                    format!("{prefix}/{segment}")
                };

                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Error::storage("list", key.clone(), e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else {
                    keys.push(key);
                }
            }
        }

        Ok(keys)
    }
}
