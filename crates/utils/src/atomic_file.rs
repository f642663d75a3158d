//! Atomic file operations to prevent torn or half-written files

use std::io;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Prefix of the temporary files created while a write is in flight
pub const TEMP_FILE_PREFIX: &str = ".warden-tmp-";

/// Returns true for file names produced by an in-flight atomic write
pub fn is_temp_file_name(name: &str) -> bool {
    name.starts_with(TEMP_FILE_PREFIX)
}

/// Write data to a file atomically by writing to a temporary file and renaming.
///
/// Readers observe either the previous content or the full new content,
/// never a partial write.
pub async fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no parent directory for {}", path.display()),
        )
    })?;

    fs::create_dir_all(parent).await?;

    // Same directory as the target so the rename stays on one filesystem
    let temp_path = parent.join(format!("{TEMP_FILE_PREFIX}{}", Uuid::new_v4()));

    let written = async {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        Ok::<(), io::Error>(())
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    Ok(())
}

/// Write data directly, creating parent directories as needed
pub async fn write_direct(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, content).await
}

/// Remove a file, treating "not found" as success. Returns whether a file was removed.
pub async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
