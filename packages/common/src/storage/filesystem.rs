use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use super::error::StorageError;
use super::key::BlobKey;
use super::traits::{BlobEntry, BlobStore};

/// Filesystem-backed flat blob store.
///
/// Every blob is a regular file directly under `base_path`, named by its key.
/// In-flight writes live in `{base_path}/.tmp/` and are renamed into place.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
}

impl FilesystemBlobStore {
    /// Open (and create if needed) a blob directory.
    pub async fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blob_path(&self, key: &BlobKey) -> PathBuf {
        self.base_path.join(key.as_str())
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }
}

fn map_io(key: &BlobKey, err: std::io::Error) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
        ErrorKind::PermissionDenied => StorageError::PermissionDenied(key.to_string()),
        _ => StorageError::Io(err),
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, key: &BlobKey, data: &[u8]) -> Result<(), StorageError> {
        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(map_io(key, e));
        }

        if let Err(e) = fs::rename(&temp_path, self.blob_path(key)).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(map_io(key, e));
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<BlobEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                debug!(name = ?name, "Skipping non UTF-8 entry in blob directory");
                continue;
            };
            let Ok(key) = BlobKey::parse(name) else {
                continue;
            };

            // The entry may vanish between readdir and stat.
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !meta.is_file() {
                continue;
            }

            entries.push(BlobEntry {
                key,
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError> {
        match fs::metadata(self.blob_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io(key, e)),
        }
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io(key, e)),
        }
    }
}
