use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageError;
use super::key::BlobKey;

/// One entry of a blob store listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub key: BlobKey,
    /// Last modification time, when the backend can report one.
    pub modified: Option<DateTime<Utc>>,
}

/// Flat, key-addressable blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key`. Readers never observe a partially written blob.
    async fn put(&self, key: &BlobKey, data: &[u8]) -> Result<(), StorageError>;

    /// List every blob currently in the store.
    async fn list(&self) -> Result<Vec<BlobEntry>, StorageError>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &BlobKey) -> Result<bool, StorageError>;

    /// Delete a blob.
    ///
    /// Returns `true` if the blob was deleted, `false` if it did not exist.
    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError>;
}
