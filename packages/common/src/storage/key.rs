use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::StorageError;

/// Longest filename most filesystems accept.
const MAX_KEY_LEN: usize = 255;

/// A validated blob key: one flat filename inside the blob directory.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobKey(String);

impl BlobKey {
    /// Validate a bare filename.
    ///
    /// Dot-prefixed names are reserved for the store's own bookkeeping (`.tmp/`).
    pub fn parse(name: &str) -> Result<Self, StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidKey("empty filename".into()));
        }
        if name.len() > MAX_KEY_LEN {
            return Err(StorageError::InvalidKey(format!(
                "filename longer than {MAX_KEY_LEN} bytes"
            )));
        }
        if name.starts_with('.') {
            return Err(StorageError::InvalidKey(format!(
                "'{name}' is a reserved dot-entry"
            )));
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(StorageError::InvalidKey(format!(
                "'{name}' is not a flat filename"
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Derive the key from a stored image reference.
    ///
    /// Accepts bare filenames, relative or absolute paths and full URLs; the key is
    /// the final path segment with any query string or fragment removed.
    pub fn from_reference(reference: &str) -> Result<Self, StorageError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(StorageError::InvalidKey("empty reference".into()));
        }

        let without_suffix = trimmed.split(['?', '#']).next().unwrap_or_default();
        let path = match without_suffix.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or_default(),
            None => without_suffix,
        };
        let segment = path.rsplit('/').next().unwrap_or_default();

        Self::parse(segment).map_err(|e| match e {
            StorageError::InvalidKey(msg) => {
                StorageError::InvalidKey(format!("reference '{trimmed}': {msg}"))
            }
            other => other,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobKey({})", self.0)
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BlobKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for BlobKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BlobKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
