//! Local blob cache for binary assets (audio tracks, note attachments).
//!
//! Blobs are keyed by [`BlobKey`] and live only on this device. The remote
//! mirror only ever stores the key, never the bytes.

mod libsql_store;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};
use crate::notice::NoticeBoard;

pub use libsql_store::{LibSqlBlobStore, BLOB_DB_NAME, BLOB_NAMESPACE};

/// Prefix marking a key as cache-internal rather than an external URL.
pub const LOCAL_KEY_PREFIX: &str = "local:";

/// Identifier of a cached binary asset.
///
/// Either `local:<scope>_<timestamp>_<name>` for user uploads, or an external
/// URL used verbatim. A key's bytes never change once written; a new version
/// of a file gets a new key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobKey(String);

impl BlobKey {
    /// Wrap an existing key or URL.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build the key for a file the user just uploaded.
    pub fn local_upload(scope: &str, timestamp_ms: i64, file_name: &str) -> Self {
        Self(format!(
            "{LOCAL_KEY_PREFIX}{scope}_{timestamp_ms}_{}",
            file_name.trim()
        ))
    }

    /// Whether the bytes for this key live in the local blob cache.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_KEY_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlobKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Durable key -> bytes storage.
#[allow(async_fn_in_trait)]
pub trait BlobStore {
    /// Store bytes under `key`, silently replacing any existing entry.
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<()>;

    /// Read the bytes stored under `key`.
    async fn get(&self, key: &BlobKey) -> Result<Option<Vec<u8>>>;

    /// Remove the entry for `key`. Returns whether an entry existed.
    async fn delete(&self, key: &BlobKey) -> Result<bool>;
}

/// Blob store front that never fails its callers.
///
/// Store errors are logged and posted as [`ErrorKind::StorageUnavailable`]
/// notices. A failed `put` simply shows up as a miss on the next `get`.
#[derive(Debug, Clone)]
pub struct BlobCache<S> {
    store: S,
    notices: NoticeBoard,
}

impl<S: BlobStore> BlobCache<S> {
    pub const fn new(store: S, notices: NoticeBoard) -> Self {
        Self { store, notices }
    }

    /// Persist bytes; returns `false` when the cache could not be written.
    pub async fn put(&self, key: &BlobKey, bytes: &[u8]) -> bool {
        match self.store.put(key, bytes).await {
            Ok(()) => {
                tracing::debug!(key = %key, size = bytes.len(), "Cached blob");
                true
            }
            Err(error) => {
                tracing::error!(key = %key, "Blob cache write failed: {error}");
                self.notices.post(
                    ErrorKind::StorageUnavailable,
                    "Could not save file for offline use; it will be available this session only",
                );
                false
            }
        }
    }

    /// Read bytes; returns `None` on a miss or when the cache is unavailable.
    pub async fn get(&self, key: &BlobKey) -> Option<Vec<u8>> {
        match self.store.get(key).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(key = %key, "Blob cache read failed: {error}");
                self.notices.post(
                    ErrorKind::StorageUnavailable,
                    "Offline file cache is unavailable",
                );
                None
            }
        }
    }

    /// Best-effort removal of a cached blob.
    pub async fn remove(&self, key: &BlobKey) -> bool {
        match self.store.delete(key).await {
            Ok(existed) => existed,
            Err(error) => {
                tracing::warn!(key = %key, "Blob cache delete failed: {error}");
                false
            }
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }
}

/// Store that rejects every operation, like a browser over its quota.
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QuotaExceededStore;

#[cfg(test)]
impl BlobStore for QuotaExceededStore {
    async fn put(&self, _key: &BlobKey, _bytes: &[u8]) -> Result<()> {
        Err(crate::Error::StorageUnavailable(
            "QuotaExceededError".to_string(),
        ))
    }

    async fn get(&self, _key: &BlobKey) -> Result<Option<Vec<u8>>> {
        Err(crate::Error::StorageUnavailable("store closed".to_string()))
    }

    async fn delete(&self, _key: &BlobKey) -> Result<bool> {
        Err(crate::Error::StorageUnavailable("store closed".to_string()))
    }
}
