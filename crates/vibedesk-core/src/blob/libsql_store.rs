//! libSQL-backed blob store.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use super::{BlobKey, BlobStore};
use crate::db::{Database, Schema};
use crate::error::{Error, Result};

/// Application identifier the blob database is named after.
pub const BLOB_DB_NAME: &str = "VibeDeskDB";
/// Object-store namespace inside the blob database.
pub const BLOB_NAMESPACE: &str = "files";

/// Blob store living in its own local libSQL file.
///
/// The connection is opened lazily on first use. Clones share the same
/// underlying connection, and concurrent first calls wait on a single open.
#[derive(Clone)]
pub struct LibSqlBlobStore {
    location: Option<PathBuf>,
    db: Arc<OnceCell<Mutex<Database>>>,
}

impl std::fmt::Debug for LibSqlBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibSqlBlobStore")
            .field("location", &self.location)
            .field("opened", &self.db.initialized())
            .finish()
    }
}

impl LibSqlBlobStore {
    /// Blob store backed by a file at `path`.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Some(path.into()),
            db: Arc::new(OnceCell::new()),
        }
    }

    /// Blob store inside a directory, using the default file name.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::at_path(dir.into().join(format!("{BLOB_DB_NAME}-{BLOB_NAMESPACE}.db")))
    }

    /// Non-durable store for tests and throwaway sessions.
    pub fn in_memory() -> Self {
        Self {
            location: None,
            db: Arc::new(OnceCell::new()),
        }
    }

    /// Open the underlying database. Idempotent and safe to call concurrently.
    pub async fn open(&self) -> Result<&Mutex<Database>> {
        self.db
            .get_or_try_init(|| async {
                let database = match &self.location {
                    Some(path) => {
                        if let Some(parent) = path.parent() {
                            std::fs::create_dir_all(parent)?;
                        }
                        Database::open(path, Schema::Blobs).await
                    }
                    None => Database::open_in_memory(Schema::Blobs).await,
                }
                .map_err(|error| Error::StorageUnavailable(error.to_string()))?;
                tracing::debug!(location = ?self.location, "Opened blob store");
                Ok::<_, Error>(Mutex::new(database))
            })
            .await
    }

    /// Number of cached entries.
    pub async fn len(&self) -> Result<u64> {
        let db = self.open().await?.lock().await;
        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM blobs", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(u64::try_from(row.get::<i64>(0)?).unwrap_or_default()),
            None => Ok(0),
        }
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

impl BlobStore for LibSqlBlobStore {
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<()> {
        let size = i64::try_from(bytes.len())
            .map_err(|_| Error::InvalidInput("blob too large".to_string()))?;
        let db = self.open().await?.lock().await;
        db.connection()
            .execute(
                "INSERT OR REPLACE INTO blobs (key, bytes, size_bytes, created_at) VALUES (?, ?, ?, ?)",
                libsql::params![
                    key.as_str(),
                    bytes.to_vec(),
                    size,
                    crate::util::unix_millis_now()
                ],
            )
            .await
            .map_err(|error| Error::StorageUnavailable(error.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<Option<Vec<u8>>> {
        let db = self.open().await?.lock().await;
        let mut rows = db
            .connection()
            .query("SELECT bytes FROM blobs WHERE key = ?", [key.as_str()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<Vec<u8>>(0)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool> {
        let db = self.open().await?.lock().await;
        let removed = db
            .connection()
            .execute("DELETE FROM blobs WHERE key = ?", [key.as_str()])
            .await?;
        Ok(removed > 0)
    }
}
