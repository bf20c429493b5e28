//! Local libSQL files for the blob cache and the document mirror

use crate::error::{Error, Result};
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;
use std::time::Duration;

use super::migrations::{self, Schema};

/// Embedded-replica settings for the mirror database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfig {
    /// Remote database URL (e.g., `libsql://your-db.turso.io`)
    pub url: Option<String>,
    /// Authentication token for remote database
    pub auth_token: Option<String>,
    /// Automatic pull interval (default: 60 seconds)
    pub sync_interval: Option<Duration>,
}

impl SyncConfig {
    /// Create a new sync configuration
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            auth_token: Some(auth_token.into()),
            sync_interval: Some(Duration::from_secs(60)),
        }
    }

    /// Set the automatic sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Disable automatic sync (manual sync only)
    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.sync_interval = None;
        self
    }

    /// Check if sync is configured
    pub const fn is_configured(&self) -> bool {
        self.url.is_some() && self.auth_token.is_some()
    }
}

/// One local libSQL file backing a single [`Schema`].
pub struct Database {
    db: LibSqlDatabase,
    conn: Connection,
    schema: Schema,
    sync_config: Option<SyncConfig>,
}

impl Database {
    /// Open (or create) a local file and migrate it to `schema`.
    pub async fn open(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        let db = Builder::new_local(path.as_ref()).build().await?;
        Self::prepare(db, schema, None).await
    }

    /// Non-durable database for tests and throwaway sessions.
    pub async fn open_in_memory(schema: Schema) -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::prepare(db, schema, None).await
    }

    /// Open the document mirror as an embedded replica of a remote libSQL
    /// primary. Blobs are never replicated, so this always uses
    /// [`Schema::Documents`].
    pub async fn open_with_sync(
        local_path: impl AsRef<Path>,
        sync_config: SyncConfig,
    ) -> Result<Self> {
        let (Some(url), Some(token)) = (&sync_config.url, &sync_config.auth_token) else {
            return Err(Error::InvalidInput(
                "sync needs both a URL and an auth token".into(),
            ));
        };

        let mut builder =
            Builder::new_remote_replica(local_path.as_ref(), url.clone(), token.clone());
        if let Some(interval) = sync_config.sync_interval {
            builder = builder.sync_interval(interval);
            tracing::debug!(?interval, "Automatic mirror sync enabled");
        }

        let db = builder.build().await?;
        Self::prepare(db, Schema::Documents, Some(sync_config)).await
    }

    async fn prepare(
        db: LibSqlDatabase,
        schema: Schema,
        sync_config: Option<SyncConfig>,
    ) -> Result<Self> {
        let conn = db.connect()?;
        let database = Self {
            db,
            conn,
            schema,
            sync_config,
        };

        // Pull the remote schema first so migrations only fill gaps
        database.sync().await?;
        database.configure().await;
        migrations::run(&database.conn, schema).await?;
        tracing::debug!(?schema, replica = database.is_sync_enabled(), "Database ready");
        Ok(database)
    }

    async fn configure(&self) {
        // Remote replicas reject some pragmas; those failures are ignored
        for pragma in [
            "PRAGMA journal_mode = WAL;",
            "PRAGMA synchronous = NORMAL;",
            "PRAGMA cache_size = 10000;",
        ] {
            if let Err(error) = self.conn.execute(pragma, ()).await {
                tracing::debug!(pragma, "Pragma rejected: {error}");
            }
        }
    }

    /// Pull remote changes when this is an embedded replica. No-op otherwise.
    pub async fn sync(&self) -> Result<()> {
        if self.sync_config.is_some() {
            self.db.sync().await?;
            tracing::debug!(schema = ?self.schema, "Pulled remote changes");
        }
        Ok(())
    }

    pub const fn is_sync_enabled(&self) -> bool {
        self.sync_config.is_some()
    }

    pub const fn schema(&self) -> Schema {
        self.schema
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
