//! Versioned schemas for the two local database files

use crate::error::Result;
use libsql::Connection;

/// Which store a database file backs. Each file carries exactly one schema
/// and its own `schema_version` history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Local blob cache (`blobs` table)
    Blobs,
    /// Mirrored documents (`documents` table)
    Documents,
}

struct Migration {
    version: i32,
    statements: &'static [&'static str],
}

const SCHEMA_VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
)";

const BLOB_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    statements: &[
        SCHEMA_VERSION_TABLE,
        "CREATE TABLE IF NOT EXISTS blobs (
            key TEXT PRIMARY KEY,
            bytes BLOB NOT NULL,
            size_bytes INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
    ],
}];

const DOCUMENT_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    statements: &[
        SCHEMA_VERSION_TABLE,
        "CREATE TABLE IF NOT EXISTS documents (
            scope TEXT NOT NULL,
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            payload TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (scope, collection, id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(scope, collection)",
    ],
}];

impl Schema {
    const fn migrations(self) -> &'static [Migration] {
        match self {
            Self::Blobs => BLOB_MIGRATIONS,
            Self::Documents => DOCUMENT_MIGRATIONS,
        }
    }

    /// Latest version of this schema.
    pub fn latest_version(self) -> i32 {
        self.migrations()
            .iter()
            .map(|migration| migration.version)
            .max()
            .unwrap_or(0)
    }
}

/// Bring `conn` up to the latest version of `schema`.
pub async fn run(conn: &Connection, schema: Schema) -> Result<()> {
    let version = get_version(conn).await?;

    for migration in schema.migrations() {
        if migration.version > version {
            apply(conn, schema, migration).await?;
        }
    }

    Ok(())
}

pub async fn get_version(conn: &Connection) -> Result<i32> {
    if !table_exists(conn, "schema_version").await? {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            [name],
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(row.get::<i32>(0)? != 0),
        None => Ok(false),
    }
}

/// Apply one migration's statements and record its version atomically.
async fn apply(conn: &Connection, schema: Schema, migration: &Migration) -> Result<()> {
    // libsql has no execute_batch, so each statement runs inside one transaction
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in migration.statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            [migration.version],
        )
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!(
        ?schema,
        version = migration.version,
        latest = schema.latest_version(),
        "Migrated database"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blob_schema_reaches_latest_version() {
        let conn = setup().await;
        run(&conn, Schema::Blobs).await.unwrap();

        assert_eq!(
            get_version(&conn).await.unwrap(),
            Schema::Blobs.latest_version()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn migrations_are_idempotent() {
        let conn = setup().await;
        run(&conn, Schema::Documents).await.unwrap();
        run(&conn, Schema::Documents).await.unwrap();

        assert_eq!(
            get_version(&conn).await.unwrap(),
            Schema::Documents.latest_version()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn each_schema_creates_only_its_own_table() {
        let blobs = setup().await;
        run(&blobs, Schema::Blobs).await.unwrap();
        assert!(table_exists(&blobs, "blobs").await.unwrap());
        assert!(!table_exists(&blobs, "documents").await.unwrap());

        let documents = setup().await;
        run(&documents, Schema::Documents).await.unwrap();
        assert!(table_exists(&documents, "documents").await.unwrap());
        assert!(!table_exists(&documents, "blobs").await.unwrap());
    }
}
