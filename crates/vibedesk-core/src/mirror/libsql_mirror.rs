//! Remote mirror backed by a libSQL database.
//!
//! Locally this is a plain SQLite file. With a [`SyncConfig`] it becomes an
//! embedded replica of a remote libSQL primary, which is what makes the data
//! follow the user across devices.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use libsql::Connection;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    merge_fields, require_object, Direction, DocPath, Query, RawRecord, RemoteMirror, SetMode,
    SnapshotHub, Subscription,
};
use crate::db::{Database, Schema, SyncConfig};
use crate::error::{Error, Result};

/// [`RemoteMirror`] over the `documents` table.
#[derive(Clone)]
pub struct LibSqlMirror {
    db: Arc<Mutex<Database>>,
    hub: Arc<SnapshotHub>,
}

impl std::fmt::Debug for LibSqlMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibSqlMirror")
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

impl LibSqlMirror {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            hub: Arc::new(SnapshotHub::new()),
        }
    }

    /// Open the mirror file, as an embedded replica when sync is configured.
    pub async fn open(path: impl AsRef<Path>, sync: Option<SyncConfig>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match sync {
            Some(config) if config.is_configured() => {
                tracing::info!("Opening mirror as embedded replica");
                Database::open_with_sync(path, config).await?
            }
            _ => Database::open(path, Schema::Documents).await?,
        };
        Ok(Self::new(db))
    }

    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory(Schema::Documents).await?))
    }

    pub fn listener_count(&self) -> usize {
        self.hub.listener_count()
    }

    pub async fn is_sync_enabled(&self) -> bool {
        self.db.lock().await.is_sync_enabled()
    }

    /// Pull remote changes and push fresh snapshots to every listener.
    pub async fn refresh(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.sync().await?;
        for (listener, query) in self.hub.all() {
            self.publish(db.connection(), listener, &query).await;
        }
        Ok(())
    }

    /// Refresh on a fixed interval until `token` is cancelled.
    ///
    /// Failures are logged and retried on the next tick.
    pub fn spawn_refresh_loop(&self, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        let mirror = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = mirror.refresh().await {
                            tracing::warn!("Mirror refresh failed: {error}");
                        }
                    }
                }
            }
            tracing::debug!("Mirror refresh loop stopped");
        })
    }

    async fn publish(&self, conn: &Connection, listener: u64, query: &Query) {
        match read_records(conn, query).await {
            Ok(records) => {
                if let Some(revision) = self.hub.publish(listener, records) {
                    tracing::trace!(listener, revision, "Pushed snapshot");
                }
            }
            Err(error) => {
                tracing::warn!(listener, collection = %query.collection, "Snapshot read failed: {error}");
            }
        }
    }

    async fn publish_changes(&self, conn: &Connection, scope: &str, collection: &str) {
        for (listener, query) in self.hub.watchers(scope, collection) {
            self.publish(conn, listener, &query).await;
        }
    }
}

impl RemoteMirror for LibSqlMirror {
    async fn subscribe(&self, query: Query) -> Result<Subscription> {
        query.validate()?;
        let db = self.db.lock().await;
        let records = read_records(db.connection(), &query).await?;
        let subscription = self.hub.register(query);
        self.hub.publish(subscription.id(), records);
        Ok(subscription)
    }

    async fn add(&self, scope: &str, collection: &str, payload: Value) -> Result<String> {
        require_object(&payload)?;
        let path = DocPath::new(scope, collection, Uuid::now_v7().to_string());
        path.validate()?;

        let db = self.db.lock().await;
        upsert(db.connection(), &path, &payload).await?;
        tracing::debug!(collection, id = %path.id, "Added document");
        self.publish_changes(db.connection(), scope, collection).await;
        Ok(path.id)
    }

    async fn set(&self, path: &DocPath, payload: Value, mode: SetMode) -> Result<()> {
        path.validate()?;
        require_object(&payload)?;

        let db = self.db.lock().await;
        let document = match mode {
            SetMode::Replace => payload,
            SetMode::Merge => {
                let mut existing = read_payload(db.connection(), path)
                    .await?
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                merge_fields(&mut existing, payload);
                existing
            }
        };
        upsert(db.connection(), path, &document).await?;
        self.publish_changes(db.connection(), &path.scope, &path.collection)
            .await;
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: Value) -> Result<()> {
        path.validate()?;
        require_object(&fields)?;

        let db = self.db.lock().await;
        let Some(mut existing) = read_payload(db.connection(), path).await? else {
            return Err(Error::NotFound(format!(
                "{}/{}/{}",
                path.scope, path.collection, path.id
            )));
        };
        merge_fields(&mut existing, fields);
        upsert(db.connection(), path, &existing).await?;
        self.publish_changes(db.connection(), &path.scope, &path.collection)
            .await;
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<()> {
        path.validate()?;

        let db = self.db.lock().await;
        let removed = db
            .connection()
            .execute(
                "DELETE FROM documents WHERE scope = ? AND collection = ? AND id = ?",
                [path.scope.as_str(), path.collection.as_str(), path.id.as_str()],
            )
            .await
            .map_err(write_failed)?;
        if removed > 0 {
            tracing::debug!(collection = %path.collection, id = %path.id, "Deleted document");
            self.publish_changes(db.connection(), &path.scope, &path.collection)
                .await;
        }
        Ok(())
    }
}

fn write_failed(error: libsql::Error) -> Error {
    Error::SyncWriteFailed(error.to_string())
}

async fn upsert(conn: &Connection, path: &DocPath, payload: &Value) -> Result<()> {
    let body = serde_json::to_string(payload)?;
    conn.execute(
        "INSERT INTO documents (scope, collection, id, payload, updated_at) VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(scope, collection, id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
        libsql::params![
            path.scope.as_str(),
            path.collection.as_str(),
            path.id.as_str(),
            body,
            crate::util::unix_millis_now()
        ],
    )
    .await
    .map_err(write_failed)?;
    Ok(())
}

async fn read_payload(conn: &Connection, path: &DocPath) -> Result<Option<Value>> {
    let mut rows = conn
        .query(
            "SELECT payload FROM documents WHERE scope = ? AND collection = ? AND id = ?",
            [path.scope.as_str(), path.collection.as_str(), path.id.as_str()],
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(Some(serde_json::from_str(&row.get::<String>(0)?)?)),
        None => Ok(None),
    }
}

async fn read_records(conn: &Connection, query: &Query) -> Result<Vec<RawRecord>> {
    let sql = snapshot_sql(query);
    let mut rows = match &query.document_id {
        Some(id) => {
            conn.query(
                &sql,
                [query.scope.as_str(), query.collection.as_str(), id.as_str()],
            )
            .await?
        }
        None => {
            conn.query(&sql, [query.scope.as_str(), query.collection.as_str()])
                .await?
        }
    };

    let mut records = Vec::new();
    while let Some(row) = rows.next().await? {
        let id: String = row.get(0)?;
        let body: String = row.get(1)?;
        match serde_json::from_str(&body) {
            Ok(payload) => records.push(RawRecord { id, payload }),
            Err(error) => tracing::warn!(%id, "Skipping unreadable document: {error}"),
        }
    }
    Ok(records)
}

/// Field names are validated by [`Query::validate`] before reaching here.
fn snapshot_sql(query: &Query) -> String {
    let mut sql =
        String::from("SELECT id, payload FROM documents WHERE scope = ? AND collection = ?");
    if query.document_id.is_some() {
        sql.push_str(" AND id = ?");
    }

    let mut terms: Vec<String> = query
        .order_by
        .iter()
        .map(|order| {
            let direction = match order.direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            };
            format!("json_extract(payload, '$.{}') {direction}", order.field)
        })
        .collect();
    terms.push("id ASC".to_string());

    sql.push_str(" ORDER BY ");
    sql.push_str(&terms.join(", "));
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::OrderBy;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn mirror() -> LibSqlMirror {
        LibSqlMirror::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribe_delivers_initial_snapshot() {
        let mirror = mirror().await;
        let mut sub = mirror
            .subscribe(Query::collection("u1", "tasks"))
            .await
            .unwrap();

        let snapshot = sub.next().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(mirror.listener_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writes_push_full_ordered_snapshots() {
        let mirror = mirror().await;
        let mut sub = mirror
            .subscribe(
                Query::collection("u1", "schedule")
                    .order_by(OrderBy::asc("date"))
                    .order_by(OrderBy::asc("time")),
            )
            .await
            .unwrap();
        let first = sub.next().await.unwrap();

        mirror
            .add("u1", "schedule", json!({"title": "late", "date": "2024-05-02", "time": "09:00"}))
            .await
            .unwrap();
        mirror
            .add("u1", "schedule", json!({"title": "early", "date": "2024-05-01", "time": "18:00"}))
            .await
            .unwrap();
        mirror
            .add("u1", "schedule", json!({"title": "earliest", "date": "2024-05-01", "time": "08:30"}))
            .await
            .unwrap();

        let snapshot = sub.next().await.unwrap();
        assert!(snapshot.revision > first.revision);
        let titles: Vec<&str> = snapshot
            .records
            .iter()
            .filter_map(|record| record.payload["title"].as_str())
            .collect();
        assert_eq!(titles, vec!["earliest", "early", "late"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn other_collections_do_not_notify() {
        let mirror = mirror().await;
        let mut sub = mirror
            .subscribe(Query::collection("u1", "tasks"))
            .await
            .unwrap();
        let first = sub.next().await.unwrap();

        mirror.add("u1", "notes", json!({"title": "n"})).await.unwrap();
        mirror.add("u2", "tasks", json!({"text": "x"})).await.unwrap();

        assert_eq!(sub.latest().unwrap().revision, first.revision);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_requires_existing_document() {
        let mirror = mirror().await;
        let path = DocPath::new("u1", "tasks", "missing");

        let error = mirror
            .update(&path, json!({"completed": true}))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_preserves_unrelated_fields() {
        let mirror = mirror().await;
        let path = DocPath::new("u1", "settings", "music");
        mirror
            .set(&path, json!({"name": "Rain", "url": "local:rain"}), SetMode::Replace)
            .await
            .unwrap();
        mirror
            .set(&path, json!({"name": "Storm"}), SetMode::Merge)
            .await
            .unwrap();

        let sub = mirror.subscribe(Query::document(&path)).await.unwrap();
        let snapshot = sub.latest().unwrap();
        assert_eq!(
            snapshot.records[0].payload,
            json!({"name": "Storm", "url": "local:rain"})
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn replace_drops_missing_fields() {
        let mirror = mirror().await;
        let path = DocPath::new("u1", "settings", "music");
        mirror
            .set(&path, json!({"name": "Rain", "url": "local:rain"}), SetMode::Replace)
            .await
            .unwrap();
        mirror
            .set(&path, json!({"name": "Storm"}), SetMode::Replace)
            .await
            .unwrap();

        let sub = mirror.subscribe(Query::document(&path)).await.unwrap();
        assert_eq!(sub.latest().unwrap().records[0].payload, json!({"name": "Storm"}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn document_query_sees_only_its_document() {
        let mirror = mirror().await;
        let id = mirror.add("u1", "notes", json!({"title": "mine"})).await.unwrap();
        mirror.add("u1", "notes", json!({"title": "other"})).await.unwrap();

        let sub = mirror
            .subscribe(Query::document(&DocPath::new("u1", "notes", &id)))
            .await
            .unwrap();
        let snapshot = sub.latest().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records[0].id, id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_removes_and_notifies() {
        let mirror = mirror().await;
        let id = mirror.add("u1", "tasks", json!({"text": "a"})).await.unwrap();
        let mut sub = mirror
            .subscribe(Query::collection("u1", "tasks"))
            .await
            .unwrap();
        assert_eq!(sub.next().await.unwrap().len(), 1);

        mirror.delete(&DocPath::new("u1", "tasks", &id)).await.unwrap();
        assert!(sub.next().await.unwrap().is_empty());

        // Deleting again is a no-op
        mirror.delete(&DocPath::new("u1", "tasks", &id)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_subscription_is_released() {
        let mirror = mirror().await;
        let mut sub = mirror
            .subscribe(Query::collection("u1", "tasks"))
            .await
            .unwrap();
        sub.cancel();

        mirror.add("u1", "tasks", json!({"text": "a"})).await.unwrap();
        assert_eq!(mirror.listener_count(), 0);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_object_payloads_are_rejected() {
        let mirror = mirror().await;
        let error = mirror.add("u1", "tasks", json!("plain")).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn documents_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mirror.db");
        {
            let mirror = LibSqlMirror::open(&path, None).await.unwrap();
            mirror.add("u1", "tasks", json!({"text": "kept"})).await.unwrap();
        }

        let mirror = LibSqlMirror::open(&path, None).await.unwrap();
        let sub = mirror
            .subscribe(Query::collection("u1", "tasks"))
            .await
            .unwrap();
        assert_eq!(sub.latest().unwrap().records[0].payload["text"], "kept");
    }

    #[test]
    fn snapshot_sql_orders_by_fields_then_id() {
        let query = Query::collection("u1", "schedule")
            .order_by(OrderBy::asc("date"))
            .order_by(OrderBy::desc("time"));
        let sql = snapshot_sql(&query);
        assert!(sql.ends_with(
            "ORDER BY json_extract(payload, '$.date') ASC, json_extract(payload, '$.time') DESC, id ASC"
        ));
    }
}
