//! Remote mirror: push-subscribable document collections.
//!
//! Every subscription receives full, ordered snapshots of its query (never
//! deltas). Writes are last-writer-wins per top-level field.

mod hub;
mod libsql_mirror;
mod writer;

use std::future::Future;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub use hub::{SnapshotHub, Subscription};
pub use libsql_mirror::LibSqlMirror;
pub use writer::SyncWriter;

/// Location of one document: `<scope>/<collection>/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub scope: String,
    pub collection: String,
    pub id: String,
}

impl DocPath {
    pub fn new(
        scope: impl Into<String>,
        collection: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_segment("scope", &self.scope)?;
        validate_segment("collection", &self.collection)?;
        validate_segment("id", &self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// One ordering term over a top-level payload field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

/// A subscription target: a whole collection, or one document in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub scope: String,
    pub collection: String,
    pub document_id: Option<String>,
    pub order_by: Vec<OrderBy>,
}

impl Query {
    pub fn collection(scope: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            collection: collection.into(),
            document_id: None,
            order_by: Vec::new(),
        }
    }

    pub fn document(path: &DocPath) -> Self {
        Self {
            scope: path.scope.clone(),
            collection: path.collection.clone(),
            document_id: Some(path.id.clone()),
            order_by: Vec::new(),
        }
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Whether a write to `scope/collection` can change this query's result.
    pub fn watches(&self, scope: &str, collection: &str) -> bool {
        self.scope == scope && self.collection == collection
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_segment("scope", &self.scope)?;
        validate_segment("collection", &self.collection)?;
        if let Some(id) = &self.document_id {
            validate_segment("id", id)?;
        }
        for order in &self.order_by {
            if !field_name_pattern().is_match(&order.field) {
                return Err(Error::InvalidInput(format!(
                    "invalid order-by field '{}'",
                    order.field
                )));
            }
        }
        Ok(())
    }
}

/// How `set` treats an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Overwrite the whole payload.
    Replace,
    /// Overwrite only the provided top-level fields.
    Merge,
}

/// Untyped document as stored in the mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    pub payload: Value,
}

/// Typed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: String,
    pub data: T,
}

/// Full, ordered result set of a query at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Strictly increasing across the snapshots one subscription observes.
    pub revision: u64,
    pub records: Vec<RawRecord>,
}

impl Snapshot {
    /// Decode every record as `T`, skipping (and logging) malformed ones.
    pub fn decode<T: DeserializeOwned>(&self) -> Vec<Record<T>> {
        self.records
            .iter()
            .filter_map(|record| match serde_json::from_value(record.payload.clone()) {
                Ok(data) => Some(Record {
                    id: record.id.clone(),
                    data,
                }),
                Err(error) => {
                    tracing::warn!(id = %record.id, "Skipping malformed record: {error}");
                    None
                }
            })
            .collect()
    }

    /// Decode the first record, used for single-document queries.
    pub fn first<T: DeserializeOwned>(&self) -> Option<Record<T>> {
        self.decode().into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Backing document store consumed by every domain feature.
///
/// Reconnection and backoff belong to the implementation; callers only see
/// snapshots and write results.
pub trait RemoteMirror: Send + Sync {
    /// Open a push subscription delivering full ordered snapshots.
    fn subscribe(&self, query: Query) -> impl Future<Output = Result<Subscription>> + Send;

    /// Create a document with a generated id and return the id.
    fn add(
        &self,
        scope: &str,
        collection: &str,
        payload: Value,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Create or overwrite a document.
    fn set(
        &self,
        path: &DocPath,
        payload: Value,
        mode: SetMode,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Merge fields into an existing document; fails with `NotFound` if absent.
    fn update(&self, path: &DocPath, fields: Value) -> impl Future<Output = Result<()>> + Send;

    /// Remove a document. Removing a missing document is not an error.
    fn delete(&self, path: &DocPath) -> impl Future<Output = Result<()>> + Send;
}

impl<M: RemoteMirror> RemoteMirror for Arc<M> {
    fn subscribe(&self, query: Query) -> impl Future<Output = Result<Subscription>> + Send {
        (**self).subscribe(query)
    }

    fn add(
        &self,
        scope: &str,
        collection: &str,
        payload: Value,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).add(scope, collection, payload)
    }

    fn set(
        &self,
        path: &DocPath,
        payload: Value,
        mode: SetMode,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).set(path, payload, mode)
    }

    fn update(&self, path: &DocPath, fields: Value) -> impl Future<Output = Result<()>> + Send {
        (**self).update(path, fields)
    }

    fn delete(&self, path: &DocPath) -> impl Future<Output = Result<()>> + Send {
        (**self).delete(path)
    }
}

/// Merge `incoming` top-level fields over `existing` (field-level LWW).
pub fn merge_fields(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(current), Value::Object(fields)) => {
            for (key, value) in fields {
                current.insert(key, value);
            }
        }
        (slot, replacement) => *slot = replacement,
    }
}

pub(crate) fn require_object(payload: &Value) -> Result<()> {
    if payload.is_object() {
        Ok(())
    } else {
        Err(Error::InvalidInput(
            "document payload must be a JSON object".to_string(),
        ))
    }
}

fn validate_segment(label: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() || value.contains('/') {
        return Err(Error::InvalidInput(format!(
            "{label} must be non-empty and must not contain '/'"
        )));
    }
    Ok(())
}

fn field_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn merge_fields_overwrites_only_given_keys() {
        let mut doc = json!({"title": "a", "done": false, "streak": 2});
        merge_fields(&mut doc, json!({"done": true}));
        assert_eq!(doc, json!({"title": "a", "done": true, "streak": 2}));
    }

    #[test]
    fn query_rejects_injection_in_order_field() {
        let query = Query::collection("u1", "tasks").order_by(OrderBy::asc("title; DROP TABLE"));
        assert!(query.validate().is_err());

        let query = Query::collection("u1", "tasks").order_by(OrderBy::asc("created_at"));
        assert!(query.validate().is_ok());
    }

    #[test]
    fn doc_path_rejects_empty_and_nested_segments() {
        assert!(DocPath::new("u1", "tasks", "").validate().is_err());
        assert!(DocPath::new("u1", "a/b", "x").validate().is_err());
        assert!(DocPath::new("u1", "tasks", "x").validate().is_ok());
    }

    #[test]
    fn snapshot_decode_skips_malformed_records() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Item {
            title: String,
        }

        let snapshot = Snapshot {
            revision: 1,
            records: vec![
                RawRecord {
                    id: "a".to_string(),
                    payload: json!({"title": "ok"}),
                },
                RawRecord {
                    id: "b".to_string(),
                    payload: json!({"title": 5}),
                },
            ],
        };

        let items = snapshot.decode::<Item>();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[0].data.title, "ok");
    }
}
