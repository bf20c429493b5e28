//! Fire-and-forget write front for UI-originated changes.

use serde::Serialize;
use serde_json::Value;

use super::{DocPath, RemoteMirror, SetMode};
use crate::error::{ErrorKind, Result};
use crate::notice::NoticeBoard;

const WRITE_FAILED_MESSAGE: &str = "Could not save your changes. They will be lost on reload.";

/// Wraps a mirror so that write failures become notices instead of errors.
///
/// Local optimistic state is left as-is on failure; the next snapshot
/// reconciles it.
#[derive(Debug, Clone)]
pub struct SyncWriter<M> {
    mirror: M,
    notices: NoticeBoard,
}

impl<M: RemoteMirror> SyncWriter<M> {
    pub const fn new(mirror: M, notices: NoticeBoard) -> Self {
        Self { mirror, notices }
    }

    pub const fn mirror(&self) -> &M {
        &self.mirror
    }

    pub const fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    /// Create a document; returns its id, or `None` when the write failed.
    pub async fn add(
        &self,
        scope: &str,
        collection: &str,
        payload: &impl Serialize,
    ) -> Option<String> {
        let result = match serde_json::to_value(payload) {
            Ok(value) => self.mirror.add(scope, collection, value).await,
            Err(error) => Err(error.into()),
        };
        self.settle(collection, "add", result)
    }

    pub async fn set(&self, path: &DocPath, payload: &impl Serialize, mode: SetMode) -> bool {
        let result = match serde_json::to_value(payload) {
            Ok(value) => self.mirror.set(path, value, mode).await,
            Err(error) => Err(error.into()),
        };
        self.settle(&path.collection, "set", result).is_some()
    }

    pub async fn update(&self, path: &DocPath, fields: Value) -> bool {
        let result = self.mirror.update(path, fields).await;
        self.settle(&path.collection, "update", result).is_some()
    }

    pub async fn delete(&self, path: &DocPath) -> bool {
        let result = self.mirror.delete(path).await;
        self.settle(&path.collection, "delete", result).is_some()
    }

    fn settle<T>(&self, collection: &str, op: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::error!(collection, op, "Mirror write failed: {error}");
                self.notices
                    .post(ErrorKind::SyncWriteFailed, WRITE_FAILED_MESSAGE);
                None
            }
        }
    }
}
