//! Soft, dismissible user notices for non-fatal failures.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{Error, ErrorKind};

const NOTICE_CAPACITY: usize = 64;

/// A non-blocking message for the UI banner area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserNotice {
    pub kind: ErrorKind,
    pub message: String,
}

/// Fan-out channel of user notices.
///
/// Posting never blocks and never fails; with no listeners the notice is
/// dropped after being logged by the caller.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    sender: broadcast::Sender<UserNotice>,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeBoard {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTICE_CAPACITY);
        Self { sender }
    }

    /// Subscribe to notices posted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<UserNotice> {
        self.sender.subscribe()
    }

    /// Post a notice. Superseded results are never shown.
    pub fn post(&self, kind: ErrorKind, message: impl Into<String>) {
        if kind == ErrorKind::StaleCancelledResult {
            return;
        }
        let _ = self.sender.send(UserNotice {
            kind,
            message: message.into(),
        });
    }

    /// Post an error as a notice of its own kind, if it has one.
    pub fn post_error(&self, context: &str, error: &Error) {
        if let Some(kind) = error.kind() {
            self.post(kind, format!("{context}: {error}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn posted_notices_reach_subscribers() {
        let board = NoticeBoard::new();
        let mut rx = board.subscribe();

        board.post(ErrorKind::SyncWriteFailed, "Could not save event");

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.kind, ErrorKind::SyncWriteFailed);
        assert_eq!(notice.message, "Could not save event");
    }

    #[tokio::test]
    async fn stale_results_are_never_posted() {
        let board = NoticeBoard::new();
        let mut rx = board.subscribe();

        board.post_error("load track", &Error::Cancelled);
        board.post(ErrorKind::PermissionDenied, "notifications blocked");

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.kind, ErrorKind::PermissionDenied);
    }

    #[test]
    fn posting_without_listeners_is_harmless() {
        NoticeBoard::new().post(ErrorKind::StorageUnavailable, "quota");
    }
}
