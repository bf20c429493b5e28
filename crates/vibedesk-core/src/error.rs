//! Error types for vibedesk-core

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using vibedesk-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vibedesk-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record or blob not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local blob cache could not be opened, read or written
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A write to the remote mirror was rejected
    #[error("Sync write failed: {0}")]
    SyncWriteFailed(String),

    /// Fetching or decoding an audio source failed
    #[error("Playback failed: {0}")]
    Playback(String),

    /// Audio payload could not be decoded
    #[error("Audio decode error: {0}")]
    Decode(#[from] hound::Error),

    /// Compressed audio could not be read or decoded
    #[error("Audio decode error: {0}")]
    Media(#[from] symphonia::core::errors::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The operation was superseded by a newer request
    #[error("Superseded by a newer request")]
    Cancelled,
}

impl Error {
    /// Classify this error for user-facing handling.
    ///
    /// Returns `None` for configuration and programming errors that have no
    /// soft-failure treatment.
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Database(_) | Self::LibSql(_) | Self::Io(_) | Self::StorageUnavailable(_) => {
                Some(ErrorKind::StorageUnavailable)
            }
            Self::SyncWriteFailed(_) => Some(ErrorKind::SyncWriteFailed),
            Self::Playback(_) | Self::Decode(_) | Self::Media(_) | Self::Http(_) => {
                Some(ErrorKind::PlaybackFailed)
            }
            Self::Cancelled => Some(ErrorKind::StaleCancelledResult),
            Self::NotFound(_) | Self::InvalidInput(_) | Self::Serialization(_) => None,
        }
    }

    /// Whether this error only signals a superseded request.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure categories surfaced to the user as non-blocking notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Local cache open/read/write failed; session-only handles are used instead.
    StorageUnavailable,
    /// A remote write was rejected; optimistic local state is kept.
    SyncWriteFailed,
    /// Fetch or decode failed; play intent is cleared.
    PlaybackFailed,
    /// Notification permission is not granted; banner and sound only.
    PermissionDenied,
    /// Result of a superseded async operation; discarded silently.
    StaleCancelledResult,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::StorageUnavailable => "storage unavailable",
            Self::SyncWriteFailed => "sync write failed",
            Self::PlaybackFailed => "playback failed",
            Self::PermissionDenied => "permission denied",
            Self::StaleCancelledResult => "stale result",
        };
        f.write_str(label)
    }
}
