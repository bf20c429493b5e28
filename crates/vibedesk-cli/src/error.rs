use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] vibedesk_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("No {collection} entry found for id/prefix: {id}")]
    NotFound { collection: &'static str, id: String },
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Could not save {0}; see the log for details")]
    WriteFailed(&'static str),
    #[error("No cached blob for key: {0}")]
    BlobMissing(String),
    #[error("Playback failed: {0}")]
    Playback(String),
    #[error(
        "Sync is not configured. Add a `sync` block to the config file, or set VIBEDESK_SYNC_URL and VIBEDESK_SYNC_TOKEN."
    )]
    SyncNotConfigured,
}
