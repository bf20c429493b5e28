//! Note model

use serde::{Deserialize, Serialize};

use super::{CollectionRecord, StoredAttachment};
use crate::mirror::OrderBy;

/// Title given to freshly created notes.
pub const UNTITLED_NOTE: &str = "Untitled Note";

/// A quick note with optional attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<StoredAttachment>,
    /// RFC 3339 creation time
    #[serde(default)]
    pub created_at: String,
}

impl Note {
    /// Create an empty note titled "Untitled Note".
    #[must_use]
    pub fn untitled() -> Self {
        Self {
            title: UNTITLED_NOTE.to_string(),
            content: String::new(),
            attachments: Vec::new(),
            created_at: crate::util::rfc3339_now(),
        }
    }

    /// First line of content, truncated to `max_len` characters
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        self.content
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }

    /// Cache keys of every file attachment.
    #[must_use]
    pub fn cached_keys(&self) -> Vec<String> {
        self.attachments
            .iter()
            .map(|stored| {
                stored
                    .original_key
                    .clone()
                    .unwrap_or_else(|| stored.url.clone())
            })
            .filter(|key| key.starts_with(crate::blob::LOCAL_KEY_PREFIX))
            .collect()
    }
}

impl CollectionRecord for Note {
    const COLLECTION: &'static str = "notes";

    fn ordering() -> Vec<OrderBy> {
        vec![OrderBy::desc("createdAt")]
    }
}
