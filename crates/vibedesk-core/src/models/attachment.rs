//! Attachment model

use serde::{Deserialize, Serialize};

use crate::blob::{BlobKey, LOCAL_KEY_PREFIX};
use crate::handles::ResolvedHandle;

/// What an attachment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// External web link
    Link,
    /// Uploaded file cached in the local blob store
    File,
}

/// Attachment as persisted in the remote mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAttachment {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    /// Blob key or external URL
    pub url: String,
    /// Written by older clients next to a session URL; wins over `url` on read.
    #[serde(default, skip_serializing)]
    pub original_key: Option<String>,
}

/// Attachment as held by an editing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub kind: AttachmentKind,
    /// The only field that is ever persisted.
    pub remote_ref: String,
    /// Session-local handle for cached bytes.
    pub resolved: Option<ResolvedHandle>,
}

impl Attachment {
    pub fn link(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttachmentKind::Link,
            remote_ref: url.into(),
            resolved: None,
        }
    }

    pub fn file(name: impl Into<String>, key: &BlobKey, handle: Option<ResolvedHandle>) -> Self {
        Self {
            name: name.into(),
            kind: AttachmentKind::File,
            remote_ref: key.as_str().to_string(),
            resolved: handle,
        }
    }

    /// Whether `remote_ref` names a blob in the local cache.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.remote_ref.starts_with(LOCAL_KEY_PREFIX)
    }

    /// Cached, but no handle has been derived yet in this session.
    #[must_use]
    pub fn needs_resolution(&self) -> bool {
        self.is_cached() && self.resolved.is_none()
    }

    /// URL a viewer should open: the handle when resolved, else the ref.
    #[must_use]
    pub fn open_url(&self) -> &str {
        self.resolved
            .as_ref()
            .map_or(self.remote_ref.as_str(), ResolvedHandle::as_str)
    }

    /// Persistable form. Never carries a session handle.
    #[must_use]
    pub fn to_stored(&self) -> StoredAttachment {
        StoredAttachment {
            name: self.name.clone(),
            kind: self.kind,
            url: self.remote_ref.clone(),
            original_key: None,
        }
    }
}

impl From<StoredAttachment> for Attachment {
    fn from(stored: StoredAttachment) -> Self {
        let remote_ref = stored
            .original_key
            .filter(|key| !key.trim().is_empty())
            .unwrap_or(stored.url);
        Self {
            name: stored.name,
            kind: stored.kind,
            remote_ref,
            resolved: None,
        }
    }
}
