//! Session-local handles for cached bytes.
//!
//! A [`ResolvedHandle`] is the playable/openable reference the UI hands to
//! players and viewers. Handles are valid only inside the process that
//! created them and must never be written to the remote mirror.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// URL scheme of session handles.
pub const SESSION_SCHEME: &str = "session:";

/// Opaque, session-scoped reference to in-memory bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedHandle(String);

impl ResolvedHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `url` looks like a session handle.
    pub fn is_session_url(url: &str) -> bool {
        url.starts_with(SESSION_SCHEME)
    }
}

impl fmt::Display for ResolvedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of live session handles. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    entries: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes and mint a fresh handle for them.
    ///
    /// Every call yields a distinct handle, even for identical bytes.
    pub fn create(&self, bytes: impl Into<Arc<[u8]>>) -> ResolvedHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let url = format!("{SESSION_SCHEME}{id}");
        self.write_entries().insert(url.clone(), bytes.into());
        ResolvedHandle(url)
    }

    /// Bytes behind a handle URL, if it is still live.
    pub fn bytes(&self, url: &str) -> Option<Arc<[u8]>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// Release a handle. Returns whether it was live.
    pub fn revoke(&self, handle: &ResolvedHandle) -> bool {
        self.write_entries().remove(handle.as_str()).is_some()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<[u8]>>> {
        self.inner
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
