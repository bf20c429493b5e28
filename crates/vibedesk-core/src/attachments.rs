//! Note editing session and attachment resolution.
//!
//! The editor keeps the attachments of the open note in memory with their
//! session handles. Incoming snapshots are merged so that an attachment that
//! is already resolved keeps its handle, and attachments the user just added
//! or removed are not undone by a snapshot that predates the write.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use serde_json::json;

use crate::blob::{BlobCache, BlobKey, BlobStore};
use crate::error::{Error, Result};
use crate::handles::{HandleRegistry, ResolvedHandle};
use crate::mirror::{Record, RemoteMirror, SyncWriter};
use crate::models::{Attachment, CollectionRecord, Note};

/// What the UI renders for the open note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorView {
    pub note_id: String,
    pub title: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Default)]
struct EditorState {
    generation: u64,
    note_id: Option<String>,
    title: String,
    content: String,
    attachments: Vec<Attachment>,
    pending_adds: HashSet<String>,
    pending_removals: HashSet<String>,
}

impl EditorState {
    fn stored_attachments(&self) -> serde_json::Value {
        json!(self
            .attachments
            .iter()
            .map(Attachment::to_stored)
            .collect::<Vec<_>>())
    }

    fn unresolved_refs(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.attachments
            .iter()
            .filter(|attachment| attachment.needs_resolution())
            .filter(|attachment| seen.insert(attachment.remote_ref.clone()))
            .map(|attachment| attachment.remote_ref.clone())
            .collect()
    }
}

/// Editing session for one note at a time.
pub struct NoteEditor<S, M> {
    scope: String,
    blobs: BlobCache<S>,
    handles: HandleRegistry,
    writer: SyncWriter<M>,
    state: Mutex<EditorState>,
}

impl<S: BlobStore, M: RemoteMirror> NoteEditor<S, M> {
    pub fn new(
        scope: impl Into<String>,
        blobs: BlobCache<S>,
        handles: HandleRegistry,
        writer: SyncWriter<M>,
    ) -> Self {
        Self {
            scope: scope.into(),
            blobs,
            handles,
            writer,
            state: Mutex::new(EditorState::default()),
        }
    }

    /// Create an "Untitled Note" and open it.
    pub async fn create_note(&self) -> Option<String> {
        let note = Note::untitled();
        let id = self.writer.add(&self.scope, Note::COLLECTION, &note).await?;
        self.open(&Record {
            id: id.clone(),
            data: note,
        });
        Some(id)
    }

    /// Delete a note, closing it if open and dropping its cached files.
    pub async fn delete_note(&self, record: &Record<Note>) -> bool {
        if self.active_note_id().as_deref() == Some(record.id.as_str()) {
            self.close();
        }
        let deleted = self.writer.delete(&Note::path(&self.scope, &record.id)).await;
        if deleted {
            for key in record.data.cached_keys() {
                self.blobs.remove(&BlobKey::new(key)).await;
            }
        }
        deleted
    }

    /// Open `record` for editing. Returns the new generation.
    pub fn open(&self, record: &Record<Note>) -> u64 {
        let mut state = self.lock();
        self.release_handles(&state.attachments);
        state.generation += 1;
        state.note_id = Some(record.id.clone());
        state.title.clone_from(&record.data.title);
        state.content.clone_from(&record.data.content);
        state.attachments = record
            .data
            .attachments
            .iter()
            .cloned()
            .map(Attachment::from)
            .collect();
        state.pending_adds.clear();
        state.pending_removals.clear();
        tracing::debug!(note = %record.id, generation = state.generation, "Opened note");
        state.generation
    }

    /// Close the editor. In-flight resolutions for the old note are discarded.
    pub fn close(&self) {
        let mut state = self.lock();
        self.release_handles(&state.attachments);
        let generation = state.generation + 1;
        *state = EditorState {
            generation,
            ..EditorState::default()
        };
    }

    pub fn view(&self) -> Option<EditorView> {
        let state = self.lock();
        state.note_id.as_ref().map(|note_id| EditorView {
            note_id: note_id.clone(),
            title: state.title.clone(),
            content: state.content.clone(),
            attachments: state.attachments.clone(),
        })
    }

    pub fn active_note_id(&self) -> Option<String> {
        self.lock().note_id.clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Merge a remote snapshot of the open note into the session.
    ///
    /// Returns the cache refs that still need a handle. Snapshots for other
    /// notes are ignored.
    pub fn apply_snapshot(&self, record: &Record<Note>) -> Vec<String> {
        let mut state = self.lock();
        if state.note_id.as_deref() != Some(record.id.as_str()) {
            return Vec::new();
        }

        let remote: Vec<Attachment> = record
            .data
            .attachments
            .iter()
            .cloned()
            .map(Attachment::from)
            .collect();
        let remote_refs: HashSet<&str> = remote.iter().map(|a| a.remote_ref.as_str()).collect();

        // Confirmed by the server, no longer pending
        let EditorState {
            pending_adds,
            pending_removals,
            ..
        } = &mut *state;
        pending_adds.retain(|r| !remote_refs.contains(r.as_str()));
        pending_removals.retain(|r| remote_refs.contains(r.as_str()));

        let mut merged: Vec<Attachment> = remote
            .iter()
            .filter(|incoming| !state.pending_removals.contains(&incoming.remote_ref))
            .map(|incoming| {
                state
                    .attachments
                    .iter()
                    .find(|local| local.remote_ref == incoming.remote_ref && local.resolved.is_some())
                    .map_or_else(
                        || incoming.clone(),
                        |local| Attachment {
                            name: incoming.name.clone(),
                            kind: incoming.kind,
                            remote_ref: incoming.remote_ref.clone(),
                            resolved: local.resolved.clone(),
                        },
                    )
            })
            .collect();
        merged.extend(
            state
                .attachments
                .iter()
                .filter(|local| state.pending_adds.contains(&local.remote_ref))
                .cloned(),
        );

        let kept: HashSet<&ResolvedHandle> =
            merged.iter().filter_map(|a| a.resolved.as_ref()).collect();
        for dropped in state
            .attachments
            .iter()
            .filter_map(|a| a.resolved.as_ref())
            .filter(|handle| !kept.contains(handle))
        {
            self.handles.revoke(dropped);
        }

        state.attachments = merged;
        state.unresolved_refs()
    }

    /// Read every unresolved cached attachment and patch in its handle.
    ///
    /// Reads run concurrently. A result is applied only if the same note is
    /// still open and the attachment is still present and unresolved.
    pub async fn resolve_pending(&self) -> usize {
        let (generation, refs) = {
            let state = self.lock();
            (state.generation, state.unresolved_refs())
        };
        if refs.is_empty() {
            return 0;
        }

        let reads = refs.iter().map(|remote_ref| async move {
            let bytes = self.blobs.get(&BlobKey::new(remote_ref.clone())).await;
            (remote_ref, bytes)
        });
        let results = join_all(reads).await;

        let mut state = self.lock();
        if state.generation != generation {
            tracing::debug!(generation, "Discarding attachment reads for a closed note");
            return 0;
        }

        let mut resolved = 0;
        for (remote_ref, bytes) in results {
            let Some(bytes) = bytes else {
                tracing::debug!(key = %remote_ref, "Attachment not in local cache");
                continue;
            };
            let targets: Vec<&mut Attachment> = state
                .attachments
                .iter_mut()
                .filter(|a| &a.remote_ref == remote_ref && a.resolved.is_none())
                .collect();
            if targets.is_empty() {
                continue;
            }
            let handle = self.handles.create(bytes);
            for attachment in targets {
                attachment.resolved = Some(handle.clone());
            }
            resolved += 1;
        }
        resolved
    }

    /// Attach an uploaded file: cache it, hand out a handle, persist the key.
    ///
    /// A failed cache write leaves the file usable for this session only.
    pub async fn add_file(&self, name: &str, bytes: Vec<u8>) -> Result<Attachment> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("File name cannot be empty".to_string()));
        }
        let (generation, note_id) = self.require_open()?;

        let key = BlobKey::local_upload(&note_id, crate::util::unix_millis_now(), name);
        self.blobs.put(&key, &bytes).await;
        let handle = self.handles.create(bytes);
        let attachment = Attachment::file(name, &key, Some(handle.clone()));

        let Some(fields) = self.push_attachment(generation, attachment.clone()) else {
            self.handles.revoke(&handle);
            return Err(Error::Cancelled);
        };
        self.persist_attachments(&note_id, fields).await;
        Ok(attachment)
    }

    /// Attach a web link, adding `https://` when no scheme is given.
    pub async fn add_link(&self, name: &str, url: &str) -> Result<Attachment> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Link name cannot be empty".to_string()));
        }
        let url = crate::util::normalize_link_url(url)
            .ok_or_else(|| Error::InvalidInput("Link URL cannot be empty".to_string()))?;
        let (generation, note_id) = self.require_open()?;

        let attachment = Attachment::link(name, url);
        let fields = self
            .push_attachment(generation, attachment.clone())
            .ok_or(Error::Cancelled)?;
        self.persist_attachments(&note_id, fields).await;
        Ok(attachment)
    }

    /// Remove the attachment at `index`.
    pub async fn remove(&self, index: usize) -> Result<Attachment> {
        let (note_id, removed, fields) = {
            let mut state = self.lock();
            let Some(note_id) = state.note_id.clone() else {
                return Err(Error::InvalidInput("No note is open".to_string()));
            };
            if index >= state.attachments.len() {
                return Err(Error::NotFound(format!("attachment #{index}")));
            }
            let removed = state.attachments.remove(index);
            state.pending_adds.remove(&removed.remote_ref);
            state.pending_removals.insert(removed.remote_ref.clone());
            (note_id, removed, state.stored_attachments())
        };

        if let Some(handle) = &removed.resolved {
            self.handles.revoke(handle);
        }
        self.persist_attachments(&note_id, fields).await;
        if removed.is_cached() {
            self.blobs.remove(&BlobKey::new(removed.remote_ref.clone())).await;
        }
        Ok(removed)
    }

    /// Save title and content of the open note.
    pub async fn save(&self, title: &str, content: &str) -> Result<bool> {
        let note_id = {
            let mut state = self.lock();
            let note_id = state
                .note_id
                .clone()
                .ok_or_else(|| Error::InvalidInput("No note is open".to_string()))?;
            state.title = title.to_string();
            state.content = content.to_string();
            note_id
        };
        Ok(self
            .writer
            .update(
                &Note::path(&self.scope, &note_id),
                json!({ "title": title, "content": content }),
            )
            .await)
    }

    fn require_open(&self) -> Result<(u64, String)> {
        let state = self.lock();
        state
            .note_id
            .clone()
            .map(|id| (state.generation, id))
            .ok_or_else(|| Error::InvalidInput("No note is open".to_string()))
    }

    fn push_attachment(&self, generation: u64, attachment: Attachment) -> Option<serde_json::Value> {
        let mut state = self.lock();
        if state.generation != generation {
            return None;
        }
        state.pending_removals.remove(&attachment.remote_ref);
        state.pending_adds.insert(attachment.remote_ref.clone());
        state.attachments.push(attachment);
        Some(state.stored_attachments())
    }

    async fn persist_attachments(&self, note_id: &str, attachments: serde_json::Value) {
        self.writer
            .update(
                &Note::path(&self.scope, note_id),
                json!({ "attachments": attachments }),
            )
            .await;
    }

    fn release_handles(&self, attachments: &[Attachment]) {
        for handle in attachments.iter().filter_map(|a| a.resolved.as_ref()) {
            self.handles.revoke(handle);
        }
    }

    fn lock(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{LibSqlBlobStore, QuotaExceededStore};
    use crate::mirror::{LibSqlMirror, Query};
    use crate::models::{AttachmentKind, StoredAttachment};
    use crate::notice::NoticeBoard;
    use pretty_assertions::assert_eq;

    type Editor = NoteEditor<LibSqlBlobStore, LibSqlMirror>;

    async fn editor() -> (Editor, LibSqlBlobStore, HandleRegistry) {
        let notices = NoticeBoard::new();
        let store = LibSqlBlobStore::in_memory();
        let handles = HandleRegistry::new();
        let mirror = LibSqlMirror::open_in_memory().await.unwrap();
        let editor = NoteEditor::new(
            "u1",
            BlobCache::new(store.clone(), notices.clone()),
            handles.clone(),
            SyncWriter::new(mirror, notices),
        );
        (editor, store, handles)
    }

    fn stored_file(key: &str) -> StoredAttachment {
        StoredAttachment {
            name: key.rsplit('_').next().unwrap_or(key).to_string(),
            kind: AttachmentKind::File,
            url: key.to_string(),
            original_key: None,
        }
    }

    fn note_with(id: &str, attachments: Vec<StoredAttachment>) -> Record<Note> {
        let mut note = Note::untitled();
        note.attachments = attachments;
        Record {
            id: id.to_string(),
            data: note,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolved_handle_survives_unrelated_snapshot() {
        let (editor, store, _) = editor().await;
        store
            .put(&BlobKey::new("local:n1_1_a.pdf"), b"pdf")
            .await
            .unwrap();

        let record = note_with("n1", vec![stored_file("local:n1_1_a.pdf")]);
        editor.open(&record);
        assert_eq!(editor.resolve_pending().await, 1);
        let handle = editor.view().unwrap().attachments[0].resolved.clone().unwrap();

        let mut updated = record.clone();
        updated.data.content = "edited elsewhere".to_string();
        let pending = editor.apply_snapshot(&updated);

        assert!(pending.is_empty());
        assert_eq!(
            editor.view().unwrap().attachments[0].resolved.as_ref(),
            Some(&handle)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn changed_ref_is_resolved_again() {
        let (editor, store, _) = editor().await;
        store.put(&BlobKey::new("local:n1_1_a.pdf"), b"a").await.unwrap();
        store.put(&BlobKey::new("local:n1_2_b.pdf"), b"b").await.unwrap();

        editor.open(&note_with("n1", vec![stored_file("local:n1_1_a.pdf")]));
        editor.resolve_pending().await;

        let pending = editor.apply_snapshot(&note_with("n1", vec![stored_file("local:n1_2_b.pdf")]));
        assert_eq!(pending, vec!["local:n1_2_b.pdf".to_string()]);
        assert_eq!(editor.resolve_pending().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_snapshot_keeps_local_add() {
        let (editor, _, _) = editor().await;
        let id = editor.create_note().await.unwrap();
        let before = note_with(&id, Vec::new());

        let added = editor.add_file("clip.wav", b"RIFF".to_vec()).await.unwrap();
        editor.apply_snapshot(&before);

        let view = editor.view().unwrap();
        assert_eq!(view.attachments.len(), 1);
        assert_eq!(view.attachments[0].remote_ref, added.remote_ref);
        assert!(view.attachments[0].resolved.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_file_persists_only_the_key() {
        let (editor, store, _) = editor().await;
        let id = editor.create_note().await.unwrap();

        let added = editor.add_file("clip.wav", b"RIFF".to_vec()).await.unwrap();
        assert!(added.remote_ref.starts_with(&format!("local:{id}_")));
        assert!(added.remote_ref.ends_with("_clip.wav"));
        assert_eq!(
            store.get(&BlobKey::new(added.remote_ref.clone())).await.unwrap(),
            Some(b"RIFF".to_vec())
        );

        let sub = editor
            .writer
            .mirror()
            .subscribe(Query::document(&Note::path("u1", &id)))
            .await
            .unwrap();
        let stored = sub.latest().unwrap().first::<Note>().unwrap();
        assert_eq!(stored.data.attachments[0].url, added.remote_ref);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_link_prefixes_scheme() {
        let (editor, _, _) = editor().await;
        editor.create_note().await.unwrap();

        let link = editor.add_link("Docs", "docs.rs/tokio").await.unwrap();
        assert_eq!(link.remote_ref, "https://docs.rs/tokio");
        assert!(editor.add_link("", "x.com").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn closing_drops_unresolved_attachments() {
        let (editor, store, handles) = editor().await;
        store.put(&BlobKey::new("local:n1_1_a.pdf"), b"a").await.unwrap();
        editor.open(&note_with("n1", vec![stored_file("local:n1_1_a.pdf")]));

        let generation = editor.generation();
        editor.close();
        assert_ne!(editor.generation(), generation);
        assert_eq!(editor.resolve_pending().await, 0);
        assert!(handles.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_revokes_handle_and_survives_stale_snapshot() {
        let (editor, _, handles) = editor().await;
        let id = editor.create_note().await.unwrap();
        let added = editor.add_file("a.txt", b"a".to_vec()).await.unwrap();
        let stale = note_with(&id, vec![added.to_stored()]);

        editor.remove(0).await.unwrap();
        assert!(handles.is_empty());

        editor.apply_snapshot(&stale);
        assert!(editor.view().unwrap().attachments.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn snapshots_for_other_notes_are_ignored() {
        let (editor, _, _) = editor().await;
        editor.open(&note_with("n1", Vec::new()));
        let pending = editor.apply_snapshot(&note_with("n2", vec![stored_file("local:n2_1_x")]));
        assert!(pending.is_empty());
        assert!(editor.view().unwrap().attachments.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_blob_stays_unresolved() {
        let (editor, _, _) = editor().await;
        editor.open(&note_with("n1", vec![stored_file("local:n1_9_gone.pdf")]));
        assert_eq!(editor.resolve_pending().await, 0);
        assert_eq!(
            editor.view().unwrap().attachments[0].open_url(),
            "local:n1_9_gone.pdf"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_without_cache_is_usable_this_session_only() {
        let notices = NoticeBoard::new();
        let mirror = LibSqlMirror::open_in_memory().await.unwrap();
        let handles = HandleRegistry::new();
        let editor = NoteEditor::new(
            "u1",
            BlobCache::new(QuotaExceededStore, notices.clone()),
            handles.clone(),
            SyncWriter::new(mirror.clone(), notices.clone()),
        );
        let id = editor.create_note().await.unwrap();

        let added = editor.add_file("clip.wav", b"RIFF".to_vec()).await.unwrap();
        let handle = added.resolved.clone().unwrap();
        assert_eq!(handles.bytes(handle.as_str()).as_deref(), Some(&b"RIFF"[..]));

        let sub = mirror
            .subscribe(Query::document(&Note::path("u1", &id)))
            .await
            .unwrap();
        let stored = sub.latest().unwrap().first::<Note>().unwrap();
        assert_eq!(stored.data.attachments[0].url, added.remote_ref);

        let reopened = NoteEditor::new(
            "u1",
            BlobCache::new(QuotaExceededStore, notices.clone()),
            HandleRegistry::new(),
            SyncWriter::new(mirror, notices),
        );
        reopened.open(&stored);
        assert_eq!(reopened.resolve_pending().await, 0);
        assert!(reopened.view().unwrap().attachments[0].resolved.is_none());
    }
}
