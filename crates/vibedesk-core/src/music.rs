//! Background track selection.
//!
//! Uploaded tracks are cached locally and referenced remotely by blob key,
//! so a fresh session on the same device can restore them. URL tracks are
//! stored verbatim.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::blob::{BlobCache, BlobKey, BlobStore};
use crate::error::{Error, Result};
use crate::handles::{HandleRegistry, ResolvedHandle};
use crate::mirror::{RemoteMirror, SetMode, Subscription, SyncWriter};
use crate::models::{MusicSetting, SettingsDocument};
use crate::playback::{AudioDecoder, AudioOutput, LoadHandle, PlaybackEngine, SourceFetcher};

/// Track currently loaded into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub name: String,
    /// Blob key or URL as persisted
    pub remote_ref: String,
    /// What the engine actually loads
    pub source: String,
}

#[derive(Debug, Default)]
struct Selection {
    generation: u64,
    current: Option<NowPlaying>,
    handle: Option<ResolvedHandle>,
}

/// Keeps the selected track, its cached bytes and the engine in step.
pub struct MusicController<S, M, F, D, O: AudioOutput> {
    scope: String,
    blobs: BlobCache<S>,
    handles: HandleRegistry,
    writer: SyncWriter<M>,
    engine: PlaybackEngine<F, D, O>,
    selection: Mutex<Selection>,
}

impl<S, M, F, D, O> MusicController<S, M, F, D, O>
where
    S: BlobStore,
    M: RemoteMirror,
    F: SourceFetcher,
    D: AudioDecoder,
    O: AudioOutput,
{
    pub fn new(
        scope: impl Into<String>,
        blobs: BlobCache<S>,
        handles: HandleRegistry,
        writer: SyncWriter<M>,
        engine: PlaybackEngine<F, D, O>,
    ) -> Self {
        Self {
            scope: scope.into(),
            blobs,
            handles,
            writer,
            engine,
            selection: Mutex::new(Selection::default()),
        }
    }

    pub const fn engine(&self) -> &PlaybackEngine<F, D, O> {
        &self.engine
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.lock().current.clone()
    }

    /// Play an uploaded file and remember it for later sessions.
    ///
    /// The track plays even when the local cache rejects the bytes; it is
    /// then simply gone after a reload.
    pub async fn select_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<LoadHandle> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(Error::InvalidInput("File name cannot be empty".to_string()));
        }

        let key = BlobKey::local_upload(&self.scope, crate::util::unix_millis_now(), file_name);
        self.blobs.put(&key, &bytes).await;
        let handle = self.handles.create(bytes);
        let setting = MusicSetting::local(&key, file_name);

        let load = self.switch_to(&setting, Some(handle), true);
        self.writer
            .set(&MusicSetting::path(&self.scope), &setting, SetMode::Replace)
            .await;
        Ok(load)
    }

    /// Play an external stream and remember it.
    pub async fn select_url(&self, url: &str) -> Result<LoadHandle> {
        let url = url.trim();
        if !crate::util::is_http_url(url) {
            return Err(Error::InvalidInput(format!(
                "'{url}' is not an http(s) URL"
            )));
        }

        let setting = MusicSetting::external(url);
        let load = self.switch_to(&setting, None, true);
        self.writer
            .set(&MusicSetting::path(&self.scope), &setting, SetMode::Replace)
            .await;
        Ok(load)
    }

    /// Bring the engine in line with the persisted setting.
    ///
    /// Unchanged refs keep their current handle. A cached track whose bytes
    /// are gone leaves no track selected. A selection made while the cache
    /// read was in flight wins over the snapshot.
    pub async fn apply_snapshot(&self, setting: Option<&MusicSetting>) -> Option<LoadHandle> {
        let setting = setting.filter(|s| !s.url.trim().is_empty())?;
        let generation = {
            let selection = self.lock();
            if selection
                .current
                .as_ref()
                .is_some_and(|current| current.remote_ref == setting.url)
            {
                return None;
            }
            selection.generation
        };

        let key = setting.key();
        if !key.is_local() {
            return self.switch_if_current(generation, setting, None);
        }

        match self.blobs.get(&key).await {
            Some(bytes) => {
                let handle = self.handles.create(bytes);
                let load = self.switch_if_current(generation, setting, Some(handle.clone()));
                if load.is_none() {
                    self.handles.revoke(&handle);
                }
                load
            }
            None => {
                tracing::info!(key = %key, "Saved track is not cached on this device");
                let mut selection = self.lock();
                if selection.generation == generation {
                    self.clear(&mut selection);
                    self.engine.clear_source();
                }
                None
            }
        }
    }

    /// Follow the `settings/music` document until the subscription ends.
    pub async fn run(&self, mut subscription: Subscription) {
        while let Some(snapshot) = subscription.next().await {
            let setting = snapshot.first::<MusicSetting>().map(|record| record.data);
            if let Some(load) = self.apply_snapshot(setting.as_ref()).await {
                tracing::debug!(generation = load.generation(), "Restored saved track");
            }
        }
    }

    fn switch_if_current(
        &self,
        generation: u64,
        setting: &MusicSetting,
        handle: Option<ResolvedHandle>,
    ) -> Option<LoadHandle> {
        if self.lock().generation != generation {
            tracing::debug!("Newer track selection wins over saved setting");
            return None;
        }
        Some(self.switch_to(setting, handle, false))
    }

    fn switch_to(
        &self,
        setting: &MusicSetting,
        handle: Option<ResolvedHandle>,
        autoplay: bool,
    ) -> LoadHandle {
        let source = handle
            .as_ref()
            .map_or_else(|| setting.url.clone(), |h| h.as_str().to_string());

        let mut selection = self.lock();
        self.clear(&mut selection);
        selection.current = Some(NowPlaying {
            name: setting.name.clone(),
            remote_ref: setting.url.clone(),
            source: source.clone(),
        });
        selection.handle = handle;

        // Engine calls happen under the selection lock so a concurrent
        // clear cannot land between the two.
        self.engine.set_source(source, autoplay)
    }

    fn clear(&self, selection: &mut Selection) {
        selection.generation += 1;
        selection.current = None;
        if let Some(previous) = selection.handle.take() {
            self.handles.revoke(&previous);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
