//! Single-flight playback engine.
//!
//! Exactly one source is current at a time. Switching source cancels the
//! previous load, and a load that finishes after being superseded is
//! discarded by comparing its generation with the current one.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{AudioDecoder, AudioOutput, DecodedBuffer, GainControl, SourceFetcher};
use crate::error::{Error, ErrorKind, Result};
use crate::notice::NoticeBoard;

/// Message shown when a track cannot be fetched or decoded.
pub const PLAYBACK_ERROR: &str = "Playback error";

/// Observable engine state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Error(String),
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Loading => f.write_str("loading"),
            Self::Ready => f.write_str("ready"),
            Self::Playing => f.write_str("playing"),
            Self::Paused => f.write_str("paused"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

struct Session<N> {
    generation: u64,
    source: Option<String>,
    status: PlaybackStatus,
    buffer: Option<DecodedBuffer>,
    play_intent: bool,
    node: Option<N>,
    cancel: Option<CancellationToken>,
    closed: bool,
}

impl<N> Default for Session<N> {
    fn default() -> Self {
        Self {
            generation: 0,
            source: None,
            status: PlaybackStatus::Idle,
            buffer: None,
            play_intent: false,
            node: None,
            cancel: None,
            closed: false,
        }
    }
}

struct EngineInner<F, D, O: AudioOutput> {
    fetcher: F,
    decoder: D,
    output: O,
    gain: GainControl,
    notices: NoticeBoard,
    status_tx: watch::Sender<PlaybackStatus>,
    session: Mutex<Session<O::Node>>,
}

/// Pending load started by [`PlaybackEngine::set_source`].
#[derive(Debug)]
pub struct LoadHandle {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl LoadHandle {
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait until the load has been applied or discarded.
    pub async fn settled(self) {
        if let Some(task) = self.task {
            if let Err(error) = task.await {
                tracing::warn!(generation = self.generation, "Load task ended abnormally: {error}");
            }
        }
    }
}

/// Fetch, decode and play one looping track at a time.
///
/// Clones share the same engine. Must be used inside a Tokio runtime.
pub struct PlaybackEngine<F, D, O: AudioOutput> {
    inner: Arc<EngineInner<F, D, O>>,
}

impl<F, D, O: AudioOutput> Clone for PlaybackEngine<F, D, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, D, O> PlaybackEngine<F, D, O>
where
    F: SourceFetcher,
    D: AudioDecoder,
    O: AudioOutput,
{
    pub fn new(fetcher: F, decoder: D, output: O, gain: GainControl, notices: NoticeBoard) -> Self {
        let (status_tx, _) = watch::channel(PlaybackStatus::Idle);
        Self {
            inner: Arc::new(EngineInner {
                fetcher,
                decoder,
                output,
                gain,
                notices,
                status_tx,
                session: Mutex::new(Session::default()),
            }),
        }
    }

    /// Make `source` current and start loading it.
    ///
    /// Any in-flight load is cancelled and any live output is stopped. With
    /// `autoplay`, playback starts as soon as the buffer is decoded.
    pub fn set_source(&self, source: impl Into<String>, autoplay: bool) -> LoadHandle {
        let source = source.into();
        let mut session = self.inner.lock();
        if session.closed {
            return LoadHandle {
                generation: session.generation,
                task: None,
            };
        }

        session.generation += 1;
        let generation = session.generation;
        if let Some(previous) = session.cancel.take() {
            previous.cancel();
        }
        self.inner.release_node(&mut session);
        let token = CancellationToken::new();
        session.cancel = Some(token.clone());
        session.source = Some(source.clone());
        session.buffer = None;
        session.play_intent = autoplay;
        self.inner.set_status(&mut session, PlaybackStatus::Loading);
        drop(session);

        tracing::debug!(generation, %source, "Loading source");
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.load(&source, &token).await;
            inner.settle(generation, result);
        });

        LoadHandle {
            generation,
            task: Some(task),
        }
    }

    /// Drop the current source: cancel its load, stop output and return to
    /// `Idle`. The engine stays usable for the next `set_source`.
    pub fn clear_source(&self) {
        let mut session = self.inner.lock();
        if session.closed {
            return;
        }
        session.generation += 1;
        if let Some(token) = session.cancel.take() {
            token.cancel();
        }
        self.inner.release_node(&mut session);
        session.source = None;
        session.buffer = None;
        session.play_intent = false;
        self.inner.set_status(&mut session, PlaybackStatus::Idle);
        tracing::debug!(generation = session.generation, "Source cleared");
    }

    /// Start or resume playback. No-op unless `Ready` or `Paused`.
    pub fn play(&self) -> PlaybackStatus {
        let mut session = self.inner.lock();
        if matches!(session.status, PlaybackStatus::Ready | PlaybackStatus::Paused) {
            session.play_intent = true;
            self.inner.start_node(&mut session);
        }
        session.status.clone()
    }

    /// Pause, keeping the decoded buffer. No-op unless `Playing`.
    pub fn pause(&self) -> PlaybackStatus {
        let mut session = self.inner.lock();
        if session.status == PlaybackStatus::Playing {
            session.play_intent = false;
            self.inner.release_node(&mut session);
            self.inner.set_status(&mut session, PlaybackStatus::Paused);
        }
        session.status.clone()
    }

    /// Flip between playing and paused.
    pub fn toggle(&self) -> PlaybackStatus {
        let status = self.status();
        match status {
            PlaybackStatus::Playing => self.pause(),
            PlaybackStatus::Ready | PlaybackStatus::Paused => self.play(),
            _ => status,
        }
    }

    pub fn set_volume(&self, volume: f32) {
        self.inner.gain.set(volume);
    }

    pub fn volume(&self) -> f32 {
        self.inner.gain.get()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.inner.lock().status.clone()
    }

    /// Receiver observing every status change.
    pub fn watch_status(&self) -> watch::Receiver<PlaybackStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn current_source(&self) -> Option<String> {
        self.inner.lock().source.clone()
    }

    pub fn output(&self) -> &O {
        &self.inner.output
    }

    /// Cancel loads, stop output and release the output context. Idempotent.
    pub fn shutdown(&self) {
        let mut session = self.inner.lock();
        if session.closed {
            return;
        }
        session.closed = true;
        session.generation += 1;
        if let Some(token) = session.cancel.take() {
            token.cancel();
        }
        self.inner.release_node(&mut session);
        session.buffer = None;
        session.play_intent = false;
        self.inner.output.close();
        self.inner.set_status(&mut session, PlaybackStatus::Idle);
        tracing::debug!("Playback engine shut down");
    }
}

impl<F, D, O> EngineInner<F, D, O>
where
    F: SourceFetcher,
    D: AudioDecoder,
    O: AudioOutput,
{
    async fn load(self: &Arc<Self>, source: &str, token: &CancellationToken) -> Result<DecodedBuffer> {
        let bytes = self.fetcher.fetch(source, token).await?;
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let inner = Arc::clone(self);
        let decoded = tokio::task::spawn_blocking(move || inner.decoder.decode(&bytes))
            .await
            .map_err(|error| Error::Playback(format!("decode task failed: {error}")))??;

        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(decoded)
    }

    fn settle(&self, generation: u64, result: Result<DecodedBuffer>) {
        let mut session = self.lock();
        if session.generation != generation {
            tracing::debug!(generation, current = session.generation, "Discarding stale load");
            return;
        }
        session.cancel = None;

        match result {
            Ok(buffer) => {
                tracing::info!(
                    generation,
                    frames = buffer.frames(),
                    sample_rate = buffer.sample_rate,
                    "Track ready"
                );
                session.buffer = Some(buffer);
                self.set_status(&mut session, PlaybackStatus::Ready);
                if session.play_intent {
                    self.start_node(&mut session);
                }
            }
            Err(Error::Cancelled) => {
                tracing::debug!(generation, "Load cancelled");
            }
            Err(error) => {
                tracing::warn!(generation, source = ?session.source, "Playback failed: {error}");
                session.play_intent = false;
                self.set_status(&mut session, PlaybackStatus::Error(PLAYBACK_ERROR.to_string()));
                self.notices
                    .post(ErrorKind::PlaybackFailed, format!("{PLAYBACK_ERROR}: {error}"));
            }
        }
    }

    /// Start a fresh looping node from the current buffer, replacing any live one.
    fn start_node(&self, session: &mut Session<O::Node>) {
        self.release_node(session);
        let Some(buffer) = session.buffer.as_ref() else {
            return;
        };
        match self.output.start(buffer, &self.gain, true) {
            Ok(node) => {
                session.node = Some(node);
                self.set_status(session, PlaybackStatus::Playing);
            }
            Err(error) => {
                tracing::warn!("Could not start output: {error}");
                session.play_intent = false;
                self.set_status(session, PlaybackStatus::Error(PLAYBACK_ERROR.to_string()));
                self.notices
                    .post(ErrorKind::PlaybackFailed, format!("{PLAYBACK_ERROR}: {error}"));
            }
        }
    }

    fn release_node(&self, session: &mut Session<O::Node>) {
        if let Some(node) = session.node.take() {
            self.output.stop(node);
        }
    }

    fn set_status(&self, session: &mut Session<O::Node>, status: PlaybackStatus) {
        if session.status != status {
            session.status = status.clone();
            self.status_tx.send_replace(status);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session<O::Node>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
