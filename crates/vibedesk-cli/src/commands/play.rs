use std::time::Duration;

use vibedesk_core::blob::{BlobKey, BlobStore, LOCAL_KEY_PREFIX};
use vibedesk_core::handles::HandleRegistry;
use vibedesk_core::playback::{
    DefaultEngine, GainControl, HostOutput, MediaDecoder, NetworkFetcher, PlaybackEngine,
    PlaybackStatus,
};
use vibedesk_core::util::is_http_url;
use vibedesk_core::NoticeBoard;

use crate::commands::common::{await_background, Context};
use crate::error::CliError;

/// How a `play` argument is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    CachedBlob(BlobKey),
    Url(String),
    File(String),
}

pub fn classify_source(source: &str) -> SourceKind {
    let source = source.trim();
    if source.starts_with(LOCAL_KEY_PREFIX) {
        SourceKind::CachedBlob(BlobKey::new(source))
    } else if is_http_url(source) {
        SourceKind::Url(source.to_string())
    } else {
        SourceKind::File(source.to_string())
    }
}

async fn resolve_source(
    ctx: &Context,
    handles: &HandleRegistry,
    source: &str,
) -> Result<String, CliError> {
    match classify_source(source) {
        SourceKind::CachedBlob(key) => {
            let bytes = ctx
                .blob_store()
                .get(&key)
                .await?
                .ok_or_else(|| CliError::BlobMissing(key.to_string()))?;
            Ok(handles.create(bytes).to_string())
        }
        SourceKind::Url(url) => Ok(url),
        SourceKind::File(path) => {
            let bytes = tokio::fs::read(&path).await?;
            Ok(handles.create(bytes).to_string())
        }
    }
}

pub async fn run_play(
    ctx: &Context,
    source: &str,
    seconds: u64,
    volume: Option<f32>,
) -> Result<(), CliError> {
    let handles = HandleRegistry::new();
    let engine: DefaultEngine = PlaybackEngine::new(
        NetworkFetcher::new(handles.clone())?,
        MediaDecoder,
        HostOutput::open(),
        GainControl::new(volume.unwrap_or(ctx.config.default_volume)),
        NoticeBoard::new(),
    );
    let source = resolve_source(ctx, &handles, source).await?;

    let mut status = engine.watch_status();
    let reporter = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            println!("{current}");
        }
    });

    engine.set_source(source, true).settled().await;
    let outcome = engine.status();
    if outcome == PlaybackStatus::Playing && seconds > 0 {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
    engine.shutdown();
    drop(engine);
    await_background("status reporter", reporter).await;

    match outcome {
        PlaybackStatus::Error(message) => Err(CliError::Playback(message)),
        _ => Ok(()),
    }
}
