use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vibedesk_core::alerts::{AlertEngine, AlertSink, Permission, SystemClock};
use vibedesk_core::handles::HandleRegistry;
use vibedesk_core::mirror::{LibSqlMirror, RemoteMirror, SyncWriter};
use vibedesk_core::models::{CollectionRecord, ScheduleEvent};
use vibedesk_core::playback::{
    AudioDecoder, AudioOutput, GainControl, HostOutput, MediaDecoder, NetworkFetcher,
    SourceFetcher,
};
use vibedesk_core::NoticeBoard;

use crate::commands::common::{await_background, Context};
use crate::error::CliError;

/// Plays each alert sound once through an audio output.
pub struct SoundPlayer<O> {
    fetcher: NetworkFetcher,
    output: Arc<O>,
    gain: GainControl,
    playing: Mutex<Vec<JoinHandle<()>>>,
}

impl<O: AudioOutput> SoundPlayer<O> {
    pub fn new(fetcher: NetworkFetcher, output: O, gain: GainControl) -> Self {
        Self {
            fetcher,
            output: Arc::new(output),
            gain,
            playing: Mutex::new(Vec::new()),
        }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Start playing `source` in the background. Failures are logged.
    pub fn play(&self, source: &str) {
        let source = source.to_string();
        let fetcher = self.fetcher.clone();
        let output = Arc::clone(&self.output);
        let gain = self.gain.clone();

        let task = tokio::spawn(async move {
            let played = async {
                let bytes = fetcher.fetch(&source, &CancellationToken::new()).await?;
                let buffer = tokio::task::spawn_blocking(move || MediaDecoder.decode(&bytes))
                    .await
                    .map_err(|error| {
                        vibedesk_core::Error::Playback(format!("decode task failed: {error}"))
                    })??;
                let node = output.start(&buffer, &gain, false)?;
                tokio::time::sleep(buffer.duration()).await;
                output.stop(node);
                Ok::<_, vibedesk_core::Error>(())
            };
            if let Err(error) = played.await {
                tracing::warn!(%source, "Alert sound failed: {error}");
            }
        });

        let mut playing = self.playing.lock().unwrap_or_else(PoisonError::into_inner);
        playing.retain(|task| !task.is_finished());
        playing.push(task);
    }

    /// Wait for sounds still playing.
    pub async fn finish(&self) {
        let tasks = std::mem::take(
            &mut *self.playing.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            await_background("alert sound", task).await;
        }
    }
}

/// Prints alerts to the terminal and plays the alert sound. System
/// notifications are only shown when the user opted in.
pub struct TerminalSink {
    pub notify: bool,
    pub sound: Option<SoundPlayer<HostOutput>>,
}

impl TerminalSink {
    pub fn new(notify: bool) -> Self {
        let sound = match NetworkFetcher::new(HandleRegistry::new()) {
            Ok(fetcher) => Some(SoundPlayer::new(
                fetcher,
                HostOutput::open(),
                GainControl::default(),
            )),
            Err(error) => {
                tracing::warn!("Alert sounds disabled: {error}");
                None
            }
        };
        Self { notify, sound }
    }
}

impl AlertSink for TerminalSink {
    fn play_sound(&self, url: &str) {
        match &self.sound {
            Some(player) if player.output().is_device() => player.play(url),
            _ => {
                tracing::debug!(url, "Alert sound (terminal bell)");
                print!("\x07");
            }
        }
    }

    fn banner(&self, title: &str, message: &str) {
        println!("{}", format_banner(title, message));
    }

    fn permission(&self) -> Permission {
        if self.notify {
            Permission::Granted
        } else {
            Permission::Denied
        }
    }

    fn system_notification(&self, title: &str, body: &str) {
        println!("(notification) {title}: {body}");
    }

    fn contact_alert(&self, message: &str) {
        println!("{message}");
    }
}

pub fn format_banner(title: &str, message: &str) -> String {
    format!("[{title}] {message}")
}

fn engine(
    ctx: &Context,
    mirror: LibSqlMirror,
    notices: NoticeBoard,
    notify: bool,
) -> AlertEngine<LibSqlMirror, TerminalSink, SystemClock> {
    AlertEngine::new(
        ctx.scope.clone(),
        ctx.config.alert_settings(ctx.contact.as_deref()),
        SyncWriter::new(mirror, notices),
        TerminalSink::new(notify),
        SystemClock,
    )
}

pub async fn run_alerts_watch(ctx: &Context, notify: bool) -> Result<(), CliError> {
    let mirror = ctx.open_mirror().await?;
    let notices = NoticeBoard::new();
    let mut notice_rx = notices.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(notice) = notice_rx.recv().await {
            eprintln!("warning: {}", notice.message);
        }
    });

    let stop = CancellationToken::new();
    let refresh = ctx
        .config
        .sync_config()
        .and_then(|sync| sync.sync_interval)
        .map(|interval| mirror.spawn_refresh_loop(interval, stop.clone()));

    let subscription = mirror.subscribe(ScheduleEvent::query(&ctx.scope)).await?;
    let engine = Arc::new(engine(ctx, mirror, notices, notify));
    let task = Arc::clone(&engine).spawn(subscription, ctx.config.alert_poll_interval());
    println!("Watching scheduled events for '{}'. Press Ctrl-C to stop.", ctx.scope);

    let signal = tokio::signal::ctrl_c().await;
    task.join().await;
    stop.cancel();
    if let Some(refresh) = refresh {
        await_background("mirror refresh", refresh).await;
    }
    if let Some(sound) = &engine.sink().sound {
        sound.finish().await;
    }
    printer.abort();
    signal?;
    Ok(())
}

pub async fn run_alerts_test(ctx: &Context, notify: bool) -> Result<(), CliError> {
    let mirror = ctx.open_mirror().await?;
    let engine = engine(ctx, mirror, NoticeBoard::new(), notify);
    engine.fire_test();
    if let Some(sound) = &engine.sink().sound {
        sound.finish().await;
    }
    Ok(())
}
