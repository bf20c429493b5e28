//! Host audio output: the default sound device when one can be opened,
//! otherwise the headless output.

use super::{AudioOutput, DecodedBuffer, GainControl, NullNode, NullOutput};
use crate::error::Result;

#[cfg(feature = "device-audio")]
pub use rodio_output::DeviceOutput;

/// Output chosen at startup.
pub enum HostOutput {
    #[cfg(feature = "device-audio")]
    Device(DeviceOutput),
    Headless(NullOutput),
}

/// Node handed out by [`HostOutput`].
pub enum HostNode {
    #[cfg(feature = "device-audio")]
    Device(rodio::Sink),
    Headless(NullNode),
}

impl HostOutput {
    /// Open the default device, falling back to headless playback when the
    /// build has no device support or no device is available.
    pub fn open() -> Self {
        #[cfg(feature = "device-audio")]
        {
            match DeviceOutput::open_default() {
                Ok(device) => return Self::Device(device),
                Err(error) => tracing::warn!("No audio device, playing headless: {error}"),
            }
        }
        #[cfg(not(feature = "device-audio"))]
        tracing::debug!("Built without device audio, playing headless");

        Self::Headless(NullOutput::new())
    }

    pub fn headless() -> Self {
        Self::Headless(NullOutput::new())
    }

    pub const fn is_device(&self) -> bool {
        !matches!(self, Self::Headless(_))
    }

    /// The headless output, when no device is in use.
    pub const fn headless_output(&self) -> Option<&NullOutput> {
        match self {
            #[cfg(feature = "device-audio")]
            Self::Device(_) => None,
            Self::Headless(output) => Some(output),
        }
    }
}

impl std::fmt::Debug for HostOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "device-audio")]
            Self::Device(_) => f.write_str("HostOutput::Device"),
            Self::Headless(output) => f
                .debug_tuple("HostOutput::Headless")
                .field(output)
                .finish(),
        }
    }
}

impl AudioOutput for HostOutput {
    type Node = HostNode;

    fn start(
        &self,
        buffer: &DecodedBuffer,
        gain: &GainControl,
        looping: bool,
    ) -> Result<HostNode> {
        match self {
            #[cfg(feature = "device-audio")]
            Self::Device(device) => device.start(buffer, gain, looping).map(HostNode::Device),
            Self::Headless(output) => output.start(buffer, gain, looping).map(HostNode::Headless),
        }
    }

    fn stop(&self, node: HostNode) {
        match (self, node) {
            #[cfg(feature = "device-audio")]
            (Self::Device(device), HostNode::Device(sink)) => device.stop(sink),
            (Self::Headless(output), HostNode::Headless(node)) => output.stop(node),
            #[cfg(feature = "device-audio")]
            _ => tracing::warn!("Output node does not belong to this output"),
        }
    }

    fn close(&self) {
        match self {
            #[cfg(feature = "device-audio")]
            Self::Device(device) => device.close(),
            Self::Headless(output) => output.close(),
        }
    }
}

#[cfg(feature = "device-audio")]
mod rodio_output {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

    use super::{AudioOutput, DecodedBuffer, GainControl};
    use crate::error::{Error, Result};
    use crate::playback::LoopingSamples;

    /// Default system sound device through rodio.
    ///
    /// The device stream is not `Send`, so it lives on its own thread until
    /// [`AudioOutput::close`].
    pub struct DeviceOutput {
        handle: OutputStreamHandle,
        release: Mutex<Option<mpsc::Sender<()>>>,
        closed: AtomicBool,
    }

    impl DeviceOutput {
        pub fn open_default() -> Result<Self> {
            let (ready_tx, ready_rx) = mpsc::sync_channel(1);
            let (release_tx, release_rx) = mpsc::channel::<()>();

            std::thread::Builder::new()
                .name("vibedesk-audio".to_string())
                .spawn(move || match OutputStream::try_default() {
                    Ok((stream, handle)) => {
                        if ready_tx.send(Ok(handle)).is_ok() {
                            // Returns once the sender is dropped by close()
                            let _ = release_rx.recv();
                        }
                        drop(stream);
                    }
                    Err(error) => {
                        let _ = ready_tx.send(Err(error.to_string()));
                    }
                })?;

            let handle = ready_rx
                .recv()
                .map_err(|_| Error::Playback("audio thread exited".to_string()))?
                .map_err(Error::Playback)?;
            tracing::info!("Opened default audio device");

            Ok(Self {
                handle,
                release: Mutex::new(Some(release_tx)),
                closed: AtomicBool::new(false),
            })
        }
    }

    impl AudioOutput for DeviceOutput {
        type Node = Sink;

        fn start(
            &self,
            buffer: &DecodedBuffer,
            gain: &GainControl,
            looping: bool,
        ) -> Result<Sink> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(Error::Playback("audio output is closed".to_string()));
            }
            let sink = Sink::try_new(&self.handle)
                .map_err(|error| Error::Playback(format!("audio device: {error}")))?;
            sink.append(DeviceSource(LoopingSamples::new(buffer, gain.clone(), looping)));
            Ok(sink)
        }

        fn stop(&self, node: Sink) {
            node.stop();
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            self.release
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
    }

    struct DeviceSource(LoopingSamples);

    impl Iterator for DeviceSource {
        type Item = f32;

        fn next(&mut self) -> Option<f32> {
            self.0.next()
        }
    }

    impl Source for DeviceSource {
        fn current_frame_len(&self) -> Option<usize> {
            None
        }

        fn channels(&self) -> u16 {
            self.0.channels()
        }

        fn sample_rate(&self) -> u32 {
            self.0.sample_rate()
        }

        fn total_duration(&self) -> Option<Duration> {
            self.0.total_duration()
        }
    }
}
