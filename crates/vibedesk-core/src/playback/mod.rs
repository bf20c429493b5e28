//! Audio playback: fetch, decode and a single looping output.
//!
//! Sound reaches a device only with the `device-audio` feature; without it
//! [`HostOutput`] is headless.

mod decode;
mod device;
mod engine;
mod fetch;
mod output;

pub use decode::{encode_pcm16_wav, AudioDecoder, DecodedBuffer, MediaDecoder, WavDecoder};
#[cfg(feature = "device-audio")]
pub use device::DeviceOutput;
pub use device::{HostNode, HostOutput};
pub use engine::{LoadHandle, PlaybackEngine, PlaybackStatus, PLAYBACK_ERROR};
pub use fetch::{NetworkFetcher, SourceFetcher};
pub use output::{
    AudioOutput, GainControl, LoopingSamples, NullNode, NullOutput, DEFAULT_VOLUME,
};

/// Engine wired with the network fetcher, the multi-format decoder and the
/// host's audio output.
pub type DefaultEngine = PlaybackEngine<NetworkFetcher, MediaDecoder, HostOutput>;
