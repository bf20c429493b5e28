//! Shared audio output context and gain.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::DecodedBuffer;
use crate::error::{Error, Result};

/// Default master volume.
pub const DEFAULT_VOLUME: f32 = 0.5;

/// Master volume shared by every node started on an output.
///
/// Changes apply to live playback immediately.
#[derive(Debug, Clone)]
pub struct GainControl(Arc<AtomicU32>);

impl GainControl {
    pub fn new(volume: f32) -> Self {
        Self(Arc::new(AtomicU32::new(clamp_volume(volume).to_bits())))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Set the volume, clamped to `[0.0, 1.0]`.
    pub fn set(&self, volume: f32) {
        self.0
            .store(clamp_volume(volume).to_bits(), Ordering::Relaxed);
    }
}

impl Default for GainControl {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME)
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        DEFAULT_VOLUME
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// An audio output context (device, sink) that plays decoded buffers.
///
/// Created once per session and shared across track switches.
pub trait AudioOutput: Send + Sync + 'static {
    /// Live playback of one buffer.
    type Node: Send + 'static;

    /// Start playing `buffer` through `gain`, restarting at the end when
    /// `looping`.
    fn start(&self, buffer: &DecodedBuffer, gain: &GainControl, looping: bool)
        -> Result<Self::Node>;

    /// Stop and release a node.
    fn stop(&self, node: Self::Node);

    /// Release the context. Later `start` calls fail.
    fn close(&self);
}

/// Sample stream over a decoded buffer with live gain applied.
///
/// Device outputs pull from this; with `looping` it wraps to the start
/// instead of ending.
#[derive(Debug, Clone)]
pub struct LoopingSamples {
    samples: Arc<[f32]>,
    position: usize,
    channels: u16,
    sample_rate: u32,
    gain: GainControl,
    looping: bool,
}

impl LoopingSamples {
    pub fn new(buffer: &DecodedBuffer, gain: GainControl, looping: bool) -> Self {
        Self {
            samples: Arc::clone(&buffer.samples),
            position: 0,
            channels: buffer.channels,
            sample_rate: buffer.sample_rate,
            gain,
            looping,
        }
    }

    pub const fn channels(&self) -> u16 {
        self.channels
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of one pass, or `None` when looping forever.
    pub fn total_duration(&self) -> Option<Duration> {
        if self.looping {
            return None;
        }
        let buffer = DecodedBuffer {
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: Arc::clone(&self.samples),
        };
        Some(buffer.duration())
    }
}

impl Iterator for LoopingSamples {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.samples.len() {
            if !self.looping || self.samples.is_empty() {
                return None;
            }
            self.position = 0;
        }
        let sample = self.samples[self.position];
        self.position += 1;
        Some(sample * self.gain.get())
    }
}

/// Headless output: accepts buffers and tracks node lifetimes without
/// producing sound.
#[derive(Debug, Clone, Default)]
pub struct NullOutput {
    inner: Arc<NullOutputInner>,
}

#[derive(Debug, Default)]
struct NullOutputInner {
    next_node: AtomicU64,
    live: AtomicUsize,
    started: AtomicUsize,
    closed: AtomicBool,
}

/// Node handed out by [`NullOutput`].
#[derive(Debug, PartialEq, Eq)]
pub struct NullNode {
    pub id: u64,
    pub frames: usize,
    pub looping: bool,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes started and not yet stopped.
    pub fn live_nodes(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Total nodes ever started.
    pub fn starts(&self) -> usize {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl AudioOutput for NullOutput {
    type Node = NullNode;

    fn start(&self, buffer: &DecodedBuffer, gain: &GainControl, looping: bool) -> Result<NullNode> {
        if self.is_closed() {
            return Err(Error::Playback("audio output is closed".to_string()));
        }
        let id = self.inner.next_node.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        self.inner.started.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            node = id,
            frames = buffer.frames(),
            volume = gain.get(),
            looping,
            "Output node started"
        );
        Ok(NullNode {
            id,
            frames: buffer.frames(),
            looping,
        })
    }

    fn stop(&self, node: NullNode) {
        self.inner.live.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(node = node.id, "Output node stopped");
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> DecodedBuffer {
        DecodedBuffer {
            sample_rate: 8_000,
            channels: 1,
            samples: vec![0.0; 80].into(),
        }
    }

    #[test]
    fn gain_is_shared_and_clamped() {
        let gain = GainControl::default();
        let shared = gain.clone();
        assert!((gain.get() - 0.5).abs() < f32::EPSILON);

        shared.set(1.7);
        assert!((gain.get() - 1.0).abs() < f32::EPSILON);
        shared.set(f32::NAN);
        assert!((gain.get() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn null_output_tracks_live_nodes() {
        let output = NullOutput::new();
        let gain = GainControl::default();

        let node = output.start(&buffer(), &gain, true).unwrap();
        assert!(node.looping);
        assert_eq!(output.live_nodes(), 1);

        output.stop(node);
        assert_eq!(output.live_nodes(), 0);
        assert_eq!(output.starts(), 1);
    }

    #[test]
    fn looping_samples_wrap_and_follow_gain() {
        let gain = GainControl::new(1.0);
        let buffer = DecodedBuffer {
            sample_rate: 8_000,
            channels: 1,
            samples: vec![0.5, -0.5].into(),
        };
        let mut samples = LoopingSamples::new(&buffer, gain.clone(), true);

        assert_eq!(samples.total_duration(), None);
        assert_eq!(samples.by_ref().take(3).collect::<Vec<_>>(), vec![0.5, -0.5, 0.5]);

        gain.set(0.0);
        assert_eq!(samples.next(), Some(0.0));
    }

    #[test]
    fn one_shot_samples_end_after_one_pass() {
        let samples = LoopingSamples::new(&buffer(), GainControl::new(0.5), false);
        assert_eq!(samples.total_duration(), Some(Duration::from_millis(10)));
        assert_eq!(samples.count(), 80);
    }

    #[test]
    fn closed_output_refuses_new_nodes() {
        let output = NullOutput::new();
        output.close();
        assert!(output
            .start(&buffer(), &GainControl::default(), true)
            .is_err());
    }
}
