//! Audio decoding into playable PCM buffers.

use std::io::{Cursor, ErrorKind as IoErrorKind};
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as MediaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::{Error, Result};

/// Fully decoded audio, ready to hand to an output.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    /// PCM sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Arc<[f32]>,
}

impl DecodedBuffer {
    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let millis = (self.frames() as u128)
            .saturating_mul(1_000)
            .saturating_div(u128::from(self.sample_rate));
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

/// Decodes a complete byte payload. Runs on a blocking thread.
pub trait AudioDecoder: Send + Sync + 'static {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedBuffer>;
}

/// WAV decoder for integer and float PCM.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedBuffer> {
        let reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(Error::Playback("WAV header has no channels".to_string()));
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / f64::from(1_u32 << (spec.bits_per_sample.clamp(1, 32) - 1));
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|value| (f64::from(value) * scale) as f32))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        if samples.is_empty() {
            return Err(Error::Playback("audio has no frames".to_string()));
        }

        Ok(DecodedBuffer {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples: samples.into(),
        })
    }
}

/// Decoder for every container the host is likely to be handed: WAV goes
/// through hound, anything else (MP3, AAC/M4A, Ogg Vorbis, FLAC) through
/// symphonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaDecoder;

impl AudioDecoder for MediaDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedBuffer> {
        if is_wav(bytes) {
            return WavDecoder.decode(bytes);
        }
        decode_compressed(bytes)
    }
}

fn is_wav(bytes: &[u8]) -> bool {
    bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WAVE".as_slice())
}

fn decode_compressed(bytes: &[u8]) -> Result<DecodedBuffer> {
    let source = MediaSourceStream::new(
        Box::new(Cursor::new(bytes.to_vec())),
        MediaSourceStreamOptions::default(),
    );
    let opened = symphonia::default::get_probe().format(
        &Hint::new(),
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = opened.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Playback("no audio track".to_string()))?;
    let track_id = track.id;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut layout: Option<(u32, u16)> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(MediaError::IoError(error)) if error.kind() == IoErrorKind::UnexpectedEof => break,
            Err(MediaError::ResetRequired) => break,
            Err(error) => return Err(error.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped, the rest of the stream still plays
            Err(MediaError::DecodeError(reason)) => {
                tracing::debug!("Skipping undecodable packet: {reason}");
                continue;
            }
            Err(error) => return Err(error.into()),
        };
        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        let channels = u16::try_from(spec.channels.count())
            .map_err(|_| Error::Playback("too many channels".to_string()))?;
        layout.get_or_insert((spec.rate, channels));

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    match layout {
        Some((sample_rate, channels)) if channels > 0 && !samples.is_empty() => {
            Ok(DecodedBuffer {
                sample_rate,
                channels,
                samples: samples.into(),
            })
        }
        _ => Err(Error::Playback("audio has no frames".to_string())),
    }
}

/// Encode interleaved PCM16 samples as a WAV byte buffer.
pub fn encode_pcm16_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    if sample_rate == 0 || channels == 0 {
        return Err(Error::InvalidInput(
            "sample_rate and channels must be greater than zero".to_string(),
        ));
    }

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_pcm16_to_unit_range() {
        let bytes = encode_pcm16_wav(&[0, 16_384, -32_768, 32_767], 8_000, 1).unwrap();
        let buffer = WavDecoder.decode(&bytes).unwrap();

        assert_eq!(buffer.sample_rate, 8_000);
        assert_eq!(buffer.channels, 1);
        assert_eq!(buffer.samples.len(), 4);
        assert!((buffer.samples[1] - 0.5).abs() < 1e-6);
        assert!((buffer.samples[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn duration_counts_frames_not_samples() {
        let stereo = encode_pcm16_wav(&vec![0; 32_000], 16_000, 2).unwrap();
        let buffer = WavDecoder.decode(&stereo).unwrap();
        assert_eq!(buffer.frames(), 16_000);
        assert_eq!(buffer.duration(), Duration::from_secs(1));
    }

    #[test]
    fn malformed_bytes_fail_to_decode() {
        let error = WavDecoder.decode(b"definitely not a wav").unwrap_err();
        assert!(matches!(error, Error::Decode(_)));
    }

    #[test]
    fn empty_audio_is_rejected() {
        let bytes = encode_pcm16_wav(&[], 8_000, 1).unwrap();
        assert!(matches!(
            WavDecoder.decode(&bytes).unwrap_err(),
            Error::Playback(_)
        ));
    }

    const MP3_FIXTURE: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/silence-mono-44k.mp3"
    ));

    #[test]
    fn media_decoder_reads_mp3_frames() {
        let buffer = MediaDecoder.decode(MP3_FIXTURE).unwrap();

        assert_eq!(buffer.sample_rate, 44_100);
        assert_eq!(buffer.channels, 1);
        assert!(buffer.frames() >= 1_152);
        assert!(buffer.samples.iter().all(|sample| sample.abs() < 1e-3));
    }

    #[test]
    fn media_decoder_keeps_wav_on_hound() {
        let bytes = encode_pcm16_wav(&[0, 16_384], 22_050, 1).unwrap();
        let buffer = MediaDecoder.decode(&bytes).unwrap();
        assert_eq!(buffer, WavDecoder.decode(&bytes).unwrap());
    }

    #[test]
    fn media_decoder_rejects_unknown_bytes() {
        let error = MediaDecoder.decode(b"definitely not audio").unwrap_err();
        assert_eq!(error.kind(), Some(crate::ErrorKind::PlaybackFailed));
    }

    #[test]
    fn invalid_encode_options_are_rejected() {
        assert!(matches!(
            encode_pcm16_wav(&[1], 0, 1).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }
}
