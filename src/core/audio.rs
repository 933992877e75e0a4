//! Audio input handling for the streaming endpoints.
//!
//! The Spark speech endpoints expect 16 kHz mono 16-bit little-endian PCM.
//! [`load_audio_file`] accepts raw PCM in that format or a WAV file, which is
//! decoded with `hound`, down-mixed to mono and linearly resampled.
//! [`frame_audio`] then splits the PCM into protocol frames.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use hound::{SampleFormat, WavReader};
use tracing::{debug, info};

use crate::errors::{GatewayError, GatewayResult};

// =============================================================================
// Constants
// =============================================================================

/// Bytes of PCM carried by one frame (40 ms of 16 kHz 16-bit mono audio).
pub const FRAME_CHUNK_SIZE: usize = 1280;

/// Sample rate required by the recognition and dialogue endpoints.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Largest audio input accepted before connecting.
pub const MAX_AUDIO_BYTES: usize = 50 * 1024 * 1024;

/// Accepted WAV sample rates; anything outside is treated as corrupt.
pub const MIN_WAV_SAMPLE_RATE: u32 = 8_000;
pub const MAX_WAV_SAMPLE_RATE: u32 = 192_000;

// =============================================================================
// Frame types
// =============================================================================

/// Position of a frame within one audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    First,
    Continue,
    Last,
}

impl FrameStatus {
    /// Numeric status used on the wire.
    pub fn as_code(self) -> u8 {
        match self {
            FrameStatus::First => 0,
            FrameStatus::Continue => 1,
            FrameStatus::Last => 2,
        }
    }
}

/// PCM layout of the audio being streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    /// Wire encoding name, `raw` for PCM
    pub encoding: &'static str,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            channels: 1,
            bit_depth: 16,
            encoding: "raw",
        }
    }
}

/// One chunk of audio plus its position in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub status: FrameStatus,
    pub payload: Bytes,
    pub format: AudioFormat,
}

/// Split `pcm` into frames of at most `chunk_size` bytes.
///
/// There is always exactly one `First` and one `Last` frame. Every chunk but
/// the final one is full-size. When the audio fits in a single chunk it is
/// carried by `First` and `Last` is empty; empty input yields two empty frames.
pub fn frame_audio(pcm: &Bytes, chunk_size: usize, format: AudioFormat) -> Vec<AudioFrame> {
    let chunk_size = chunk_size.max(1);
    let frame = |status, payload| AudioFrame {
        status,
        payload,
        format,
    };

    if pcm.len() <= chunk_size {
        return vec![
            frame(FrameStatus::First, pcm.clone()),
            frame(FrameStatus::Last, Bytes::new()),
        ];
    }

    let count = pcm.len().div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            let end = (start + chunk_size).min(pcm.len());
            let status = match i {
                0 => FrameStatus::First,
                i if i == count - 1 => FrameStatus::Last,
                _ => FrameStatus::Continue,
            };
            frame(status, pcm.slice(start..end))
        })
        .collect()
}

// =============================================================================
// Loading and validation
// =============================================================================

/// Read an audio file and return 16 kHz mono 16-bit PCM.
pub async fn load_audio_file(path: impl AsRef<Path>) -> GatewayResult<Bytes> {
    let path = path.as_ref();
    let data = tokio::fs::read(path).await.map_err(|e| {
        GatewayError::InvalidInput(format!("Cannot read audio file {}: {e}", path.display()))
    })?;

    validate_audio_size(data.len())?;

    if is_wav(&data) {
        let pcm = decode_wav(&data)?;
        validate_audio_size(pcm.len())?;
        info!(
            "Decoded WAV file {} into {} bytes of PCM",
            path.display(),
            pcm.len()
        );
        Ok(pcm)
    } else {
        debug!("Treating {} as raw PCM ({} bytes)", path.display(), data.len());
        Ok(Bytes::from(data))
    }
}

/// Reject empty or oversized audio.
pub fn validate_audio_size(len: usize) -> GatewayResult<()> {
    if len == 0 {
        return Err(GatewayError::DecodeError("Audio input is empty".to_string()));
    }
    if len > MAX_AUDIO_BYTES {
        return Err(GatewayError::DecodeError(format!(
            "Audio input too large: {len} bytes (max {MAX_AUDIO_BYTES})"
        )));
    }
    Ok(())
}

fn is_wav(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

/// Decode a WAV buffer into 16 kHz mono 16-bit little-endian PCM.
pub fn decode_wav(data: &[u8]) -> GatewayResult<Bytes> {
    let mut reader = WavReader::new(Cursor::new(data))
        .map_err(|e| GatewayError::DecodeError(format!("Invalid WAV data: {e}")))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(GatewayError::DecodeError("WAV file has no channels".to_string()));
    }
    if !(MIN_WAV_SAMPLE_RATE..=MAX_WAV_SAMPLE_RATE).contains(&spec.sample_rate) {
        return Err(GatewayError::DecodeError(format!(
            "Unsupported WAV sample rate: {} Hz",
            spec.sample_rate
        )));
    }

    // Bound the resampled size before decoding anything.
    let projected = u64::from(reader.duration()) * u64::from(TARGET_SAMPLE_RATE)
        / u64::from(spec.sample_rate)
        * 2;
    validate_audio_size(usize::try_from(projected).unwrap_or(usize::MAX).max(1))?;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| GatewayError::DecodeError(format!("Failed to read WAV samples: {e}")))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| {
                    GatewayError::DecodeError(format!("Failed to read WAV samples: {e}"))
                })?
        }
    };

    let mono = downmix(&interleaved, spec.channels as usize);
    let resampled = resample_linear(&mono, spec.sample_rate, TARGET_SAMPLE_RATE);

    debug!(
        "WAV input: {} Hz, {} channel(s), {} bit -> {} samples at {} Hz",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        resampled.len(),
        TARGET_SAMPLE_RATE
    );

    let mut pcm = Vec::with_capacity(resampled.len() * 2);
    for sample in resampled {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        pcm.extend_from_slice(&value.to_le_bytes());
    }
    Ok(Bytes::from(pcm))
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round().max(1.0) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[next] * frac
        })
        .collect()
}
