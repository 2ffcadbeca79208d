// PCM stream formats and sample conversion
// The engine works on f32; everything buffered by the core stays little-endian PCM

use serde::{Deserialize, Serialize};

use crate::aec_constants::{is_supported_rate, MAX_CHANNELS};
use crate::error::{AecError, Result};

/// Little-endian PCM sample encodings understood by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Signed 16-bit little-endian
    S16Le,
    /// Signed 32-bit little-endian
    S32Le,
}

impl SampleFormat {
    /// Width of one sample in bytes
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::S32Le => 4,
        }
    }

    /// Decode PCM bytes into `out` as f32 normalized to [-1.0, 1.0).
    ///
    /// `out` is cleared first. Trailing bytes that do not fill a sample are ignored.
    pub fn decode(self, bytes: &[u8], out: &mut Vec<f32>) {
        out.clear();
        match self {
            SampleFormat::S16Le => out.extend(
                bytes
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0),
            ),
            SampleFormat::S32Le => out.extend(
                bytes
                    .chunks_exact(4)
                    .map(|b| (i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64 / 2_147_483_648.0) as f32),
            ),
        }
    }

    /// Encode f32 samples as PCM bytes appended to `out`, saturating out-of-range values.
    pub fn encode(self, samples: &[f32], out: &mut Vec<u8>) {
        out.reserve(samples.len() * self.bytes_per_sample());
        match self {
            SampleFormat::S16Le => {
                for &s in samples {
                    let v = (s * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            SampleFormat::S32Le => {
                for &s in samples {
                    let v = (s as f64 * 2_147_483_648.0)
                        .round()
                        .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
    }
}

/// Format of one physical stream as reported by the hardware layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Sampling rate in Hz
    pub sampling_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Sample encoding
    pub sample_format: SampleFormat,
}

impl StreamFormat {
    /// Create a stream format
    pub fn new(sampling_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sampling_rate,
            channels,
            sample_format,
        }
    }

    /// Shorthand for the common S16LE case
    pub fn s16(sampling_rate: u32, channels: u16) -> Self {
        Self::new(sampling_rate, channels, SampleFormat::S16Le)
    }

    /// Bytes per frame (one sample of every channel)
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    /// Check rate and channel limits
    pub fn validate(&self) -> Result<()> {
        if !is_supported_rate(self.sampling_rate) {
            return Err(AecError::Config(format!(
                "Unsupported stream sampling rate {} Hz",
                self.sampling_rate
            )));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(AecError::Config(format!(
                "Unsupported stream channel count {}",
                self.channels
            )));
        }
        Ok(())
    }
}
