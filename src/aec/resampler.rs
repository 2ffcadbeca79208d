//! Reference resampler adapter.
//!
//! Converts playback audio from its native rate, channel layout and sample
//! format into the layout the reference FIFO stores: S16LE at the microphone
//! rate with the microphone's channel count. The FFT resampler consumes fixed
//! chunks, so input that does not fill a chunk is held back for the next call
//! and output length varies from call to call.

use rubato::{FftFixedIn, Resampler};

use super::format::{SampleFormat, StreamFormat};
use super::Side;
use crate::aec_constants::{frames_for_duration, is_supported_rate};
use crate::error::{AecError, Result};

/// Sample format of everything stored in the reference FIFO
pub const REFERENCE_STORAGE_FORMAT: SampleFormat = SampleFormat::S16Le;

/// Stateful converter owned by the playback path
pub struct ReferenceResampler {
    source: StreamFormat,
    target: StreamFormat,
    /// `None` when source and target rates match
    resampler: Option<FftFixedIn<f32>>,
    chunk_frames: usize,
    /// Leading output frames still to drop to cancel the filter delay
    delay_remaining: usize,
    /// De-interleaved, channel-mapped input waiting for a full chunk
    pending: Vec<Vec<f32>>,
    decoded: Vec<f32>,
    mapped: Vec<f32>,
}

impl ReferenceResampler {
    /// Build a converter from `source` to the mic rate and channel count.
    ///
    /// Fails with `ResamplerInit` if the rate pair cannot be resampled.
    pub fn new(
        source: StreamFormat,
        target_rate: u32,
        target_channels: u16,
        chunk_ms: u32,
    ) -> Result<Self> {
        let init_error = |reason: String| AecError::ResamplerInit {
            from_rate: source.sampling_rate,
            to_rate: target_rate,
            reason,
        };
        if !is_supported_rate(source.sampling_rate) || !is_supported_rate(target_rate) {
            return Err(init_error("unsupported sampling rate".to_string()));
        }
        if source.channels == 0 || target_channels == 0 {
            return Err(init_error("channel count must be non-zero".to_string()));
        }

        let mut chunk_frames = frames_for_duration(source.sampling_rate, chunk_ms).max(1);
        let resampler = if source.sampling_rate == target_rate {
            None
        } else {
            let r = FftFixedIn::<f32>::new(
                source.sampling_rate as usize,
                target_rate as usize,
                chunk_frames,
                1, // sub_chunks
                target_channels as usize,
            )
            .map_err(|e| init_error(e.to_string()))?;
            // The FFT may round the chunk up to a whole number of rate periods
            chunk_frames = r.input_frames_next();
            Some(r)
        };

        crate::debug!(
            "Reference resampler: {} Hz x{} -> {} Hz x{} ({})",
            source.sampling_rate,
            source.channels,
            target_rate,
            target_channels,
            if resampler.is_some() { "fft" } else { "passthrough" }
        );

        let delay_remaining = resampler.as_ref().map_or(0, |r| r.output_delay());
        Ok(Self {
            source,
            target: StreamFormat::new(target_rate, target_channels, REFERENCE_STORAGE_FORMAT),
            resampler,
            chunk_frames,
            delay_remaining,
            pending: vec![Vec::with_capacity(chunk_frames * 2); target_channels as usize],
            decoded: Vec::new(),
            mapped: Vec::new(),
        })
    }

    /// Convert one block of native playback bytes, appending storage bytes to `output`.
    ///
    /// Returns the number of target frames appended, which may be zero while
    /// the resampler is still filling a chunk.
    pub fn convert(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let frame_size = self.source.frame_size();
        if input.len() % frame_size != 0 {
            return Err(AecError::InvalidBuffer {
                side: Side::Reference,
                len: input.len(),
                reason: "not a whole number of frames",
            });
        }

        self.source.sample_format.decode(input, &mut self.decoded);
        map_channels(
            &self.decoded,
            self.source.channels as usize,
            self.target.channels as usize,
            &mut self.mapped,
        );

        let Some(resampler) = self.resampler.as_mut() else {
            REFERENCE_STORAGE_FORMAT.encode(&self.mapped, output);
            return Ok(self.mapped.len() / self.target.channels as usize);
        };

        let channels = self.pending.len();
        for (i, sample) in self.mapped.iter().enumerate() {
            self.pending[i % channels].push(*sample);
        }

        let mut frames_out = 0;
        while self.pending[0].len() >= self.chunk_frames {
            let chunk: Vec<&[f32]> = self
                .pending
                .iter()
                .map(|ch| &ch[..self.chunk_frames])
                .collect();
            let resampled = resampler
                .process(&chunk, None)
                .map_err(|e| AecError::Resample(e.to_string()))?;
            for ch in self.pending.iter_mut() {
                ch.drain(..self.chunk_frames);
            }

            let produced = resampled.first().map_or(0, |c| c.len());
            let skip = self.delay_remaining.min(produced);
            self.delay_remaining -= skip;
            let frames = produced - skip;
            self.mapped.clear();
            for frame in skip..produced {
                for ch in &resampled {
                    self.mapped.push(ch[frame]);
                }
            }
            REFERENCE_STORAGE_FORMAT.encode(&self.mapped, output);
            frames_out += frames;
        }

        crate::trace!(
            "Resampled {} input frames into {} output frames ({} pending)",
            input.len() / frame_size,
            frames_out,
            self.pending[0].len()
        );
        Ok(frames_out)
    }

    /// Convert a hardware frame count from the source rate to the target rate
    pub fn map_available(&self, frames: u32) -> u32 {
        ((frames as u64 * self.target.sampling_rate as u64 + self.source.sampling_rate as u64 / 2)
            / self.source.sampling_rate as u64) as u32
    }

    /// Drop held input and filter state. Called when playback restarts.
    pub fn reset(&mut self) {
        for ch in self.pending.iter_mut() {
            ch.clear();
        }
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
            self.delay_remaining = resampler.output_delay();
        }
    }

    /// Native playback format
    pub fn source(&self) -> StreamFormat {
        self.source
    }

    /// Layout of the converted output
    pub fn target(&self) -> StreamFormat {
        self.target
    }

    /// Source frames held back waiting for a full chunk
    pub fn pending_frames(&self) -> usize {
        self.pending.first().map_or(0, |c| c.len())
    }

    /// Target frames of accepted input not yet emitted: the held-back chunk
    /// plus the filter delay
    pub fn latency_frames(&self) -> u32 {
        let delay = self.resampler.as_ref().map_or(0, |r| r.output_delay());
        self.map_available(self.pending_frames() as u32) + delay as u32
    }
}

impl std::fmt::Debug for ReferenceResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResampler")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("chunk_frames", &self.chunk_frames)
            .field("pending_frames", &self.pending_frames())
            .finish_non_exhaustive()
    }
}

/// Remap interleaved `input` from `from` channels to `to` channels.
///
/// Mono output averages every source channel; otherwise output channel `c`
/// copies source channel `c % from`.
fn map_channels(input: &[f32], from: usize, to: usize, out: &mut Vec<f32>) {
    out.clear();
    if from == to {
        out.extend_from_slice(input);
        return;
    }
    for frame in input.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|c| frame[c % from]));
        }
    }
}

#[cfg(test)]
#[path = "resampler_test.rs"]
mod tests;
