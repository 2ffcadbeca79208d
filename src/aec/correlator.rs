//! Capture/playback correlation.
//!
//! Picks the reference bytes that were playing while a microphone block was
//! captured. Everything is measured in reference-FIFO storage bytes (mic rate,
//! mic channel count, S16LE), because the reference is resampled on write.
//!
//! For a block of `N` bytes the correlator computes
//!
//! ```text
//! end   = read_write_diff - reference_available_bytes + mic_available_bytes
//! start = end - N
//! ```
//!
//! `read_write_diff` is the reference FIFO occupancy, `reference_available` the
//! frames the playback hardware still had queued at the latest write (not yet
//! audible), and `mic_available` the frames the capture hardware had buffered
//! after this block was read. Bytes before `start` are stale and get skipped; a
//! negative `start` means the block begins before any buffered playback and is
//! filled with a silence prefix; a block reaching past the FIFO end is padded
//! with trailing silence. Either padding counts as an underrun.

use super::fifo::TimestampRecord;
use super::tracker::SideTracker;

/// Outcome of aligning one microphone block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Correlation {
    /// Frames in the aligned block
    pub frames: usize,
    /// Stale reference bytes skipped before the block
    pub skipped_bytes: usize,
    /// Reference bytes copied into the block
    pub read_bytes: usize,
    /// Silence bytes substituted for missing reference audio
    pub padded_bytes: usize,
    /// Drift exceeded the FIFO and the reference was flushed
    pub resynced: bool,
}

impl Correlation {
    /// True if any part of the block had to be filled with silence
    pub fn underrun(&self) -> bool {
        self.padded_bytes > 0
    }
}

/// Aligns microphone blocks against the reference tracker
#[derive(Debug, Clone, Copy)]
pub struct Correlator {
    frame_size: usize,
}

impl Correlator {
    /// `frame_size` is the reference storage frame size in bytes
    pub fn new(frame_size: usize) -> Self {
        Self { frame_size }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Start offset of the block in the reference FIFO, in bytes.
    ///
    /// Negative when the block starts before the oldest buffered byte.
    pub fn block_start(
        &self,
        reference: &SideTracker,
        mic_timestamp: &TimestampRecord,
        frames: usize,
    ) -> i64 {
        let reference_available = reference
            .latest_timestamp()
            .map_or(0, |ts| ts.available as i64);
        let end = reference.read_write_diff() - reference_available * self.frame_size as i64
            + mic_timestamp.available as i64 * self.frame_size as i64;
        end - (frames * self.frame_size) as i64
    }

    /// Fill `out` with exactly `frames` frames of aligned reference audio.
    ///
    /// `out` always ends up `frames * frame_size` bytes long, silence included.
    pub fn align(
        &self,
        reference: &mut SideTracker,
        mic_timestamp: &TimestampRecord,
        frames: usize,
        out: &mut Vec<u8>,
    ) -> Correlation {
        let block = frames * self.frame_size;
        out.clear();
        out.resize(block, 0);

        if !reference.is_configured() || !reference.is_running() {
            return Correlation {
                frames,
                ..Correlation::default()
            };
        }

        let start = self.block_start(reference, mic_timestamp, frames);
        let capacity = reference.capacity_bytes() as i64;
        if start.abs() > capacity {
            let flushed = reference.reset_fifo();
            crate::warn!(
                "Reference drift of {} bytes exceeds the {}-byte FIFO, flushed {} bytes",
                start,
                capacity,
                flushed
            );
            return Correlation {
                frames,
                padded_bytes: block,
                resynced: true,
                ..Correlation::default()
            };
        }

        let (prefix, skip) = if start < 0 {
            ((-start as usize).min(block), 0)
        } else {
            (0, start as usize)
        };
        let skipped_bytes = reference.skip(skip);

        let wanted = block - prefix;
        let take = wanted.min(reference.occupancy());
        // Keep whole frames so channels never shift
        let take = take - take % self.frame_size;
        let read_bytes = match reference.read_into(&mut out[prefix..prefix + take]) {
            Ok(()) => take,
            Err(e) => {
                crate::warn!("Reference read failed, using silence: {}", e);
                out[prefix..prefix + take].fill(0);
                0
            }
        };

        let correlation = Correlation {
            frames,
            skipped_bytes,
            read_bytes,
            padded_bytes: block - read_bytes,
            resynced: false,
        };
        if correlation.underrun() {
            crate::trace!(
                "Reference underrun: start {} bytes, read {} of {} bytes",
                start,
                read_bytes,
                block
            );
        }
        correlation
    }
}

#[cfg(test)]
#[path = "correlator_test.rs"]
mod tests;
