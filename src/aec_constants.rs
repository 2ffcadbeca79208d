//! Centralized constants for reference synchronization.
//!
//! Codec period sizes mirror the hardware this core was built for. All other
//! values are defaults for `AecConfig` and can be overridden per session.

// =============================================================================
// CODEC TIMING
// =============================================================================

/// Minimum period granularity of the codec (frames).
pub const CODEC_BASE_FRAME_COUNT: usize = 32;

/// Capture sampling rate of the microphone codec (Hz).
pub const CAPTURE_SAMPLING_RATE: u32 = 16000;

/// Capture period: 16 * 32 = 512 frames, i.e. 32ms at 16kHz.
pub const CAPTURE_PERIOD_SIZE: usize = CODEC_BASE_FRAME_COUNT * 16;

/// Playback sampling rate of the loudspeaker codec (Hz).
pub const PLAYBACK_SAMPLING_RATE: u32 = 48000;

/// Playback period: 32 * 32 = 1024 frames, i.e. ~21ms at 48kHz.
pub const PLAYBACK_PERIOD_SIZE: usize = CODEC_BASE_FRAME_COUNT * 32;

// =============================================================================
// STREAM FORMAT LIMITS
// =============================================================================

/// Sampling rates accepted on either side of a session.
pub const SUPPORTED_SAMPLE_RATES: [u32; 8] = [8000, 11025, 16000, 22050, 32000, 44100, 48000, 96000];

/// Maximum channel count accepted on either side of a session.
pub const MAX_CHANNELS: u16 = 8;

// =============================================================================
// SESSION DEFAULTS
// =============================================================================

/// Default budget for one engine call before `process` fails open (ms).
///
/// Two capture periods: a stalled engine costs at most one extra period of
/// latency before the capture path gets its buffer back.
pub const DEFAULT_ENGINE_TIMEOUT_MS: u64 = 64;

/// Default reference FIFO depth (ms of microphone-rate audio).
///
/// Drift larger than this is treated as unrecoverable and forces a resync.
pub const DEFAULT_REFERENCE_FIFO_MS: u32 = 500;

/// Default mic/output staging depth (ms). Bounds the largest `process` block.
pub const DEFAULT_MIC_FIFO_MS: u32 = 128;

/// Default resampler chunk duration (ms of source audio per FFT chunk).
pub const DEFAULT_RESAMPLER_CHUNK_MS: u32 = 10;

/// Returns true if `rate` is one of [`SUPPORTED_SAMPLE_RATES`].
pub fn is_supported_rate(rate: u32) -> bool {
    SUPPORTED_SAMPLE_RATES.contains(&rate)
}

/// Number of frames covering `duration_ms` at `sample_rate`, rounded up.
pub fn frames_for_duration(sample_rate: u32, duration_ms: u32) -> usize {
    (sample_rate as u64 * duration_ms as u64).div_ceil(1000) as usize
}

#[cfg(test)]
#[path = "aec_constants_test.rs"]
mod tests;
