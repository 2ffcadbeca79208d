//! Session configuration.
//!
//! `AecConfig` carries the three values the device hands over when it opens
//! AEC (microphone sampling rate and both channel counts) plus the tunables of
//! the synchronization core. It deserializes from JSON with defaults for every
//! missing field, and two environment variables can override it at open time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aec_constants::{
    frames_for_duration, is_supported_rate, CAPTURE_SAMPLING_RATE, DEFAULT_ENGINE_TIMEOUT_MS,
    DEFAULT_MIC_FIFO_MS, DEFAULT_REFERENCE_FIFO_MS, DEFAULT_RESAMPLER_CHUNK_MS, MAX_CHANNELS,
};
use crate::error::{AecError, Result};

/// Environment variable overriding `engine_timeout_ms`
pub const ENGINE_TIMEOUT_ENV: &str = "AEC_ENGINE_TIMEOUT_MS";

/// Environment variable that, when set, disables the idle bypass
pub const DISABLE_IDLE_BYPASS_ENV: &str = "AEC_DISABLE_IDLE_BYPASS";

/// Configuration for one AEC session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AecConfig {
    /// Microphone sampling rate in Hz; the reference is resampled to it
    pub sampling_rate: u32,
    /// Channel count of the playback (reference) stream
    pub reference_channels: u16,
    /// Channel count of the capture (microphone) stream
    pub mic_channels: u16,
    /// Budget for one engine call before `process` fails open
    pub engine_timeout_ms: u64,
    /// Depth of the reference FIFO in milliseconds of mic-rate audio
    pub reference_fifo_ms: u32,
    /// Depth of the mic and output staging FIFOs in milliseconds
    pub mic_fifo_ms: u32,
    /// Source audio per resampler chunk in milliseconds
    pub resampler_chunk_ms: u32,
    /// Skip the engine entirely while playback is stopped
    pub bypass_when_idle: bool,
}

impl Default for AecConfig {
    fn default() -> Self {
        Self {
            sampling_rate: CAPTURE_SAMPLING_RATE,
            reference_channels: 1,
            mic_channels: 1,
            engine_timeout_ms: DEFAULT_ENGINE_TIMEOUT_MS,
            reference_fifo_ms: DEFAULT_REFERENCE_FIFO_MS,
            mic_fifo_ms: DEFAULT_MIC_FIFO_MS,
            resampler_chunk_ms: DEFAULT_RESAMPLER_CHUNK_MS,
            bypass_when_idle: true,
        }
    }
}

impl AecConfig {
    /// Create a config for the given mic rate and channel counts, with default tunables.
    pub fn new(sampling_rate: u32, reference_channels: u16, mic_channels: u16) -> Self {
        Self {
            sampling_rate,
            reference_channels,
            mic_channels,
            ..Self::default()
        }
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| AecError::Config(format!("Malformed config: {}", e)))
    }

    /// Apply overrides from `AEC_ENGINE_TIMEOUT_MS` and `AEC_DISABLE_IDLE_BYPASS`.
    ///
    /// An unparsable timeout is ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(ENGINE_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.engine_timeout_ms = ms,
                Err(_) => crate::warn!("Ignoring {}={:?}: not a number of milliseconds", ENGINE_TIMEOUT_ENV, raw),
            }
        }
        if std::env::var(DISABLE_IDLE_BYPASS_ENV).is_ok() {
            self.bypass_when_idle = false;
        }
        self
    }

    /// Check every field. A config that passes can open a session.
    pub fn validate(&self) -> Result<()> {
        if !is_supported_rate(self.sampling_rate) {
            return Err(AecError::Config(format!(
                "Unsupported microphone sampling rate {} Hz",
                self.sampling_rate
            )));
        }
        validate_channels("reference", self.reference_channels)?;
        validate_channels("microphone", self.mic_channels)?;
        if self.engine_timeout_ms == 0 {
            return Err(AecError::Config("engine_timeout_ms must be positive".to_string()));
        }
        if self.reference_fifo_ms == 0 || self.mic_fifo_ms == 0 {
            return Err(AecError::Config("FIFO durations must be positive".to_string()));
        }
        if self.resampler_chunk_ms == 0 {
            return Err(AecError::Config("resampler_chunk_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Engine budget as a `Duration`
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    /// Reference FIFO depth in mic-rate frames
    pub fn reference_fifo_frames(&self) -> usize {
        frames_for_duration(self.sampling_rate, self.reference_fifo_ms)
    }

    /// Mic/output staging depth in frames
    pub fn mic_fifo_frames(&self) -> usize {
        frames_for_duration(self.sampling_rate, self.mic_fifo_ms)
    }
}

fn validate_channels(what: &str, channels: u16) -> Result<()> {
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(AecError::Config(format!(
            "Unsupported {} channel count {} (expected 1..={})",
            what, channels, MAX_CHANNELS
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
