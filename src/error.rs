//! Error types for the AEC synchronization core.

use std::time::Duration;

use thiserror::Error;

use crate::aec::Side;

/// Errors surfaced by the synchronization core.
///
/// Configuration-time variants (`Config`, `ResamplerInit`, `NotConfigured`)
/// propagate to the stream layer. Per-call conditions are recovered inside the
/// session: `Underrun` is only returned by the raw FIFO and is padded over by
/// the correlator, `EngineTimeout` leaves the caller's buffer untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AecError {
    /// Invalid or unsupported rate/channel/format combination
    #[error("Invalid AEC configuration: {0}")]
    Config(String),

    /// The resampler cannot be built for the requested rate pair
    #[error("Resampler init failed for {from_rate} Hz -> {to_rate} Hz: {reason}")]
    ResamplerInit {
        from_rate: u32,
        to_rate: u32,
        reason: String,
    },

    /// The resampler failed while converting a block
    #[error("Resampler failed: {0}")]
    Resample(String),

    /// A FIFO read asked for more bytes than are buffered
    #[error("Underrun on {side} FIFO: requested {requested} bytes, {available} available")]
    Underrun {
        side: Side,
        requested: usize,
        available: usize,
    },

    /// The cancellation engine did not finish within its budget
    #[error("Echo cancellation engine timed out after {0:?}")]
    EngineTimeout(Duration),

    /// The side has not been configured (or was torn down)
    #[error("{0} side is not configured")]
    NotConfigured(Side),

    /// The buffer handed to the session does not fit the side's format
    #[error("Invalid {side} buffer of {len} bytes: {reason}")]
    InvalidBuffer {
        side: Side,
        len: usize,
        reason: &'static str,
    },

    /// The worker could not read the staged microphone block for a call
    #[error("Engine call {0} lost its microphone block")]
    EngineInputLost(u64),

    /// The session has been closed
    #[error("AEC session is closed")]
    SessionClosed,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AecError>;
