//! Reference synchronization core for acoustic echo cancellation.
//!
//! Sits between a capture stream, a playback stream and an external echo
//! canceller. Playback audio is resampled to the microphone rate and buffered
//! with hardware timestamps; each captured block is matched with the reference
//! audio that was audible while it was recorded, then cleaned on a dedicated
//! worker thread with a bounded wait so capture never stalls.
//!
//! The embedding driver installs a `log` logger; this crate only emits records.

// Enable coverage attribute on nightly for explicit exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod aec;
pub mod aec_constants;
pub mod config;
pub mod error;

// Re-export log macros for use throughout the crate
pub use log::{debug, error, info, trace, warn};

pub use aec::{
    AecSession, BlockLayout, EchoCanceller, PassthroughCanceller, ProcessReport, SampleFormat, Side,
    StreamFormat, SyncStats, TimestampRecord,
};
pub use config::AecConfig;
pub use error::{AecError, Result};
