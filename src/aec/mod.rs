//! Echo-cancellation synchronization session.
//!
//! An [`AecSession`] sits between a capture stream, a playback stream and an
//! external [`EchoCanceller`]. Playback audio is resampled into a timestamped
//! reference FIFO as it is written; every captured block is paired with the
//! reference audio that was audible while it was recorded and handed to the
//! engine on a dedicated worker thread.
//!
//! Three threads touch a session: the capture thread (`process`), the playback
//! thread (`write_reference`, `set_reference_running`) and the worker. Session
//! state sits behind one lock; the resampler has its own lock used only by the
//! playback path. Lock order is resampler, then session state.

mod coordinator;
mod correlator;
mod diagnostics;
mod engine;
mod fifo;
mod format;
mod resampler;
mod state;
mod tracker;

pub use coordinator::CoordinatorState;
pub use correlator::{Correlation, Correlator};
pub use diagnostics::SyncStats;
pub use engine::{BlockLayout, EchoCanceller, PassthroughCanceller};
pub use fifo::{TimestampRecord, TimestampedFifo};
pub use format::{SampleFormat, StreamFormat};
pub use resampler::{ReferenceResampler, REFERENCE_STORAGE_FORMAT};
pub use tracker::SideTracker;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AecConfig;
use crate::error::{AecError, Result};
use coordinator::WorkerHandle;
use state::{SessionState, Shared};

/// Which physical stream a tracker or error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Captured microphone audio
    Mic,
    /// Audio sent to the speaker
    Reference,
    /// Echo-cancelled result
    Output,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Mic => write!(f, "mic"),
            Side::Reference => write!(f, "reference"),
            Side::Output => write!(f, "output"),
        }
    }
}

/// What happened to one captured block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessReport {
    /// Frames in the block
    pub frames: usize,
    /// Playback was idle and the block was returned untouched
    pub bypassed: bool,
    /// Part of the reference had to be filled with silence
    pub underrun: bool,
    /// Drift forced a reference flush before this block
    pub resynced: bool,
}

/// Playback-side state, owned by the playback path
#[derive(Debug, Default)]
struct PlaybackPath {
    resampler: Option<ReferenceResampler>,
    converted: Vec<u8>,
}

/// One echo-cancellation context for a capture/playback stream pair.
///
/// `AecSession` is `Send + Sync`; share it behind an `Arc` between the
/// capture and playback threads. Dropping it closes it.
pub struct AecSession {
    config: AecConfig,
    shared: Arc<Shared>,
    worker: WorkerHandle,
    playback: Mutex<PlaybackPath>,
}

impl AecSession {
    /// Validate `config` and start the worker that owns `engine`.
    ///
    /// No state survives a failed open.
    pub fn open(config: AecConfig, engine: Box<dyn EchoCanceller>) -> Result<Self> {
        config.validate()?;

        let storage_frame_size =
            config.mic_channels as usize * REFERENCE_STORAGE_FORMAT.bytes_per_sample();
        let shared = Arc::new(Shared::new(SessionState::new(Correlator::new(
            storage_frame_size,
        ))));
        let worker = WorkerHandle::spawn(Arc::clone(&shared), engine)?;

        crate::info!(
            "AEC session opened: {} Hz, {} reference ch, {} mic ch, engine budget {:?}",
            config.sampling_rate,
            config.reference_channels,
            config.mic_channels,
            config.engine_timeout()
        );
        Ok(Self {
            config,
            shared,
            worker,
            playback: Mutex::new(PlaybackPath::default()),
        })
    }

    pub fn config(&self) -> &AecConfig {
        &self.config
    }

    /// Stop the worker and release every side. Safe to call more than once.
    pub fn close(&self) {
        if !self.worker.is_running() {
            return;
        }
        self.worker.stop();

        let mut playback = self.playback.lock();
        playback.resampler = None;
        let mut state = self.shared.state.lock();
        state.mic.destroy();
        state.reference.destroy();
        state.output.destroy();
        state.reference_block = Vec::new();
        crate::info!("AEC session closed");
    }

    /// Attach the playback stream format. Called when the playback stream opens.
    ///
    /// The resampler is built first; on failure nothing is stored.
    pub fn configure_reference_side(&self, format: &StreamFormat) -> Result<()> {
        format.validate()?;
        if format.channels != self.config.reference_channels {
            return Err(AecError::Config(format!(
                "Playback stream has {} channels, session expects {}",
                format.channels, self.config.reference_channels
            )));
        }
        let resampler = ReferenceResampler::new(
            *format,
            self.config.sampling_rate,
            self.config.mic_channels,
            self.config.resampler_chunk_ms,
        )?;

        let mut playback = self.playback.lock();
        let mut state = self.shared.state.lock();
        if state.is_closed() {
            return Err(AecError::SessionClosed);
        }
        let frame_size = state.correlator.frame_size();
        state
            .reference
            .configure(*format, frame_size, self.config.reference_fifo_frames() * frame_size)?;
        playback.resampler = Some(resampler);
        Ok(())
    }

    /// Attach the capture stream format and size the mic and output FIFOs
    pub fn configure_mic_side(&self, format: &StreamFormat) -> Result<()> {
        format.validate()?;
        if format.sampling_rate != self.config.sampling_rate {
            return Err(AecError::Config(format!(
                "Capture stream runs at {} Hz, session expects {} Hz",
                format.sampling_rate, self.config.sampling_rate
            )));
        }
        if format.channels != self.config.mic_channels {
            return Err(AecError::Config(format!(
                "Capture stream has {} channels, session expects {}",
                format.channels, self.config.mic_channels
            )));
        }

        let frame_size = format.frame_size();
        let capacity = self.config.mic_fifo_frames() * frame_size;
        let mut state = self.shared.state.lock();
        if state.is_closed() {
            return Err(AecError::SessionClosed);
        }
        self.wait_for_in_flight(&mut state);
        state.mic.configure(*format, frame_size, capacity)?;
        state.output.configure(*format, frame_size, capacity)?;
        Ok(())
    }

    /// Release the reference FIFO and resampler. Called when playback closes.
    pub fn teardown_reference_side(&self) {
        let mut playback = self.playback.lock();
        playback.resampler = None;
        let mut state = self.shared.state.lock();
        self.wait_for_in_flight(&mut state);
        state.reference.destroy();
    }

    /// Release the mic and output FIFOs. Called when capture closes.
    pub fn teardown_mic_side(&self) {
        let mut state = self.shared.state.lock();
        self.wait_for_in_flight(&mut state);
        state.mic.destroy();
        state.output.destroy();
    }

    /// Report whether playback is running.
    ///
    /// A stopped→running edge flushes the reference FIFO and the resampler's
    /// held input so pre-gap audio is never matched against new frames.
    pub fn set_reference_running(&self, running: bool) {
        let mut playback = self.playback.lock();
        let mut state = self.shared.state.lock();
        if state.is_closed() {
            crate::debug!("Ignoring reference running={} on a closed session", running);
            return;
        }
        let was_running = state.reference.is_running();
        let started = state.reference.set_running(running);
        if started {
            state.stats.reference_restarts += 1;
            drop(state);
            if let Some(resampler) = playback.resampler.as_mut() {
                resampler.reset();
            }
            crate::debug!("Reference playback started");
        } else if was_running && !running {
            crate::debug!("Reference playback stopped");
        }
    }

    /// Feed audio that was just written to the speaker.
    ///
    /// `timestamp.available` is the number of playback frames still queued in
    /// hardware after this write. Returns the bytes accepted: all of `buffer`,
    /// or 0 while playback is stopped. Overruns are logged and counted.
    pub fn write_reference(&self, buffer: &[u8], timestamp: TimestampRecord) -> Result<usize> {
        let mut playback = self.playback.lock();
        {
            let state = self.shared.state.lock();
            if state.is_closed() {
                return Err(AecError::SessionClosed);
            }
            if !state.reference.is_configured() {
                return Err(AecError::NotConfigured(Side::Reference));
            }
            if !state.reference.is_running() {
                crate::trace!("Dropping {} reference bytes while playback is stopped", buffer.len());
                return Ok(0);
            }
        }

        let PlaybackPath {
            resampler,
            converted,
        } = &mut *playback;
        let resampler = resampler
            .as_mut()
            .ok_or(AecError::NotConfigured(Side::Reference))?;
        let source_frame = resampler.source().frame_size();
        if buffer.len() % source_frame != 0 {
            return Err(AecError::InvalidBuffer {
                side: Side::Reference,
                len: buffer.len(),
                reason: "not a whole number of frames",
            });
        }

        converted.clear();
        resampler.convert(buffer, converted)?;
        // Audio still inside the resampler was already queued in hardware but
        // is not in the FIFO yet
        let queued = resampler
            .map_available(timestamp.available)
            .saturating_sub(resampler.latency_frames());
        let stored = TimestampRecord::new(timestamp.time, queued, converted.len());

        let mut state = self.shared.state.lock();
        if converted.is_empty() {
            state.reference.observe(stored);
            return Ok(buffer.len());
        }
        let dropped = state.reference.write(converted, stored)?;
        if dropped > 0 {
            state.stats.overruns += 1;
            crate::warn!("Reference FIFO overrun: dropped {} unread bytes", dropped);
        }
        Ok(buffer.len())
    }

    /// Cancel echo in one captured block, in place.
    ///
    /// `timestamp.available` is the number of capture frames still buffered in
    /// hardware after this block was read. On `Err` the buffer is unchanged,
    /// so the caller can pass the raw capture on (fail-open). That covers
    /// `EngineTimeout` and `EngineInputLost` as well as configuration errors.
    pub fn process(&self, buffer: &mut [u8], timestamp: TimestampRecord) -> Result<ProcessReport> {
        let budget = self.config.engine_timeout();
        let deadline = Instant::now() + budget;

        let mut state = self.shared.state.lock();
        if state.is_closed() {
            return Err(AecError::SessionClosed);
        }
        let mic_format = state.mic.format().ok_or(AecError::NotConfigured(Side::Mic))?;
        let frame_size = mic_format.frame_size();
        validate_mic_buffer(buffer.len(), frame_size, state.mic.capacity_bytes())?;
        let frames = buffer.len() / frame_size;
        state.mic.observe(timestamp);

        if self.config.bypass_when_idle && !state.reference.is_running() {
            state.stats.blocks_bypassed += 1;
            crate::trace!("Playback idle, bypassing {} frames", frames);
            return Ok(ProcessReport {
                frames,
                bypassed: true,
                ..ProcessReport::default()
            });
        }

        if let Err(e) = self.shared.wait_idle(&mut state, deadline, budget) {
            if matches!(e, AecError::EngineTimeout(_)) {
                state.stats.engine_timeouts += 1;
                crate::warn!("Previous engine call still running, passing capture through");
            }
            return Err(e);
        }

        let st = &mut *state;
        let correlator = st.correlator;
        let correlation = correlator.align(&mut st.reference, &timestamp, frames, &mut st.reference_block);
        if correlation.underrun() {
            st.stats.underruns += 1;
        }
        if correlation.resynced {
            st.stats.resyncs += 1;
        }

        st.mic.reset_fifo();
        st.output.reset_fifo();
        st.mic.write(buffer, timestamp)?;
        let layout = BlockLayout {
            sampling_rate: mic_format.sampling_rate,
            channels: mic_format.channels,
            frames,
        };
        let seq = self.shared.submit(
            st,
            layout,
            mic_format.sample_format,
            buffer.len(),
            timestamp,
        );

        if let Err(e) = self.shared.wait_completion(&mut state, seq, deadline, budget) {
            if matches!(e, AecError::EngineTimeout(_)) {
                state.stats.engine_timeouts += 1;
            }
            return Err(e);
        }

        state.output.read_into(buffer)?;
        state.stats.blocks_processed += 1;
        Ok(ProcessReport {
            frames,
            bypassed: false,
            underrun: correlation.underrun(),
            resynced: correlation.resynced,
        })
    }

    /// Snapshot of the synchronization counters
    pub fn stats(&self) -> SyncStats {
        self.shared.state.lock().snapshot_stats()
    }

    /// Bounded wait for an engine call to finish before a side is resized or
    /// released. The worker only touches FIFOs under the lock, so proceeding
    /// after a timeout is safe; the late result is simply not delivered.
    fn wait_for_in_flight(&self, state: &mut parking_lot::MutexGuard<'_, SessionState>) {
        let budget = self.config.engine_timeout();
        if let Err(e) = self.shared.wait_idle(state, Instant::now() + budget, budget) {
            crate::warn!("Tearing down with an engine call in flight: {}", e);
            if let Some(call) = state.pending.take() {
                state.completed_seq = state.completed_seq.max(call.seq);
            }
        }
    }
}

impl Drop for AecSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AecSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AecSession")
            .field("config", &self.config)
            .field("open", &self.worker.is_running())
            .finish_non_exhaustive()
    }
}

fn validate_mic_buffer(len: usize, frame_size: usize, capacity: usize) -> Result<()> {
    let reason = if len == 0 {
        "empty block"
    } else if len % frame_size != 0 {
        "not a whole number of frames"
    } else if len > capacity {
        "larger than the microphone FIFO"
    } else {
        return Ok(());
    };
    Err(AecError::InvalidBuffer {
        side: Side::Mic,
        len,
        reason,
    })
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
