// Coordinator thread for the cancellation engine
//
// The capture path deposits one call at a time under the session lock and
// waits (bounded) on `done`. The worker picks the call up on `ready`, runs the
// engine with the lock released, then publishes the result to the output FIFO.
// Callers that give up early either withdraw a call the worker never saw or
// mark a running one abandoned so its late result is dropped.

use parking_lot::MutexGuard;
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::engine::{BlockLayout, EchoCanceller};
use super::fifo::TimestampRecord;
use super::format::SampleFormat;
use super::resampler::REFERENCE_STORAGE_FORMAT;
use super::state::{SessionState, Shared};
use crate::error::{AecError, Result};

/// Phase of the single in-flight engine call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No call in flight
    Idle,
    /// A call was deposited and the worker has not picked it up
    ArgsReady,
    /// The worker is running the engine
    Running,
    /// The session is closing; nothing new is accepted
    Stopping,
}

/// Arguments of one engine call. The audio itself travels through the mic
/// FIFO and the session's reference block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingCall {
    pub seq: u64,
    pub layout: BlockLayout,
    pub mic_format: SampleFormat,
    pub mic_bytes: usize,
    pub timestamp: TimestampRecord,
}

impl Shared {
    /// Block until no call is in flight.
    ///
    /// Fails with `EngineTimeout` once `deadline` passes and with
    /// `SessionClosed` if the session starts stopping.
    pub(crate) fn wait_idle(
        &self,
        state: &mut MutexGuard<'_, SessionState>,
        deadline: Instant,
        budget: Duration,
    ) -> Result<()> {
        loop {
            match state.phase {
                CoordinatorState::Idle => return Ok(()),
                CoordinatorState::Stopping => return Err(AecError::SessionClosed),
                CoordinatorState::ArgsReady | CoordinatorState::Running => {}
            }
            if self.done.wait_until(state, deadline).timed_out() {
                return match state.phase {
                    CoordinatorState::Idle => Ok(()),
                    CoordinatorState::Stopping => Err(AecError::SessionClosed),
                    _ => Err(AecError::EngineTimeout(budget)),
                };
            }
        }
    }

    /// Deposit a call and wake the worker. The mic block must already be in
    /// the mic FIFO and the aligned reference in `reference_block`.
    pub(crate) fn submit(
        &self,
        state: &mut SessionState,
        layout: BlockLayout,
        mic_format: SampleFormat,
        mic_bytes: usize,
        timestamp: TimestampRecord,
    ) -> u64 {
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending = Some(PendingCall {
            seq,
            layout,
            mic_format,
            mic_bytes,
            timestamp,
        });
        state.phase = CoordinatorState::ArgsReady;
        self.ready.notify_one();
        seq
    }

    /// Wait until call `seq` completes or `deadline` passes.
    ///
    /// On timeout a call the worker has not picked up is withdrawn; one that is
    /// already running is marked abandoned and its result discarded later.
    /// A call the worker had to drop fails with `EngineInputLost`.
    pub(crate) fn wait_completion(
        &self,
        state: &mut MutexGuard<'_, SessionState>,
        seq: u64,
        deadline: Instant,
        budget: Duration,
    ) -> Result<()> {
        loop {
            if state.completed_seq >= seq {
                return finished(state, seq);
            }
            if state.phase == CoordinatorState::Stopping {
                return Err(AecError::SessionClosed);
            }
            if self.done.wait_until(state, deadline).timed_out() {
                if state.completed_seq >= seq {
                    return finished(state, seq);
                }
                match state.phase {
                    CoordinatorState::ArgsReady => {
                        state.pending = None;
                        state.mic.reset_fifo();
                        state.phase = CoordinatorState::Idle;
                        crate::warn!("Engine call {} withdrawn before pickup", seq);
                    }
                    CoordinatorState::Running => {
                        state.abandoned_seq = Some(seq);
                        crate::warn!("Engine call {} exceeded {:?}, abandoning", seq, budget);
                    }
                    CoordinatorState::Stopping => return Err(AecError::SessionClosed),
                    CoordinatorState::Idle => {}
                }
                return Err(AecError::EngineTimeout(budget));
            }
        }
    }
}

fn finished(state: &mut SessionState, seq: u64) -> Result<()> {
    if state.failed_seq == Some(seq) {
        state.failed_seq = None;
        return Err(AecError::EngineInputLost(seq));
    }
    Ok(())
}

/// Handle to the coordinator worker thread
///
/// Stopping is idempotent; the thread is joined on the first stop.
pub(crate) struct WorkerHandle {
    shared: Arc<Shared>,
    thread: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Spawn the worker with exclusive ownership of `engine`
    pub(crate) fn spawn(shared: Arc<Shared>, engine: Box<dyn EchoCanceller>) -> Result<Self> {
        let worker_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("aec-worker".to_string())
            .spawn(move || worker_main(worker_shared, engine))
            .map_err(|e| AecError::Config(format!("Failed to spawn engine worker: {}", e)))?;

        Ok(Self {
            shared,
            thread: parking_lot::Mutex::new(Some(thread)),
        })
    }

    /// Move to `Stopping`, wake both sides and join the worker
    pub(crate) fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.phase = CoordinatorState::Stopping;
            state.pending = None;
        }
        self.shared.ready.notify_all();
        self.shared.done.notify_all();

        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                crate::error!("AEC worker panicked before shutdown");
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.thread.lock().is_some()
    }
}

/// Buffers owned by the worker, reused across calls
#[derive(Default)]
struct WorkerScratch {
    mic_bytes: Vec<u8>,
    reference_bytes: Vec<u8>,
    mic: Vec<f32>,
    reference: Vec<f32>,
    output: Vec<f32>,
    output_bytes: Vec<u8>,
}

/// Main loop for the worker thread
#[cfg_attr(coverage_nightly, coverage(off))]
fn worker_main(shared: Arc<Shared>, mut engine: Box<dyn EchoCanceller>) {
    crate::info!("AEC worker started");
    let mut scratch = WorkerScratch::default();

    loop {
        let call = {
            let mut state = shared.state.lock();
            loop {
                let phase = state.phase;
                match phase {
                    CoordinatorState::Stopping => {
                        drop(state);
                        crate::info!("AEC worker exiting");
                        return;
                    }
                    CoordinatorState::ArgsReady => break,
                    CoordinatorState::Idle | CoordinatorState::Running => shared.ready.wait(&mut state),
                }
            }
            match pick_up(&mut state, &mut scratch) {
                Some(call) => {
                    state.phase = CoordinatorState::Running;
                    call
                }
                None => {
                    state.phase = CoordinatorState::Idle;
                    shared.done.notify_all();
                    continue;
                }
            }
        };

        run_engine(engine.as_mut(), &call, &mut scratch);

        let mut state = shared.state.lock();
        publish(&mut state, &call, &scratch.output_bytes);
        drop(state);
        shared.done.notify_all();
    }
}

/// Take the deposited call and move its audio into worker-owned buffers
fn pick_up(state: &mut SessionState, scratch: &mut WorkerScratch) -> Option<PendingCall> {
    let call = state.pending.take()?;
    scratch.mic_bytes.clear();
    scratch.mic_bytes.resize(call.mic_bytes, 0);
    if let Err(e) = state.mic.read_into(&mut scratch.mic_bytes) {
        crate::error!("Engine call {} lost its microphone block: {}", call.seq, e);
        state.completed_seq = call.seq;
        state.failed_seq = Some(call.seq);
        return None;
    }
    mem::swap(&mut scratch.reference_bytes, &mut state.reference_block);
    Some(call)
}

fn run_engine(engine: &mut dyn EchoCanceller, call: &PendingCall, scratch: &mut WorkerScratch) {
    call.mic_format.decode(&scratch.mic_bytes, &mut scratch.mic);
    REFERENCE_STORAGE_FORMAT.decode(&scratch.reference_bytes, &mut scratch.reference);

    let samples = call.layout.samples();
    // Both sides carry the mic layout; guard against a short reference anyway
    scratch.reference.resize(samples, 0.0);
    scratch.mic.resize(samples, 0.0);
    scratch.output.clear();
    scratch.output.resize(samples, 0.0);

    engine.cancel(call.layout, &scratch.mic, &scratch.reference, &mut scratch.output);

    scratch.output_bytes.clear();
    call.mic_format.encode(&scratch.output, &mut scratch.output_bytes);
}

/// Hand the result to the waiting caller, or drop it if the caller gave up
fn publish(state: &mut SessionState, call: &PendingCall, output: &[u8]) {
    if state.abandoned_seq == Some(call.seq) {
        state.abandoned_seq = None;
        state.stats.late_results_discarded += 1;
        crate::warn!("Discarding late engine result for call {}", call.seq);
    } else if state.phase != CoordinatorState::Stopping {
        match state.output.write(output, call.timestamp) {
            Ok(0) => {}
            Ok(dropped) => crate::warn!("Output FIFO dropped {} bytes", dropped),
            Err(e) => crate::error!("Engine result for call {} not delivered: {}", call.seq, e),
        }
    }

    state.completed_seq = call.seq;
    if state.phase == CoordinatorState::Running {
        state.phase = CoordinatorState::Idle;
    }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod tests;
