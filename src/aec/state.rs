// Session state guarded by the session lock
// Shared between the capture path, the playback path and the coordinator worker

use parking_lot::{Condvar, Mutex};

use super::coordinator::{CoordinatorState, PendingCall};
use super::correlator::Correlator;
use super::diagnostics::SyncStats;
use super::tracker::SideTracker;
use super::Side;

/// Everything the session lock protects
#[derive(Debug)]
pub(crate) struct SessionState {
    pub mic: SideTracker,
    pub reference: SideTracker,
    pub output: SideTracker,
    pub correlator: Correlator,
    /// Aligned reference block for the call in flight (storage format)
    pub reference_block: Vec<u8>,
    pub phase: CoordinatorState,
    pub pending: Option<PendingCall>,
    pub next_seq: u64,
    pub completed_seq: u64,
    /// Call whose caller timed out while the engine was running it
    pub abandoned_seq: Option<u64>,
    /// Call the worker completed without running the engine
    pub failed_seq: Option<u64>,
    pub stats: SyncStats,
}

impl SessionState {
    pub fn new(correlator: Correlator) -> Self {
        Self {
            mic: SideTracker::new(Side::Mic),
            reference: SideTracker::new(Side::Reference),
            output: SideTracker::new(Side::Output),
            correlator,
            reference_block: Vec::new(),
            phase: CoordinatorState::Idle,
            pending: None,
            next_seq: 1,
            completed_seq: 0,
            abandoned_seq: None,
            failed_seq: None,
            stats: SyncStats::default(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.phase == CoordinatorState::Stopping
    }

    /// Counters plus a live view of the reference tracker
    pub fn snapshot_stats(&self) -> SyncStats {
        SyncStats {
            reference_bytes_written: self.reference.bytes_written(),
            reference_bytes_consumed: self.reference.bytes_consumed(),
            reference_bytes_discarded: self.reference.bytes_discarded(),
            reference_fifo_bytes: self.reference.occupancy() as u64,
            ..self.stats.clone()
        }
    }
}

/// Session lock plus the two conditions of the coordinator protocol
pub(crate) struct Shared {
    pub state: Mutex<SessionState>,
    /// Signalled when a call is deposited (worker waits on it)
    pub ready: Condvar,
    /// Signalled when a call completes or the session stops (capture waits on it)
    pub done: Condvar,
}

impl Shared {
    pub fn new(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
            ready: Condvar::new(),
            done: Condvar::new(),
        }
    }
}
