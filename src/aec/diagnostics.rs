//! Synchronization health counters.
//!
//! Every per-call condition the core recovers from (overrun, underrun, drift
//! resync, engine timeout) is counted here so the stream layer can surface it
//! without the real-time paths ever failing.

use serde::Serialize;

/// Snapshot of a session's synchronization counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Blocks that went through the cancellation engine
    pub blocks_processed: u64,
    /// Blocks returned untouched because playback was stopped
    pub blocks_bypassed: u64,
    /// Blocks whose reference had to be padded with silence
    pub underruns: u64,
    /// Reference writes that evicted unread audio
    pub overruns: u64,
    /// Times drift exceeded the reference FIFO and forced a flush
    pub resyncs: u64,
    /// Calls that failed open because the engine exceeded its budget
    pub engine_timeouts: u64,
    /// Engine results that arrived after their caller gave up
    pub late_results_discarded: u64,
    /// False→true edges of the reference running flag
    pub reference_restarts: u64,
    /// Mic-rate bytes written to the reference FIFO
    pub reference_bytes_written: u64,
    /// Reference bytes consumed by correlation (read or skipped)
    pub reference_bytes_consumed: u64,
    /// Reference bytes dropped by overruns, flushes and resyncs
    pub reference_bytes_discarded: u64,
    /// Reference bytes currently buffered
    pub reference_fifo_bytes: u64,
}

impl SyncStats {
    /// Written minus consumed reference bytes.
    ///
    /// Stays bounded while capture and playback run at matched rates; unbounded
    /// growth means the offset arithmetic is not draining the reference.
    pub fn reference_backlog(&self) -> i64 {
        self.reference_bytes_written as i64 - self.reference_bytes_consumed as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backlog_is_written_minus_consumed() {
        let stats = SyncStats {
            reference_bytes_written: 1000,
            reference_bytes_consumed: 400,
            ..SyncStats::default()
        };
        assert_eq!(stats.reference_backlog(), 600);
    }

    #[test]
    fn test_stats_serialize_with_field_names() {
        let json = serde_json::to_string(&SyncStats::default()).unwrap();
        assert!(json.contains("\"engine_timeouts\":0"));
        assert!(json.contains("\"reference_fifo_bytes\":0"));
    }
}
