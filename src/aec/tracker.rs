// Stream side tracker
// Per-side synchronization state: format metadata, FIFO, running edges, byte accounting

use super::fifo::{TimestampRecord, TimestampedFifo};
use super::format::StreamFormat;
use super::Side;
use crate::error::{AecError, Result};

/// Synchronization state of one physical stream (mic, reference or output).
///
/// `format` is the stream's native format. `storage_frame_size` is the frame
/// size of what the FIFO holds, which differs from the native one on the
/// reference side (it stores resampled, mic-layout audio).
#[derive(Debug)]
pub struct SideTracker {
    side: Side,
    format: Option<StreamFormat>,
    storage_frame_size: usize,
    fifo: Option<TimestampedFifo>,
    last_timestamp: Option<TimestampRecord>,
    running: bool,
    prev_running: bool,
    bytes_written: u64,
    bytes_consumed: u64,
    bytes_discarded: u64,
}

impl SideTracker {
    /// Create an unconfigured tracker
    pub fn new(side: Side) -> Self {
        Self {
            side,
            format: None,
            storage_frame_size: 0,
            fifo: None,
            last_timestamp: None,
            running: false,
            prev_running: false,
            bytes_written: 0,
            bytes_consumed: 0,
            bytes_discarded: 0,
        }
    }

    /// Attach the stream format and allocate the FIFO.
    ///
    /// Called when the corresponding stream opens. Reconfiguring replaces the
    /// FIFO and restarts the byte accounting.
    pub fn configure(
        &mut self,
        format: StreamFormat,
        storage_frame_size: usize,
        capacity_bytes: usize,
    ) -> Result<()> {
        if storage_frame_size == 0 || capacity_bytes % storage_frame_size != 0 {
            return Err(AecError::Config(format!(
                "{} FIFO capacity {} is not a whole number of {}-byte frames",
                self.side, capacity_bytes, storage_frame_size
            )));
        }
        let fifo = TimestampedFifo::new(self.side, capacity_bytes)?;

        crate::debug!(
            "[{}] configured: {} Hz, {} ch, {:?}, FIFO {} bytes",
            self.side,
            format.sampling_rate,
            format.channels,
            format.sample_format,
            capacity_bytes
        );
        self.format = Some(format);
        self.storage_frame_size = storage_frame_size;
        self.fifo = Some(fifo);
        self.last_timestamp = None;
        self.bytes_written = 0;
        self.bytes_consumed = 0;
        self.bytes_discarded = 0;
        Ok(())
    }

    /// Record a running-state change.
    ///
    /// On a false→true edge the FIFO is flushed so audio from before the gap
    /// is never correlated against new frames. Returns true on that edge.
    pub fn set_running(&mut self, running: bool) -> bool {
        self.prev_running = self.running;
        self.running = running;

        let started = running && !self.prev_running;
        if started {
            let flushed = self.reset_fifo();
            self.last_timestamp = None;
            if flushed > 0 {
                crate::debug!("[{}] started, flushed {} stale bytes", self.side, flushed);
            }
        }
        started
    }

    /// Release the FIFO and format. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if self.fifo.take().is_some() {
            crate::debug!("[{}] destroyed", self.side);
        }
        self.format = None;
        self.storage_frame_size = 0;
        self.last_timestamp = None;
        self.running = false;
        self.prev_running = false;
    }

    /// Append bytes with their timestamp; returns the bytes dropped by an overrun
    pub fn write(&mut self, bytes: &[u8], timestamp: TimestampRecord) -> Result<usize> {
        let side = self.side;
        let fifo = self.fifo.as_mut().ok_or(AecError::NotConfigured(side))?;
        let dropped = fifo.write(bytes, timestamp);
        self.bytes_written += bytes.len() as u64;
        self.bytes_discarded += dropped as u64;
        self.last_timestamp = Some(timestamp);
        Ok(dropped)
    }

    /// Read exactly `dst.len()` bytes, or fail with `Underrun` consuming nothing
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<()> {
        let side = self.side;
        let fifo = self.fifo.as_mut().ok_or(AecError::NotConfigured(side))?;
        fifo.read_into(dst)?;
        self.bytes_consumed += dst.len() as u64;
        Ok(())
    }

    /// Consume up to `n` bytes without reading them
    pub fn skip(&mut self, n: usize) -> usize {
        let skipped = self.fifo.as_mut().map_or(0, |f| f.skip(n));
        self.bytes_consumed += skipped as u64;
        skipped
    }

    /// Flush the FIFO; returns the number of bytes dropped
    pub fn reset_fifo(&mut self) -> usize {
        let dropped = self.fifo.as_mut().map_or(0, |f| f.clear());
        self.bytes_discarded += dropped as u64;
        dropped
    }

    /// Remember the latest hardware timestamp without buffering data
    pub fn observe(&mut self, timestamp: TimestampRecord) {
        self.last_timestamp = Some(timestamp);
    }

    /// Latest timestamp: the last one written or observed, else the newest
    /// buffered record
    pub fn latest_timestamp(&self) -> Option<TimestampRecord> {
        self.last_timestamp
            .or_else(|| self.fifo.as_ref().and_then(|f| f.peek_timestamp()))
    }

    /// Bytes written but neither consumed nor discarded, i.e. the FIFO occupancy
    pub fn read_write_diff(&self) -> i64 {
        self.bytes_written as i64 - self.bytes_consumed as i64 - self.bytes_discarded as i64
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn is_configured(&self) -> bool {
        self.fifo.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn was_running(&self) -> bool {
        self.prev_running
    }

    pub fn storage_frame_size(&self) -> usize {
        self.storage_frame_size
    }

    pub fn occupancy(&self) -> usize {
        self.fifo.as_ref().map_or(0, |f| f.len())
    }

    pub fn capacity_bytes(&self) -> usize {
        self.fifo.as_ref().map_or(0, |f| f.capacity())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded
    }
}

#[cfg(test)]
#[path = "tracker_test.rs"]
mod tests;
