// Timestamped byte FIFO
// A fixed-capacity ring of PCM bytes plus the timestamp records that account for them

use std::collections::VecDeque;
use std::time::Duration;

use ringbuf::{
    traits::{Consumer, Observer, Producer},
    HeapRb,
};

use super::Side;
use crate::error::{AecError, Result};

/// Timing metadata reported by the hardware layer on every PCM read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampRecord {
    /// Monotonic time of the hardware transfer
    pub time: Duration,
    /// Frames sitting in the hardware buffer at `time`.
    ///
    /// Playback: frames queued but not yet rendered. Capture: frames captured
    /// but not yet read.
    pub available: u32,
    /// Bytes transferred by this read or write
    pub bytes: usize,
}

impl TimestampRecord {
    /// Create a timestamp record
    pub fn new(time: Duration, available: u32, bytes: usize) -> Self {
        Self {
            time,
            available,
            bytes,
        }
    }
}

/// A record plus how many of its bytes are still buffered
#[derive(Debug, Clone, Copy)]
struct PendingRecord {
    record: TimestampRecord,
    remaining: usize,
}

/// Fixed-capacity byte FIFO with a queue of timestamp records.
///
/// Invariant: the `remaining` counts of the queued records always sum to the
/// number of buffered bytes, so a consumer can never take bytes that no record
/// accounts for. One writer and one reader; callers synchronize access.
pub struct TimestampedFifo {
    side: Side,
    ring: HeapRb<u8>,
    records: VecDeque<PendingRecord>,
}

impl TimestampedFifo {
    /// Create a FIFO holding at most `capacity` bytes
    pub fn new(side: Side, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(AecError::Config(format!("{} FIFO capacity must be non-zero", side)));
        }
        Ok(Self {
            side,
            ring: HeapRb::new(capacity),
            records: VecDeque::new(),
        })
    }

    /// Append `bytes` and record `timestamp` for them.
    ///
    /// If the FIFO cannot hold everything, the oldest bytes are evicted first.
    /// Returns the number of bytes dropped (0 unless the write overran).
    pub fn write(&mut self, bytes: &[u8], timestamp: TimestampRecord) -> usize {
        if bytes.is_empty() {
            return 0;
        }
        let capacity = self.capacity();

        // Only the newest `capacity` bytes of an oversized write can survive
        let (kept, truncated) = if bytes.len() > capacity {
            (&bytes[bytes.len() - capacity..], bytes.len() - capacity)
        } else {
            (bytes, 0)
        };

        let overflow = (self.len() + kept.len()).saturating_sub(capacity);
        let evicted = self.discard_front(overflow);

        let pushed = self.ring.push_slice(kept);
        debug_assert_eq!(pushed, kept.len());

        if let Some(last) = self.records.back() {
            if timestamp.time < last.record.time {
                crate::warn!(
                    "[{} fifo] Timestamp went backwards ({:?} < {:?}), keeping arrival order",
                    self.side,
                    timestamp.time,
                    last.record.time
                );
            }
        }
        self.records.push_back(PendingRecord {
            record: timestamp,
            remaining: pushed,
        });

        evicted + truncated
    }

    /// Remove exactly `n` bytes in arrival order.
    pub fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        self.read_into(&mut out)?;
        Ok(out)
    }

    /// Fill `dst` with the oldest buffered bytes.
    ///
    /// Fails with `Underrun` and consumes nothing if fewer than `dst.len()`
    /// bytes are buffered.
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<()> {
        let available = self.len();
        if dst.len() > available {
            return Err(AecError::Underrun {
                side: self.side,
                requested: dst.len(),
                available,
            });
        }
        let popped = self.ring.pop_slice(dst);
        self.release_records(popped);
        Ok(())
    }

    /// Discard up to `n` bytes from the front; returns how many were discarded
    pub fn skip(&mut self, n: usize) -> usize {
        self.discard_front(n)
    }

    /// Most recent timestamp still accounting for buffered bytes
    pub fn peek_timestamp(&self) -> Option<TimestampRecord> {
        self.records.back().map(|p| p.record)
    }

    /// Drop all bytes and records; returns the number of bytes dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.len();
        self.discard_front(dropped)
    }

    /// Buffered bytes
    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    /// True if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Fixed capacity in bytes
    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    /// Number of queued timestamp records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn discard_front(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let skipped = self.ring.skip(n);
        self.release_records(skipped);
        skipped
    }

    /// Account `n` consumed bytes against the oldest records
    fn release_records(&mut self, mut n: usize) {
        while n > 0 {
            let Some(front) = self.records.front_mut() else {
                break;
            };
            if front.remaining > n {
                front.remaining -= n;
                return;
            }
            n -= front.remaining;
            self.records.pop_front();
        }
    }
}

impl std::fmt::Debug for TimestampedFifo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampedFifo")
            .field("side", &self.side)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("records", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: u64, bytes: usize) -> TimestampRecord {
        TimestampRecord::new(Duration::from_millis(ms), 0, bytes)
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            TimestampedFifo::new(Side::Reference, 0),
            Err(AecError::Config(_))
        ));
    }

    #[test]
    fn test_reads_preserve_arrival_order() {
        let mut fifo = TimestampedFifo::new(Side::Reference, 16).unwrap();
        fifo.write(&[1, 2, 3], ts(0, 3));
        fifo.write(&[4, 5], ts(1, 2));

        assert_eq!(fifo.read(2).unwrap(), vec![1, 2]);
        assert_eq!(fifo.read(3).unwrap(), vec![3, 4, 5]);
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_read_underrun_consumes_nothing() {
        let mut fifo = TimestampedFifo::new(Side::Mic, 8).unwrap();
        fifo.write(&[7, 7, 7], ts(0, 3));

        let err = fifo.read(4).unwrap_err();
        assert_eq!(
            err,
            AecError::Underrun {
                side: Side::Mic,
                requested: 4,
                available: 3
            }
        );
        assert_eq!(fifo.len(), 3);
        assert_eq!(fifo.record_count(), 1);
    }

    #[test]
    fn test_overrun_evicts_oldest_bytes() {
        let mut fifo = TimestampedFifo::new(Side::Reference, 4).unwrap();
        assert_eq!(fifo.write(&[1, 2, 3], ts(0, 3)), 0);

        let dropped = fifo.write(&[4, 5, 6], ts(1, 3));
        assert_eq!(dropped, 2);
        assert_eq!(fifo.len(), 4);
        assert_eq!(fifo.read(4).unwrap(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_oversized_write_keeps_newest_bytes() {
        let mut fifo = TimestampedFifo::new(Side::Reference, 3).unwrap();
        fifo.write(&[9], ts(0, 1));

        let dropped = fifo.write(&[1, 2, 3, 4, 5], ts(1, 5));
        assert_eq!(dropped, 3); // 1 evicted + 2 truncated
        assert_eq!(fifo.read(3).unwrap(), vec![3, 4, 5]);
    }

    #[test]
    fn test_records_track_buffered_bytes() {
        let mut fifo = TimestampedFifo::new(Side::Reference, 8).unwrap();
        fifo.write(&[0; 3], ts(0, 3));
        fifo.write(&[0; 3], ts(1, 3));
        assert_eq!(fifo.record_count(), 2);

        // Partially consuming the first record keeps it queued
        fifo.read(2).unwrap();
        assert_eq!(fifo.record_count(), 2);

        // Finishing it releases it
        fifo.read(1).unwrap();
        assert_eq!(fifo.record_count(), 1);

        // Eviction releases records as well
        fifo.write(&[0; 8], ts(2, 8));
        assert_eq!(fifo.record_count(), 1);
        assert_eq!(fifo.peek_timestamp(), Some(ts(2, 8)));
    }

    #[test]
    fn test_peek_timestamp_returns_latest_without_consuming() {
        let mut fifo = TimestampedFifo::new(Side::Reference, 8).unwrap();
        assert_eq!(fifo.peek_timestamp(), None);
        fifo.write(&[1, 2], ts(5, 2));
        fifo.write(&[3, 4], ts(6, 2));

        assert_eq!(fifo.peek_timestamp(), Some(ts(6, 2)));
        assert_eq!(fifo.len(), 4);
    }

    #[test]
    fn test_skip_is_bounded_by_occupancy() {
        let mut fifo = TimestampedFifo::new(Side::Reference, 8).unwrap();
        fifo.write(&[1, 2, 3], ts(0, 3));
        assert_eq!(fifo.skip(10), 3);
        assert_eq!(fifo.record_count(), 0);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut fifo = TimestampedFifo::new(Side::Output, 8).unwrap();
        fifo.write(&[1, 2, 3], ts(0, 3));
        assert_eq!(fifo.clear(), 3);
        assert!(fifo.is_empty());
        assert_eq!(fifo.peek_timestamp(), None);
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let mut fifo = TimestampedFifo::new(Side::Reference, 4).unwrap();
        for round in 0u8..10 {
            fifo.write(&[round, round + 100], ts(round as u64, 2));
            assert_eq!(fifo.read(2).unwrap(), vec![round, round + 100]);
        }
    }
}
