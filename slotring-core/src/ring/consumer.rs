// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Consumer - the single writer of `tail` and reader of the slot at `tail`.
//!
//! Mirror of the producer: `head` is loaded with acquire ordering before
//! the slot is touched, and `tail` is released only after the payload has
//! been copied out. Every wait is bounded; an empty ring yields a
//! retriable `WouldBlock` instead of spinning forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use serde::Serialize;

use crate::error::RingError;
use crate::ring::{Desynchronization, SequenceCheck, SharedRegion};
use crate::timestamp::{PhaseRecorder, PhaseTag, Timestamp};

/// End-of-run summary for the consumer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsumeReport {
    pub messages: u64,
    pub bytes: u64,
    pub mismatches: u64,
    /// Every consumed message carried the expected sequence number.
    pub in_sync: bool,
    pub first_desync: Option<Desynchronization>,
    #[serde(skip)]
    pub timestamps: Vec<Timestamp>,
}

/// Read end of the ring.
pub struct Consumer {
    region: Arc<SharedRegion>,
    recorder: Option<PhaseRecorder>,
    check: SequenceCheck,
    consumed: u64,
    bytes: u64,
    scratch: Vec<u8>,
}

impl Consumer {
    pub(crate) fn new(region: Arc<SharedRegion>) -> Self {
        let msg_size = region.layout().msg_size();
        Self {
            region,
            recorder: None,
            check: SequenceCheck::new(),
            consumed: 0,
            bytes: 0,
            scratch: vec![0u8; msg_size],
        }
    }

    /// Record phase timestamps for every consumed message.
    pub fn with_recorder(mut self, recorder: PhaseRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    /// Number of messages consumed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    #[inline]
    fn record(&mut self, tag: PhaseTag) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(tag, self.consumed);
        }
    }

    /// Load `(head, tail)`. `head` is acquired so the producer's payload
    /// write is visible before we read the slot.
    #[inline]
    fn load(&self) -> (usize, usize) {
        (
            self.region.head().load(Ordering::Acquire),
            self.region.tail().load(Ordering::Relaxed),
        )
    }

    /// Copy `slots[tail]` into `buf` and release the slot.
    fn take(&mut self, tail: usize, buf: &mut [u8]) {
        self.record(PhaseTag::ReadSyncEnd);
        self.record(PhaseTag::ReadStart);

        let msg_size = self.region.layout().msg_size();
        let slot = self.region.slot_ptr(tail);
        // SAFETY: the acquire load of `head` in `load` made the producer's
        // write of this slot visible, and the producer will not touch it
        // again until `tail` moves past it. buf holds at least msg_size bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(slot, buf.as_mut_ptr(), msg_size);
        }

        self.record(PhaseTag::ReadEnd);

        let next = self.region.layout().next(tail);
        self.region.tail().store(next, Ordering::Release);

        tracing::trace!(seq = self.consumed, slot = tail, "Consumed");
        self.consumed += 1;
    }

    fn check_buffer(&self, buf: &[u8]) -> Result<(), RingError> {
        let required = self.region.layout().msg_size();
        if buf.len() < required {
            return Err(RingError::BufferTooSmall {
                size: buf.len(),
                required,
            });
        }
        Ok(())
    }

    /// Consume one message without waiting.
    ///
    /// Exactly `MSG_SIZE` bytes are written to the front of `buf`.
    ///
    /// # Errors
    /// `Empty` if nothing is published, `BufferTooSmall` if `buf` cannot
    /// hold a slot.
    pub fn try_consume(&mut self, buf: &mut [u8]) -> Result<(), RingError> {
        self.check_buffer(buf)?;

        let (head, tail) = self.load();
        if self.region.layout().is_empty(head, tail) {
            return Err(RingError::Empty);
        }

        self.record(PhaseTag::ReadSyncStart);
        self.take(tail, buf);
        Ok(())
    }

    /// Consume one message, waiting at most `timeout` for one to arrive.
    ///
    /// # Errors
    /// `WouldBlock` if the ring stayed empty. Retriable.
    pub fn consume_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), RingError> {
        self.check_buffer(buf)?;
        self.record(PhaseTag::ReadSyncStart);

        let start = Instant::now();
        let backoff = Backoff::new();
        loop {
            let (head, tail) = self.load();
            if !self.region.layout().is_empty(head, tail) {
                self.take(tail, buf);
                return Ok(());
            }

            if start.elapsed() >= timeout {
                return Err(RingError::WouldBlock {
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }

            backoff.snooze();
        }
    }

    /// Consume into the scratch buffer and run the sequence check.
    fn consume_checked(&mut self, timeout: Duration) -> Result<(), RingError> {
        let mut scratch = std::mem::take(&mut self.scratch);
        let result = self.consume_timeout(&mut scratch, timeout);
        if result.is_ok() {
            self.bytes += scratch.len() as u64;
            self.check.observe(&scratch);
        }
        self.scratch = scratch;
        result
    }

    /// Consume exactly `count` numbered messages, validating their order.
    ///
    /// Sequence mismatches are soft faults: they are counted and the drain
    /// continues.
    ///
    /// # Errors
    /// `Stalled` if no message arrived within `poll_timeout`.
    pub fn drain(
        &mut self,
        count: u64,
        poll_timeout: Duration,
    ) -> Result<ConsumeReport, RingError> {
        let mut received = 0;
        while received < count {
            match self.consume_checked(poll_timeout) {
                Ok(()) => received += 1,
                Err(RingError::WouldBlock { waited_ms }) => {
                    tracing::warn!(received, expected = count, waited_ms, "Consumer stalled");
                    return Err(RingError::Stalled {
                        received,
                        expected: count,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(self.report())
    }

    /// Consume numbered messages until `stop` is set and the ring is empty.
    ///
    /// `poll_timeout` bounds each wait, so the stop flag is observed at
    /// least that often.
    pub fn drain_until(&mut self, stop: &AtomicBool, poll_timeout: Duration) -> ConsumeReport {
        loop {
            match self.consume_checked(poll_timeout) {
                Ok(()) => {}
                Err(RingError::WouldBlock { .. }) if stop.load(Ordering::Acquire) => break,
                Err(RingError::WouldBlock { .. }) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Consumer drain failed");
                    break;
                }
            }
        }

        self.report()
    }

    /// Summary of everything consumed so far.
    pub fn report(&mut self) -> ConsumeReport {
        ConsumeReport {
            messages: self.consumed,
            bytes: self.bytes,
            mismatches: self.check.mismatches(),
            in_sync: self.check.in_sync(),
            first_desync: self.check.first_desync(),
            timestamps: self
                .recorder
                .as_mut()
                .map(|r| r.drain_records())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{Message, Producer};
    use crate::shm::RegionLayout;
    use crate::types::{MessageSize, SlotCount};

    fn pair(slots: usize) -> (Producer, Consumer) {
        let layout =
            RegionLayout::new(SlotCount::new(slots).unwrap(), MessageSize::new(64).unwrap());
        SharedRegion::heap(layout).unwrap().into_split()
    }

    #[test]
    fn test_empty_ring() {
        let (_producer, mut consumer) = pair(4);
        let mut buf = [0u8; 64];
        assert_eq!(consumer.try_consume(&mut buf), Err(RingError::Empty));
        assert!(matches!(
            consumer.consume_timeout(&mut buf, Duration::from_millis(5)),
            Err(RingError::WouldBlock { .. })
        ));
    }

    #[test]
    fn test_buffer_too_small() {
        let (mut producer, mut consumer) = pair(4);
        producer.try_publish(b"hi").unwrap();

        let mut buf = [0u8; 63];
        assert_eq!(
            consumer.try_consume(&mut buf),
            Err(RingError::BufferTooSmall {
                size: 63,
                required: 64
            })
        );
        // slot not consumed
        assert_eq!(consumer.region().occupied(), 1);
    }

    #[test]
    fn test_fifo_across_wraparound() {
        let (mut producer, mut consumer) = pair(3);
        let mut buf = [0u8; 64];

        for seq in 0..10u64 {
            producer
                .try_publish(Message::numbered(seq, 64).as_bytes())
                .unwrap();
            consumer.try_consume(&mut buf).unwrap();
            assert_eq!(Message::sequence_of(&buf), Some(seq));
        }
        assert_eq!(consumer.region().snapshot(), (1, 1));
    }

    #[test]
    fn test_drain_reports_desync_as_soft_fault() {
        let (mut producer, mut consumer) = pair(8);
        for seq in [0u64, 1, 7, 3] {
            producer
                .try_publish(Message::numbered(seq, 64).as_bytes())
                .unwrap();
        }

        let report = consumer.drain(4, Duration::from_millis(50)).unwrap();
        assert_eq!(report.messages, 4);
        assert_eq!(report.bytes, 4 * 64);
        assert_eq!(report.mismatches, 1);
        assert!(!report.in_sync);
        let desync = report.first_desync.unwrap();
        assert_eq!(desync.expected, 2);
        assert_eq!(desync.observed, Some(7));
    }

    #[test]
    fn test_drain_stalls_without_producer() {
        let (mut producer, mut consumer) = pair(8);
        producer
            .try_publish(Message::numbered(0, 64).as_bytes())
            .unwrap();

        assert_eq!(
            consumer.drain(3, Duration::from_millis(10)).unwrap_err(),
            RingError::Stalled {
                received: 1,
                expected: 3
            }
        );
    }

    #[test]
    fn test_drain_until_stops_when_flag_set_and_empty() {
        let (mut producer, mut consumer) = pair(8);
        for seq in 0..3u64 {
            producer
                .try_publish(Message::numbered(seq, 64).as_bytes())
                .unwrap();
        }

        let stop = AtomicBool::new(true);
        let report = consumer.drain_until(&stop, Duration::from_millis(5));
        assert_eq!(report.messages, 3);
        assert!(report.in_sync);
    }
}
