// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Producer - the single writer of `head` and of the slot at `head`.
//!
//! Publication order for every message:
//! 1. load `head` (own index, relaxed) and `tail` (acquire)
//! 2. while full, poll the stop signal and back off
//! 3. copy the payload into `slots[head]`
//! 4. store `head = next(head)` with release ordering
//!
//! `head` never moves before the whole payload is in the slot, so a stop
//! can never leave a half-published message behind.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use serde::Serialize;

use crate::error::RingError;
use crate::ring::{Message, SharedRegion};
use crate::state::{ProducerControl, ProducerState};
use crate::timestamp::{PhaseRecorder, PhaseTag, Timestamp};

/// Result of a blocking publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The message is visible to the consumer.
    Published,
    /// Stop was requested while waiting for a free slot; nothing was written.
    Stopped,
}

/// End-of-run summary for the producer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProducerReport {
    pub published: u64,
    /// The run ended on a stop request rather than by exhausting its count.
    pub stopped_early: bool,
    #[serde(skip)]
    pub timestamps: Vec<Timestamp>,
}

/// Write end of the ring.
pub struct Producer {
    region: Arc<SharedRegion>,
    recorder: Option<PhaseRecorder>,
    published: u64,
}

impl Producer {
    pub(crate) fn new(region: Arc<SharedRegion>) -> Self {
        Self {
            region,
            recorder: None,
            published: 0,
        }
    }

    /// Record phase timestamps for every published message.
    pub fn with_recorder(mut self, recorder: PhaseRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    /// Number of messages published so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    #[inline]
    fn record(&mut self, tag: PhaseTag) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(tag, self.published);
        }
    }

    fn check_payload(&self, payload: &[u8]) -> Result<(), RingError> {
        let max = self.region.layout().msg_size();
        if payload.len() > max {
            return Err(RingError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }
        Ok(())
    }

    /// Load `(head, tail)`. `tail` is acquired so the consumer's read of a
    /// slot happens-before we overwrite it.
    #[inline]
    fn load(&self) -> (usize, usize) {
        (
            self.region.head().load(Ordering::Relaxed),
            self.region.tail().load(Ordering::Acquire),
        )
    }

    /// Copy the payload into `slots[head]` and publish it.
    fn commit(&mut self, head: usize, payload: &[u8]) {
        self.record(PhaseTag::WriteSyncEnd);
        self.record(PhaseTag::WriteStart);

        let msg_size = self.region.layout().msg_size();
        let slot = self.region.slot_ptr(head);
        // SAFETY: the slot at `head` is not visible to the consumer until the
        // release store below, and only this producer writes it. The slot is
        // msg_size bytes and payload.len() <= msg_size.
        unsafe {
            std::ptr::copy_nonoverlapping(payload.as_ptr(), slot, payload.len());
            std::ptr::write_bytes(slot.add(payload.len()), 0, msg_size - payload.len());
        }

        self.record(PhaseTag::WriteEnd);

        let next = self.region.layout().next(head);
        self.region.head().store(next, Ordering::Release);

        tracing::trace!(seq = self.published, slot = head, "Published");
        self.published += 1;
    }

    /// Publish without waiting.
    ///
    /// # Errors
    /// `Full` if all `SLOTS - 1` usable slots are outstanding.
    pub fn try_publish(&mut self, payload: &[u8]) -> Result<(), RingError> {
        self.check_payload(payload)?;

        let (head, tail) = self.load();
        if self.region.layout().is_full(head, tail) {
            return Err(RingError::Full);
        }

        self.record(PhaseTag::WriteSyncStart);
        self.commit(head, payload);
        Ok(())
    }

    /// Publish, spinning while the ring is full.
    ///
    /// The stop signal is polled at every spin iteration. On stop the
    /// message is not written and `head` is untouched.
    pub fn publish(
        &mut self,
        payload: &[u8],
        control: &ProducerControl,
    ) -> Result<PublishOutcome, RingError> {
        self.check_payload(payload)?;
        self.record(PhaseTag::WriteSyncStart);

        let backoff = Backoff::new();
        loop {
            let (head, tail) = self.load();
            if !self.region.layout().is_full(head, tail) {
                self.commit(head, payload);
                return Ok(PublishOutcome::Published);
            }

            if control.is_stop_requested() {
                tracing::debug!(published = self.published, "Stop requested while ring full");
                return Ok(PublishOutcome::Stopped);
            }

            backoff.snooze();
        }
    }

    /// Publish, waiting at most `timeout` for a free slot.
    ///
    /// # Errors
    /// `WouldBlock` if no slot freed up in time. Retriable.
    pub fn publish_timeout(&mut self, payload: &[u8], timeout: Duration) -> Result<(), RingError> {
        self.check_payload(payload)?;
        self.record(PhaseTag::WriteSyncStart);

        let start = Instant::now();
        let backoff = Backoff::new();
        loop {
            let (head, tail) = self.load();
            if !self.region.layout().is_full(head, tail) {
                self.commit(head, payload);
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

    /// Generate and publish numbered messages until `count` is reached
    /// (`None` = unbounded) or a stop is requested.
    ///
    /// The control must already be `Running`; on return it is `Stopped`.
    pub fn run(&mut self, count: Option<u64>, control: &ProducerControl) -> ProducerReport {
        let msg_size = self.region.layout().msg_size();
        let mut stopped_early = false;

        tracing::debug!(count = ?count, msg_size = msg_size, "Producer running");

        loop {
            if count.is_some_and(|limit| self.published >= limit) {
                break;
            }
            if control.is_stop_requested() {
                stopped_early = true;
                break;
            }

            let message = Message::numbered(self.published, msg_size);
            match self.publish(message.as_bytes(), control) {
                Ok(PublishOutcome::Published) => {}
                Ok(PublishOutcome::Stopped) => {
                    stopped_early = true;
                    break;
                }
                // Numbered messages are sized to the slot; cannot happen.
                Err(e) => {
                    tracing::error!(error = %e, "Producer publish failed");
                    break;
                }
            }
        }

        if let Err(e) = control.transition_to(ProducerState::Stopped) {
            tracing::warn!(error = %e, "Producer stopped from unexpected state");
        }

        tracing::debug!(
            published = self.published,
            stopped_early = stopped_early,
            "Producer finished"
        );

        ProducerReport {
            published: self.published,
            stopped_early,
            timestamps: self
                .recorder
                .as_mut()
                .map(PhaseRecorder::drain_records)
                .unwrap_or_default(),
        }
    }
}
