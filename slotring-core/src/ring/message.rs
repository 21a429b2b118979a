// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Numbered test payloads and sequence checking.
//!
//! The ring treats slots as opaque bytes. The generated workload writes
//! `"message <seq>"` followed by NUL padding so the consumer can verify
//! ordering.

use std::ffi::CStr;
use std::fmt::Write as _;

use serde::Serialize;

const PREFIX: &str = "message ";

/// A fixed-size numbered payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    bytes: Vec<u8>,
}

impl Message {
    /// Build `"message <seq>"` NUL-padded to exactly `size` bytes.
    ///
    /// The text is truncated if `size` cannot hold it; the last byte is
    /// always NUL.
    pub fn numbered(seq: u64, size: usize) -> Self {
        let mut text = String::with_capacity(PREFIX.len() + 20);
        text.push_str(PREFIX);
        // Writing to a String never fails.
        let _ = write!(text, "{}", seq);

        let mut bytes = vec![0u8; size];
        let len = text.len().min(size.saturating_sub(1));
        bytes[..len].copy_from_slice(&text.as_bytes()[..len]);

        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Parse the sequence number out of a slot's bytes.
    pub fn sequence_of(slot: &[u8]) -> Option<u64> {
        CStr::from_bytes_until_nul(slot)
            .ok()?
            .to_str()
            .ok()?
            .strip_prefix(PREFIX)?
            .parse()
            .ok()
    }
}

/// A consumed slot whose sequence number did not match the running counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Desynchronization {
    /// Logical position of the message in the stream.
    pub position: u64,
    pub expected: u64,
    /// `None` when the slot did not hold a parseable numbered message.
    pub observed: Option<u64>,
}

/// Running sequence validator. Mismatches are soft faults.
#[derive(Debug, Default)]
pub struct SequenceCheck {
    expected: u64,
    mismatches: u64,
    first: Option<Desynchronization>,
}

impl SequenceCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one consumed slot and advance the counter.
    ///
    /// Returns the fault, if any. Counting continues regardless.
    pub fn observe(&mut self, slot: &[u8]) -> Option<Desynchronization> {
        let expected = self.expected;
        self.expected += 1;

        let observed = Message::sequence_of(slot);
        if observed == Some(expected) {
            return None;
        }

        let fault = Desynchronization {
            position: expected,
            expected,
            observed,
        };
        self.mismatches += 1;
        self.first.get_or_insert(fault);

        tracing::warn!(
            position = fault.position,
            expected = fault.expected,
            observed = ?fault.observed,
            "Consumer desynchronized"
        );

        Some(fault)
    }

    pub fn checked(&self) -> u64 {
        self.expected
    }

    pub fn mismatches(&self) -> u64 {
        self.mismatches
    }

    pub fn in_sync(&self) -> bool {
        self.mismatches == 0
    }

    pub fn first_desync(&self) -> Option<Desynchronization> {
        self.first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_message_layout() {
        let msg = Message::numbered(42, 64);
        assert_eq!(msg.as_bytes().len(), 64);
        assert!(msg.as_bytes().starts_with(b"message 42\0"));
        assert!(msg.as_bytes()[10..].iter().all(|&b| b == 0));
        assert_eq!(Message::sequence_of(msg.as_bytes()), Some(42));
    }

    #[test]
    fn test_max_sequence_fits_minimum_slot() {
        let msg = Message::numbered(u64::MAX, crate::types::MIN_MESSAGE_SIZE);
        assert_eq!(Message::sequence_of(msg.as_bytes()), Some(u64::MAX));
    }

    #[test]
    fn test_sequence_of_rejects_garbage() {
        assert_eq!(Message::sequence_of(&[0u8; 16]), None);
        assert_eq!(Message::sequence_of(b"message x\0"), None);
        assert_eq!(Message::sequence_of(b"message 7"), None);
        assert_eq!(Message::sequence_of(b"hello 7\0"), None);
    }

    #[test]
    fn test_sequence_check_soft_fault() {
        let mut check = SequenceCheck::new();
        assert!(check.observe(Message::numbered(0, 32).as_bytes()).is_none());

        let fault = check.observe(Message::numbered(5, 32).as_bytes()).unwrap();
        assert_eq!(fault.expected, 1);
        assert_eq!(fault.observed, Some(5));

        // Counting continues past the fault
        assert!(check.observe(Message::numbered(2, 32).as_bytes()).is_none());
        assert_eq!(check.checked(), 3);
        assert_eq!(check.mismatches(), 1);
        assert!(!check.in_sync());
        assert_eq!(check.first_desync(), Some(fault));
    }
}
