// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Region layout and index arithmetic.
//!
//! ```text
//! 0           +------------------------------+
//!             | head: usize (producer-owned) |
//!             | tail: usize (consumer-owned) |
//!             +------------------------------+
//!             | unused until buf_offset      |
//! buf_offset  +------------------------------+
//!             | slot 0       (msg_size)      |
//!             | ...                          |
//!             | slot SLOTS-1 (msg_size)      |
//!             +------------------------------+
//! ```
//!
//! Indices are logical slot numbers, never addresses, so the same arithmetic
//! applies to every backing in [`crate::shm`].

use std::mem::size_of;

use nix::unistd::{sysconf, SysconfVar};
use serde::Serialize;

use crate::error::HardValidationError;
use crate::types::{MessageSize, SlotCount};

/// Size of the control header: `head` then `tail`, one index word each.
pub const HEADER_SIZE: usize = 2 * size_of::<usize>();

/// Fallback used when `sysconf` cannot report the page size.
const DEFAULT_PAGE_SIZE: usize = 4096;

/// Page size of the running system.
pub fn page_size() -> usize {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as usize,
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Next index after `i` in a ring of `slots` slots.
#[inline]
pub const fn next(i: usize, slots: usize) -> usize {
    (i + 1) % slots
}

/// The ring is empty iff both indices are equal.
#[inline]
pub const fn is_empty(head: usize, tail: usize) -> bool {
    head == tail
}

/// The ring is full iff advancing `head` would make it equal `tail`.
#[inline]
pub const fn is_full(head: usize, tail: usize, slots: usize) -> bool {
    next(head, slots) == tail
}

/// Number of published but not yet consumed slots.
#[inline]
pub const fn occupied(head: usize, tail: usize, slots: usize) -> usize {
    (head + slots - tail) % slots
}

/// Geometry of a shared region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionLayout {
    slots: SlotCount,
    msg_size: MessageSize,
    buf_offset: usize,
}

impl RegionLayout {
    /// Layout with the slot array starting at the first page boundary.
    pub fn new(slots: SlotCount, msg_size: MessageSize) -> Self {
        Self {
            slots,
            msg_size,
            buf_offset: page_size(),
        }
    }

    /// Layout with an explicit slot array offset.
    ///
    /// The offset must be page-aligned and leave room for the header.
    pub fn with_buf_offset(
        slots: SlotCount,
        msg_size: MessageSize,
        buf_offset: usize,
    ) -> Result<Self, HardValidationError> {
        let page_size = page_size();

        if buf_offset < HEADER_SIZE {
            return Err(HardValidationError::InvalidFieldValue {
                field: "buf_offset",
                value: buf_offset.to_string(),
                reason: format!("Offset must leave room for the {}-byte header", HEADER_SIZE),
            });
        }

        if buf_offset % page_size != 0 {
            return Err(HardValidationError::UnalignedBufferOffset {
                offset: buf_offset,
                page_size,
            });
        }

        Ok(Self {
            slots,
            msg_size,
            buf_offset,
        })
    }

    pub fn slots(&self) -> usize {
        self.slots.get()
    }

    pub fn msg_size(&self) -> usize {
        self.msg_size.bytes()
    }

    pub fn buf_offset(&self) -> usize {
        self.buf_offset
    }

    /// Maximum number of outstanding messages (`SLOTS - 1`).
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Byte offset of slot `index` from the start of the region.
    #[inline]
    pub fn slot_offset(&self, index: usize) -> usize {
        debug_assert!(index < self.slots());
        self.buf_offset + index * self.msg_size()
    }

    /// Total number of bytes the region must span.
    pub fn total_len(&self) -> usize {
        self.buf_offset + self.slots() * self.msg_size()
    }

    #[inline]
    pub fn next(&self, i: usize) -> usize {
        next(i, self.slots())
    }

    #[inline]
    pub fn is_empty(&self, head: usize, tail: usize) -> bool {
        is_empty(head, tail)
    }

    #[inline]
    pub fn is_full(&self, head: usize, tail: usize) -> bool {
        is_full(head, tail, self.slots())
    }

    #[inline]
    pub fn occupied(&self, head: usize, tail: usize) -> usize {
        occupied(head, tail, self.slots())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(slots: usize, msg_size: usize) -> RegionLayout {
        RegionLayout::new(
            SlotCount::new(slots).unwrap(),
            MessageSize::new(msg_size).unwrap(),
        )
    }

    #[test]
    fn test_next_wraps() {
        assert_eq!(next(0, 8), 1);
        assert_eq!(next(6, 8), 7);
        assert_eq!(next(7, 8), 0);
        assert_eq!(next(1, 2), 0);
    }

    #[test]
    fn test_full_and_empty_are_mutually_exclusive() {
        for slots in 2..=9 {
            for head in 0..slots {
                for tail in 0..slots {
                    let empty = is_empty(head, tail);
                    let full = is_full(head, tail, slots);
                    assert!(!(empty && full), "slots={slots} head={head} tail={tail}");
                    assert!(occupied(head, tail, slots) < slots);
                    if full {
                        assert_eq!(occupied(head, tail, slots), slots - 1);
                    }
                    if empty {
                        assert_eq!(occupied(head, tail, slots), 0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_layout_index_predicates() {
        let layout = layout(4, 64);
        assert!(layout.is_empty(0, 0));
        assert!(layout.is_empty(3, 3));
        assert!(!layout.is_full(0, 0));

        // head one behind tail: capacity reached
        assert!(layout.is_full(3, 0));
        assert!(layout.is_full(1, 2));
        assert!(!layout.is_empty(3, 0));
        assert_eq!(layout.occupied(3, 0), layout.capacity());
    }

    #[test]
    fn test_slot_offsets() {
        let layout = layout(8, 4096);
        let page = page_size();
        assert_eq!(layout.buf_offset(), page);
        assert_eq!(layout.slot_offset(0), page);
        assert_eq!(layout.slot_offset(3), page + 3 * 4096);
        assert_eq!(layout.total_len(), page + 8 * 4096);
        assert_eq!(layout.capacity(), 7);
    }

    #[test]
    fn test_buf_offset_validation() {
        let slots = SlotCount::new(4).unwrap();
        let size = MessageSize::new(64).unwrap();
        let page = page_size();

        assert!(RegionLayout::with_buf_offset(slots, size, page * 2).is_ok());
        assert!(matches!(
            RegionLayout::with_buf_offset(slots, size, page + 8),
            Err(HardValidationError::UnalignedBufferOffset { .. })
        ));
        assert!(RegionLayout::with_buf_offset(slots, size, 0).is_err());
    }

    #[test]
    fn test_header_fits_before_first_slot() {
        assert!(page_size() >= HEADER_SIZE);
        assert_eq!(HEADER_SIZE, 2 * size_of::<usize>());
    }
}
