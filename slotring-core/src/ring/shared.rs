// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! SharedRegion - typed view over one mapping of the ring's backing block.
//!
//! The control header sits at offset 0 and is accessed only through
//! atomics; slots are reached by logical index through [`RegionLayout`].

use std::mem::align_of;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::RegionError;
use crate::ring::{Consumer, Producer};
use crate::shm::{HeapArena, RegionLayout, RegionMemory, HEADER_SIZE};

/// Control header stored at the start of the region.
#[repr(C)]
struct RingHeader {
    /// Next slot to write. Written only by the producer.
    head: AtomicUsize,
    /// Next slot to read. Written only by the consumer.
    tail: AtomicUsize,
}

const _: () = assert!(std::mem::size_of::<RingHeader>() == HEADER_SIZE);

/// One mapped view of the ring.
///
/// Several `SharedRegion`s may view the same backing block (one per
/// execution context); they agree on everything because all state lives in
/// the block itself.
pub struct SharedRegion {
    memory: Arc<dyn RegionMemory>,
    layout: RegionLayout,
}

impl SharedRegion {
    /// Wrap a mapped view. The view must span the whole layout.
    pub fn new(memory: Arc<dyn RegionMemory>, layout: RegionLayout) -> Result<Self, RegionError> {
        let required = layout.total_len();
        if memory.len() < required {
            return Err(RegionError::RegionTooSmall {
                size: memory.len(),
                required,
            });
        }

        if memory.as_ptr() as usize % align_of::<RingHeader>() != 0 {
            return Err(RegionError::InvalidLayout {
                reason: format!(
                    "Base address {:p} is not aligned for the header",
                    memory.as_ptr()
                ),
            });
        }

        Ok(Self { memory, layout })
    }

    /// Allocate a fresh zeroed heap-backed region.
    pub fn heap(layout: RegionLayout) -> Result<Self, RegionError> {
        let arena = HeapArena::new(layout.total_len())?;
        Self::new(Arc::new(arena), layout)
    }

    /// Hand out the single producer and the single consumer of this region.
    ///
    /// Both ends share this one view. Consuming `self` guarantees no second
    /// pair can be created for it.
    pub fn into_split(self) -> (Producer, Consumer) {
        let region = Arc::new(self);
        (Producer::new(region.clone()), Consumer::new(region))
    }

    /// Attach only the producer side to this view.
    ///
    /// For a process that maps the block itself while the consumer lives
    /// behind another view. At most one producer may exist per block.
    pub fn into_producer(self) -> Producer {
        Producer::new(Arc::new(self))
    }

    /// Attach only the consumer side to this view.
    ///
    /// At most one consumer may exist per block.
    pub fn into_consumer(self) -> Consumer {
        Consumer::new(Arc::new(self))
    }

    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    fn header(&self) -> &RingHeader {
        // SAFETY: `new` checked the view spans at least HEADER_SIZE bytes and
        // is aligned for RingHeader. The header is only accessed atomically.
        unsafe { &*(self.memory.as_ptr() as *const RingHeader) }
    }

    #[inline]
    pub(crate) fn head(&self) -> &AtomicUsize {
        &self.header().head
    }

    #[inline]
    pub(crate) fn tail(&self) -> &AtomicUsize {
        &self.header().tail
    }

    /// Observe `(head, tail)` as currently published by both sides.
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.head().load(Ordering::Acquire),
            self.tail().load(Ordering::Acquire),
        )
    }

    /// Number of published, unconsumed messages.
    pub fn occupied(&self) -> usize {
        let (head, tail) = self.snapshot();
        self.layout.occupied(head, tail)
    }

    /// Reset both indices to 0. Slot bytes are left as they are.
    ///
    /// Only called by the lifecycle while neither side is running.
    pub(crate) fn reset(&self) {
        self.head().store(0, Ordering::Release);
        self.tail().store(0, Ordering::Release);
    }

    /// Raw pointer to the first byte of slot `index`.
    #[inline]
    pub(crate) fn slot_ptr(&self, index: usize) -> *mut u8 {
        assert!(index < self.layout.slots(), "slot index out of range");
        // SAFETY: slot_offset(index) + msg_size <= total_len <= memory.len()
        unsafe { self.memory.as_ptr().add(self.layout.slot_offset(index)) }
    }

    /// Copy out slot `index`.
    ///
    /// Only meaningful while no producer is writing to the region.
    pub(crate) fn copy_slot(&self, index: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; self.layout.msg_size()];
        // SAFETY: slot_ptr is valid for msg_size bytes; caller guarantees
        // no concurrent writer.
        unsafe {
            std::ptr::copy_nonoverlapping(self.slot_ptr(index), bytes.as_mut_ptr(), bytes.len());
        }
        bytes
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (head, tail) = self.snapshot();
        f.debug_struct("SharedRegion")
            .field("layout", &self.layout)
            .field("head", &head)
            .field("tail", &tail)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageSize, SlotCount};

    fn layout() -> RegionLayout {
        RegionLayout::new(SlotCount::new(4).unwrap(), MessageSize::new(64).unwrap())
    }

    #[test]
    fn test_fresh_region_is_empty() {
        let region = SharedRegion::heap(layout()).unwrap();
        assert_eq!(region.snapshot(), (0, 0));
        assert_eq!(region.occupied(), 0);
    }

    #[test]
    fn test_undersized_view_rejected() {
        let layout = layout();
        let arena = HeapArena::new(layout.total_len() - 1).unwrap();
        assert!(matches!(
            SharedRegion::new(Arc::new(arena), layout),
            Err(RegionError::RegionTooSmall { .. })
        ));
    }

    #[test]
    fn test_reset_keeps_slot_bytes() {
        let region = SharedRegion::heap(layout()).unwrap();
        // SAFETY: single-threaded test, slot 1 is 64 bytes
        unsafe { *region.slot_ptr(1) = 0xEE };
        region.head().store(3, Ordering::Release);
        region.tail().store(1, Ordering::Release);
        assert_eq!(region.occupied(), 2);

        region.reset();
        assert_eq!(region.snapshot(), (0, 0));
        assert_eq!(region.copy_slot(1)[0], 0xEE);
    }

    #[test]
    #[should_panic(expected = "slot index out of range")]
    fn test_slot_index_bounds() {
        let region = SharedRegion::heap(layout()).unwrap();
        region.slot_ptr(4);
    }
}
