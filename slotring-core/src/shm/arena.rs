// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! HeapArena - page-aligned, zeroed process-local backing.
//!
//! Used when both sides of the ring live in one process. Every "mapping"
//! of an arena is a clone of the same `Arc`, so views share bytes exactly
//! like two mmaps of one shared memory object.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::RegionError;
use crate::shm::layout::page_size;
use crate::shm::RegionMemory;

/// A single contiguous, zero-initialized heap allocation.
pub struct HeapArena {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: HeapArena owns its allocation.
unsafe impl Send for HeapArena {}

// SAFETY: Concurrent access goes through the ring's atomic header protocol.
unsafe impl Sync for HeapArena {}

impl HeapArena {
    /// Allocate `size` zeroed bytes aligned to the page size.
    pub fn new(size: usize) -> Result<Self, RegionError> {
        if size == 0 {
            return Err(RegionError::AllocationFailure {
                name: "heap".to_string(),
                reason: "Size must be non-zero".to_string(),
            });
        }

        let layout = Layout::from_size_align(size, page_size()).map_err(|e| {
            RegionError::AllocationFailure {
                name: "heap".to_string(),
                reason: format!("Invalid layout: {}", e),
            }
        })?;

        // SAFETY: layout has non-zero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| RegionError::AllocationFailure {
            name: "heap".to_string(),
            reason: format!("Allocator refused {} bytes", size),
        })?;

        tracing::debug!(size = size, "Allocated heap arena");

        Ok(Self { ptr, layout })
    }
}

impl RegionMemory for HeapArena {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for HeapArena {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated with exactly this layout
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
