// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Backing memory for the shared region.
//!
//! A region is one contiguous block of bytes. It can live on the heap
//! ([`HeapArena`]) or in a POSIX shared memory object
//! ([`SharedMemoryRegion`]); the ring only ever sees it through
//! [`RegionMemory`].

mod arena;
pub mod layout;
mod region;

pub use arena::HeapArena;
pub use layout::{RegionLayout, HEADER_SIZE};
pub use region::SharedMemoryRegion;

/// One mapped view of a region's backing block.
pub trait RegionMemory: Send + Sync {
    /// Base address of this view. Page-aligned.
    fn as_ptr(&self) -> *mut u8;

    /// Length of this view in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
