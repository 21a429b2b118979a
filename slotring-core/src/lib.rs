// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Slotring Core Library
//!
//! Lock-free single-producer single-consumer ring of fixed-size slots in a
//! shared memory region. Provides the region layout and backings, the
//! producer and consumer, producer control state, configuration parsing and
//! session lifecycle management.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod ring;
pub mod shm;
pub mod state;
pub mod timestamp;
pub mod types;

// Re-export commonly used types
pub use config::{Backing, ConfigLoader, RingConfig, SessionConfig};
pub use error::{
    HardValidationError, LifecycleError, RegionError, RingError, SlotRingError, SlotRingResult,
};
pub use lifecycle::{LifecycleManager, RegionHandle};
pub use ring::{ConsumeReport, Consumer, Message, Producer, ProducerReport, SharedRegion};
pub use shm::RegionLayout;
pub use state::{ProducerControl, ProducerState};
pub use types::{MessageSize, RegionName, SlotCount};
