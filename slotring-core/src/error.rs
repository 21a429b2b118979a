// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for slotring.
//!
//! Every failure is an explicit enum variant. No `Box<dyn Error>`, no
//! `anyhow::Result` in the library.
//!
//! Sequence desynchronization is a soft fault recorded in
//! [`crate::ring::ConsumeReport`], not an error.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for slotring.
#[derive(Debug, Error)]
pub enum SlotRingError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Region, Ring and Lifecycle Errors
    // =========================================================================
    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    #[error("Ring error: {0}")]
    Ring(#[from] RingError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid configuration values. Raised at construction time, never later.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Slot count out of bounds: {slots} (min: {min}, max: {max})")]
    SlotCountOutOfBounds { slots: usize, min: usize, max: usize },

    #[error("Message size out of bounds: {size} bytes (min: {min}, max: {max})")]
    MessageSizeOutOfBounds { size: usize, min: usize, max: usize },

    #[error("Buffer offset {offset} is not aligned to page size {page_size}")]
    UnalignedBufferOffset { offset: usize, page_size: usize },
}

/// Invalid producer control transitions.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition producer from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Backing memory errors. On any of these nothing is left mapped.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Failed to allocate backing memory: {name} - {reason}")]
    AllocationFailure { name: String, reason: String },

    #[error("Failed to map backing memory: {reason}")]
    MappingFailure { reason: String },

    #[error("Invalid region layout: {reason}")]
    InvalidLayout { reason: String },

    #[error("Region too small: {size} bytes, layout requires {required}")]
    RegionTooSmall { size: usize, required: usize },
}

/// Data-path errors returned by the producer and consumer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("Ring full - no free slot")]
    Full,

    #[error("Ring empty - no message available")]
    Empty,

    #[error("Would block - no progress after {waited_ms}ms")]
    WouldBlock { waited_ms: u64 },

    #[error("Payload size exceeds slot size: {size} > {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Receive buffer too small: {size} < {required}")]
    BufferTooSmall { size: usize, required: usize },

    #[error("Consumer stalled after {received} of {expected} messages")]
    Stalled { received: u64, expected: u64 },
}

impl RingError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Full | Self::Empty | Self::WouldBlock { .. })
    }
}

/// Session lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("A session is already active on this region")]
    SessionActive,

    #[error("Backing block has not been initialized")]
    NotInitialized,

    #[error("No session is active")]
    NoActiveSession,

    #[error("Session {session_id} is not the active session")]
    UnknownSession { session_id: u64 },

    #[error("Producer did not stop within {timeout_ms}ms")]
    TeardownTimeout { timeout_ms: u64 },

    #[error("Failed to spawn producer thread: {reason}")]
    SpawnFailed { reason: String },

    #[error("Producer thread panicked")]
    ProducerPanicked,

    #[error("The session's consumer has already been taken")]
    ConsumerTaken,

    #[error("Producer control: {0}")]
    State(#[from] StateTransitionError),

    #[error("Region error: {0}")]
    Region(#[from] RegionError),
}

/// Result type alias using SlotRingError.
pub type SlotRingResult<T> = Result<T, SlotRingError>;
