// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated ring parameters.
//!
//! All types validate their invariants at creation time, so a `RegionLayout`
//! built from them can never describe an unusable ring.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Smallest usable ring: one live slot plus the reserved one.
pub const MIN_SLOTS: usize = 2;
/// Largest supported slot count.
pub const MAX_SLOTS: usize = 65536;

/// Smallest slot: room for `"message "`, a 20-digit sequence and the NUL.
pub const MIN_MESSAGE_SIZE: usize = 32;
/// Largest slot (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Validated number of slots in the ring.
///
/// One slot is always reserved to tell full from empty, so a ring of
/// `n` slots holds at most `n - 1` outstanding messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct SlotCount(usize);

impl SlotCount {
    /// Create a new SlotCount with bounds validation.
    pub fn new(slots: usize) -> Result<Self, HardValidationError> {
        if !(MIN_SLOTS..=MAX_SLOTS).contains(&slots) {
            return Err(HardValidationError::SlotCountOutOfBounds {
                slots,
                min: MIN_SLOTS,
                max: MAX_SLOTS,
            });
        }
        Ok(Self(slots))
    }

    /// Get the inner slot count.
    pub fn get(&self) -> usize {
        self.0
    }

    /// Maximum number of messages that may be outstanding at once.
    pub fn capacity(&self) -> usize {
        self.0 - 1
    }
}

impl fmt::Display for SlotCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<usize> for SlotCount {
    type Error = HardValidationError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SlotCount> for usize {
    fn from(slots: SlotCount) -> Self {
        slots.0
    }
}

/// Validated size of one slot in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct MessageSize(usize);

impl MessageSize {
    /// Create a new MessageSize with bounds validation.
    pub fn new(bytes: usize) -> Result<Self, HardValidationError> {
        if !(MIN_MESSAGE_SIZE..=MAX_MESSAGE_SIZE).contains(&bytes) {
            return Err(HardValidationError::MessageSizeOutOfBounds {
                size: bytes,
                min: MIN_MESSAGE_SIZE,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(Self(bytes))
    }

    /// Get the slot size in bytes.
    pub fn bytes(&self) -> usize {
        self.0
    }
}

impl fmt::Display for MessageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl TryFrom<usize> for MessageSize {
    type Error = HardValidationError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MessageSize> for usize {
    fn from(size: MessageSize) -> Self {
        size.0
    }
}

/// Validated POSIX shared memory object name (without the leading `/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionName(String);

impl RegionName {
    /// Create a new RegionName with validation.
    /// Must be non-empty, at most 200 chars, alphanumeric with `-`, `_` or `.`.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();

        if name.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "backing.name",
                value: name,
                reason: "Region name cannot be empty".to_string(),
            });
        }

        if name.len() > 200 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "backing.name",
                value: name.clone(),
                reason: format!("Region name too long: {} chars (max 200)", name.len()),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(HardValidationError::InvalidFieldValue {
                field: "backing.name",
                value: name,
                reason: "Region name must contain only alphanumeric characters, '-', '_' and '.'"
                    .to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RegionName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RegionName> for String {
    fn from(name: RegionName) -> Self {
        name.0
    }
}
