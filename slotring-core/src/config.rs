// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict validation.
//!
//! Ring geometry, session bounds and the backing kind are validated once,
//! when the configuration is loaded. Any invalid field results in a
//! HardValidationError.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HardValidationError, SlotRingError, SlotRingResult};
use crate::shm::RegionLayout;
use crate::types::{MessageSize, RegionName, SlotCount};

/// Raw ring geometry as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRingConfig {
    #[serde(default = "default_slots")]
    slots: usize,
    #[serde(default = "default_message_size")]
    message_size: usize,
    #[serde(default)]
    buf_offset: Option<usize>,
}

fn default_slots() -> usize {
    8
}

fn default_message_size() -> usize {
    4096
}

impl Default for RawRingConfig {
    fn default() -> Self {
        Self {
            slots: default_slots(),
            message_size: default_message_size(),
            buf_offset: None,
        }
    }
}

/// Raw session bounds.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSessionConfig {
    #[serde(default = "default_message_count")]
    message_count: Option<u64>,
    #[serde(default = "default_teardown_timeout_ms")]
    teardown_timeout_ms: u64,
    #[serde(default = "default_poll_timeout_ms")]
    poll_timeout_ms: u64,
}

fn default_message_count() -> Option<u64> {
    Some(4000)
}

fn default_teardown_timeout_ms() -> u64 {
    1000
}

fn default_poll_timeout_ms() -> u64 {
    100
}

impl Default for RawSessionConfig {
    fn default() -> Self {
        Self {
            message_count: default_message_count(),
            teardown_timeout_ms: default_teardown_timeout_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

/// Raw backing selection.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawBackingConfig {
    Heap,
    Posix {
        #[serde(default = "default_region_name")]
        name: String,
    },
}

fn default_region_name() -> String {
    "slotring".to_string()
}

impl Default for RawBackingConfig {
    fn default() -> Self {
        Self::Heap
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    ring: RawRingConfig,
    #[serde(default)]
    session: RawSessionConfig,
    #[serde(default)]
    backing: RawBackingConfig,
}

/// Where the region's backing block lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backing {
    /// Process-local page-aligned heap arena.
    Heap,
    /// POSIX shared memory object; each side maps its own view.
    Posix { name: RegionName },
}

impl Backing {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heap => "heap",
            Self::Posix { .. } => "posix",
        }
    }
}

/// Validated session bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// `None` runs the producer until it is stopped.
    pub message_count: Option<u64>,
    pub teardown_timeout: Duration,
    pub poll_timeout: Duration,
}

/// Complete validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingConfig {
    pub layout: RegionLayout,
    pub session: SessionConfig,
    pub backing: Backing,
}

impl Default for RingConfig {
    /// 8 slots of 4096 bytes, 4000 messages, heap backing.
    fn default() -> Self {
        // The defaults are within bounds; validation cannot fail.
        ConfigLoader::validate(RawConfig::default())
            .unwrap_or_else(|e| unreachable!("default configuration is invalid: {e}"))
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> SlotRingResult<RingConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SlotRingError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SlotRingError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> SlotRingResult<RingConfig> {
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| SlotRingError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        Ok(Self::validate(raw)?)
    }

    fn validate(raw: RawConfig) -> Result<RingConfig, HardValidationError> {
        let layout = Self::validate_ring(raw.ring)?;
        let session = Self::validate_session(raw.session)?;
        let backing = match raw.backing {
            RawBackingConfig::Heap => Backing::Heap,
            RawBackingConfig::Posix { name } => Backing::Posix {
                name: RegionName::new(name)?,
            },
        };

        Ok(RingConfig {
            layout,
            session,
            backing,
        })
    }

    fn validate_ring(raw: RawRingConfig) -> Result<RegionLayout, HardValidationError> {
        let slots = SlotCount::new(raw.slots)?;
        let msg_size = MessageSize::new(raw.message_size)?;

        match raw.buf_offset {
            Some(offset) => RegionLayout::with_buf_offset(slots, msg_size, offset),
            None => Ok(RegionLayout::new(slots, msg_size)),
        }
    }

    fn validate_session(raw: RawSessionConfig) -> Result<SessionConfig, HardValidationError> {
        if raw.teardown_timeout_ms == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "teardown_timeout_ms",
                value: "0".to_string(),
                reason: "Teardown must be given time to complete".to_string(),
            });
        }

        if raw.poll_timeout_ms == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "poll_timeout_ms",
                value: "0".to_string(),
                reason: "Poll timeout must be non-zero".to_string(),
            });
        }

        Ok(SessionConfig {
            message_count: raw.message_count,
            teardown_timeout: Duration::from_millis(raw.teardown_timeout_ms),
            poll_timeout: Duration::from_millis(raw.poll_timeout_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::layout::page_size;

    #[test]
    fn test_valid_config() {
        let yaml = r#"
ring:
  slots: 16
  message_size: 1024
session:
  message_count: 100
  teardown_timeout_ms: 250
backing:
  kind: posix
  name: ring-test
"#;

        let config = ConfigLoader::load_string(yaml).unwrap();
        assert_eq!(config.layout.slots(), 16);
        assert_eq!(config.layout.msg_size(), 1024);
        assert_eq!(config.layout.buf_offset(), page_size());
        assert_eq!(config.session.message_count, Some(100));
        assert_eq!(config.session.teardown_timeout, Duration::from_millis(250));
        assert_eq!(config.session.poll_timeout, Duration::from_millis(100));
        assert_eq!(config.backing.kind(), "posix");
    }

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::load_string("").unwrap();
        assert_eq!(config, RingConfig::default());
        assert_eq!(config.layout.slots(), 8);
        assert_eq!(config.layout.msg_size(), 4096);
        assert_eq!(config.session.message_count, Some(4000));
        assert_eq!(config.backing, Backing::Heap);
    }

    #[test]
    fn test_unbounded_message_count() {
        let yaml = "session:\n  message_count: null\n";
        let config = ConfigLoader::load_string(yaml).unwrap();
        assert_eq!(config.session.message_count, None);
    }

    #[test]
    fn test_invalid_slots() {
        let result = ConfigLoader::load_string("ring:\n  slots: 1\n");
        assert!(matches!(
            result,
            Err(SlotRingError::HardValidation(
                HardValidationError::SlotCountOutOfBounds { .. }
            ))
        ));
    }

    #[test]
    fn test_unaligned_buf_offset() {
        let yaml = format!("ring:\n  buf_offset: {}\n", page_size() + 1);
        assert!(matches!(
            ConfigLoader::load_string(&yaml),
            Err(SlotRingError::HardValidation(
                HardValidationError::UnalignedBufferOffset { .. }
            ))
        ));
    }

    #[test]
    fn test_zero_teardown_timeout_rejected() {
        let yaml = "session:\n  teardown_timeout_ms: 0\n";
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "ring:\n  slot: 8\n";
        assert!(matches!(
            ConfigLoader::load_string(yaml),
            Err(SlotRingError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_bad_region_name() {
        let yaml = "backing:\n  kind: posix\n  name: \"bad/name\"\n";
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ConfigLoader::load_file("/nonexistent/slotring.yaml"),
            Err(SlotRingError::ConfigNotFound { .. })
        ));
    }
}
