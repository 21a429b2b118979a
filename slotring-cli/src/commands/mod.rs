// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

use std::path::Path;

use slotring_core::{ConfigLoader, RingConfig, SlotRingResult};

pub mod layout;
pub mod run;
pub mod validate;

/// Load the configuration file if one was given, else the defaults.
pub fn load_config(path: Option<&Path>) -> SlotRingResult<RingConfig> {
    match path {
        Some(path) => {
            tracing::debug!(config = %path.display(), "Loading configuration");
            ConfigLoader::load_file(path)
        }
        None => Ok(RingConfig::default()),
    }
}
