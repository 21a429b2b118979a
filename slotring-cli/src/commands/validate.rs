// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `slotring validate` command - Validate configuration file.

use std::path::Path;

use slotring_core::{Backing, ConfigLoader};

pub async fn execute(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file.display(), "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Ring:");
            println!("  Slots:            {}", config.layout.slots());
            println!("  Capacity:         {} messages", config.layout.capacity());
            println!("  Message Size:     {} bytes", config.layout.msg_size());
            println!("  Buffer Offset:    {} bytes", config.layout.buf_offset());
            println!();
            println!("Session:");
            match config.session.message_count {
                Some(count) => println!("  Message Count:    {}", count),
                None => println!("  Message Count:    unbounded"),
            }
            println!(
                "  Teardown Timeout: {}ms",
                config.session.teardown_timeout.as_millis()
            );
            println!(
                "  Poll Timeout:     {}ms",
                config.session.poll_timeout.as_millis()
            );
            println!();
            match &config.backing {
                Backing::Heap => println!("Backing: heap"),
                Backing::Posix { name } => println!("Backing: posix (/{})", name),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
