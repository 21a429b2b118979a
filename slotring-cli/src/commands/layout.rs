// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `slotring layout` command - Print the region layout.

use std::path::Path;

use slotring_core::shm::HEADER_SIZE;

use super::load_config;

/// Slots listed before the output is elided.
const MAX_LISTED_SLOTS: usize = 16;

pub async fn execute(
    config_path: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let layout = config.layout;

    if json {
        println!("{}", serde_json::to_string_pretty(&layout)?);
        return Ok(());
    }

    println!("Region: {} bytes", layout.total_len());
    println!("  [0x{:08x}] head  ({} bytes)", 0, HEADER_SIZE / 2);
    println!("  [0x{:08x}] tail  ({} bytes)", HEADER_SIZE / 2, HEADER_SIZE / 2);
    if layout.buf_offset() > HEADER_SIZE {
        println!(
            "  [0x{:08x}] pad   ({} bytes)",
            HEADER_SIZE,
            layout.buf_offset() - HEADER_SIZE
        );
    }

    for index in 0..layout.slots().min(MAX_LISTED_SLOTS) {
        println!(
            "  [0x{:08x}] slot {:<5} ({} bytes)",
            layout.slot_offset(index),
            index,
            layout.msg_size()
        );
    }
    if layout.slots() > MAX_LISTED_SLOTS {
        println!("  ... {} more slots", layout.slots() - MAX_LISTED_SLOTS);
    }

    println!();
    println!(
        "Capacity: {} of {} slots (one is always kept free)",
        layout.capacity(),
        layout.slots()
    );
    Ok(())
}
