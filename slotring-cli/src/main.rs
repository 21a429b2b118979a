// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Slotring CLI
//!
//! Test harness for the slotring SPSC ring: runs a producer/consumer
//! session, validates configuration files and prints region layouts.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::run::{BackingArg, RunOptions};

/// Slotring - lock-free SPSC shared-memory slot ring
#[derive(Parser)]
#[command(name = "slotring")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (built-in defaults when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one producer/consumer session
    Run {
        /// Number of slots (one is always kept free)
        #[arg(long)]
        slots: Option<usize>,

        /// Size of every slot in bytes
        #[arg(long)]
        message_size: Option<usize>,

        /// Number of messages to publish
        #[arg(long, conflicts_with = "unbounded")]
        count: Option<u64>,

        /// Publish until Ctrl+C
        #[arg(long)]
        unbounded: bool,

        /// Backing memory for the region
        #[arg(long, value_enum)]
        backing: Option<BackingArg>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Record phase timestamps and write them to this file
        #[arg(long)]
        timestamps: Option<PathBuf>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: PathBuf,
    },

    /// Print header and slot offsets of the configured region
    Layout {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            slots,
            message_size,
            count,
            unbounded,
            backing,
            json,
            timestamps,
        } => {
            let options = RunOptions {
                slots,
                message_size,
                count,
                unbounded,
                backing,
                json,
                timestamps,
            };
            commands::run::execute(cli.config.as_deref(), options).await
        }
        Commands::Validate { file } => commands::validate::execute(&file).await,
        Commands::Layout { json } => commands::layout::execute(cli.config.as_deref(), json).await,
    }
}
