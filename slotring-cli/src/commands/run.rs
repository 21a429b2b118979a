// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `slotring run` command - Run one producer/consumer session.
//!
//! The producer runs on the session's own thread; the consumer drains on a
//! blocking task. Without a message count the session runs until Ctrl+C.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::ValueEnum;
use serde::Serialize;

use slotring_core::timestamp::{PhaseSummary, Timestamp};
use slotring_core::{
    Backing, ConsumeReport, LifecycleManager, MessageSize, ProducerReport, RegionHandle,
    RegionLayout, RegionName, RingConfig, SlotCount,
};

use super::load_config;

/// Region name used when `--backing posix` overrides a heap config.
const DEFAULT_REGION_NAME: &str = "slotring";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackingArg {
    Heap,
    Posix,
}

/// Command-line overrides for a session.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub slots: Option<usize>,
    pub message_size: Option<usize>,
    pub count: Option<u64>,
    pub unbounded: bool,
    pub backing: Option<BackingArg>,
    pub json: bool,
    pub timestamps: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    session_id: u64,
    backing: &'static str,
    slots: usize,
    message_size: usize,
    elapsed_ms: f64,
    messages_per_sec: f64,
    megabytes: f64,
    producer: ProducerReport,
    consumer: ConsumeReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    phases: Option<PhaseSummary>,
}

pub async fn execute(
    config_path: Option<&Path>,
    options: RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = apply_overrides(load_config(config_path)?, &options)?;
    let count = if options.unbounded {
        None
    } else {
        options.count.or(config.session.message_count)
    };

    tracing::info!(
        slots = config.layout.slots(),
        msg_size = config.layout.msg_size(),
        count = ?count,
        backing = config.backing.kind(),
        "Starting session"
    );

    let poll_timeout = config.session.poll_timeout;
    let backing = config.backing.kind();
    let manager = Arc::new(
        LifecycleManager::new(config).with_phase_recording(options.timestamps.is_some()),
    );

    let mut handle = manager.acquire_with_count(count)?;
    let mut consumer = handle.take_consumer()?;
    let session_id = handle.session_id();
    let layout = *handle.region().layout();
    let started = Instant::now();

    let (drained, produced) = match count {
        Some(count) => {
            let drained =
                tokio::task::spawn_blocking(move || consumer.drain(count, poll_timeout)).await?;
            let produced = release(manager.clone(), handle).await;
            (drained.map_err(Box::<dyn std::error::Error>::from), produced)
        }
        None => {
            if !options.json {
                println!("Press Ctrl+C to stop...");
            }

            let stop = Arc::new(AtomicBool::new(false));
            let flag = stop.clone();
            let drainer =
                tokio::task::spawn_blocking(move || consumer.drain_until(&flag, poll_timeout));

            tokio::signal::ctrl_c().await?;
            tracing::info!("Stopping session");

            // Producer first, so everything it published is still drained.
            let produced = release(manager.clone(), handle).await;
            stop.store(true, Ordering::Release);
            (Ok(drainer.await?), produced)
        }
    };

    let elapsed = started.elapsed();
    let consumer = drained?;
    let producer = produced?;
    manager.destroy()?;

    if let Some(path) = &options.timestamps {
        write_timestamps(path, &producer, &consumer)?;
        tracing::info!(path = %path.display(), "Wrote phase timestamps");
    }

    let phases = options.timestamps.as_ref().map(|_| {
        let mut records = producer.timestamps.clone();
        records.extend_from_slice(&consumer.timestamps);
        PhaseSummary::from_records(&records)
    });

    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    let summary = RunSummary {
        session_id,
        backing,
        slots: layout.slots(),
        message_size: layout.msg_size(),
        elapsed_ms: secs * 1000.0,
        messages_per_sec: consumer.messages as f64 / secs,
        megabytes: consumer.bytes as f64 / (1024.0 * 1024.0),
        producer,
        consumer,
        phases,
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if !summary.consumer.in_sync {
        std::process::exit(2);
    }
    Ok(())
}

fn apply_overrides(
    mut config: RingConfig,
    options: &RunOptions,
) -> Result<RingConfig, Box<dyn std::error::Error>> {
    if options.slots.is_some() || options.message_size.is_some() {
        let slots = SlotCount::new(options.slots.unwrap_or(config.layout.slots()))?;
        let msg_size = MessageSize::new(options.message_size.unwrap_or(config.layout.msg_size()))?;
        config.layout = RegionLayout::with_buf_offset(slots, msg_size, config.layout.buf_offset())?;
    }

    match (options.backing, &config.backing) {
        (Some(BackingArg::Heap), _) => config.backing = Backing::Heap,
        (Some(BackingArg::Posix), Backing::Heap) => {
            config.backing = Backing::Posix {
                name: RegionName::new(DEFAULT_REGION_NAME)?,
            }
        }
        _ => {}
    }

    Ok(config)
}

async fn release(
    manager: Arc<LifecycleManager>,
    handle: RegionHandle,
) -> Result<ProducerReport, Box<dyn std::error::Error>> {
    let report = tokio::task::spawn_blocking(move || manager.release(handle)).await??;
    Ok(report)
}

/// First line `"<bytes> <in_sync>"`, then one `"<Tag> <side> <ticker> <ns>"`
/// line per record in time order.
fn write_timestamps(
    path: &Path,
    producer: &ProducerReport,
    consumer: &ConsumeReport,
) -> std::io::Result<()> {
    let mut records: Vec<&Timestamp> = producer
        .timestamps
        .iter()
        .chain(consumer.timestamps.iter())
        .collect();
    records.sort_by_key(|ts| (ts.ns, ts.ticker, ts.tag));

    let mut out = BufWriter::new(std::fs::File::create(path)?);
    writeln!(out, "{} {}", consumer.bytes, consumer.in_sync)?;
    for ts in records {
        writeln!(out, "{}", ts)?;
    }
    out.flush()
}

fn print_summary(summary: &RunSummary) {
    let consumer = &summary.consumer;

    println!(
        "read all {:.1}MB, sync = {}",
        summary.megabytes, consumer.in_sync
    );
    println!();
    println!("Session {} ({} backing)", summary.session_id, summary.backing);
    println!(
        "  Ring:       {} slots x {} bytes",
        summary.slots, summary.message_size
    );
    println!("  Published:  {}", summary.producer.published);
    println!("  Consumed:   {}", consumer.messages);
    println!("  Elapsed:    {:.2}ms", summary.elapsed_ms);
    println!("  Throughput: {:.0} msg/s", summary.messages_per_sec);

    if consumer.mismatches > 0 {
        println!("  Mismatches: {}", consumer.mismatches);
    }
    if let Some(desync) = &consumer.first_desync {
        match desync.observed {
            Some(observed) => println!(
                "  First desync at message {}: expected {}, got {}",
                desync.position, desync.expected, observed
            ),
            None => println!(
                "  First desync at message {}: expected {}, slot unreadable",
                desync.position, desync.expected
            ),
        }
    }

    if let Some(phases) = &summary.phases {
        println!();
        println!("Phase latencies (ns)      mean     median        p99");
        for (name, stats) in [
            ("write sync", &phases.write_sync),
            ("write", &phases.write),
            ("read sync", &phases.read_sync),
            ("read", &phases.read),
            ("transit", &phases.transit),
        ] {
            println!(
                "  {:<18} {:>10.0} {:>10} {:>10}",
                name, stats.mean_ns, stats.median_ns, stats.p99_ns
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_keep_buf_offset() {
        let options = RunOptions {
            slots: Some(16),
            message_size: Some(512),
            ..Default::default()
        };
        let base = RingConfig::default();
        let config = apply_overrides(base.clone(), &options).unwrap();
        assert_eq!(config.layout.slots(), 16);
        assert_eq!(config.layout.msg_size(), 512);
        assert_eq!(config.layout.buf_offset(), base.layout.buf_offset());
    }

    #[test]
    fn test_posix_override_uses_default_name() {
        let options = RunOptions {
            backing: Some(BackingArg::Posix),
            ..Default::default()
        };
        let config = apply_overrides(RingConfig::default(), &options).unwrap();
        assert_eq!(config.backing.kind(), "posix");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let options = RunOptions {
            slots: Some(1),
            ..Default::default()
        };
        assert!(apply_overrides(RingConfig::default(), &options).is_err());
    }
}
