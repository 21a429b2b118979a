// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-message phase timestamps.
//!
//! Each side can record when it started and finished waiting for a slot
//! ("sync") and when it started and finished copying the payload. All
//! timestamps are nanoseconds since one shared session epoch, so producer
//! and consumer records can be merged and compared.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

/// Phase boundary being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum PhaseTag {
    ReadSyncStart,
    ReadSyncEnd,
    ReadStart,
    ReadEnd,
    WriteSyncStart,
    WriteSyncEnd,
    WriteStart,
    WriteEnd,
}

impl PhaseTag {
    pub fn side(&self) -> Side {
        match self {
            Self::ReadSyncStart | Self::ReadSyncEnd | Self::ReadStart | Self::ReadEnd => {
                Side::Consumer
            }
            _ => Side::Producer,
        }
    }
}

/// Which end of the ring produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Producer,
    Consumer,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer => write!(f, "producer"),
            Self::Consumer => write!(f, "consumer"),
        }
    }
}

/// One recorded phase boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Timestamp {
    pub tag: PhaseTag,
    /// Sequence number of the message.
    pub ticker: u64,
    /// Nanoseconds since the session epoch.
    pub ns: u64,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} {} {}",
            self.tag,
            self.tag.side(),
            self.ticker,
            self.ns
        )
    }
}

/// Collects timestamps for one side of the ring.
#[derive(Debug, Clone)]
pub struct PhaseRecorder {
    epoch: Instant,
    records: Vec<Timestamp>,
}

impl PhaseRecorder {
    pub fn new(epoch: Instant) -> Self {
        Self {
            epoch,
            records: Vec::new(),
        }
    }

    #[inline]
    pub fn record(&mut self, tag: PhaseTag, ticker: u64) {
        let ns = self.epoch.elapsed().as_nanos() as u64;
        self.records.push(Timestamp { tag, ticker, ns });
    }

    pub fn records(&self) -> &[Timestamp] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Timestamp> {
        self.records
    }

    /// Take everything recorded so far, keeping the epoch.
    pub fn drain_records(&mut self) -> Vec<Timestamp> {
        std::mem::take(&mut self.records)
    }
}

/// Latency statistics over a set of samples (nanoseconds).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub median_ns: u64,
    pub p99_ns: u64,
}

impl LatencyStats {
    pub fn from_samples(mut samples: Vec<u64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        samples.sort_unstable();
        let len = samples.len();
        let sum: u64 = samples.iter().sum();

        Self {
            count: len,
            min_ns: samples[0],
            max_ns: samples[len - 1],
            mean_ns: sum as f64 / len as f64,
            median_ns: samples[len / 2],
            p99_ns: samples[((len as f64 * 0.99) as usize).min(len - 1)],
        }
    }
}

/// Phase latencies of a session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseSummary {
    /// Producer time spent waiting for a free slot.
    pub write_sync: LatencyStats,
    /// Producer time spent copying into the slot.
    pub write: LatencyStats,
    /// Consumer time spent waiting for a published slot.
    pub read_sync: LatencyStats,
    /// Consumer time spent copying out of the slot.
    pub read: LatencyStats,
    /// From the producer starting a write to the consumer finishing the read.
    pub transit: LatencyStats,
}

impl PhaseSummary {
    /// Spans run from the first start record of a message to the last end
    /// record, so retried waits count as one.
    pub fn from_records(records: &[Timestamp]) -> Self {
        use std::collections::HashMap;

        let mut first: HashMap<(PhaseTag, u64), u64> = HashMap::with_capacity(records.len());
        let mut last: HashMap<(PhaseTag, u64), u64> = HashMap::with_capacity(records.len());
        for ts in records {
            first.entry((ts.tag, ts.ticker)).or_insert(ts.ns);
            last.insert((ts.tag, ts.ticker), ts.ns);
        }

        let span = |start: PhaseTag, end: PhaseTag| -> LatencyStats {
            let samples = first
                .iter()
                .filter(|((tag, _), _)| *tag == start)
                .filter_map(|(&(_, ticker), &start_ns)| {
                    last.get(&(end, ticker))
                        .map(|&end_ns| end_ns.saturating_sub(start_ns))
                })
                .collect();
            LatencyStats::from_samples(samples)
        };

        Self {
            write_sync: span(PhaseTag::WriteSyncStart, PhaseTag::WriteSyncEnd),
            write: span(PhaseTag::WriteStart, PhaseTag::WriteEnd),
            read_sync: span(PhaseTag::ReadSyncStart, PhaseTag::ReadSyncEnd),
            read: span(PhaseTag::ReadStart, PhaseTag::ReadEnd),
            transit: span(PhaseTag::WriteStart, PhaseTag::ReadEnd),
        }
    }
}
