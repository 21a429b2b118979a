// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark harness for ring sessions and single-slot latency.
//!
//! Provides utilities for running whole sessions with a fixed message
//! count and for collecting publish/consume latency samples.

use std::time::{Duration, Instant};

use serde::Serialize;

use slotring_core::timestamp::LatencyStats;
use slotring_core::{
    Backing, LifecycleManager, MessageSize, RegionLayout, RingConfig, SharedRegion,
    SlotCount, SlotRingResult,
};

/// Result of one timed session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSample {
    pub slots: usize,
    pub message_size: usize,
    pub messages: u64,
    pub bytes: u64,
    pub in_sync: bool,
    pub elapsed_ns: u64,
}

impl SessionSample {
    pub fn messages_per_sec(&self) -> f64 {
        self.messages as f64 / (self.elapsed_ns.max(1) as f64 / 1e9)
    }

    pub fn bytes_per_sec(&self) -> f64 {
        self.bytes as f64 / (self.elapsed_ns.max(1) as f64 / 1e9)
    }
}

/// A full producer/consumer session with a fixed geometry.
pub struct SessionBench {
    manager: LifecycleManager,
    messages: u64,
}

impl SessionBench {
    /// Heap-backed session of `messages` messages.
    pub fn new(slots: usize, message_size: usize, messages: u64) -> SlotRingResult<Self> {
        let mut config = RingConfig::default();
        config.layout = RegionLayout::new(SlotCount::new(slots)?, MessageSize::new(message_size)?);
        config.session.message_count = Some(messages);
        config.backing = Backing::Heap;
        Ok(Self::with_config(config, messages))
    }

    pub fn with_config(config: RingConfig, messages: u64) -> Self {
        Self {
            manager: LifecycleManager::new(config),
            messages,
        }
    }

    /// Run one session to completion. The backing block is reused across
    /// calls, as a session reset would in production.
    pub fn run_once(&self) -> SlotRingResult<SessionSample> {
        let poll = self.manager.config().session.poll_timeout;
        let layout = self.manager.config().layout;

        let start = Instant::now();
        let mut handle = self.manager.acquire_with_count(Some(self.messages))?;
        let mut consumer = match handle.take_consumer() {
            Ok(consumer) => consumer,
            Err(e) => {
                self.manager.release(handle)?;
                return Err(e.into());
            }
        };
        let report = consumer.drain(self.messages, poll);
        self.manager.release(handle)?;
        let elapsed = start.elapsed();
        let report = report?;

        Ok(SessionSample {
            slots: layout.slots(),
            message_size: layout.msg_size(),
            messages: report.messages,
            bytes: report.bytes,
            in_sync: report.in_sync,
            elapsed_ns: elapsed.as_nanos() as u64,
        })
    }
}

/// A benchmark harness for measuring publish/consume latency.
pub struct BenchmarkHarness {
    /// Number of warmup iterations before measurement
    warmup_iterations: u64,
    /// Number of measurement iterations
    measurement_iterations: u64,
}

impl BenchmarkHarness {
    /// Create a new benchmark harness with default settings.
    pub fn new() -> Self {
        Self {
            warmup_iterations: 10,
            measurement_iterations: 100,
        }
    }

    /// Set the number of warmup iterations.
    pub fn warmup(mut self, iterations: u64) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    /// Set the number of measurement iterations.
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.measurement_iterations = iterations;
        self
    }

    /// Run a closure repeatedly and collect latency samples in nanoseconds.
    pub fn run<F>(&self, mut operation: F) -> Vec<u64>
    where
        F: FnMut(),
    {
        // Warmup phase
        for _ in 0..self.warmup_iterations {
            operation();
        }

        // Measurement phase
        let mut samples = Vec::with_capacity(self.measurement_iterations as usize);
        for _ in 0..self.measurement_iterations {
            let start = Instant::now();
            operation();
            samples.push(start.elapsed().as_nanos() as u64);
        }

        samples
    }

    /// Latency of one publish followed by one consume on an in-process ring.
    pub fn slot_round_trip(&self, layout: RegionLayout) -> SlotRingResult<LatencyStats> {
        let (mut producer, mut consumer) = SharedRegion::heap(layout)?.into_split();
        let payload = vec![0xABu8; layout.msg_size()];
        let mut buf = vec![0u8; layout.msg_size()];

        let mut failure = None;
        let samples = self.run(|| {
            let result = producer
                .try_publish(&payload)
                .and_then(|()| consumer.try_consume(&mut buf));
            if let Err(e) = result {
                failure.get_or_insert(e);
            }
        });

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(LatencyStats::from_samples(samples)),
        }
    }

    /// Run whole sessions for at least `duration` and return every sample.
    pub fn run_sessions(
        &self,
        bench: &SessionBench,
        duration: Duration,
    ) -> SlotRingResult<Vec<SessionSample>> {
        for _ in 0..self.warmup_iterations.min(2) {
            bench.run_once()?;
        }

        let start = Instant::now();
        let mut samples = Vec::new();
        while start.elapsed() < duration {
            samples.push(bench.run_once()?);
        }
        Ok(samples)
    }
}

impl Default for BenchmarkHarness {
    fn default() -> Self {
        Self::new()
    }
}
