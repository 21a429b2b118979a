// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Slotring Benchmarking Framework
//!
//! Measures the slot ring end to end: full producer/consumer sessions
//! through the LifecycleManager, and single-slot publish/consume latency
//! on an in-process ring.
//!
//! # Data Output
//!
//! Session results serialize to JSON for comparison across runs.

pub mod harness;

pub use harness::{BenchmarkHarness, SessionBench, SessionSample};
