// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Lock-free single-producer single-consumer slot ring.
//!
//! Fixed-size messages pass through a [`SharedRegion`] synchronized only by
//! its `head`/`tail` header: the producer publishes with a release store of
//! `head`, the consumer subscribes with an acquire load of it (and the
//! reverse for `tail`). No locks, no syscalls on the data path.

mod consumer;
mod message;
mod producer;
mod shared;

pub use consumer::{ConsumeReport, Consumer};
pub use message::{Desynchronization, Message, SequenceCheck};
pub use producer::{Producer, ProducerReport, PublishOutcome};
pub use shared::SharedRegion;
