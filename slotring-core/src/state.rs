// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Producer control state machine with typed state transitions.
//!
//! Implements the producer lifecycle: Idle → Running → StopRequested → Stopped.
//! The state lives in an atomic so the lifecycle thread and the producer
//! thread can both drive it; invalid transitions result in
//! StateTransitionError.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;

/// Producer execution states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProducerState {
    /// Not started yet.
    Idle = 0,

    /// Publishing messages.
    Running = 1,

    /// Stop has been requested; the producer exits at its next poll.
    StopRequested = 2,

    /// The producer loop has returned. Terminal.
    Stopped = 3,
}

impl ProducerState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::StopRequested => "StopRequested",
            Self::Stopped => "Stopped",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::StopRequested,
            _ => Self::Stopped,
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: ProducerState) -> bool {
        matches!(
            (self, target),
            (Self::Idle, Self::Running) |
            // Stop requested by the lifecycle
            (Self::Running, Self::StopRequested) |
            // Message count exhausted
            (Self::Running, Self::Stopped) |
            (Self::StopRequested, Self::Stopped)
        )
    }

    /// Whether the producer loop should exit.
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::StopRequested | Self::Stopped)
    }
}

impl std::fmt::Display for ProducerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Shared control cell for one producer execution.
#[derive(Debug)]
pub struct ProducerControl {
    state: AtomicU8,
}

impl ProducerControl {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ProducerState::Idle as u8),
        }
    }

    /// Get the current state.
    pub fn state(&self) -> ProducerState {
        ProducerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Attempt to transition to a new state.
    ///
    /// The transition is a single compare-exchange, so a concurrent
    /// transition from the other thread is never lost.
    pub fn transition_to(&self, target: ProducerState) -> Result<(), StateTransitionError> {
        let mut current = self.state();
        loop {
            if !current.can_transition_to(target) {
                return Err(StateTransitionError::InvalidTransition {
                    from: current.name(),
                    to: target.name(),
                });
            }

            match self.state.compare_exchange_weak(
                current as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    tracing::debug!(
                        from = current.name(),
                        to = target.name(),
                        "Producer state transition"
                    );
                    return Ok(());
                }
                Err(actual) => current = ProducerState::from_u8(actual),
            }
        }
    }

    /// Request a cooperative stop. Idempotent once stopping or stopped.
    ///
    /// Returns the state observed after the request.
    pub fn request_stop(&self) -> ProducerState {
        match self.transition_to(ProducerState::StopRequested) {
            Ok(()) => ProducerState::StopRequested,
            Err(_) => self.state(),
        }
    }

    /// Polled by the producer at every spin iteration.
    #[inline]
    pub fn is_stop_requested(&self) -> bool {
        self.state().is_stopping()
    }
}

impl Default for ProducerControl {
    fn default() -> Self {
        Self::new()
    }
}
