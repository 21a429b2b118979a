// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! LifecycleManager - creates the backing block and runs one producer per
//! session.
//!
//! - `init` / `destroy` create and free the backing block.
//! - `acquire` maps a producer view and a consumer view of the block,
//!   resets the header and starts the producer thread (`on_open`).
//! - `release` stops the producer cooperatively, waits for it with a bounded
//!   timeout (`on_close`) and drops the session's views.
//!
//! All of it is serialized by a single mutex that the data path never
//! touches.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{Backing, RingConfig};
use crate::error::{LifecycleError, RegionError};
use crate::ring::{Consumer, Producer, ProducerReport, SharedRegion};
use crate::shm::{HeapArena, RegionMemory, SharedMemoryRegion};
use crate::state::{ProducerControl, ProducerState};
use crate::timestamp::PhaseRecorder;

/// The consumer's side of one session.
///
/// Returned by [`LifecycleManager::acquire`]; hand it back to
/// [`LifecycleManager::release`] to end the session.
pub struct RegionHandle {
    session_id: u64,
    region: Arc<SharedRegion>,
    consumer: Option<Consumer>,
    control: Arc<ProducerControl>,
    epoch: Instant,
}

impl RegionHandle {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// The consumer's view of the region.
    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    pub fn control(&self) -> &ProducerControl {
        &self.control
    }

    /// Current state of this session's producer.
    pub fn producer_state(&self) -> ProducerState {
        self.control.state()
    }

    /// Session start; timestamps of both sides are relative to it.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Take the session's single consumer.
    ///
    /// # Errors
    /// `ConsumerTaken` on every call after the first.
    pub fn take_consumer(&mut self) -> Result<Consumer, LifecycleError> {
        self.consumer.take().ok_or(LifecycleError::ConsumerTaken)
    }
}

impl std::fmt::Debug for RegionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionHandle")
            .field("session_id", &self.session_id)
            .field("producer_state", &self.control.state())
            .field("consumer_taken", &self.consumer.is_none())
            .finish()
    }
}

/// Producer execution bound to the active session.
struct ActiveSession {
    id: u64,
    control: Arc<ProducerControl>,
    done: mpsc::Receiver<()>,
    thread: JoinHandle<ProducerReport>,
}

#[derive(Default)]
struct Inner {
    block: Option<Arc<dyn RegionMemory>>,
    active: Option<ActiveSession>,
    sessions: u64,
}

/// Owns the backing block and the producer thread.
pub struct LifecycleManager {
    config: RingConfig,
    record_phases: bool,
    inner: Mutex<Inner>,
}

impl LifecycleManager {
    pub fn new(config: RingConfig) -> Self {
        Self {
            config,
            record_phases: false,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Record per-message phase timestamps on both sides of every session.
    pub fn with_phase_recording(mut self, enabled: bool) -> Self {
        self.record_phases = enabled;
        self
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create and zero the backing block. No-op if it already exists.
    pub fn init(&self) -> Result<(), LifecycleError> {
        let mut inner = self.lock();
        self.init_locked(&mut inner).map(|_| ())
    }

    fn init_locked(&self, inner: &mut Inner) -> Result<Arc<dyn RegionMemory>, LifecycleError> {
        if let Some(block) = &inner.block {
            return Ok(block.clone());
        }

        let len = self.config.layout.total_len();
        let block: Arc<dyn RegionMemory> = match &self.config.backing {
            Backing::Heap => Arc::new(HeapArena::new(len)?),
            Backing::Posix { name } => Arc::new(SharedMemoryRegion::create(name, len)?),
        };

        tracing::info!(
            backing = self.config.backing.kind(),
            slots = self.config.layout.slots(),
            msg_size = self.config.layout.msg_size(),
            bytes = len,
            "Initialized backing block"
        );

        inner.block = Some(block.clone());
        Ok(block)
    }

    /// Map one more view of the block for an execution context.
    fn map_view(&self, block: &Arc<dyn RegionMemory>) -> Result<Arc<SharedRegion>, RegionError> {
        let view: Arc<dyn RegionMemory> = match &self.config.backing {
            Backing::Heap => block.clone(),
            Backing::Posix { name } => Arc::new(SharedMemoryRegion::open(name, block.len())?),
        };
        Ok(Arc::new(SharedRegion::new(view, self.config.layout)?))
    }

    /// Start a session with the configured message count.
    pub fn acquire(&self) -> Result<RegionHandle, LifecycleError> {
        self.acquire_with_count(self.config.session.message_count)
    }

    /// Start a session whose producer publishes `count` messages
    /// (`None` = until released).
    ///
    /// # Errors
    /// `SessionActive` if the previous session was not released,
    /// `Region(AllocationFailure | MappingFailure)` if the block or a view
    /// cannot be created. Nothing is left mapped on failure.
    pub fn acquire_with_count(&self, count: Option<u64>) -> Result<RegionHandle, LifecycleError> {
        let mut inner = self.lock();

        if inner.active.is_some() {
            return Err(LifecycleError::SessionActive);
        }

        let created = inner.block.is_none();
        let block = self.init_locked(&mut inner)?;

        let views = self
            .map_view(&block)
            .and_then(|producer| Ok((producer, self.map_view(&block)?)));
        let (producer_view, consumer_view) = match views {
            Ok(views) => views,
            Err(e) => {
                if created {
                    inner.block = None;
                }
                tracing::error!(error = %e, "Failed to map session views");
                return Err(e.into());
            }
        };

        let epoch = Instant::now();
        let (session_id, control) = self.on_open(&mut inner, producer_view, count, epoch)?;

        let mut consumer = Consumer::new(consumer_view.clone());
        if self.record_phases {
            consumer = consumer.with_recorder(PhaseRecorder::new(epoch));
        }

        Ok(RegionHandle {
            session_id,
            region: consumer_view,
            consumer: Some(consumer),
            control,
            epoch,
        })
    }

    /// Reset the header and start the producer thread for a new session.
    fn on_open(
        &self,
        inner: &mut Inner,
        region: Arc<SharedRegion>,
        count: Option<u64>,
        epoch: Instant,
    ) -> Result<(u64, Arc<ProducerControl>), LifecycleError> {
        // Stale slot bytes from a previous session stay; they are unreachable
        // once both indices are 0.
        region.reset();

        inner.sessions += 1;
        let id = inner.sessions;

        let control = Arc::new(ProducerControl::new());
        // Running before the thread exists, so a release racing the spawn
        // still finds a stoppable producer.
        control.transition_to(ProducerState::Running)?;

        let mut producer = Producer::new(region);
        if self.record_phases {
            producer = producer.with_recorder(PhaseRecorder::new(epoch));
        }

        let (done_tx, done) = mpsc::sync_channel(1);
        let thread_control = control.clone();
        let thread = thread::Builder::new()
            .name(format!("slotring-producer-{}", id))
            .spawn(move || {
                let report = producer.run(count, &thread_control);
                // The receiver may already be gone after a teardown timeout.
                let _ = done_tx.send(());
                report
            })
            .map_err(|e| {
                control.request_stop();
                LifecycleError::SpawnFailed {
                    reason: e.to_string(),
                }
            })?;

        tracing::info!(session = id, count = ?count, "Session opened");

        inner.active = Some(ActiveSession {
            id,
            control: control.clone(),
            done,
            thread,
        });

        Ok((id, control))
    }

    /// End the session behind `handle`.
    ///
    /// # Errors
    /// `TeardownTimeout` if the producer did not stop within the configured
    /// teardown timeout. The session then stays active; call
    /// [`Self::await_teardown`] to keep waiting.
    pub fn release(&self, handle: RegionHandle) -> Result<ProducerReport, LifecycleError> {
        let mut inner = self.lock();

        match &inner.active {
            Some(active) if active.id == handle.session_id => {}
            Some(_) => {
                return Err(LifecycleError::UnknownSession {
                    session_id: handle.session_id,
                })
            }
            None => return Err(LifecycleError::NoActiveSession),
        }

        let report = self.on_close(&mut inner, self.config.session.teardown_timeout)?;

        // Consumer view unmapped here, after the producer is gone.
        drop(handle);

        tracing::info!(
            published = report.published,
            stopped_early = report.stopped_early,
            "Session released"
        );
        Ok(report)
    }

    /// Keep waiting for a producer whose release timed out.
    pub fn await_teardown(&self, timeout: Duration) -> Result<ProducerReport, LifecycleError> {
        let mut inner = self.lock();
        if inner.active.is_none() {
            return Err(LifecycleError::NoActiveSession);
        }
        self.on_close(&mut inner, timeout)
    }

    /// Request stop and wait for the producer thread to finish.
    fn on_close(
        &self,
        inner: &mut Inner,
        timeout: Duration,
    ) -> Result<ProducerReport, LifecycleError> {
        let active = inner.active.take().ok_or(LifecycleError::NoActiveSession)?;

        let observed = active.control.request_stop();
        tracing::debug!(session = active.id, state = %observed, "Stop requested");

        match active.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                let timeout_ms = timeout.as_millis() as u64;
                tracing::error!(
                    session = active.id,
                    timeout_ms = timeout_ms,
                    "Producer did not stop in time"
                );
                inner.active = Some(active);
                return Err(LifecycleError::TeardownTimeout { timeout_ms });
            }
        }

        active
            .thread
            .join()
            .map_err(|_| LifecycleError::ProducerPanicked)
    }

    /// Free the backing block.
    ///
    /// # Errors
    /// `SessionActive` while a producer may still be running.
    pub fn destroy(&self) -> Result<(), LifecycleError> {
        let mut inner = self.lock();
        if inner.active.is_some() {
            return Err(LifecycleError::SessionActive);
        }
        if inner.block.take().is_some() {
            tracing::info!(backing = self.config.backing.kind(), "Destroyed backing block");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().block.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Number of sessions opened so far.
    pub fn session_count(&self) -> u64 {
        self.lock().sessions
    }

    fn quiescent_view(&self, inner: &Inner) -> Result<SharedRegion, LifecycleError> {
        if let Some(active) = &inner.active {
            if active.control.state() != ProducerState::Stopped {
                return Err(LifecycleError::SessionActive);
            }
        }
        let block = inner.block.clone().ok_or(LifecycleError::NotInitialized)?;
        Ok(SharedRegion::new(block, self.config.layout)?)
    }

    /// Read `(head, tail)` straight from the block.
    pub fn header(&self) -> Result<(usize, usize), LifecycleError> {
        let inner = self.lock();
        let block = inner.block.clone().ok_or(LifecycleError::NotInitialized)?;
        Ok(SharedRegion::new(block, self.config.layout)?.snapshot())
    }

    /// Copy out the raw bytes of slot `index`.
    ///
    /// # Errors
    /// `SessionActive` unless the current producer, if any, has stopped.
    pub fn inspect_slot(&self, index: usize) -> Result<Vec<u8>, LifecycleError> {
        if index >= self.config.layout.slots() {
            return Err(LifecycleError::Region(RegionError::InvalidLayout {
                reason: format!(
                    "Slot {} out of range (slots: {})",
                    index,
                    self.config.layout.slots()
                ),
            }));
        }
        let inner = self.lock();
        Ok(self.quiescent_view(&inner)?.copy_slot(index))
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        let timeout = self.config.session.teardown_timeout;
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        let Some(active) = inner.active.take() else {
            return;
        };

        active.control.request_stop();
        match active.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = active.thread.join();
            }
            Err(RecvTimeoutError::Timeout) => {
                // The thread keeps its own view alive; detaching it is safe.
                tracing::error!(session = active.id, "Producer still running at drop");
            }
        }
    }
}
