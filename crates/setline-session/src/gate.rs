//! Process-wide serialization of device read-modify-write sequences.
//!
//! The device lock reports conflicts instead of queuing, so concurrent
//! callers coordinate here first. One [`SerializationGate`] is created by the
//! caller and shared through an `Arc`; tests can build as many independent
//! gates as they need.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;

use crate::context::{ContextError, OperationContext};

const GATE_TARGET: &str = "setline_session::gate";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Critical section admitting one sequence at a time.
///
/// Waiters are not queued fairly.
#[derive(Debug)]
pub struct SerializationGate {
    held: Mutex<bool>,
    released: Condvar,
    poll_interval: Duration,
}

impl Default for SerializationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializationGate {
    /// Creates an open gate.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Creates an open gate that re-checks the waiter's context every
    /// `interval`.
    #[must_use]
    pub const fn with_poll_interval(interval: Duration) -> Self {
        Self {
            held: Mutex::new(false),
            released: Condvar::new(),
            poll_interval: interval,
        }
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the gate is free, then holds it until the guard drops.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the context is cancelled or its deadline
    /// passes while waiting.
    pub fn acquire(&self, ctx: &OperationContext) -> Result<GateGuard<'_>, ContextError> {
        let mut held = self.state();
        loop {
            ctx.check()?;
            if !*held {
                *held = true;
                trace!(target: GATE_TARGET, "gate acquired");
                return Ok(GateGuard { gate: self });
            }
            let wait = ctx
                .remaining()
                .map_or(self.poll_interval, |remaining| remaining.min(self.poll_interval));
            held = match self.released.wait_timeout(held, wait) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Takes the gate only if it is free.
    #[must_use]
    pub fn try_acquire(&self) -> Option<GateGuard<'_>> {
        let mut held = self.state();
        if *held {
            return None;
        }
        *held = true;
        Some(GateGuard { gate: self })
    }

    /// Returns true while some caller holds the gate.
    #[must_use]
    pub fn is_held(&self) -> bool {
        *self.state()
    }

    /// Runs `operation` while holding the gate.
    ///
    /// # Errors
    ///
    /// Returns the acquisition failure or the error from `operation`.
    pub fn with_gate<R, E>(
        &self,
        ctx: &OperationContext,
        operation: impl FnOnce() -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<ContextError>,
    {
        let _guard = self.acquire(ctx)?;
        operation()
    }

    fn release(&self) {
        let mut held = self.state();
        *held = false;
        drop(held);
        self.released.notify_one();
        trace!(target: GATE_TARGET, "gate released");
    }
}

/// Holds the gate until dropped.
#[derive(Debug)]
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    gate: &'a SerializationGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
