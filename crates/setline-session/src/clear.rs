//! Side channel for failures raised while clearing a transaction.
//!
//! `clear` never returns an error so that cleanup cannot mask the failure
//! that triggered it. Each failed step is instead reported to a
//! [`ClearObserver`] and summarised in the returned [`ClearReport`].

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::error::SessionError;

pub(crate) const CLEAR_TARGET: &str = "setline_session::clear";

/// Cleanup step that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClearStep {
    /// Discarding the uncommitted candidate.
    Discard,
    /// Releasing the configuration lock.
    Unlock,
}

impl fmt::Display for ClearStep {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Discard => "discard",
            Self::Unlock => "unlock",
        })
    }
}

/// One failed cleanup step.
#[derive(Debug, Clone)]
pub struct ClearFailure {
    /// Session that was being cleared.
    pub session: u64,
    /// Step that failed.
    pub step: ClearStep,
    /// Error raised by the step.
    pub error: SessionError,
}

impl fmt::Display for ClearFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "session {} {} failed: {}",
            self.session, self.step, self.error
        )
    }
}

/// Outcome of a clear.
#[derive(Debug, Clone, Default)]
pub struct ClearReport {
    was_locked: bool,
    failures: Vec<ClearFailure>,
}

impl ClearReport {
    /// Report for a clear that had nothing to do.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            was_locked: false,
            failures: Vec::new(),
        }
    }

    /// Report for a clear of a locked transaction.
    #[must_use]
    pub const fn locked(failures: Vec<ClearFailure>) -> Self {
        Self {
            was_locked: true,
            failures,
        }
    }

    /// Returns true when a lock was held before the clear.
    #[must_use]
    pub const fn was_locked(&self) -> bool {
        self.was_locked
    }

    /// Returns true when every step succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the failed steps.
    #[must_use]
    pub fn failures(&self) -> &[ClearFailure] {
        &self.failures
    }
}

/// Receives cleanup failures.
pub trait ClearObserver: Send + Sync {
    /// Called once per failed step.
    fn clear_failed(&self, failure: &ClearFailure);
}

/// Observer that logs failures at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingClearObserver;

impl ClearObserver for TracingClearObserver {
    fn clear_failed(&self, failure: &ClearFailure) {
        warn!(
            target: CLEAR_TARGET,
            session = failure.session,
            step = %failure.step,
            error = %failure.error,
            "clear step failed"
        );
    }
}

/// Observer that keeps every failure for later inspection.
#[derive(Debug, Default)]
pub struct RecordingClearObserver {
    failures: Mutex<Vec<ClearFailure>>,
}

impl RecordingClearObserver {
    /// Creates an empty recorder behind an `Arc`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the recorded failures.
    #[must_use]
    pub fn failures(&self) -> Vec<ClearFailure> {
        self.failures
            .lock()
            .map(|failures| failures.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Returns the number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures().len()
    }

    /// Returns true when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures().is_empty()
    }
}

impl ClearObserver for RecordingClearObserver {
    fn clear_failed(&self, failure: &ClearFailure) {
        TracingClearObserver.clear_failed(failure);
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        failures.push(failure.clone());
    }
}
