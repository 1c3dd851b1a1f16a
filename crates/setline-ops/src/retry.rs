//! Caller-level retry when the configuration lock is busy.
//!
//! The engine never retries on its own. Callers that prefer to wait for a
//! lock held elsewhere wrap an operation in [`LockRetry::run`].

use std::thread;
use std::time::Duration;

use setline_session::OperationContext;
use tracing::warn;

use crate::error::OperationError;

const RETRY_TARGET: &str = "setline_ops::retry";

/// Fixed-interval retry of lock conflicts, bounded by the context deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRetry {
    interval: Duration,
    max_attempts: Option<u32>,
}

impl LockRetry {
    /// Retries every `interval` until the context stops the operation.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Gives up after `attempts` tries in total.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Returns the retry interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `operation`, repeating it while it fails with a lock conflict.
    ///
    /// Other errors and successes return immediately. When the deadline
    /// passes or the attempts run out, the last lock error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error from the final attempt.
    pub fn run<T>(
        &self,
        ctx: &OperationContext,
        mut operation: impl FnMut() -> Result<T, OperationError>,
    ) -> Result<T, OperationError> {
        let mut attempt = 1_u32;
        loop {
            let error = match operation() {
                Err(error) if error.is_lock_conflict() => error,
                outcome => return outcome,
            };
            if self.max_attempts.is_some_and(|max| attempt >= max) {
                return Err(error);
            }
            let wait = ctx
                .remaining()
                .map_or(self.interval, |remaining| remaining.min(self.interval));
            if ctx.check().is_err() || (wait.is_zero() && ctx.deadline().is_some()) {
                return Err(error);
            }
            warn!(
                target: RETRY_TARGET,
                attempt,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                %error,
                "configuration lock busy; retrying"
            );
            thread::sleep(wait);
            if ctx.check().is_err() {
                return Err(error);
            }
            attempt = attempt.saturating_add(1);
        }
    }
}
