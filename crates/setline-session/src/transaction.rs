//! Lock, stage and commit-or-clear guard over a [`ConfigSession`].
//!
//! A [`Transaction`] is bounded by lock acquisition and commit-or-clear. The
//! guard makes the clear half of the contract automatic: if it is dropped
//! while the session still holds the configuration lock, it clears before
//! the borrow ends, so an early return with `?` can never leave the device
//! locked.

use std::fmt;
use std::time::Duration;

use setline_codec::ConfigLine;
use tracing::debug;

use crate::clear::ClearReport;
use crate::context::OperationContext;
use crate::error::SessionError;
use crate::rpc::RpcDiagnostic;
use crate::session::{ConfigSession, TransactionState};

pub(crate) const TRANSACTION_TARGET: &str = "setline_session::transaction";

/// Options for a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOptions {
    comment: Option<String>,
    check_only: bool,
    confirm_timeout: Option<Duration>,
}

impl CommitOptions {
    /// Plain commit without a log comment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the commit log comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Validates the candidate without activating it.
    ///
    /// A check leaves the transaction locked with its staged lines.
    #[must_use]
    pub const fn check_only(mut self) -> Self {
        self.check_only = true;
        self
    }

    /// Requests a confirmed commit that rolls back unless re-confirmed.
    #[must_use]
    pub const fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = Some(timeout);
        self
    }

    /// Returns the log comment.
    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Returns true for a check-only commit.
    #[must_use]
    pub const fn is_check_only(&self) -> bool {
        self.check_only
    }

    /// Returns the confirmation timeout.
    #[must_use]
    pub const fn confirm_timeout(&self) -> Option<Duration> {
        self.confirm_timeout
    }
}

/// Non-fatal message returned by a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticWarning {
    message: String,
    element: Option<String>,
    path: Option<String>,
}

impl DiagnosticWarning {
    /// Creates a warning from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            element: None,
            path: None,
        }
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the element the device mentioned, if any.
    #[must_use]
    pub fn element(&self) -> Option<&str> {
        self.element.as_deref()
    }

    /// Returns the configuration path the device mentioned, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl From<RpcDiagnostic> for DiagnosticWarning {
    fn from(diagnostic: RpcDiagnostic) -> Self {
        Self {
            message: diagnostic.message().to_owned(),
            element: diagnostic.bad_element().map(ToOwned::to_owned),
            path: diagnostic.path().map(ToOwned::to_owned),
        }
    }
}

impl fmt::Display for DiagnosticWarning {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(formatter, "{path}: ")?;
        }
        formatter.write_str(&self.message)
    }
}

/// Guard over one locked transaction.
pub struct Transaction<'s, S: ConfigSession + ?Sized> {
    session: &'s mut S,
}

impl<'s, S: ConfigSession + ?Sized> Transaction<'s, S> {
    /// Locks the candidate and returns the guard.
    ///
    /// # Errors
    ///
    /// Returns the lock failure; nothing needs clearing in that case.
    pub fn begin(session: &'s mut S, ctx: &OperationContext) -> Result<Self, SessionError> {
        session.lock(ctx)?;
        debug!(target: TRANSACTION_TARGET, session = session.id(), "transaction started");
        Ok(Self { session })
    }

    /// Stages lines into the candidate.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Apply`] when the device rejects a line.
    pub fn stage(&mut self, ctx: &OperationContext, lines: &[ConfigLine]) -> Result<(), SessionError> {
        self.session.stage(ctx, lines)
    }

    /// Runs an opaque command inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Command`] or a transport failure.
    pub fn command(&mut self, ctx: &OperationContext, text: &str) -> Result<String, SessionError> {
        self.session.command(ctx, text)
    }

    /// Commits the staged lines.
    ///
    /// The context is checked first, so a cancellation that arrives after
    /// staging stops the commit and the guard clears on drop.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Commit`] when the device rejects the candidate
    /// or [`SessionError::Cancelled`] when the context stopped the call.
    pub fn commit(
        &mut self,
        ctx: &OperationContext,
        options: &CommitOptions,
    ) -> Result<Vec<DiagnosticWarning>, SessionError> {
        ctx.check()?;
        self.session.commit(ctx, options)
    }

    /// Discards staged lines and releases the lock.
    pub fn clear(self) -> ClearReport {
        self.session.clear()
    }

    /// Returns the session state.
    #[must_use]
    pub fn state(&self) -> &TransactionState {
        self.session.state()
    }

    /// Returns the underlying session.
    pub fn session(&mut self) -> &mut S {
        self.session
    }
}

impl<S: ConfigSession + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if !self.session.state().is_locked() {
            return;
        }
        let report = self.session.clear();
        debug!(
            target: TRANSACTION_TARGET,
            session = self.session.id(),
            clean = report.is_clean(),
            "transaction cleared on drop"
        );
    }
}

/// Locks, stages `lines` and commits them as one transaction.
///
/// Any failure after the lock is taken clears the candidate before the error
/// is returned.
///
/// # Errors
///
/// Returns the first lock, apply, commit or cancellation error.
pub fn execute<S: ConfigSession + ?Sized>(
    session: &mut S,
    ctx: &OperationContext,
    lines: &[ConfigLine],
    options: &CommitOptions,
) -> Result<Vec<DiagnosticWarning>, SessionError> {
    let mut transaction = Transaction::begin(session, ctx)?;
    transaction.stage(ctx, lines)?;
    transaction.commit(ctx, options)
}
