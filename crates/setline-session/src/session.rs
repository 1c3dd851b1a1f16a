//! Device sessions and the transaction state machine.
//!
//! A [`Session`] owns one [`Transport`] and the [`DeviceFacts`] captured when
//! it opened. Transaction steps move it between two states:
//!
//! ```text
//! Idle --lock--> Locked --commit ok--> Idle
//!                  |  \--commit err--> Locked
//!                  \----clear--------> Idle
//! ```
//!
//! Sessions are never shared between callers; open a fresh one per operation
//! and let it close on drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use setline_codec::{ConfigLine, ConfigPath};
use tracing::{debug, trace, warn};

use crate::clear::{ClearFailure, ClearObserver, ClearReport, ClearStep, TracingClearObserver};
use crate::context::OperationContext;
use crate::error::{Operation, SessionError};
use crate::facts::DeviceFacts;
use crate::process::{ProcessTransport, SshTransportConfig};
use crate::rpc::{MessageIds, Request, RpcReply, envelope};
use crate::transaction::{CommitOptions, DiagnosticWarning};
use crate::transport::Transport;

pub(crate) const SESSION_TARGET: &str = "setline_session::session";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Transaction state of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TransactionState {
    /// No lock held.
    #[default]
    Idle,
    /// The candidate lock is held.
    Locked {
        /// Lines staged since the lock was taken, in order.
        staged: Vec<ConfigLine>,
    },
}

impl TransactionState {
    /// Returns a lowercase state name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Locked { .. } => "locked",
        }
    }

    /// Returns true while the lock is held.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    /// Returns the staged lines; empty while idle.
    #[must_use]
    pub fn staged(&self) -> &[ConfigLine] {
        match self {
            Self::Idle => &[],
            Self::Locked { staged } => staged,
        }
    }
}

/// Contract shared by live and dry-run sessions.
pub trait ConfigSession: Send {
    /// Returns a process-unique session identifier for logs.
    fn id(&self) -> u64;

    /// Returns the facts captured at open time.
    fn facts(&self) -> &DeviceFacts;

    /// Returns the transaction state.
    fn state(&self) -> &TransactionState;

    /// Runs one opaque command and returns its text reply.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Command`] when the device rejects the command,
    /// or a transport failure. Never retries.
    fn command(&mut self, ctx: &OperationContext, text: &str) -> Result<String, SessionError>;

    /// Returns the configuration under `path` as relative `set` lines.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigSession::command`] failures.
    fn show_config(
        &mut self,
        ctx: &OperationContext,
        path: &ConfigPath,
    ) -> Result<String, SessionError> {
        let reply = self.command(ctx, &show_command(path, true))?;
        Ok(strip_framing(&reply))
    }

    /// Takes the exclusive candidate lock.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Lock`] when the device reports the lock held,
    /// and [`SessionError::InvalidState`] when already locked.
    fn lock(&mut self, ctx: &OperationContext) -> Result<(), SessionError>;

    /// Loads lines into the candidate without committing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Apply`] when any line is rejected, and
    /// [`SessionError::InvalidState`] when idle.
    fn stage(&mut self, ctx: &OperationContext, lines: &[ConfigLine]) -> Result<(), SessionError>;

    /// Commits the candidate and releases the lock.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Commit`] when the device rejects the
    /// candidate; the session stays locked.
    fn commit(
        &mut self,
        ctx: &OperationContext,
        options: &CommitOptions,
    ) -> Result<Vec<DiagnosticWarning>, SessionError>;

    /// Discards staged lines and releases the lock. Never fails.
    fn clear(&mut self) -> ClearReport;

    /// Releases the session. Calling it more than once is harmless.
    fn close(&mut self);

    /// Returns true once closed.
    fn is_closed(&self) -> bool;

    /// Returns the lines staged in the current transaction.
    fn staged_lines(&self) -> &[ConfigLine] {
        self.state().staged()
    }

    /// Returns true when staged lines never reach a device.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Returns the read command for `path`.
#[must_use]
pub fn show_command(path: &ConfigPath, relative: bool) -> String {
    let mut command = String::from("show configuration");
    if !path.is_empty() {
        command.push(' ');
        command.push_str(&path.to_string());
    }
    command.push_str(" | display set");
    if relative {
        command.push_str(" relative");
    }
    command
}

/// Drops prompts, banners and edit markers from command output.
#[must_use]
pub fn strip_framing(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !(line.starts_with('{') && line.ends_with('}')))
        .filter(|line| !(line.starts_with("[edit") && line.ends_with(']')))
        .filter(|line| !line.starts_with(crate::transport::FRAME_DELIMITER))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Live session over a [`Transport`].
pub struct Session<T: Transport> {
    id: u64,
    transport: T,
    facts: DeviceFacts,
    state: TransactionState,
    ids: MessageIds,
    observer: Arc<dyn ClearObserver>,
    closed: bool,
}

impl Session<ProcessTransport> {
    /// Spawns the ssh subsystem and opens a session over it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] when the client cannot start, the
    /// hello exchange fails or the facts cannot be read.
    pub fn connect(config: &SshTransportConfig, ctx: &OperationContext) -> Result<Self, SessionError> {
        ctx.check()?;
        let transport = ProcessTransport::spawn(config).map_err(|source| {
            SessionError::connection(format!("cannot reach {}", config.host()), source)
        })?;
        Self::open(transport, ctx)
    }
}

impl<T: Transport> Session<T> {
    /// Opens a session over an established transport and reads device facts.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] when the fact-gathering request
    /// fails or its reply cannot be understood.
    pub fn open(mut transport: T, ctx: &OperationContext) -> Result<Self, SessionError> {
        ctx.check()?;
        let id = next_session_id();
        let mut ids = MessageIds::default();
        let request = envelope(ids.next_id(), &Request::SoftwareInformation.body());
        let raw = match transport.round_trip(&request) {
            Ok(raw) => raw,
            Err(source) => {
                discard_transport(&mut transport);
                return Err(SessionError::connection("failed to read device facts", source));
            }
        };
        let facts = match DeviceFacts::from_reply(&raw) {
            Ok(facts) => facts,
            Err(error) => {
                discard_transport(&mut transport);
                return Err(SessionError::Connection {
                    message: format!("device facts not understood: {error}"),
                    source: None,
                });
            }
        };

        debug!(
            target: SESSION_TARGET,
            session = id,
            model = facts.model(),
            family = %facts.family(),
            version = %facts.version(),
            "session opened"
        );
        Ok(Self {
            id,
            transport,
            facts,
            state: TransactionState::Idle,
            ids,
            observer: Arc::new(TracingClearObserver),
            closed: false,
        })
    }

    /// Routes clear failures to `observer` instead of the log.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ClearObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Sends one request after checking the context.
    fn rpc(
        &mut self,
        ctx: &OperationContext,
        operation: Operation,
        request: &Request,
    ) -> Result<RpcReply, SessionError> {
        ctx.check()?;
        self.exchange(operation, request)
    }

    /// Sends one request regardless of the context; used while clearing.
    fn exchange(&mut self, operation: Operation, request: &Request) -> Result<RpcReply, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let message_id = self.ids.next_id();
        trace!(
            target: SESSION_TARGET,
            session = self.id,
            %operation,
            message_id,
            "sending request"
        );
        let raw = self
            .transport
            .round_trip(&envelope(message_id, &request.body()))
            .map_err(|source| SessionError::Transport { operation, source })?;
        let reply =
            RpcReply::parse(&raw).map_err(|source| SessionError::Protocol { operation, source })?;
        trace!(
            target: SESSION_TARGET,
            session = self.id,
            %operation,
            message_id,
            ok = reply.is_ok(),
            diagnostics = reply.diagnostics().len(),
            "received reply"
        );
        Ok(reply)
    }

    fn invalid_state(&self, operation: Operation) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state.name(),
        }
    }

    fn clear_step(&mut self, step: ClearStep, request: &Request, failures: &mut Vec<ClearFailure>) {
        let operation = match step {
            ClearStep::Discard => Operation::Discard,
            ClearStep::Unlock => Operation::Unlock,
        };
        let error = match self.exchange(operation, request) {
            Ok(reply) if reply.has_errors() => SessionError::Command {
                command: step.to_string(),
                diagnostics: reply.errors(),
            },
            Ok(_) => return,
            Err(error) => error,
        };
        let failure = ClearFailure {
            session: self.id,
            step,
            error,
        };
        self.observer.clear_failed(&failure);
        failures.push(failure);
    }
}

fn discard_transport<T: Transport>(transport: &mut T) {
    if let Err(error) = transport.close() {
        debug!(target: SESSION_TARGET, %error, "transport close failed after open error");
    }
}

impl<T: Transport> ConfigSession for Session<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn facts(&self) -> &DeviceFacts {
        &self.facts
    }

    fn state(&self) -> &TransactionState {
        &self.state
    }

    fn command(&mut self, ctx: &OperationContext, text: &str) -> Result<String, SessionError> {
        let reply = self.rpc(
            ctx,
            Operation::Command,
            &Request::Command {
                text: text.to_owned(),
            },
        )?;
        if reply.has_errors() {
            return Err(SessionError::Command {
                command: text.to_owned(),
                diagnostics: reply.errors(),
            });
        }
        Ok(reply.output().to_owned())
    }

    fn lock(&mut self, ctx: &OperationContext) -> Result<(), SessionError> {
        if self.state.is_locked() {
            return Err(self.invalid_state(Operation::Lock));
        }
        let reply = self.rpc(ctx, Operation::Lock, &Request::Lock)?;
        if reply.has_errors() {
            return Err(SessionError::Lock {
                diagnostics: reply.errors(),
            });
        }
        self.state = TransactionState::Locked { staged: Vec::new() };
        debug!(target: SESSION_TARGET, session = self.id, "candidate locked");
        Ok(())
    }

    fn stage(&mut self, ctx: &OperationContext, lines: &[ConfigLine]) -> Result<(), SessionError> {
        if !self.state.is_locked() {
            return Err(self.invalid_state(Operation::Stage));
        }
        if lines.is_empty() {
            return Ok(());
        }
        let request = Request::LoadSet {
            lines: lines.iter().map(ToString::to_string).collect(),
        };
        let reply = self.rpc(ctx, Operation::Stage, &request)?;
        if reply.has_errors() {
            return Err(SessionError::Apply {
                diagnostics: reply.errors(),
            });
        }
        if let TransactionState::Locked { staged } = &mut self.state {
            staged.extend_from_slice(lines);
        }
        debug!(
            target: SESSION_TARGET,
            session = self.id,
            lines = lines.len(),
            total = self.state.staged().len(),
            "lines staged"
        );
        Ok(())
    }

    fn commit(
        &mut self,
        ctx: &OperationContext,
        options: &CommitOptions,
    ) -> Result<Vec<DiagnosticWarning>, SessionError> {
        if !self.state.is_locked() {
            return Err(self.invalid_state(Operation::Commit));
        }
        let request = Request::Commit {
            comment: options.comment().map(ToOwned::to_owned),
            check_only: options.is_check_only(),
            confirm_timeout: options.confirm_timeout(),
        };
        let reply = self.rpc(ctx, Operation::Commit, &request)?;
        if reply.has_errors() {
            return Err(SessionError::Commit {
                diagnostics: reply.errors(),
            });
        }
        let mut warnings: Vec<DiagnosticWarning> =
            reply.warnings().into_iter().map(DiagnosticWarning::from).collect();
        if options.is_check_only() {
            debug!(target: SESSION_TARGET, session = self.id, "candidate checked");
            return Ok(warnings);
        }

        let staged = self.state.staged().len();
        self.state = TransactionState::Idle;
        match self.exchange(Operation::Unlock, &Request::Unlock) {
            Ok(reply) if !reply.has_errors() => {}
            Ok(reply) => warnings.extend(reply.errors().into_iter().map(|diagnostic| {
                DiagnosticWarning::new(format!("lock not released after commit: {diagnostic}"))
            })),
            Err(error) => {
                warn!(target: SESSION_TARGET, session = self.id, %error, "unlock after commit failed");
                warnings.push(DiagnosticWarning::new(format!(
                    "lock not released after commit: {error}"
                )));
            }
        }
        debug!(
            target: SESSION_TARGET,
            session = self.id,
            lines = staged,
            warnings = warnings.len(),
            "candidate committed"
        );
        Ok(warnings)
    }

    fn clear(&mut self) -> ClearReport {
        if !self.state.is_locked() {
            return ClearReport::idle();
        }
        let mut failures = Vec::new();
        self.clear_step(ClearStep::Discard, &Request::Discard, &mut failures);
        self.clear_step(ClearStep::Unlock, &Request::Unlock, &mut failures);
        self.state = TransactionState::Idle;
        debug!(
            target: SESSION_TARGET,
            session = self.id,
            failures = failures.len(),
            "transaction cleared"
        );
        ClearReport::locked(failures)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.clear();
        if let Err(error) = self.exchange(Operation::Close, &Request::CloseSession) {
            debug!(target: SESSION_TARGET, session = self.id, %error, "close-session not acknowledged");
        }
        self.closed = true;
        if let Err(error) = self.transport.close() {
            warn!(target: SESSION_TARGET, session = self.id, %error, "transport did not close cleanly");
        }
        debug!(target: SESSION_TARGET, session = self.id, "session closed");
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.close();
    }
}
