//! Session substitute that writes staged lines to a local sink.
//!
//! A dry run follows the same transaction contract as a live session but
//! never touches a device: staged lines are appended to a [`LineSink`],
//! commits succeed without warnings, and commands return empty text so
//! existence checks always see the resource as absent.
//!
//! The sink records what was staged, not what was committed. Lines reach it
//! at stage time and stay there when the transaction is later cleared; the
//! clear is logged at warn with the number of lines left behind.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use setline_codec::ConfigLine;
use tracing::{debug, info, warn};

use crate::clear::ClearReport;
use crate::context::OperationContext;
use crate::error::{Operation, SessionError};
use crate::facts::{DeviceFacts, SoftwareVersion};
use crate::session::{ConfigSession, TransactionState, next_session_id};
use crate::transaction::{CommitOptions, DiagnosticWarning};

const DRY_RUN_TARGET: &str = "setline_session::dry_run";

/// Destination for staged lines.
pub trait LineSink: Send {
    /// Appends lines in order.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised by the destination.
    fn append(&mut self, lines: &[ConfigLine]) -> io::Result<()>;
}

/// In-memory sink whose clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<ConfigLine>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every line appended so far.
    #[must_use]
    pub fn lines(&self) -> Vec<ConfigLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Renders the buffer as a script, one statement per line.
    #[must_use]
    pub fn script(&self) -> String {
        self.lines()
            .iter()
            .map(|line| format!("{line}\n"))
            .collect()
    }
}

impl LineSink for MemorySink {
    fn append(&mut self, lines: &[ConfigLine]) -> io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(lines);
        Ok(())
    }
}

/// Sink appending statements to a file, creating it on first write.
#[derive(Debug, Clone)]
pub struct SetFileSink {
    path: Utf8PathBuf,
}

impl SetFileSink {
    /// Targets `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl LineSink for SetFileSink {
    fn append(&mut self, lines: &[ConfigLine]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut script = String::new();
        for line in lines {
            script.push_str(&line.to_string());
            script.push('\n');
        }
        file.write_all(script.as_bytes())?;
        file.flush()
    }
}

/// Dry-run session.
pub struct DryRunSession {
    id: u64,
    facts: DeviceFacts,
    state: TransactionState,
    sink: Box<dyn LineSink>,
    closed: bool,
}

impl DryRunSession {
    /// Creates a session with placeholder facts.
    #[must_use]
    pub fn new(sink: Box<dyn LineSink>) -> Self {
        Self::with_facts(sink, DeviceFacts::new("unknown", SoftwareVersion::new(0, 0)))
    }

    /// Creates a session reporting `facts` to capability checks.
    #[must_use]
    pub fn with_facts(sink: Box<dyn LineSink>, facts: DeviceFacts) -> Self {
        let id = next_session_id();
        debug!(target: DRY_RUN_TARGET, session = id, model = facts.model(), "dry-run session opened");
        Self {
            id,
            facts,
            state: TransactionState::Idle,
            sink,
            closed: false,
        }
    }

    fn ensure_open(&self, ctx: &OperationContext) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        ctx.check()?;
        Ok(())
    }

    fn invalid_state(&self, operation: Operation) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state.name(),
        }
    }
}

impl ConfigSession for DryRunSession {
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
        self.ensure_open(ctx)?;
        debug!(target: DRY_RUN_TARGET, session = self.id, command = text, "command skipped");
        Ok(String::new())
    }

    fn lock(&mut self, ctx: &OperationContext) -> Result<(), SessionError> {
        self.ensure_open(ctx)?;
        if self.state.is_locked() {
            return Err(self.invalid_state(Operation::Lock));
        }
        self.state = TransactionState::Locked { staged: Vec::new() };
        Ok(())
    }

    fn stage(&mut self, ctx: &OperationContext, lines: &[ConfigLine]) -> Result<(), SessionError> {
        self.ensure_open(ctx)?;
        if !self.state.is_locked() {
            return Err(self.invalid_state(Operation::Stage));
        }
        self.sink.append(lines).map_err(SessionError::sink)?;
        if let TransactionState::Locked { staged } = &mut self.state {
            staged.extend_from_slice(lines);
        }
        info!(
            target: DRY_RUN_TARGET,
            session = self.id,
            lines = lines.len(),
            "staged lines written to dry-run sink"
        );
        Ok(())
    }

    fn commit(
        &mut self,
        ctx: &OperationContext,
        options: &CommitOptions,
    ) -> Result<Vec<DiagnosticWarning>, SessionError> {
        self.ensure_open(ctx)?;
        if !self.state.is_locked() {
            return Err(self.invalid_state(Operation::Commit));
        }
        if !options.is_check_only() {
            self.state = TransactionState::Idle;
        }
        Ok(Vec::new())
    }

    fn clear(&mut self) -> ClearReport {
        let TransactionState::Locked { staged } = &self.state else {
            return ClearReport::idle();
        };
        if !staged.is_empty() {
            warn!(
                target: DRY_RUN_TARGET,
                session = self.id,
                lines = staged.len(),
                "transaction cleared; staged lines remain in the dry-run sink"
            );
        }
        self.state = TransactionState::Idle;
        ClearReport::locked(Vec::new())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.clear();
        self.closed = true;
        debug!(target: DRY_RUN_TARGET, session = self.id, "dry-run session closed");
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
