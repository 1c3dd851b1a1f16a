//! Resource operations over fresh, serialized sessions.
//!
//! Each call opens its own session through the [`SessionFactory`], holds the
//! shared [`SerializationGate`] while it talks to the device, and closes the
//! session before returning. Writes run as one locked transaction; any
//! failure after the lock clears the candidate before the error surfaces.

use std::sync::Arc;

use setline_codec::{AttributeTree, ConfigLine, ConfigPath, build, delete_lines, parse, replace_lines};
use setline_session::{
    CommitOptions, ConfigSession, DeviceFacts, DiagnosticWarning, OperationContext,
    SerializationGate, execute, require, show_command, strip_framing,
};
use tracing::{debug, info};

use crate::comment::{Action, batch_comment, resource_comment};
use crate::error::OperationError;
use crate::factory::SessionFactory;
use crate::resource::ResourceSpec;

const ENGINE_TARGET: &str = "setline_ops::engine";

/// Outcome of one committed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    /// Kind of change.
    pub action: Action,
    /// Resource path, absent for raw statement batches.
    pub resource: Option<ConfigPath>,
    /// Statements that were staged.
    pub lines: Vec<ConfigLine>,
    /// Warnings the device attached to the commit.
    pub warnings: Vec<DiagnosticWarning>,
    /// True when the statements went to a dry-run sink.
    pub dry_run: bool,
}

/// Runs resource operations against one device.
pub struct ResourceEngine<F> {
    factory: F,
    gate: Arc<SerializationGate>,
    comment_prefix: Option<String>,
}

impl<F: SessionFactory> ResourceEngine<F> {
    /// Creates an engine whose device conversations are serialized by `gate`.
    #[must_use]
    pub const fn new(factory: F, gate: Arc<SerializationGate>) -> Self {
        Self {
            factory,
            gate,
            comment_prefix: None,
        }
    }

    /// Prefixes every commit comment with `prefix`.
    #[must_use]
    pub fn with_comment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.comment_prefix = Some(prefix.into());
        self
    }

    /// Returns the gate shared by this engine.
    #[must_use]
    pub const fn gate(&self) -> &Arc<SerializationGate> {
        &self.gate
    }

    /// Reports the facts of the device.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Session`] when no session can be opened.
    pub fn facts(&self, ctx: &OperationContext) -> Result<DeviceFacts, OperationError> {
        self.with_session(ctx, |session| Ok(session.facts().clone()))
    }

    /// Returns the configuration under `path` as relative `set` lines.
    ///
    /// # Errors
    ///
    /// Returns session failures and [`OperationError::Cancelled`] when the
    /// gate wait is stopped.
    pub fn show(&self, ctx: &OperationContext, path: &ConfigPath) -> Result<String, OperationError> {
        self.with_session(ctx, |session| {
            let _guard = self.gate.acquire(ctx)?;
            Ok(session.show_config(ctx, path)?)
        })
    }

    /// Reads the resource called `name`, or `None` when it is not configured.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Decode`] when the device output does not fit
    /// the resource layout.
    pub fn read(
        &self,
        ctx: &OperationContext,
        spec: &ResourceSpec,
        name: &str,
    ) -> Result<Option<AttributeTree>, OperationError> {
        let path = spec.path(name);
        self.with_session(ctx, |session| {
            let _guard = self.gate.acquire(ctx)?;
            let text = session.show_config(ctx, &path)?;
            if text.trim().is_empty() {
                return Ok(None);
            }
            let tree = parse(spec.schema(), &path, &text)?;
            debug!(target: ENGINE_TARGET, kind = spec.kind(), name, "resource read");
            Ok(Some(tree))
        })
    }

    /// Returns true when anything is configured at the resource path.
    ///
    /// # Errors
    ///
    /// Returns session failures.
    pub fn exists(
        &self,
        ctx: &OperationContext,
        spec: &ResourceSpec,
        name: &str,
    ) -> Result<bool, OperationError> {
        let path = spec.path(name);
        self.with_session(ctx, |session| {
            let _guard = self.gate.acquire(ctx)?;
            is_present(session, ctx, &path)
        })
    }

    /// Creates the resource called `name` from `tree`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Unsupported`] before any lock when the
    /// device lacks the resource's feature, [`OperationError::AlreadyExists`]
    /// when the path is already configured, and
    /// [`OperationError::MissingAfterCommit`] when the committed resource
    /// cannot be read back.
    pub fn create(
        &self,
        ctx: &OperationContext,
        spec: &ResourceSpec,
        name: &str,
        tree: &AttributeTree,
    ) -> Result<CommitSummary, OperationError> {
        let path = spec.path(name);
        let mut lines = build(spec.schema(), &path, tree)?;
        if lines.is_empty() {
            lines.push(ConfigLine::set(path.clone()));
        }
        self.with_session(ctx, |session| {
            require_feature(spec, session)?;
            let _guard = self.gate.acquire(ctx)?;
            if is_present(session, ctx, &path)? {
                return Err(OperationError::AlreadyExists {
                    kind: spec.kind().to_owned(),
                    name: name.to_owned(),
                });
            }
            let summary = self.commit_resource(session, ctx, Action::Create, spec, name, lines)?;
            verify_present(session, ctx, spec, name, &summary)?;
            Ok(summary)
        })
    }

    /// Replaces the resource called `name` with `tree`.
    ///
    /// Attributes missing from `tree` are removed from the device.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Unsupported`] before any lock, and
    /// [`OperationError::MissingAfterCommit`] when the result cannot be read
    /// back.
    pub fn update(
        &self,
        ctx: &OperationContext,
        spec: &ResourceSpec,
        name: &str,
        tree: &AttributeTree,
    ) -> Result<CommitSummary, OperationError> {
        let path = spec.path(name);
        let mut lines = replace_lines(spec.schema(), &path, tree)?;
        if lines.len() == 1 {
            lines.push(ConfigLine::set(path));
        }
        self.with_session(ctx, |session| {
            require_feature(spec, session)?;
            let _guard = self.gate.acquire(ctx)?;
            let summary = self.commit_resource(session, ctx, Action::Update, spec, name, lines)?;
            verify_present(session, ctx, spec, name, &summary)?;
            Ok(summary)
        })
    }

    /// Removes the resource called `name` and everything beneath it.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Unsupported`] before any lock, or the
    /// transaction failure.
    pub fn delete(
        &self,
        ctx: &OperationContext,
        spec: &ResourceSpec,
        name: &str,
    ) -> Result<CommitSummary, OperationError> {
        let lines = delete_lines(&spec.path(name));
        self.with_session(ctx, |session| {
            require_feature(spec, session)?;
            let _guard = self.gate.acquire(ctx)?;
            self.commit_resource(session, ctx, Action::Delete, spec, name, lines)
        })
    }

    /// Commits raw statements as one transaction.
    ///
    /// Without `comment` the commit is logged as `apply N statements`.
    ///
    /// # Errors
    ///
    /// Returns the lock, apply, commit or cancellation error.
    pub fn apply_lines(
        &self,
        ctx: &OperationContext,
        lines: &[ConfigLine],
        comment: Option<&str>,
    ) -> Result<CommitSummary, OperationError> {
        let comment = comment.map_or_else(
            || batch_comment(self.comment_prefix.as_deref(), lines.len()),
            ToOwned::to_owned,
        );
        self.with_session(ctx, |session| {
            let _guard = self.gate.acquire(ctx)?;
            let options = CommitOptions::new().with_comment(comment);
            let warnings = execute(&mut *session, ctx, lines, &options)?;
            let summary = CommitSummary {
                action: Action::Apply,
                resource: None,
                lines: lines.to_vec(),
                warnings,
                dry_run: session.is_dry_run(),
            };
            log_commit(session.id(), &summary);
            Ok(summary)
        })
    }

    fn with_session<R>(
        &self,
        ctx: &OperationContext,
        operation: impl FnOnce(&mut dyn ConfigSession) -> Result<R, OperationError>,
    ) -> Result<R, OperationError> {
        let mut session = self.factory.open(ctx)?;
        let outcome = operation(session.as_mut());
        session.close();
        outcome
    }

    fn commit_resource(
        &self,
        session: &mut dyn ConfigSession,
        ctx: &OperationContext,
        action: Action,
        spec: &ResourceSpec,
        name: &str,
        lines: Vec<ConfigLine>,
    ) -> Result<CommitSummary, OperationError> {
        let comment = resource_comment(self.comment_prefix.as_deref(), action, spec.kind(), name);
        let options = CommitOptions::new().with_comment(comment);
        let warnings = execute(&mut *session, ctx, &lines, &options)?;
        let summary = CommitSummary {
            action,
            resource: Some(spec.path(name)),
            lines,
            warnings,
            dry_run: session.is_dry_run(),
        };
        log_commit(session.id(), &summary);
        Ok(summary)
    }
}

fn require_feature(spec: &ResourceSpec, session: &dyn ConfigSession) -> Result<(), OperationError> {
    if let Some(feature) = spec.feature() {
        require(feature, session.facts())?;
    }
    Ok(())
}

fn is_present(
    session: &mut dyn ConfigSession,
    ctx: &OperationContext,
    path: &ConfigPath,
) -> Result<bool, OperationError> {
    let reply = session.command(ctx, &show_command(path, false))?;
    Ok(!strip_framing(&reply).trim().is_empty())
}

fn verify_present(
    session: &mut dyn ConfigSession,
    ctx: &OperationContext,
    spec: &ResourceSpec,
    name: &str,
    summary: &CommitSummary,
) -> Result<(), OperationError> {
    if summary.dry_run {
        return Ok(());
    }
    let Some(path) = &summary.resource else {
        return Ok(());
    };
    if is_present(session, ctx, path)? {
        return Ok(());
    }
    Err(OperationError::MissingAfterCommit {
        kind: spec.kind().to_owned(),
        name: name.to_owned(),
    })
}

fn log_commit(session: u64, summary: &CommitSummary) {
    info!(
        target: ENGINE_TARGET,
        session,
        action = %summary.action,
        resource = summary.resource.as_ref().map(ToString::to_string),
        lines = summary.lines.len(),
        warnings = summary.warnings.len(),
        dry_run = summary.dry_run,
        "configuration committed"
    );
}
