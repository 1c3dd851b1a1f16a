//! Error types for device sessions and their transports.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::context::ContextError;
use crate::rpc::{ReplyParseError, RpcDiagnostic};

/// Session step during which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Transport setup and hello exchange.
    Open,
    /// Device fact gathering.
    Facts,
    /// Opaque command round trip.
    Command,
    /// Exclusive configuration lock.
    Lock,
    /// Loading staged statements into the candidate.
    Stage,
    /// Committing the candidate.
    Commit,
    /// Discarding uncommitted candidate changes.
    Discard,
    /// Releasing the configuration lock.
    Unlock,
    /// Closing the session.
    Close,
}

impl Operation {
    /// Returns a stable lowercase label for logs and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Facts => "facts",
            Self::Command => "command",
            Self::Lock => "lock",
            Self::Stage => "stage",
            Self::Commit => "commit",
            Self::Discard => "discard",
            Self::Unlock => "unlock",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Transport-layer errors.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// The transport command could not be started.
    #[error("failed to start '{command}': {source}")]
    Spawn {
        /// Command that failed to start.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The peer closed the channel.
    #[error("connection closed by peer")]
    Closed,

    /// The peer sent bytes that do not form a valid message.
    #[error("malformed message: {message}")]
    Framing {
        /// Description of the framing problem.
        message: String,
    },

    /// The hello exchange failed.
    #[error("capability exchange failed: {message}")]
    Handshake {
        /// Description of the handshake problem.
        message: String,
    },
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            return Self::Closed;
        }
        Self::Io(Arc::new(error))
    }
}

/// Coarse error classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport or authentication failure; fatal to the operation.
    Connection,
    /// The exclusive configuration lock is unavailable.
    Lock,
    /// A staged statement was rejected.
    Apply,
    /// The candidate was rejected at commit time.
    Commit,
    /// An opaque command failed.
    Command,
    /// A call arrived in the wrong transaction state.
    State,
    /// The operation was cancelled or timed out.
    Cancelled,
}

/// Errors raised by sessions.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The transport could not be established or the device facts could not
    /// be gathered.
    #[error("connection failed: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
        /// Transport error, when one caused the failure.
        #[source]
        source: Option<TransportError>,
    },

    /// A round trip failed at the transport level.
    #[error("{operation} failed: {source}")]
    Transport {
        /// Step that was running.
        operation: Operation,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The device returned an unparseable reply.
    #[error("{operation} returned a malformed reply: {source}")]
    Protocol {
        /// Step that was running.
        operation: Operation,
        /// Parse failure.
        #[source]
        source: ReplyParseError,
    },

    /// The device rejected an opaque command.
    #[error("command '{command}' failed: {}", join_messages(.diagnostics))]
    Command {
        /// Command text.
        command: String,
        /// Device diagnostics.
        diagnostics: Vec<RpcDiagnostic>,
    },

    /// The exclusive configuration lock could not be acquired.
    #[error("configuration lock refused: {}", join_messages(.diagnostics))]
    Lock {
        /// Device diagnostics.
        diagnostics: Vec<RpcDiagnostic>,
    },

    /// The device rejected staged statements.
    #[error("staged statements rejected: {}", join_messages(.diagnostics))]
    Apply {
        /// Device diagnostics, naming the offending element where known.
        diagnostics: Vec<RpcDiagnostic>,
    },

    /// The device rejected the candidate at commit time.
    #[error("commit rejected: {}", join_messages(.diagnostics))]
    Commit {
        /// Device diagnostics.
        diagnostics: Vec<RpcDiagnostic>,
    },

    /// A step was called in the wrong transaction state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Step that was attempted.
        operation: Operation,
        /// Name of the current state.
        state: &'static str,
    },

    /// The operation context stopped the call.
    #[error(transparent)]
    Cancelled(#[from] ContextError),

    /// The session was already closed.
    #[error("session is closed")]
    Closed,

    /// The dry-run sink could not be written.
    #[error("failed to write staged statements: {source}")]
    Sink {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl SessionError {
    /// Builds a connection error caused by a transport failure.
    #[must_use]
    pub fn connection(message: impl Into<String>, source: TransportError) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Builds a dry-run sink error.
    #[must_use]
    pub fn sink(source: io::Error) -> Self {
        Self::Sink {
            source: Arc::new(source),
        }
    }

    /// Returns the coarse class of the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. }
            | Self::Transport { .. }
            | Self::Protocol { .. }
            | Self::Closed
            | Self::Sink { .. } => ErrorKind::Connection,
            Self::Command { .. } => ErrorKind::Command,
            Self::Lock { .. } => ErrorKind::Lock,
            Self::Apply { .. } => ErrorKind::Apply,
            Self::Commit { .. } => ErrorKind::Commit,
            Self::InvalidState { .. } => ErrorKind::State,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Returns the device diagnostics attached to the error.
    #[must_use]
    pub fn diagnostics(&self) -> &[RpcDiagnostic] {
        match self {
            Self::Command { diagnostics, .. }
            | Self::Lock { diagnostics }
            | Self::Apply { diagnostics }
            | Self::Commit { diagnostics } => diagnostics,
            _ => &[],
        }
    }
}

fn join_messages(diagnostics: &[RpcDiagnostic]) -> String {
    if diagnostics.is_empty() {
        return String::from("no diagnostics returned");
    }
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
