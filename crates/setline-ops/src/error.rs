//! Errors raised by resource operations.

use setline_codec::{DecodeError, EncodeError};
use setline_session::{ContextError, ErrorKind, SessionError, Unsupported};
use thiserror::Error;

/// Errors surfaced by [`crate::ResourceEngine`].
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    /// A session step failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The attribute tree does not match the resource layout.
    #[error("cannot build statements: {0}")]
    Encode(#[from] EncodeError),

    /// The device configuration could not be decoded.
    #[error("cannot read configuration: {0}")]
    Decode(#[from] DecodeError),

    /// The operation context stopped the call while waiting for the gate.
    #[error(transparent)]
    Cancelled(#[from] ContextError),

    /// The device cannot configure the resource.
    #[error(transparent)]
    Unsupported(#[from] Unsupported),

    /// A create targeted a resource that already exists.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// The resource was not found when re-read after its commit.
    #[error("{kind} '{name}' is missing after commit")]
    MissingAfterCommit {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },
}

impl OperationError {
    /// Returns true when the device refused the configuration lock.
    #[must_use]
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, Self::Session(error) if error.kind() == ErrorKind::Lock)
    }

    /// Returns true for cancellation or deadline expiry at any layer.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled(_) => true,
            Self::Session(error) => error.kind() == ErrorKind::Cancelled,
            _ => false,
        }
    }
}
