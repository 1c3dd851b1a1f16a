//! Device sessions, transactions and serialization for set-line configuration.
//!
//! This crate carries the stateful half of the engine:
//!
//! - [`Transport`] is the request/reply channel to one device.
//!   [`FramedTransport`] speaks end-of-message framed XML RPCs over any
//!   reader and writer; [`ProcessTransport`] runs the ssh client with the
//!   `netconf` subsystem.
//! - [`Session`] owns a transport plus the [`DeviceFacts`] read when it
//!   opened, and implements the [`ConfigSession`] contract: opaque commands,
//!   configuration reads, and the lock, stage, commit and clear steps.
//! - [`Transaction`] guards one locked transaction and clears it on drop.
//! - [`SerializationGate`] admits one read-modify-write sequence at a time
//!   across every caller sharing it.
//! - [`supports`] answers capability questions from facts alone.
//! - [`DryRunSession`] honours the same contract while writing staged lines
//!   to a [`LineSink`].
//!
//! Clear never fails; failed cleanup steps are routed to a
//! [`ClearObserver`].

mod capability;
mod clear;
mod context;
mod dry_run;
mod error;
mod facts;
mod gate;
mod process;
mod rpc;
mod session;
mod transaction;
mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod simulator;

#[cfg(test)]
mod tests;

pub use capability::{Feature, FeatureParseError, Unsupported, require, supports};
pub use clear::{
    ClearFailure, ClearObserver, ClearReport, ClearStep, RecordingClearObserver,
    TracingClearObserver,
};
pub use context::{CancellationToken, ContextError, OperationContext};
pub use dry_run::{DryRunSession, LineSink, MemorySink, SetFileSink};
pub use error::{ErrorKind, Operation, SessionError, TransportError};
pub use facts::{DeviceFacts, FactsError, HardwareFamily, SoftwareVersion, VersionParseError};
pub use gate::{GateGuard, SerializationGate};
pub use process::{ProcessTransport, SshTransportConfig};
pub use rpc::{
    MessageIds, ReplyParseError, Request, RpcDiagnostic, RpcReply, ScannedElement, Severity,
    element_text, envelope, scan,
};
pub use session::{ConfigSession, Session, TransactionState, show_command, strip_framing};
pub use transaction::{CommitOptions, DiagnosticWarning, Transaction, execute};
pub use transport::{FRAME_DELIMITER, FramedTransport, Transport, parse_hello};
