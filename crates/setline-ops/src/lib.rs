//! Resource operations for set-line configured devices.
//!
//! A [`ResourceSpec`] names where a resource type lives and how its
//! statements are laid out. [`ResourceEngine`] turns attribute trees into
//! locked, serialized transactions on a fresh session per call:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use setline_codec::{AttributeTree, ConfigPath, Schema, ValueKind};
//! use setline_ops::{ResourceEngine, ResourceSpec, SshSessionFactory};
//! use setline_session::{OperationContext, SerializationGate, SshTransportConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::builder()
//!     .scalar("description", "description", ValueKind::Text)
//!     .build()?;
//! let spec = ResourceSpec::new("interface", ConfigPath::parse("interfaces")?, schema);
//! let factory = SshSessionFactory::new(SshTransportConfig::new("edge1.example.net"));
//! let engine = ResourceEngine::new(factory, Arc::new(SerializationGate::new()));
//! let tree = AttributeTree::new().with_text("description", "uplink");
//! engine.create(&OperationContext::new(), &spec, "ge-0/0/0", &tree)?;
//! # Ok(())
//! # }
//! ```
//!
//! [`LockRetry`] is available to callers that would rather wait for a lock
//! held elsewhere than fail.

mod comment;
mod engine;
mod error;
mod factory;
mod resource;
mod retry;

#[cfg(test)]
mod tests;

pub use comment::{Action, batch_comment, resource_comment};
pub use engine::{CommitSummary, ResourceEngine};
pub use error::OperationError;
pub use factory::{DryRunSessionFactory, SessionFactory, SshSessionFactory};
pub use resource::ResourceSpec;
pub use retry::LockRetry;
