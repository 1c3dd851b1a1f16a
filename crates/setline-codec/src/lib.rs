//! Line-grammar codec for hierarchical `set`/`delete` configuration statements.
//!
//! Network operating systems in the Junos family expose their configuration
//! as a flat list of statements such as
//! `set interfaces ge-0/0/0 unit 0 family inet address 10.0.0.1/24`. This
//! crate translates between those statements and structured
//! [`AttributeTree`] records in both directions:
//!
//! - [`build`] walks a tree against its [`Schema`] and emits one
//!   [`ConfigLine`] per present value. Absent values emit nothing, so staging
//!   the result leaves unspecified device settings untouched.
//! - [`parse`] strips the `set ` verb and output framing, resolves each
//!   statement through a longest-prefix-first [`DispatchTable`], and rebuilds
//!   the tree. Malformed numeric tokens fail with a [`DecodeError`] naming the
//!   line and field; nothing is silently defaulted.
//!
//! The codec is pure: it performs no I/O and holds no state between calls.
//!
//! # Example
//!
//! ```
//! use setline_codec::{AttributeTree, ConfigPath, ListOrder, Schema, ValueKind, build};
//!
//! let schema = Schema::builder()
//!     .scalar("preference", "preference", ValueKind::Integer)
//!     .list("export", "export", ValueKind::Text, ListOrder::Ordered)
//!     .build()
//!     .expect("schema is valid");
//! let base = ConfigPath::parse("protocols bgp group R1").expect("valid path");
//! let tree = AttributeTree::new().with_text_list("export", ["P1", "P2"]);
//!
//! let lines = build(&schema, &base, &tree).expect("tree matches schema");
//! assert_eq!(lines.len(), 2);
//! assert_eq!(lines[0].to_string(), "set protocols bgp group R1 export P1");
//! ```

mod build;
mod dispatch;
mod error;
mod line;
mod parse;
mod schema;
mod token;
mod tree;

#[cfg(test)]
mod tests;

pub use build::{build, delete_lines, replace_lines};
pub use dispatch::{DispatchEntry, DispatchTable};
pub use error::{DecodeError, DecodeReason, EncodeError, LineParseError, SchemaError};
pub use line::{ConfigLine, ConfigPath, Verb};
pub use parse::{parse, parse_lines};
pub use schema::{Field, FieldKind, ListOrder, Schema, SchemaBuilder, ValueKind};
pub use token::{quote, tokenize};
pub use tree::{AttributeTree, Entry, Scalar, Value};
