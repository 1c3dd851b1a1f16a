//! Commit log comments.

use strum::Display;

/// Kind of change being committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    /// A new resource.
    Create,
    /// A replaced resource.
    Update,
    /// A removed resource.
    Delete,
    /// Raw statements.
    Apply,
}

/// Builds the commit comment for a resource change.
///
/// ```text
/// create resource interface ge-0/0/0
/// nightly: delete resource policy P1
/// ```
#[must_use]
pub fn resource_comment(prefix: Option<&str>, action: Action, kind: &str, name: &str) -> String {
    with_prefix(prefix, format!("{action} resource {kind} {name}"))
}

/// Builds the commit comment for a batch of raw statements.
#[must_use]
pub fn batch_comment(prefix: Option<&str>, statements: usize) -> String {
    with_prefix(prefix, format!("{} {statements} statements", Action::Apply))
}

fn with_prefix(prefix: Option<&str>, comment: String) -> String {
    match prefix.map(str::trim).filter(|prefix| !prefix.is_empty()) {
        Some(prefix) => format!("{prefix}: {comment}"),
        None => comment,
    }
}
