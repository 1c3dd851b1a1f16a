//! Description of one configurable resource type.

use setline_codec::{ConfigPath, Schema};
use setline_session::Feature;

/// Where a resource type lives in the hierarchy and how its statements look.
///
/// A resource named `ge-0/0/0` of a spec whose parent is `interfaces`
/// occupies `interfaces ge-0/0/0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    kind: String,
    parent: ConfigPath,
    schema: Schema,
    feature: Option<Feature>,
}

impl ResourceSpec {
    /// Creates a spec for resources named under `parent`.
    #[must_use]
    pub fn new(kind: impl Into<String>, parent: ConfigPath, schema: Schema) -> Self {
        Self {
            kind: kind.into(),
            parent,
            schema,
            feature: None,
        }
    }

    /// Requires `feature` before any write.
    #[must_use]
    pub const fn with_feature(mut self, feature: Feature) -> Self {
        self.feature = Some(feature);
        self
    }

    /// Returns the resource kind used in messages and commit comments.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the parent path.
    #[must_use]
    pub const fn parent(&self) -> &ConfigPath {
        &self.parent
    }

    /// Returns the statement layout.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the feature writes depend on.
    #[must_use]
    pub const fn feature(&self) -> Option<Feature> {
        self.feature
    }

    /// Returns the path of the resource called `name`.
    #[must_use]
    pub fn path(&self, name: &str) -> ConfigPath {
        self.parent.child(name)
    }
}
