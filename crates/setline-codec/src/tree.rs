//! Structured attribute records exchanged with resource callers.
//!
//! An [`AttributeTree`] maps attribute names to values. An absent entry means
//! "unset": building never emits statements for it and parsing never invents
//! one. Zero, `false` and the empty string are ordinary values.

use std::collections::BTreeMap;

use crate::schema::{FieldKind, ListOrder, Schema};

/// A single scalar value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scalar {
    /// Text token.
    Text(String),
    /// Signed integer.
    Integer(i64),
    /// Unsigned integer.
    Unsigned(u64),
}

impl Scalar {
    /// Renders the scalar as a statement token.
    #[must_use]
    pub fn to_token(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Unsigned(value) => value.to_string(),
        }
    }
}

/// One named entry of a keyed collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    key: String,
    tree: AttributeTree,
}

impl Entry {
    /// Creates an entry.
    #[must_use]
    pub fn new(key: impl Into<String>, tree: AttributeTree) -> Self {
        Self {
            key: key.into(),
            tree,
        }
    }

    /// Returns the entry name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the entry attributes.
    #[must_use]
    pub const fn tree(&self) -> &AttributeTree {
        &self.tree
    }

    pub(crate) const fn tree_mut(&mut self) -> &mut AttributeTree {
        &mut self.tree
    }
}

/// Value stored for one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Single value.
    Scalar(Scalar),
    /// Flag value; `false` is an explicit "not set on device".
    Flag(bool),
    /// Repeated values.
    List(Vec<Scalar>),
    /// Presence-significant container.
    Block(AttributeTree),
    /// Named entries in statement order.
    Keyed(Vec<Entry>),
}

/// Structured record keyed by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeTree {
    values: BTreeMap<String, Value>,
}

impl AttributeTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Removes an attribute, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Builder-style variant of [`Self::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets a text scalar.
    #[must_use]
    pub fn with_text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(name, Value::Scalar(Scalar::Text(value.into())))
    }

    /// Sets a signed integer scalar.
    #[must_use]
    pub fn with_integer(self, name: impl Into<String>, value: i64) -> Self {
        self.with(name, Value::Scalar(Scalar::Integer(value)))
    }

    /// Sets an unsigned integer scalar.
    #[must_use]
    pub fn with_unsigned(self, name: impl Into<String>, value: u64) -> Self {
        self.with(name, Value::Scalar(Scalar::Unsigned(value)))
    }

    /// Sets a flag.
    #[must_use]
    pub fn with_flag(self, name: impl Into<String>, value: bool) -> Self {
        self.with(name, Value::Flag(value))
    }

    /// Sets a list of scalars.
    #[must_use]
    pub fn with_list(self, name: impl Into<String>, values: Vec<Scalar>) -> Self {
        self.with(name, Value::List(values))
    }

    /// Sets a list of text scalars.
    #[must_use]
    pub fn with_text_list<I, S>(self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|value| Scalar::Text(value.into()))
            .collect();
        self.with_list(name, values)
    }

    /// Sets a block.
    #[must_use]
    pub fn with_block(self, name: impl Into<String>, block: Self) -> Self {
        self.with(name, Value::Block(block))
    }

    /// Appends a keyed entry, creating the collection when absent.
    ///
    /// An existing non-keyed value under `name` is replaced.
    #[must_use]
    pub fn with_entry(mut self, name: impl Into<String>, key: impl Into<String>, tree: Self) -> Self {
        let name = name.into();
        let entry = Entry::new(key, tree);
        match self.values.get_mut(&name) {
            Some(Value::Keyed(entries)) => entries.push(entry),
            _ => {
                self.values.insert(name, Value::Keyed(vec![entry]));
            }
        }
        self
    }

    /// Returns the raw value of an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.values.get_mut(name)
    }

    /// Returns true when the attribute is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns true when no attribute is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns a scalar.
    #[must_use]
    pub fn scalar(&self, name: &str) -> Option<&Scalar> {
        match self.values.get(name) {
            Some(Value::Scalar(scalar)) => Some(scalar),
            _ => None,
        }
    }

    /// Returns a text scalar.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.scalar(name) {
            Some(Scalar::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Returns a signed integer scalar.
    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.scalar(name) {
            Some(Scalar::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns an unsigned integer scalar.
    #[must_use]
    pub fn unsigned(&self, name: &str) -> Option<u64> {
        match self.scalar(name) {
            Some(Scalar::Unsigned(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns a flag value.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(Value::Flag(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns list elements.
    #[must_use]
    pub fn list(&self, name: &str) -> Option<&[Scalar]> {
        match self.values.get(name) {
            Some(Value::List(values)) => Some(values),
            _ => None,
        }
    }

    /// Returns a block.
    #[must_use]
    pub fn block(&self, name: &str) -> Option<&Self> {
        match self.values.get(name) {
            Some(Value::Block(block)) => Some(block),
            _ => None,
        }
    }

    /// Returns the entries of a keyed collection.
    #[must_use]
    pub fn entries(&self, name: &str) -> Option<&[Entry]> {
        match self.values.get(name) {
            Some(Value::Keyed(entries)) => Some(entries),
            _ => None,
        }
    }

    /// Returns one named entry of a keyed collection.
    #[must_use]
    pub fn entry(&self, name: &str, key: &str) -> Option<&Self> {
        self.entries(name)?
            .iter()
            .find(|entry| entry.key == key)
            .map(Entry::tree)
    }

    /// Returns a copy with unordered lists sorted, recursively.
    ///
    /// Two trees describing the same device state compare equal after
    /// canonicalisation even when unordered lists were read in a different
    /// order. Attributes unknown to `schema` are kept as they are.
    #[must_use]
    pub fn canonical(&self, schema: &Schema) -> Self {
        let mut canonical = self.clone();
        canonical.canonicalise(schema);
        canonical
    }

    fn canonicalise(&mut self, schema: &Schema) {
        for field in schema.fields() {
            let Some(value) = self.values.get_mut(field.name()) else {
                continue;
            };
            match (field.kind(), value) {
                (
                    FieldKind::List {
                        order: ListOrder::Unordered,
                        ..
                    },
                    Value::List(values),
                ) => values.sort(),
                (FieldKind::Block(nested), Value::Block(block)) => block.canonicalise(nested),
                (FieldKind::Keyed(nested), Value::Keyed(entries)) => {
                    for entry in entries {
                        entry.tree.canonicalise(nested);
                    }
                }
                _ => {}
            }
        }
    }
}
