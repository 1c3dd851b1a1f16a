//! Declarative field layouts describing one resource kind.
//!
//! A [`Schema`] lists fields in the order their statements are emitted. Each
//! field couples an attribute name with the keyword tokens that introduce it
//! in statement text and a [`FieldKind`] describing its value shape. The
//! dispatch table used for decoding is computed once when the schema is
//! built.

use std::collections::BTreeSet;
use std::fmt;

use crate::dispatch::DispatchTable;
use crate::error::SchemaError;

/// Scalar value shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Free-form text token.
    Text,
    /// Signed 64-bit integer.
    Integer,
    /// Unsigned 64-bit integer.
    Unsigned,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Unsigned => "unsigned integer",
        })
    }
}

/// Whether element order of a list is significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListOrder {
    /// Order is part of the value (policy chains, for example).
    Ordered,
    /// Order carries no meaning; comparisons should sort first.
    Unordered,
}

/// Value shape of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Keyword followed by exactly one value token.
    Scalar(ValueKind),
    /// Keyword alone; presence means enabled.
    Flag,
    /// Keyword repeated once per element.
    List {
        /// Element shape.
        value: ValueKind,
        /// Whether order is significant.
        order: ListOrder,
    },
    /// Container whose presence is significant even when empty.
    Block(Schema),
    /// Named entries, each a container keyed by the token after the keyword.
    Keyed(Schema),
}

impl FieldKind {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Scalar(kind) => format!("a {kind} scalar"),
            Self::Flag => String::from("a flag"),
            Self::List { value, .. } => format!("a list of {value} values"),
            Self::Block(_) => String::from("a block"),
            Self::Keyed(_) => String::from("keyed entries"),
        }
    }
}

/// One declared attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    keyword: Vec<String>,
    kind: FieldKind,
}

impl Field {
    /// Returns the attribute name used in [`crate::AttributeTree`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the keyword tokens that introduce the field.
    #[must_use]
    pub fn keyword(&self) -> &[String] {
        &self.keyword
    }

    /// Returns the value shape.
    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }
}

/// Ordered field layout for one hierarchy level.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<Field>,
    table: DispatchTable<usize>,
}

impl Schema {
    /// Starts building a schema.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Returns fields in emission order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field by attribute name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Returns the dispatch table mapping keyword prefixes to field indices.
    #[must_use]
    pub const fn dispatch(&self) -> &DispatchTable<usize> {
        &self.table
    }

    /// Resolves the field introduced by `tokens`, returning the value tokens.
    #[must_use]
    pub fn resolve<'t>(&self, tokens: &'t [String]) -> Option<(&Field, &'t [String])> {
        self.table
            .resolve(tokens)
            .and_then(|(index, rest)| self.fields.get(*index).map(|field| (field, rest)))
    }
}

/// Builder for [`Schema`].
///
/// Keywords are given as space-separated text (`"metric-out igp"`).
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<Field>,
}

impl SchemaBuilder {
    fn push(mut self, name: &str, keyword: &str, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name: name.to_owned(),
            keyword: keyword.split_whitespace().map(String::from).collect(),
            kind,
        });
        self
    }

    /// Declares a scalar attribute.
    #[must_use]
    pub fn scalar(self, name: &str, keyword: &str, kind: ValueKind) -> Self {
        self.push(name, keyword, FieldKind::Scalar(kind))
    }

    /// Declares a flag attribute.
    #[must_use]
    pub fn flag(self, name: &str, keyword: &str) -> Self {
        self.push(name, keyword, FieldKind::Flag)
    }

    /// Declares a list attribute.
    #[must_use]
    pub fn list(self, name: &str, keyword: &str, value: ValueKind, order: ListOrder) -> Self {
        self.push(name, keyword, FieldKind::List { value, order })
    }

    /// Declares a presence-significant block.
    #[must_use]
    pub fn block(self, name: &str, keyword: &str, schema: Schema) -> Self {
        self.push(name, keyword, FieldKind::Block(schema))
    }

    /// Declares a keyed collection of blocks.
    #[must_use]
    pub fn keyed(self, name: &str, keyword: &str, schema: Schema) -> Self {
        self.push(name, keyword, FieldKind::Keyed(schema))
    }

    /// Validates the layout and computes its dispatch table.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] when a name or keyword is declared twice or
    /// a keyword is empty.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut names = BTreeSet::new();
        let mut keywords = BTreeSet::new();
        let mut table = DispatchTable::new();

        for (index, field) in self.fields.iter().enumerate() {
            if field.keyword.is_empty() {
                return Err(SchemaError::EmptyKeyword {
                    name: field.name.clone(),
                });
            }
            if !names.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateName {
                    name: field.name.clone(),
                });
            }
            if !keywords.insert(field.keyword.as_slice()) {
                return Err(SchemaError::DuplicateKeyword {
                    keyword: field.keyword.join(" "),
                });
            }
            table.insert(field.keyword.iter().cloned(), index);
        }

        Ok(Schema {
            fields: self.fields,
            table,
        })
    }
}
