//! Error types raised by the line-grammar codec.

use std::fmt;

use thiserror::Error;

use crate::schema::ValueKind;

/// Errors raised while splitting statement text into tokens or lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineParseError {
    /// A double-quoted token was not closed before the end of the text.
    #[error("unterminated quoted token in '{text}'")]
    UnterminatedQuote {
        /// Statement text that failed to tokenise.
        text: String,
    },

    /// The statement did not start with a known verb.
    #[error("unknown statement verb '{verb}'")]
    UnknownVerb {
        /// First token of the statement.
        verb: String,
    },

    /// The statement carried a verb but no path.
    #[error("statement '{text}' has no path")]
    EmptyStatement {
        /// Statement text.
        text: String,
    },
}

/// Errors raised when a [`crate::Schema`] is assembled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two fields share an attribute name.
    #[error("attribute '{name}' is declared twice")]
    DuplicateName {
        /// Attribute name declared more than once.
        name: String,
    },

    /// Two fields share the same keyword tokens.
    #[error("keyword '{keyword}' is declared twice")]
    DuplicateKeyword {
        /// Keyword declared more than once.
        keyword: String,
    },

    /// A field keyword contained no tokens.
    #[error("attribute '{name}' has an empty keyword")]
    EmptyKeyword {
        /// Attribute with the empty keyword.
        name: String,
    },
}

/// Errors raised while building statements from an attribute tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The tree carries an attribute the schema does not declare.
    #[error("attribute '{attribute}' is not declared by the schema")]
    UnknownAttribute {
        /// Dotted attribute path.
        attribute: String,
    },

    /// The value stored for an attribute does not match its declared kind.
    #[error("attribute '{attribute}' expects {expected}")]
    KindMismatch {
        /// Dotted attribute path.
        attribute: String,
        /// Description of the expected value shape.
        expected: String,
    },
}

/// Reason a statement could not be decoded into a field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeReason {
    /// The token is not a valid value of the declared kind.
    InvalidNumber {
        /// Offending token.
        token: String,
        /// Kind the token was decoded as.
        kind: ValueKind,
    },
    /// The statement ended where a value was required.
    MissingValue,
    /// A keyed block statement carried no entry name.
    MissingKey,
    /// The statement carried tokens after the value.
    UnexpectedTokens {
        /// Tokens left over after decoding.
        tokens: Vec<String>,
    },
}

impl fmt::Display for DecodeReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNumber { token, kind } => {
                write!(formatter, "'{token}' is not a valid {kind} value")
            }
            Self::MissingValue => formatter.write_str("is missing its value"),
            Self::MissingKey => formatter.write_str("is missing its entry name"),
            Self::UnexpectedTokens { tokens } => {
                write!(formatter, "has unexpected trailing tokens '{}'", tokens.join(" "))
            }
        }
    }
}

/// Errors raised while parsing device output into an attribute tree.
///
/// Decoding never mutates device state, so no rollback is attached to these
/// failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The statement text could not be tokenised.
    #[error("cannot tokenise line '{line}': {source}")]
    Tokenize {
        /// Raw line as received.
        line: String,
        /// Underlying tokeniser failure.
        #[source]
        source: LineParseError,
    },

    /// A field value could not be decoded.
    #[error("line '{line}': field '{field}' {reason}")]
    Field {
        /// Raw line as received.
        line: String,
        /// Dotted attribute path of the field.
        field: String,
        /// Why decoding failed.
        reason: DecodeReason,
    },
}

impl DecodeError {
    pub(crate) fn field(line: &str, field: &str, reason: DecodeReason) -> Self {
        Self::Field {
            line: line.to_owned(),
            field: field.to_owned(),
            reason,
        }
    }

    /// Returns the raw line that failed to decode.
    #[must_use]
    pub fn line(&self) -> &str {
        match self {
            Self::Tokenize { line, .. } | Self::Field { line, .. } => line,
        }
    }

    /// Returns the dotted attribute path, when the failure is tied to a field.
    #[must_use]
    pub fn field_path(&self) -> Option<&str> {
        match self {
            Self::Tokenize { .. } => None,
            Self::Field { field, .. } => Some(field),
        }
    }
}
