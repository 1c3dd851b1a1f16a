//! Statement lines and configuration paths.

use std::fmt;
use std::str::FromStr;

use crate::error::LineParseError;
use crate::token::{quote, tokenize};

/// Statement verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Adds or replaces a value.
    Set,
    /// Removes a path and everything beneath it.
    Delete,
}

impl Verb {
    /// Returns the keyword used in statement text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Ordered list of tokens addressing a node in the configuration hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConfigPath {
    tokens: Vec<String>,
}

impl ConfigPath {
    /// Builds a path from already-split tokens.
    #[must_use]
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a path from statement text, honouring quoted tokens.
    ///
    /// # Errors
    ///
    /// Returns [`LineParseError::UnterminatedQuote`] for unbalanced quotes.
    pub fn parse(text: &str) -> Result<Self, LineParseError> {
        tokenize(text).map(|tokens| Self { tokens })
    }

    /// Returns the tokens of the path.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Returns true when the path addresses the configuration root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns a new path extended by one token.
    #[must_use]
    pub fn child(&self, token: impl Into<String>) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(token.into());
        Self { tokens }
    }

    /// Returns a new path extended by several tokens.
    #[must_use]
    pub fn join<I, S>(&self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut joined = self.tokens.clone();
        joined.extend(tokens.into_iter().map(Into::into));
        Self { tokens: joined }
    }

    /// Returns the remainder of `tokens` when this path is a prefix of them.
    #[must_use]
    pub fn strip_from<'t>(&self, tokens: &'t [String]) -> Option<&'t [String]> {
        if tokens.len() < self.tokens.len() {
            return None;
        }
        let (head, rest) = tokens.split_at(self.tokens.len());
        (head == self.tokens.as_slice()).then_some(rest)
    }

    /// Returns true when this path is a prefix of (or equal to) `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.strip_from(&other.tokens).is_some()
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tokens(formatter, &self.tokens)
    }
}

fn write_tokens(formatter: &mut fmt::Formatter<'_>, tokens: &[String]) -> fmt::Result {
    for (index, token) in tokens.iter().enumerate() {
        if index > 0 {
            formatter.write_str(" ")?;
        }
        formatter.write_str(&quote(token))?;
    }
    Ok(())
}

/// One statement of the configuration language.
///
/// Lines keep their tokens unquoted; quoting is applied when the line is
/// rendered with [`fmt::Display`]. Ordering between lines is significant for
/// ordered constructs and is preserved by every consumer in this workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigLine {
    verb: Verb,
    path: ConfigPath,
}

impl ConfigLine {
    /// Builds a `set` statement.
    #[must_use]
    pub const fn set(path: ConfigPath) -> Self {
        Self {
            verb: Verb::Set,
            path,
        }
    }

    /// Builds a `delete` statement.
    #[must_use]
    pub const fn delete(path: ConfigPath) -> Self {
        Self {
            verb: Verb::Delete,
            path,
        }
    }

    /// Returns the statement verb.
    #[must_use]
    pub const fn verb(&self) -> Verb {
        self.verb
    }

    /// Returns the statement path, including any trailing value tokens.
    #[must_use]
    pub const fn path(&self) -> &ConfigPath {
        &self.path
    }

    /// Returns the statement tokens after the verb.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        self.path.tokens()
    }
}

impl fmt::Display for ConfigLine {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} {}", self.verb, self.path)
    }
}

impl FromStr for ConfigLine {
    type Err = LineParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(LineParseError::EmptyStatement {
                text: text.to_owned(),
            });
        }
        let verb = match tokens.remove(0).as_str() {
            "set" => Verb::Set,
            "delete" => Verb::Delete,
            other => {
                return Err(LineParseError::UnknownVerb {
                    verb: other.to_owned(),
                });
            }
        };
        if tokens.is_empty() {
            return Err(LineParseError::EmptyStatement {
                text: text.to_owned(),
            });
        }
        Ok(Self {
            verb,
            path: ConfigPath { tokens },
        })
    }
}
