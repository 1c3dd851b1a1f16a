//! Tokenisation and quoting for statement text.
//!
//! Statements split on ASCII whitespace. A token wrapped in double quotes may
//! contain whitespace; inside quotes a backslash escapes the next character.

use std::borrow::Cow;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::LineParseError;

/// Characters that force a token to be quoted when rendered.
const SPECIAL_CHARACTERS: &[char] = &['"', ';', '{', '}', '#', '\\'];

/// Splits statement text into unquoted tokens.
///
/// # Errors
///
/// Returns [`LineParseError::UnterminatedQuote`] when a quoted token is not
/// closed.
///
/// # Examples
///
/// ```
/// use setline_codec::tokenize;
///
/// let tokens = tokenize(r#"set description "uplink to core""#).expect("valid text");
/// assert_eq!(tokens, vec!["set", "description", "uplink to core"]);
/// ```
pub fn tokenize(text: &str) -> Result<Vec<String>, LineParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.next_if(char::is_ascii_whitespace).is_some() {}
        match chars.peek() {
            None => break,
            Some('"') => {
                chars.next();
                tokens.push(read_quoted(&mut chars, text)?);
            }
            Some(_) => {
                let mut token = String::new();
                while let Some(character) = chars.next_if(|c| !c.is_ascii_whitespace()) {
                    token.push(character);
                }
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>, text: &str) -> Result<String, LineParseError> {
    let mut token = String::new();
    while let Some(character) = chars.next() {
        match character {
            '"' => return Ok(token),
            '\\' => match chars.next() {
                Some(escaped) => token.push(escaped),
                None => break,
            },
            other => token.push(other),
        }
    }
    Err(LineParseError::UnterminatedQuote {
        text: text.to_owned(),
    })
}

/// Renders a token, quoting it when the device grammar requires it.
///
/// # Examples
///
/// ```
/// use setline_codec::quote;
///
/// assert_eq!(quote("ge-0/0/0"), "ge-0/0/0");
/// assert_eq!(quote("uplink to core"), "\"uplink to core\"");
/// assert_eq!(quote(""), "\"\"");
/// ```
#[must_use]
pub fn quote(token: &str) -> Cow<'_, str> {
    let needs_quotes = token.is_empty()
        || token
            .chars()
            .any(|c| c.is_whitespace() || SPECIAL_CHARACTERS.contains(&c));
    if !needs_quotes {
        return Cow::Borrowed(token);
    }

    let mut quoted = String::with_capacity(token.len() + 2);
    quoted.push('"');
    for character in token.chars() {
        if character == '"' || character == '\\' {
            quoted.push('\\');
        }
        quoted.push(character);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}
