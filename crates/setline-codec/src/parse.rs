//! Statement decoding into attribute trees.

use tracing::trace;

use crate::error::{DecodeError, DecodeReason};
use crate::line::{ConfigLine, ConfigPath, Verb};
use crate::schema::{FieldKind, Schema, ValueKind};
use crate::token::tokenize;
use crate::tree::{AttributeTree, Entry, Scalar, Value};

const PARSE_TARGET: &str = "setline_codec::parse";

/// Parses device output into a tree.
///
/// `text` is the output of a `show configuration … | display set` style
/// command. Blank lines, output framing and non-`set` statements are
/// skipped. Statements beginning with `base` are taken relative to it.
/// Statements that share the leading token of `base` but not the rest of it
/// belong to another resource and are skipped; any other statement is
/// assumed to be relative already, as with `display set relative`.
/// Statements matching no schema field are ignored.
///
/// # Errors
///
/// Returns [`DecodeError`] naming the offending line when a statement cannot
/// be tokenised or its value does not fit the declared field kind.
///
/// # Examples
///
/// ```
/// use setline_codec::{ConfigPath, Schema, ValueKind, parse};
///
/// let schema = Schema::builder()
///     .scalar("mtu", "mtu", ValueKind::Unsigned)
///     .build()
///     .expect("schema is valid");
/// let base = ConfigPath::parse("interfaces ge-0/0/0").expect("valid path");
/// let tree = parse(&schema, &base, "set interfaces ge-0/0/0 mtu 9192\n").expect("decodes");
/// assert_eq!(tree.unsigned("mtu"), Some(9192));
/// ```
pub fn parse(schema: &Schema, base: &ConfigPath, text: &str) -> Result<AttributeTree, DecodeError> {
    let mut tree = AttributeTree::new();
    for raw in text.lines() {
        let Some(statement) = statement_text(raw) else {
            continue;
        };
        let tokens = tokenize(statement).map_err(|source| DecodeError::Tokenize {
            line: raw.to_owned(),
            source,
        })?;
        decode_statement(schema, base, &tokens, raw, &mut tree)?;
    }
    Ok(tree)
}

/// Decodes already-parsed `set` lines into a tree.
///
/// `delete` lines are ignored. Path handling matches [`parse`].
///
/// # Errors
///
/// Returns [`DecodeError`] when a value does not fit its field kind.
pub fn parse_lines(
    schema: &Schema,
    base: &ConfigPath,
    lines: &[ConfigLine],
) -> Result<AttributeTree, DecodeError> {
    let mut tree = AttributeTree::new();
    for line in lines.iter().filter(|line| line.verb() == Verb::Set) {
        decode_statement(schema, base, line.tokens(), &line.to_string(), &mut tree)?;
    }
    Ok(tree)
}

/// Returns the statement body of a raw output line, or `None` when the line
/// carries no `set` statement.
fn statement_text(raw: &str) -> Option<&str> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('<') || line.starts_with('#') || line == "]]>]]>" {
        return None;
    }
    if line.starts_with('{') && line.ends_with('}') {
        return None;
    }
    if let Some(rest) = line.strip_prefix("set ") {
        return Some(rest);
    }
    let verb = line.split_ascii_whitespace().next().unwrap_or_default();
    if matches!(
        verb,
        "delete" | "deactivate" | "activate" | "protect" | "unprotect" | "set"
    ) {
        return None;
    }
    Some(line)
}

fn decode_statement(
    schema: &Schema,
    base: &ConfigPath,
    tokens: &[String],
    raw: &str,
    tree: &mut AttributeTree,
) -> Result<(), DecodeError> {
    let relative = match base.strip_from(tokens) {
        Some(rest) => rest,
        None if is_outside(base, tokens) => {
            trace!(target: PARSE_TARGET, line = raw, "statement outside base");
            return Ok(());
        }
        None => tokens,
    };
    if relative.is_empty() {
        return Ok(());
    }
    decode_level(schema, relative, raw, "", tree)
}

/// True for absolute statements that address a sibling of `base`.
fn is_outside(base: &ConfigPath, tokens: &[String]) -> bool {
    base.tokens()
        .first()
        .is_some_and(|head| tokens.first() == Some(head))
}

fn decode_level(
    schema: &Schema,
    tokens: &[String],
    raw: &str,
    prefix: &str,
    tree: &mut AttributeTree,
) -> Result<(), DecodeError> {
    let Some((field, rest)) = schema.resolve(tokens) else {
        trace!(
            target: PARSE_TARGET,
            line = raw,
            attribute = prefix,
            "statement matches no field"
        );
        return Ok(());
    };
    let attribute = if prefix.is_empty() {
        field.name().to_owned()
    } else {
        format!("{prefix}.{}", field.name())
    };
    let fail = |reason| DecodeError::field(raw, &attribute, reason);

    match field.kind() {
        FieldKind::Scalar(kind) => {
            let token = single_value(rest).map_err(fail)?;
            let scalar = decode_scalar(*kind, token).map_err(fail)?;
            tree.insert(field.name(), Value::Scalar(scalar));
        }
        FieldKind::Flag => {
            if !rest.is_empty() {
                return Err(fail(DecodeReason::UnexpectedTokens {
                    tokens: rest.to_vec(),
                }));
            }
            tree.insert(field.name(), Value::Flag(true));
        }
        FieldKind::List { value, .. } => {
            let token = single_value(rest).map_err(fail)?;
            let scalar = decode_scalar(*value, token).map_err(fail)?;
            match tree.get_mut(field.name()) {
                Some(Value::List(values)) => values.push(scalar),
                _ => tree.insert(field.name(), Value::List(vec![scalar])),
            }
        }
        FieldKind::Block(nested) => {
            if !matches!(tree.get(field.name()), Some(Value::Block(_))) {
                tree.insert(field.name(), Value::Block(AttributeTree::new()));
            }
            if let (Some(Value::Block(block)), false) = (tree.get_mut(field.name()), rest.is_empty())
            {
                decode_level(nested, rest, raw, &attribute, block)?;
            }
        }
        FieldKind::Keyed(nested) => {
            let Some((key, rest)) = rest.split_first() else {
                return Err(fail(DecodeReason::MissingKey));
            };
            if !matches!(tree.get(field.name()), Some(Value::Keyed(_))) {
                tree.insert(field.name(), Value::Keyed(Vec::new()));
            }
            let Some(Value::Keyed(entries)) = tree.get_mut(field.name()) else {
                return Ok(());
            };
            let index = match entries.iter().position(|entry| entry.key() == key) {
                Some(index) => index,
                None => {
                    entries.push(Entry::new(key.clone(), AttributeTree::new()));
                    entries.len() - 1
                }
            };
            if !rest.is_empty() {
                let entry_attribute = format!("{attribute}[{index}]");
                if let Some(entry) = entries.get_mut(index) {
                    decode_level(nested, rest, raw, &entry_attribute, entry.tree_mut())?;
                }
            }
        }
    }
    Ok(())
}

fn single_value(rest: &[String]) -> Result<&str, DecodeReason> {
    match rest {
        [] => Err(DecodeReason::MissingValue),
        [token] => Ok(token),
        [_, extra @ ..] => Err(DecodeReason::UnexpectedTokens {
            tokens: extra.to_vec(),
        }),
    }
}

fn decode_scalar(kind: ValueKind, token: &str) -> Result<Scalar, DecodeReason> {
    let invalid = || DecodeReason::InvalidNumber {
        token: token.to_owned(),
        kind,
    };
    match kind {
        ValueKind::Text => Ok(Scalar::Text(token.to_owned())),
        ValueKind::Integer => token.parse().map(Scalar::Integer).map_err(|_| invalid()),
        ValueKind::Unsigned => token.parse().map(Scalar::Unsigned).map_err(|_| invalid()),
    }
}
