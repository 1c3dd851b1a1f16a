//! Reading `set`/`delete` scripts from disk.

use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use setline_codec::{ConfigLine, LineParseError};
use thiserror::Error;

/// Errors raised while reading a statement script.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// The script could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Script path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// A statement did not parse.
    #[error("{path}:{line}: {source}")]
    Statement {
        /// Script path.
        path: Utf8PathBuf,
        /// One-based line number.
        line: usize,
        /// Parse failure.
        #[source]
        source: LineParseError,
    },
}

/// Parses one statement per line, skipping blank lines and `#` comments.
///
/// # Errors
///
/// Returns [`ScriptError::Statement`] naming the first bad line.
pub fn parse_script(path: &Utf8Path, text: &str) -> Result<Vec<ConfigLine>, ScriptError> {
    text.lines()
        .enumerate()
        .map(|(index, raw)| (index.saturating_add(1), raw.trim()))
        .filter(|(_, raw)| !raw.is_empty() && !raw.starts_with('#'))
        .map(|(line, raw)| {
            raw.parse().map_err(|source| ScriptError::Statement {
                path: path.to_owned(),
                line,
                source,
            })
        })
        .collect()
}

/// Reads and parses the script at `path`.
///
/// # Errors
///
/// Returns [`ScriptError`] when the file cannot be read or parsed.
pub fn read_script(path: &Utf8Path) -> Result<Vec<ConfigLine>, ScriptError> {
    let text = fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.to_owned(),
        source: Arc::new(source),
    })?;
    parse_script(path, &text)
}
