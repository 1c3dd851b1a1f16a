//! Command-line surface of the `setline` binary.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Configures set-line devices over NETCONF.
#[derive(Debug, Parser)]
#[command(name = "setline", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub(crate) enum CliCommand {
    /// Prints the device model, family and software version.
    Facts,
    /// Prints the configuration under a path as `set` statements.
    Show {
        /// Path tokens, for example `interfaces ge-0/0/0`.
        #[arg(value_name = "TOKEN", num_args = 0..)]
        path: Vec<String>,
    },
    /// Commits the statements in a script as one transaction.
    Apply {
        /// File holding one `set` or `delete` statement per line.
        #[arg(value_name = "FILE")]
        script: Utf8PathBuf,
        /// Commit comment; defaults to a statement count.
        #[arg(long)]
        comment: Option<String>,
    },
    /// Removes a configuration path and everything beneath it.
    Delete {
        /// Path tokens, for example `interfaces ge-0/0/0`.
        #[arg(value_name = "TOKEN", required = true, num_args = 1..)]
        path: Vec<String>,
        /// Commit comment; defaults to a statement count.
        #[arg(long)]
        comment: Option<String>,
    },
}
