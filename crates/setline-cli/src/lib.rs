//! Command-line runtime for the `setline` tool.
//!
//! The runtime splits configuration flags from the subcommand, loads
//! [`setline_config::Config`] through `ortho_config`, installs logging, and
//! runs one operation against a device, or against a dry-run file when one
//! is configured. Output streams are injected so tests can drive the whole
//! runtime in process.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;
use setline_codec::LineParseError;
use setline_config::ConfigError;
use setline_ops::OperationError;
use setline_session::VersionParseError;
use thiserror::Error;

mod cli;
mod commands;
mod config;
mod script;
pub mod telemetry;

use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub use script::{ScriptError, parse_script, read_script};

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] telemetry::TelemetryError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("invalid configuration path: {0}")]
    Path(#[from] LineParseError),
    #[error("invalid dry-run version: {0}")]
    Version(#[from] VersionParseError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("failed to write output: {0}")]
    Output(io::Error),
}

/// Runs the CLI with the given arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);

    let cli = match Cli::try_parse_from(&split.command_arguments) {
        Ok(cli) => cli,
        Err(error) => return report_usage(error, stdout, stderr),
    };

    let result = loader
        .load(&split.config_arguments)
        .and_then(|config| {
            telemetry::initialise(&config)?;
            Ok(config)
        })
        .and_then(|config| commands::execute(&cli.command, &config, stdout));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn report_usage<W: Write, E: Write>(error: clap::Error, stdout: &mut W, stderr: &mut E) -> ExitCode {
    match error.kind() {
        ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
            let _ = write!(stdout, "{}", error.render());
            ExitCode::SUCCESS
        }
        _ => {
            let _ = write!(stderr, "{}", AppError::CliUsage(error));
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests;
