//! Configuration loading helpers for the setline CLI.
//!
//! Configuration flags lead the command line. They are split off and handed
//! to `ortho_config` so the subcommand parser only sees its own tokens.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use setline_config::Config;

use crate::AppError;

/// Flags consumed by the configuration loader.
///
/// Keep in sync with the fields of [`Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--host",
    "--port",
    "--username",
    "--ssh-key-file",
    "--ssh-command",
    "--connect-timeout-secs",
    "--operation-timeout-secs",
    "--commit-comment-prefix",
    "--lock-retry-interval-ms",
    "--dry-run-file",
    "--dry-run-model",
    "--dry-run-version",
    "--log-filter",
    "--log-format",
];

pub(crate) trait ConfigLoader {
    /// Loads and validates configuration from the leading flags.
    ///
    /// Configuration flags must precede the subcommand; later occurrences
    /// are parsed as subcommand arguments.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        let config =
            Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Stop;
    }
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (&*text, false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by the configuration flags.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by the subcommand tokens.
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut remaining = args.iter();
    let program: Vec<OsString> = remaining.next().cloned().into_iter().collect();
    let mut config_arguments = program.clone();
    let mut command_arguments = program;

    let mut pending_value = false;
    let mut rest = remaining.peekable();
    while let Some(argument) = rest.peek() {
        if pending_value {
            pending_value = false;
        } else {
            match classify(argument) {
                FlagAction::Include { needs_value } => pending_value = needs_value,
                FlagAction::Stop => break,
            }
        }
        config_arguments.extend(rest.next().cloned());
    }
    command_arguments.extend(rest.cloned());

    ConfigArgumentSplit {
        config_arguments,
        command_arguments,
    }
}
