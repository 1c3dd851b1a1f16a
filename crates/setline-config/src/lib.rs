//! Layered configuration for the setline tools.
//!
//! [`Config`] is loaded with `ortho_config`: built-in defaults are overridden
//! by a TOML configuration file (`--config-path` or `SETLINE_CONFIG_PATH`),
//! then by `SETLINE_*` environment variables, then by command-line flags.
//! Passwords are never read from configuration; the ssh client handles
//! authentication through keys or an agent.

mod defaults;
mod logging;

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_LOG_FILTER, DEFAULT_PORT, DEFAULT_SSH_COMMAND,
    MAX_OPERATION_TIMEOUT_SECS,
    default_connect_timeout_secs, default_log_filter, default_log_filter_string,
    default_log_format, default_port, default_ssh_command,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Connection, commit and logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SETLINE")]
pub struct Config {
    /// Device host name or address. Required unless dry-run is enabled.
    #[serde(default)]
    pub host: Option<String>,
    /// NETCONF-over-SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user; the ssh client default applies when unset.
    #[serde(default)]
    pub username: Option<String>,
    /// Private key handed to the ssh client.
    #[serde(default)]
    pub ssh_key_file: Option<Utf8PathBuf>,
    /// Executable used to open the ssh subsystem.
    #[serde(default = "default_ssh_command")]
    pub ssh_command: String,
    /// Seconds allowed for the transport handshake.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds allowed for a whole resource operation.
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
    /// Text prepended to every generated commit comment.
    #[serde(default)]
    pub commit_comment_prefix: Option<String>,
    /// Interval between lock attempts; lock retry stays off when unset.
    #[serde(default)]
    pub lock_retry_interval_ms: Option<u64>,
    /// File receiving staged statements instead of a device.
    #[serde(default)]
    pub dry_run_file: Option<Utf8PathBuf>,
    /// Hardware model reported by the dry-run session.
    #[serde(default)]
    pub dry_run_model: Option<String>,
    /// Software version reported by the dry-run session.
    #[serde(default)]
    pub dry_run_version: Option<String>,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            username: None,
            ssh_key_file: None,
            ssh_command: default_ssh_command(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            operation_timeout_secs: None,
            commit_comment_prefix: None,
            lock_retry_interval_ms: None,
            dry_run_file: None,
            dry_run_model: None,
            dry_run_version: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

/// Errors raised when a loaded configuration cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No device host was configured and dry-run is disabled.
    #[error("no device host configured; set --host or SETLINE_HOST, or enable dry-run")]
    MissingHost,
    /// A setting that must be positive was zero.
    #[error("'{setting}' must be greater than zero")]
    Zero {
        /// Name of the offending setting.
        setting: &'static str,
    },
    /// A setting exceeded its upper bound.
    #[error("'{setting}' must not exceed {max}")]
    TooLarge {
        /// Name of the offending setting.
        setting: &'static str,
        /// Largest accepted value.
        max: u64,
    },
    /// The ssh command was empty.
    #[error("ssh command must not be empty")]
    EmptySshCommand,
}

impl Config {
    /// Returns true when statements go to a file instead of a device.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run_file.is_some()
    }

    /// Returns the transport handshake timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the per-operation deadline, if any.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }

    /// Returns the lock retry interval when lock retry is enabled.
    #[must_use]
    pub fn lock_retry_interval(&self) -> Option<Duration> {
        self.lock_retry_interval_ms.map(Duration::from_millis)
    }

    /// Returns the configured log filter.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Checks settings that the loader cannot express as types.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first unusable setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_dry_run() && self.host.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingHost);
        }
        if self.port == 0 {
            return Err(ConfigError::Zero { setting: "port" });
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                setting: "connect_timeout_secs",
            });
        }
        match self.operation_timeout_secs {
            Some(0) => {
                return Err(ConfigError::Zero {
                    setting: "operation_timeout_secs",
                });
            }
            Some(secs) if secs > MAX_OPERATION_TIMEOUT_SECS => {
                return Err(ConfigError::TooLarge {
                    setting: "operation_timeout_secs",
                    max: MAX_OPERATION_TIMEOUT_SECS,
                });
            }
            _ => {}
        }
        if self.lock_retry_interval_ms == Some(0) {
            return Err(ConfigError::Zero {
                setting: "lock_retry_interval_ms",
            });
        }
        if self.ssh_command.trim().is_empty() {
            return Err(ConfigError::EmptySshCommand);
        }
        Ok(())
    }
}
