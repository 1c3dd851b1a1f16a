//! Built-in defaults shared by the configuration loader and the binary.

use crate::logging::LogFormat;

/// NETCONF-over-SSH port.
pub const DEFAULT_PORT: u16 = 830;

/// Command used to open the ssh subsystem.
pub const DEFAULT_SSH_COMMAND: &str = "ssh";

/// Seconds allowed for the transport handshake.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Longest accepted per-operation deadline, in seconds (one day).
pub const MAX_OPERATION_TIMEOUT_SECS: u64 = 86_400;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Port used when none is configured.
#[must_use]
pub const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Owned ssh command used where allocation is required (e.g. serde).
#[must_use]
pub fn default_ssh_command() -> String {
    DEFAULT_SSH_COMMAND.to_owned()
}

/// Connect timeout used when none is configured.
#[must_use]
pub const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Default log filter expression used by the binary.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binary.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
