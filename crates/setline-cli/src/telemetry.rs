//! Structured logging for the CLI.
//!
//! A bare level such as `info` applies to the setline crates only; other
//! crates stay at `warn`. Full directive lists pass through untouched.
//! Events go to stderr so stdout carries command output alone.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use setline_config::{Config, LogFormat};
use thiserror::Error;
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{Level, debug};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

const TELEMETRY_TARGET: &str = "setline_cli::telemetry";

/// Crates whose events a bare level applies to.
const SETLINE_CRATES: &[&str] = &[
    "setline_cli",
    "setline_codec",
    "setline_config",
    "setline_ops",
    "setline_session",
];

/// Level applied to every other crate when a bare level is configured.
const DEPENDENCY_LEVEL: &str = "warn";

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Errors encountered while configuring logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter expression does not parse.
    #[error("invalid log filter '{filter}': {reason}")]
    Filter {
        /// Filter text as configured.
        filter: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber was already installed elsewhere.
    #[error("failed to install log subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Subscriber settings derived from a [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    directives: String,
    format: LogFormat,
    ansi: bool,
}

impl LogSettings {
    /// Derives settings for a process whose stderr is a terminal or not.
    #[must_use]
    pub fn from_config(config: &Config, terminal: bool) -> Self {
        let format = config.log_format();
        Self {
            directives: directives(config.log_filter()),
            format,
            ansi: terminal && format == LogFormat::Compact,
        }
    }

    /// Returns the `EnvFilter` directives.
    #[must_use]
    pub fn directives(&self) -> &str {
        &self.directives
    }

    /// Returns true when colour codes are emitted.
    #[must_use]
    pub const fn ansi(&self) -> bool {
        self.ansi
    }

    fn filter(&self) -> Result<EnvFilter, TelemetryError> {
        EnvFilter::try_new(&self.directives).map_err(|error| TelemetryError::Filter {
            filter: self.directives.clone(),
            reason: error.to_string(),
        })
    }
}

/// Expands a bare level into per-crate directives.
fn directives(filter: &str) -> String {
    let trimmed = filter.trim();
    if trimmed.parse::<Level>().is_err() {
        return trimmed.to_owned();
    }
    let level = trimmed.to_ascii_lowercase();
    SETLINE_CRATES
        .iter()
        .fold(String::from(DEPENDENCY_LEVEL), |mut directives, name| {
            directives.push_str(&format!(",{name}={level}"));
            directives
        })
}

/// Installs the global subscriber on the first call.
///
/// Later calls return immediately, so tests that run the CLI repeatedly in
/// one process keep the first configuration.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or another
/// subscriber is already installed.
pub fn initialise(config: &Config) -> Result<(), TelemetryError> {
    TELEMETRY_GUARD.get_or_try_init(|| {
        let settings = LogSettings::from_config(config, io::stderr().is_terminal());
        install_subscriber(&settings)?;
        debug!(
            target: TELEMETRY_TARGET,
            filter = settings.directives(),
            device = config.host.as_deref().unwrap_or_default(),
            dry_run_file = config.dry_run_file.as_ref().map(|path| path.as_str()),
            "logging ready"
        );
        Ok(())
    })?;
    Ok(())
}

fn install_subscriber(settings: &LogSettings) -> Result<(), TelemetryError> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(settings.filter()?)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(settings.ansi)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match settings.format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
