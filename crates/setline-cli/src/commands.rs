//! Subcommand execution over a resource engine.

use std::io::Write;
use std::sync::Arc;

use setline_codec::{ConfigLine, ConfigPath, delete_lines};
use setline_config::{Config, ConfigError};
use setline_ops::{
    CommitSummary, DryRunSessionFactory, LockRetry, OperationError, ResourceEngine, SessionFactory,
    SshSessionFactory,
};
use setline_session::{
    DeviceFacts, OperationContext, SerializationGate, SetFileSink, SoftwareVersion,
    SshTransportConfig,
};
use tracing::debug;

use crate::AppError;
use crate::cli::CliCommand;
use crate::script::read_script;

const COMMAND_TARGET: &str = "setline_cli::commands";

/// Runs `command` against the configured device or dry-run file.
pub(crate) fn execute<W: Write>(
    command: &CliCommand,
    config: &Config,
    stdout: &mut W,
) -> Result<(), AppError> {
    let ctx = config
        .operation_timeout()
        .map_or_else(OperationContext::new, |timeout| {
            OperationContext::new().with_timeout(timeout)
        });
    let gate = Arc::new(SerializationGate::new());

    if let Some(path) = &config.dry_run_file {
        let mut factory = DryRunSessionFactory::new(SetFileSink::new(path.clone()));
        if let Some(facts) = dry_run_facts(config)? {
            factory = factory.with_facts(facts);
        }
        debug!(target: COMMAND_TARGET, file = %path, "dry run");
        let engine = engine(factory, gate, config);
        return dispatch(&engine, command, config, &ctx, stdout);
    }

    let factory = SshSessionFactory::new(transport_config(config)?);
    let engine = engine(factory, gate, config);
    dispatch(&engine, command, config, &ctx, stdout)
}

fn engine<F: SessionFactory>(
    factory: F,
    gate: Arc<SerializationGate>,
    config: &Config,
) -> ResourceEngine<F> {
    let engine = ResourceEngine::new(factory, gate);
    match &config.commit_comment_prefix {
        Some(prefix) => engine.with_comment_prefix(prefix.clone()),
        None => engine,
    }
}

fn transport_config(config: &Config) -> Result<SshTransportConfig, AppError> {
    let host = config
        .host
        .as_deref()
        .filter(|host| !host.is_empty())
        .ok_or(ConfigError::MissingHost)?;
    let mut transport = SshTransportConfig::new(host)
        .with_command(config.ssh_command.clone())
        .with_port(config.port)
        .with_connect_timeout(config.connect_timeout());
    if let Some(username) = &config.username {
        transport = transport.with_username(username.clone());
    }
    if let Some(key_file) = &config.ssh_key_file {
        transport = transport.with_key_file(key_file.clone());
    }
    Ok(transport)
}

fn dry_run_facts(config: &Config) -> Result<Option<DeviceFacts>, AppError> {
    if config.dry_run_model.is_none() && config.dry_run_version.is_none() {
        return Ok(None);
    }
    let version = match &config.dry_run_version {
        Some(text) => text.parse()?,
        None => SoftwareVersion::new(0, 0),
    };
    let model = config.dry_run_model.as_deref().unwrap_or("unknown");
    Ok(Some(DeviceFacts::new(model, version)))
}

fn parse_path(tokens: &[String]) -> Result<ConfigPath, AppError> {
    Ok(ConfigPath::parse(&tokens.join(" "))?)
}

fn dispatch<F: SessionFactory, W: Write>(
    engine: &ResourceEngine<F>,
    command: &CliCommand,
    config: &Config,
    ctx: &OperationContext,
    stdout: &mut W,
) -> Result<(), AppError> {
    match command {
        CliCommand::Facts => {
            let facts = engine.facts(ctx)?;
            write_facts(stdout, &facts).map_err(AppError::Output)
        }
        CliCommand::Show { path } => {
            let text = engine.show(ctx, &parse_path(path)?)?;
            if text.is_empty() {
                return Ok(());
            }
            writeln!(stdout, "{text}").map_err(AppError::Output)
        }
        CliCommand::Apply { script, comment } => {
            let lines = read_script(script)?;
            let summary = commit(engine, config, ctx, &lines, comment.as_deref())?;
            write_summary(stdout, &summary, config).map_err(AppError::Output)
        }
        CliCommand::Delete { path, comment } => {
            let lines = delete_lines(&parse_path(path)?);
            let summary = commit(engine, config, ctx, &lines, comment.as_deref())?;
            write_summary(stdout, &summary, config).map_err(AppError::Output)
        }
    }
}

fn commit<F: SessionFactory>(
    engine: &ResourceEngine<F>,
    config: &Config,
    ctx: &OperationContext,
    lines: &[ConfigLine],
    comment: Option<&str>,
) -> Result<CommitSummary, OperationError> {
    let apply = || engine.apply_lines(ctx, lines, comment);
    match config.lock_retry_interval() {
        Some(interval) => LockRetry::new(interval).run(ctx, apply),
        None => apply(),
    }
}

fn write_facts<W: Write>(stdout: &mut W, facts: &DeviceFacts) -> std::io::Result<()> {
    if let Some(hostname) = facts.hostname() {
        writeln!(stdout, "hostname: {hostname}")?;
    }
    writeln!(stdout, "model: {}", facts.model())?;
    writeln!(stdout, "family: {}", facts.family())?;
    writeln!(stdout, "version: {}", facts.version())
}

fn write_summary<W: Write>(
    stdout: &mut W,
    summary: &CommitSummary,
    config: &Config,
) -> std::io::Result<()> {
    let count = summary.lines.len();
    match (&config.dry_run_file, summary.dry_run) {
        (Some(path), true) => writeln!(stdout, "staged {count} statements in {path}")?,
        _ => writeln!(stdout, "committed {count} statements")?,
    }
    for warning in &summary.warnings {
        writeln!(stdout, "warning: {warning}")?;
    }
    Ok(())
}
