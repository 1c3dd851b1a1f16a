//! Transport that runs the ssh client with the `netconf` subsystem.

use std::io::{BufReader, BufWriter};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::{FramedTransport, TRANSPORT_TARGET, Transport};

/// Settings for launching the ssh subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTransportConfig {
    command: String,
    host: String,
    port: u16,
    username: Option<String>,
    key_file: Option<Utf8PathBuf>,
    connect_timeout: Duration,
}

impl SshTransportConfig {
    /// Creates settings for `host` with the default client, port and timeout.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            command: String::from("ssh"),
            host: host.into(),
            port: 830,
            username: None,
            key_file: None,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the ssh executable.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Overrides the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the login user.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the private key file.
    #[must_use]
    pub fn with_key_file(mut self, key_file: impl Into<Utf8PathBuf>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    /// Sets the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns the host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the arguments passed to the ssh executable.
    ///
    /// Batch mode is forced so the client never prompts for a password.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            String::from("-p"),
            self.port.to_string(),
            String::from("-o"),
            String::from("BatchMode=yes"),
            String::from("-o"),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        if let Some(username) = &self.username {
            args.push(String::from("-l"));
            args.push(username.clone());
        }
        if let Some(key_file) = &self.key_file {
            args.push(String::from("-i"));
            args.push(key_file.to_string());
        }
        args.push(self.host.clone());
        args.push(String::from("-s"));
        args.push(String::from("netconf"));
        args
    }
}

type ChildTransport = FramedTransport<BufReader<ChildStdout>, BufWriter<ChildStdin>>;

/// Framed transport over a spawned ssh client.
pub struct ProcessTransport {
    child: Child,
    framed: ChildTransport,
    closed: bool,
}

impl ProcessTransport {
    /// Spawns the ssh client and performs the hello exchange.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] when the client cannot be started,
    /// or the handshake failure.
    pub fn spawn(config: &SshTransportConfig) -> Result<Self, TransportError> {
        debug!(
            target: TRANSPORT_TARGET,
            command = %config.command,
            host = %config.host,
            port = config.port,
            "spawning ssh subsystem"
        );

        let mut child = Command::new(&config.command)
            .args(config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                command: config.command.clone(),
                source: Arc::new(source),
            })?;

        let pipes = child.stdin.take().zip(child.stdout.take());
        let Some((stdin, stdout)) = pipes else {
            reap(&mut child);
            return Err(TransportError::Spawn {
                command: config.command.clone(),
                source: Arc::new(std::io::Error::other("failed to capture stdio")),
            });
        };

        let mut framed = FramedTransport::new(BufReader::new(stdout), BufWriter::new(stdin));
        if let Err(error) = framed.handshake() {
            reap(&mut child);
            return Err(error);
        }

        debug!(
            target: TRANSPORT_TARGET,
            host = %config.host,
            pid = child.id(),
            "ssh subsystem ready"
        );
        Ok(Self {
            child,
            framed,
            closed: false,
        })
    }
}

fn reap(child: &mut Child) {
    if let Err(error) = child.kill() {
        debug!(target: TRANSPORT_TARGET, %error, "ssh client already exited");
    }
    if let Err(error) = child.wait() {
        warn!(target: TRANSPORT_TARGET, %error, "failed to reap ssh client");
    }
}

impl Transport for ProcessTransport {
    fn round_trip(&mut self, request: &str) -> Result<String, TransportError> {
        self.framed.round_trip(request)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let flushed = self.framed.close();
        reap(&mut self.child);
        flushed
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!(target: TRANSPORT_TARGET, %error, "ssh transport did not close cleanly");
        }
    }
}
