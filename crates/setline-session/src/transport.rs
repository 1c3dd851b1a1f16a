//! Request/reply channels to a device.
//!
//! The device speaks XML RPCs framed with the NETCONF 1.0 end-of-message
//! marker:
//! ```text
//! <rpc message-id="1">…</rpc>]]>]]>
//! ```
//! Both peers send a `<hello>` before the first request.

use std::io::{BufRead, Write};

use tracing::trace;

use crate::error::TransportError;
use crate::rpc::{CLIENT_HELLO, ReplyParseError, scan};

/// End-of-message marker.
pub const FRAME_DELIMITER: &str = "]]>]]>";

pub(crate) const TRANSPORT_TARGET: &str = "setline_session::transport";

/// Authenticated request/reply channel to one device.
///
/// Implementations perform exactly one exchange per call and never retry.
pub trait Transport: Send {
    /// Sends one framed request and returns the framed reply.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the channel fails.
    fn round_trip(&mut self, request: &str) -> Result<String, TransportError>;

    /// Releases the channel. Calling it more than once is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the channel cannot be shut down cleanly.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Framed transport over any buffered reader and writer.
pub struct FramedTransport<R, W> {
    reader: R,
    writer: W,
    server_capabilities: Vec<String>,
    closed: bool,
}

impl<R: BufRead, W: Write> FramedTransport<R, W> {
    /// Wraps a reader and writer without performing the hello exchange.
    #[must_use]
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            server_capabilities: Vec::new(),
            closed: false,
        }
    }

    /// Exchanges hello messages and records the server capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Handshake`] when the server hello is not
    /// understood, or an I/O error.
    pub fn handshake(&mut self) -> Result<&[String], TransportError> {
        self.send(CLIENT_HELLO)?;
        let hello = self.receive()?;
        self.server_capabilities =
            parse_hello(&hello).map_err(|error| TransportError::Handshake {
                message: error.to_string(),
            })?;
        if self.server_capabilities.is_empty() {
            return Err(TransportError::Handshake {
                message: String::from("server hello advertised no capabilities"),
            });
        }
        trace!(
            target: TRANSPORT_TARGET,
            capabilities = self.server_capabilities.len(),
            "hello exchanged"
        );
        Ok(&self.server_capabilities)
    }

    /// Returns capabilities advertised by the server.
    #[must_use]
    pub fn server_capabilities(&self) -> &[String] {
        &self.server_capabilities
    }

    /// Writes one framed message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if writing fails.
    pub fn send(&mut self, message: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.writer.write_all(message.as_bytes())?;
        self.writer.write_all(FRAME_DELIMITER.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Reads one framed message (blocks until complete).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] on end of stream and
    /// [`TransportError::Framing`] for non-UTF-8 payloads.
    pub fn receive(&mut self) -> Result<String, TransportError> {
        let mut buffer = Vec::new();
        loop {
            let read = self.reader.read_until(b'>', &mut buffer)?;
            if read == 0 {
                return Err(TransportError::Closed);
            }
            if buffer.ends_with(FRAME_DELIMITER.as_bytes()) {
                break;
            }
        }
        buffer.truncate(buffer.len() - FRAME_DELIMITER.len());
        String::from_utf8(buffer).map_err(|error| TransportError::Framing {
            message: error.to_string(),
        })
    }

    /// Returns the underlying writer.
    #[must_use]
    pub const fn writer(&self) -> &W {
        &self.writer
    }
}

impl<R: BufRead + Send, W: Write + Send> Transport for FramedTransport<R, W> {
    fn round_trip(&mut self, request: &str) -> Result<String, TransportError> {
        self.send(request)?;
        self.receive()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.flush()?;
        Ok(())
    }
}

/// Extracts capability URIs from a hello message.
///
/// # Errors
///
/// Returns [`ReplyParseError`] when the hello is not well-formed.
pub fn parse_hello(hello: &str) -> Result<Vec<String>, ReplyParseError> {
    Ok(scan(hello)?
        .into_iter()
        .filter(|element| element.name() == "capability")
        .map(|element| element.text().trim().to_owned())
        .filter(|capability| !capability.is_empty())
        .collect())
}
