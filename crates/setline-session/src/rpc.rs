//! XML request envelopes and reply parsing for the device RPC dialect.
//!
//! Requests are small fixed documents, built with [`quick_xml::escape`] for
//! the text they carry. Replies are scanned with a streaming reader: the
//! engine only needs the text body, the `<ok/>` marker and any `rpc-error`
//! or `xnm:warning` diagnostics, so replies are otherwise treated as opaque.

use std::fmt;
use std::time::Duration;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

/// Client hello sent when a transport opens.
pub const CLIENT_HELLO: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">"#,
    "<capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities>",
    "</hello>"
);

/// Errors raised while scanning XML.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyParseError {
    /// The reader rejected the document.
    #[error("invalid XML: {message}")]
    Xml {
        /// Reader error text.
        message: String,
    },
}

impl ReplyParseError {
    fn xml(error: &quick_xml::Error) -> Self {
        Self::Xml {
            message: error.to_string(),
        }
    }
}

/// Diagnostic severity reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The request failed.
    Error,
    /// The request succeeded with a caveat.
    Warning,
}

/// One `rpc-error`, `xnm:error` or `xnm:warning` entry from a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcDiagnostic {
    severity: Severity,
    message: String,
    bad_element: Option<String>,
    path: Option<String>,
}

impl RpcDiagnostic {
    /// Creates a diagnostic.
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            bad_element: None,
            path: None,
        }
    }

    /// Attaches the element the device objected to.
    #[must_use]
    pub fn with_bad_element(mut self, element: impl Into<String>) -> Self {
        self.bad_element = Some(element.into());
        self
    }

    /// Attaches the configuration path reported by the device.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Returns the severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the device message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the offending element, when reported.
    #[must_use]
    pub fn bad_element(&self) -> Option<&str> {
        self.bad_element.as_deref()
    }

    /// Returns the configuration path, when reported.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Returns true for error severity.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for RpcDiagnostic {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message)?;
        if let Some(element) = &self.bad_element {
            write!(formatter, " (element '{element}')")?;
        }
        Ok(())
    }
}

/// Requests the engine sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Opaque CLI command answered as text.
    Command {
        /// Command text.
        text: String,
    },
    /// Acquire the exclusive candidate lock.
    Lock,
    /// Load `set`/`delete` statements into the candidate.
    LoadSet {
        /// Rendered statements, one per element.
        lines: Vec<String>,
    },
    /// Commit or check the candidate.
    Commit {
        /// Commit log comment.
        comment: Option<String>,
        /// Validate without activating.
        check_only: bool,
        /// Roll back automatically unless confirmed within this period.
        confirm_timeout: Option<Duration>,
    },
    /// Drop uncommitted candidate changes.
    Discard,
    /// Release the candidate lock.
    Unlock,
    /// Fetch hardware and software facts.
    SoftwareInformation,
    /// End the session.
    CloseSession,
}

impl Request {
    /// Returns the request body without its envelope.
    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::Command { text } => {
                format!(r#"<command format="text">{}</command>"#, escape(text.as_str()))
            }
            Self::Lock => String::from("<lock><target><candidate/></target></lock>"),
            Self::LoadSet { lines } => format!(
                r#"<load-configuration action="set" format="text"><configuration-set>{}</configuration-set></load-configuration>"#,
                escape(lines.join("\n").as_str())
            ),
            Self::Commit {
                comment,
                check_only,
                confirm_timeout,
            } => commit_body(comment.as_deref(), *check_only, *confirm_timeout),
            Self::Discard => String::from("<discard-changes/>"),
            Self::Unlock => String::from("<unlock><target><candidate/></target></unlock>"),
            Self::SoftwareInformation => String::from("<get-software-information/>"),
            Self::CloseSession => String::from("<close-session/>"),
        }
    }
}

fn commit_body(comment: Option<&str>, check_only: bool, confirm_timeout: Option<Duration>) -> String {
    let mut body = String::from("<commit-configuration>");
    if check_only {
        body.push_str("<check/>");
    }
    if let Some(timeout) = confirm_timeout {
        let minutes = timeout.as_secs().div_ceil(60).max(1);
        body.push_str(&format!(
            "<confirmed/><confirm-timeout>{minutes}</confirm-timeout>"
        ));
    }
    if let Some(comment) = comment {
        body.push_str(&format!("<log>{}</log>", escape(comment)));
    }
    body.push_str("</commit-configuration>");
    body
}

/// Wraps a request body in an `rpc` envelope.
#[must_use]
pub fn envelope(message_id: u64, body: &str) -> String {
    format!(r#"<rpc message-id="{message_id}">{body}</rpc>"#)
}

/// Monotonic message identifiers for one session.
#[derive(Debug, Default)]
pub struct MessageIds {
    last: u64,
}

impl MessageIds {
    /// Returns the next identifier, starting at 1.
    pub const fn next_id(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}

/// Parsed reply to one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcReply {
    message_id: Option<String>,
    ok: bool,
    output: String,
    diagnostics: Vec<RpcDiagnostic>,
}

const OUTPUT_ELEMENTS: &[&str] = &["output", "configuration-output", "configuration-text"];

#[derive(Default)]
struct PendingDiagnostic {
    depth: usize,
    severity: Option<Severity>,
    message: Option<String>,
    bad_element: Option<String>,
    path: Option<String>,
}

impl PendingDiagnostic {
    fn finish(self) -> RpcDiagnostic {
        RpcDiagnostic {
            severity: self.severity.unwrap_or(Severity::Error),
            message: self
                .message
                .unwrap_or_else(|| String::from("device reported an error without a message")),
            bad_element: self.bad_element,
            path: self.path,
        }
    }

    fn absorb(&mut self, name: &str, text: &str) {
        let text = text.trim();
        match name {
            "error-severity" => {
                self.severity = Some(if text == "warning" {
                    Severity::Warning
                } else {
                    Severity::Error
                });
            }
            "error-message" | "message" => self.message = Some(text.to_owned()),
            "bad-element" => self.bad_element = Some(text.to_owned()),
            "error-path" => self.path = Some(text.to_owned()),
            _ => {}
        }
    }
}

fn diagnostic_severity(name: &str) -> Option<Option<Severity>> {
    match name {
        "rpc-error" => Some(None),
        "error" => Some(Some(Severity::Error)),
        "warning" => Some(Some(Severity::Warning)),
        _ => None,
    }
}

impl RpcReply {
    /// Parses a reply document.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyParseError`] when the document is not well-formed.
    pub fn parse(xml: &str) -> Result<Self, ReplyParseError> {
        let mut reply = Self::default();
        let mut reader = Reader::from_str(xml);
        let mut depth = 0usize;
        let mut text = String::new();
        let mut pending: Option<PendingDiagnostic> = None;

        loop {
            match reader.read_event().map_err(|error| ReplyParseError::xml(&error))? {
                Event::Start(start) => {
                    depth += 1;
                    text.clear();
                    let name = local_name(&start);
                    if name == "rpc-reply" {
                        reply.message_id = attribute(&start, "message-id");
                    }
                    if pending.is_none() {
                        if let Some(severity) = diagnostic_severity(&name) {
                            pending = Some(PendingDiagnostic {
                                depth,
                                severity,
                                ..PendingDiagnostic::default()
                            });
                        }
                    }
                }
                Event::Empty(start) => {
                    if pending.is_none() && local_name(&start) == "ok" {
                        reply.ok = true;
                    }
                }
                Event::Text(content) => text.push_str(&String::from_utf8_lossy(&content)),
                Event::CData(content) => text.push_str(&String::from_utf8_lossy(&content)),
                Event::GeneralRef(reference) => push_entity(&mut text, &reference),
                Event::End(end) => {
                    let name = String::from_utf8_lossy(end.local_name().as_ref()).into_owned();
                    match pending.take() {
                        Some(diagnostic) if diagnostic.depth == depth => {
                            reply.diagnostics.push(diagnostic.finish());
                        }
                        Some(mut diagnostic) => {
                            diagnostic.absorb(&name, &text);
                            pending = Some(diagnostic);
                        }
                        None if OUTPUT_ELEMENTS.contains(&name.as_str()) => {
                            reply.output.push_str(&text);
                        }
                        None => {}
                    }
                    text.clear();
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(reply)
    }

    /// Returns the echoed message identifier.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Returns true when the reply carried `<ok/>`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.ok
    }

    /// Returns the text body of the reply.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Returns every diagnostic in document order.
    #[must_use]
    pub fn diagnostics(&self) -> &[RpcDiagnostic] {
        &self.diagnostics
    }

    /// Returns true when any diagnostic has error severity.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(RpcDiagnostic::is_error)
    }

    /// Returns error-severity diagnostics.
    #[must_use]
    pub fn errors(&self) -> Vec<RpcDiagnostic> {
        self.diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.is_error())
            .cloned()
            .collect()
    }

    /// Returns warning-severity diagnostics.
    #[must_use]
    pub fn warnings(&self) -> Vec<RpcDiagnostic> {
        self.diagnostics
            .iter()
            .filter(|diagnostic| !diagnostic.is_error())
            .cloned()
            .collect()
    }
}

/// One element found by [`scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
}

impl ScannedElement {
    /// Returns the local element name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the text directly inside the element.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns an attribute value by local name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Lists elements in document order with their direct text content.
///
/// # Errors
///
/// Returns [`ReplyParseError`] when the document is not well-formed.
pub fn scan(xml: &str) -> Result<Vec<ScannedElement>, ReplyParseError> {
    let mut reader = Reader::from_str(xml);
    let mut elements = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|error| ReplyParseError::xml(&error))?;
        match event {
            Event::Start(start) => {
                open.push(elements.len());
                elements.push(scanned(&start));
            }
            Event::Empty(start) => elements.push(scanned(&start)),
            Event::End(_) => {
                open.pop();
            }
            Event::Text(content) => {
                append_text(&mut elements, &open, &String::from_utf8_lossy(&content));
            }
            Event::CData(content) => {
                append_text(&mut elements, &open, &String::from_utf8_lossy(&content));
            }
            Event::GeneralRef(reference) => {
                let mut resolved = String::new();
                push_entity(&mut resolved, &reference);
                append_text(&mut elements, &open, &resolved);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(elements)
}

/// Returns the trimmed text of the first element named `name`.
///
/// # Errors
///
/// Returns [`ReplyParseError`] when the document is not well-formed.
pub fn element_text(xml: &str, name: &str) -> Result<Option<String>, ReplyParseError> {
    Ok(scan(xml)?
        .into_iter()
        .find(|element| element.name == name)
        .map(|element| element.text.trim().to_owned()))
}

fn append_text(elements: &mut [ScannedElement], open: &[usize], text: &str) {
    if let Some(element) = open.last().and_then(|index| elements.get_mut(*index)) {
        element.text.push_str(text);
    }
}

fn scanned(start: &BytesStart<'_>) -> ScannedElement {
    let attributes = start
        .attributes()
        .flatten()
        .map(|attr| {
            (
                String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
                String::from_utf8_lossy(&attr.value).into_owned(),
            )
        })
        .collect();
    ScannedElement {
        name: local_name(start),
        attributes,
        text: String::new(),
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attribute(start: &BytesStart<'_>, name: &str) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name.as_bytes())
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

fn push_entity(text: &mut String, reference: &[u8]) {
    let name = String::from_utf8_lossy(reference);
    let resolved = match name.as_ref() {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        other => other.strip_prefix('#').and_then(|code| {
            let value = match code.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => code.parse().ok(),
            };
            value.and_then(char::from_u32)
        }),
    };
    match resolved {
        Some(character) => text.push(character),
        None => {
            text.push('&');
            text.push_str(&name);
            text.push(';');
        }
    }
}
