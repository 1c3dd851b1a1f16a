//! In-memory device speaking the RPC dialect, for tests.
//!
//! A [`SimulatedDevice`] keeps running and candidate configurations as
//! ordered statement lists and serves any number of
//! [`SimulatedTransport`]s. Every request is appended to a shared log so
//! tests can assert on ordering across concurrent sessions.
//!
//! Leaves introduced by a single-valued keyword hold one value: setting
//! `description b` where `description a` exists replaces it, as a device
//! does. Other statements accumulate.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use quick_xml::escape::escape;
use setline_codec::{ConfigLine, ConfigPath, LineParseError, Verb, tokenize};

use crate::error::TransportError;
use crate::rpc::{ScannedElement, scan};
use crate::transport::Transport;

/// Keywords whose leaf carries exactly one value on a fresh device.
const SINGLE_VALUED_KEYWORDS: &[&str] = &[
    "description",
    "host-name",
    "local-as",
    "mtu",
    "peer-as",
    "preference",
    "speed",
    "type",
    "vlan-id",
];

/// Request classes recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// `get-software-information`.
    Facts,
    /// Opaque command.
    Command,
    /// Candidate lock.
    Lock,
    /// Statement load.
    Load,
    /// Commit or check.
    Commit,
    /// Discard of candidate changes.
    Discard,
    /// Candidate unlock.
    Unlock,
    /// Session close.
    Close,
    /// Anything else.
    Other,
}

/// One logged request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedRequest {
    /// Simulated session number.
    pub session: u64,
    /// Request class.
    pub kind: RequestKind,
    /// Command text or loaded statements.
    pub detail: String,
}

/// One successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Committing session.
    pub session: u64,
    /// Commit log comment.
    pub comment: Option<String>,
}

#[derive(Debug, Default)]
struct DeviceState {
    hostname: String,
    model: String,
    version: String,
    running: Vec<Vec<String>>,
    candidate: Vec<Vec<String>>,
    lock_owner: Option<u64>,
    external_lock: bool,
    rejected_tokens: BTreeSet<String>,
    single_valued: BTreeSet<String>,
    commit_failure: Option<String>,
    commit_warnings: Vec<String>,
    fail_discard: bool,
    fail_unlock: bool,
    offline: bool,
    latency: Option<Duration>,
    next_session: u64,
    log: Vec<LoggedRequest>,
    commits: Vec<CommitRecord>,
}

/// Shared handle to one simulated device.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SimulatedDevice {
    /// Creates a device reporting `model` and `version`.
    #[must_use]
    pub fn new(model: &str, version: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                hostname: String::from("sim1"),
                model: model.to_owned(),
                version: version.to_owned(),
                single_valued: SINGLE_VALUED_KEYWORDS
                    .iter()
                    .map(|keyword| (*keyword).to_owned())
                    .collect(),
                ..DeviceState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a new transport to the device.
    #[must_use]
    pub fn connect(&self) -> SimulatedTransport {
        let session = {
            let mut state = self.state();
            state.next_session += 1;
            state.next_session
        };
        SimulatedTransport {
            device: self.clone(),
            session,
            closed: false,
        }
    }

    /// Adds statements to both running and candidate configurations.
    ///
    /// # Errors
    ///
    /// Returns [`LineParseError`] for a malformed statement; nothing is
    /// applied in that case.
    pub fn seed(&self, statements: &[&str]) -> Result<(), LineParseError> {
        let lines = statements
            .iter()
            .map(|statement| statement.parse::<ConfigLine>())
            .collect::<Result<Vec<_>, _>>()?;
        let mut guard = self.state();
        let state = &mut *guard;
        for line in &lines {
            apply(&mut state.running, &state.single_valued, line);
        }
        state.candidate = state.running.clone();
        Ok(())
    }

    /// Treats leaves introduced by `keyword` as holding one value.
    pub fn declare_single_valued(&self, keyword: &str) {
        self.state().single_valued.insert(keyword.to_owned());
    }

    /// Makes loads containing `token` fail with a syntax error.
    pub fn reject_token(&self, token: &str) {
        self.state().rejected_tokens.insert(token.to_owned());
    }

    /// Makes the next commits fail with `message`; `None` restores success.
    pub fn fail_commits(&self, message: Option<&str>) {
        self.state().commit_failure = message.map(ToOwned::to_owned);
    }

    /// Adds a warning to every successful commit.
    pub fn warn_on_commit(&self, message: &str) {
        self.state().commit_warnings.push(message.to_owned());
    }

    /// Makes discard requests fail.
    pub fn fail_discard(&self, fail: bool) {
        self.state().fail_discard = fail;
    }

    /// Makes unlock requests fail.
    pub fn fail_unlock(&self, fail: bool) {
        self.state().fail_unlock = fail;
    }

    /// Simulates a lock held by a user outside the engine.
    pub fn hold_external_lock(&self, held: bool) {
        self.state().external_lock = held;
    }

    /// Drops every transport's traffic on the floor.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Delays every reply.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    /// Returns the running configuration as `set` statements.
    #[must_use]
    pub fn running(&self) -> Vec<String> {
        render(&self.state().running, 0)
    }

    /// Returns the candidate configuration as `set` statements.
    #[must_use]
    pub fn candidate(&self) -> Vec<String> {
        render(&self.state().candidate, 0)
    }

    /// Returns the session holding the candidate lock.
    #[must_use]
    pub fn lock_owner(&self) -> Option<u64> {
        self.state().lock_owner
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn log(&self) -> Vec<LoggedRequest> {
        self.state().log.clone()
    }

    /// Returns every successful commit.
    #[must_use]
    pub fn commits(&self) -> Vec<CommitRecord> {
        self.state().commits.clone()
    }

    fn handle(&self, session: u64, request: &str) -> Result<String, TransportError> {
        let latency = {
            let state = self.state();
            if state.offline {
                return Err(TransportError::Closed);
            }
            state.latency
        };
        if let Some(latency) = latency {
            thread::sleep(latency);
        }

        let elements = scan(request).map_err(|error| TransportError::Framing {
            message: error.to_string(),
        })?;
        let message_id = elements
            .first()
            .and_then(|element| element.attribute("message-id"))
            .unwrap_or("0")
            .to_owned();
        let operation = elements.get(1).map(ScannedElement::name).unwrap_or_default();
        let mut state = self.state();
        let body = match operation {
            "get-software-information" => {
                log(&mut state, session, RequestKind::Facts, "");
                format!(
                    "<software-information><host-name>{}</host-name>\
                     <product-model>{}</product-model><junos-version>{}</junos-version>\
                     </software-information>",
                    escape(state.hostname.as_str()),
                    escape(state.model.as_str()),
                    escape(state.version.as_str())
                )
            }
            "command" => {
                let text = elements.get(1).map(ScannedElement::text).unwrap_or_default();
                log(&mut state, session, RequestKind::Command, text.trim());
                command_reply(&state, text.trim())
            }
            "lock" => {
                log(&mut state, session, RequestKind::Lock, "");
                if state.external_lock || state.lock_owner.is_some() {
                    rpc_error(
                        "error",
                        "configuration database locked by: admin terminal p0 (pid 4242)",
                        None,
                    )
                } else {
                    state.lock_owner = Some(session);
                    String::from("<ok/>")
                }
            }
            "load-configuration" => {
                let text = elements
                    .iter()
                    .find(|element| element.name() == "configuration-set")
                    .map(ScannedElement::text)
                    .unwrap_or_default();
                log(&mut state, session, RequestKind::Load, text);
                load(&mut state, session, text)
            }
            "commit-configuration" => {
                log(&mut state, session, RequestKind::Commit, "");
                let check = elements.iter().any(|element| element.name() == "check");
                let comment = elements
                    .iter()
                    .find(|element| element.name() == "log")
                    .map(|element| element.text().to_owned());
                commit(&mut state, session, check, comment)
            }
            "discard-changes" => {
                log(&mut state, session, RequestKind::Discard, "");
                if state.fail_discard {
                    rpc_error("error", "discard failed: database busy", None)
                } else {
                    if state.lock_owner.is_none_or(|owner| owner == session) {
                        state.candidate = state.running.clone();
                    }
                    String::from("<ok/>")
                }
            }
            "unlock" => {
                log(&mut state, session, RequestKind::Unlock, "");
                if state.fail_unlock {
                    rpc_error("error", "unlock failed: database busy", None)
                } else if state.lock_owner == Some(session) {
                    state.lock_owner = None;
                    String::from("<ok/>")
                } else {
                    rpc_error("error", "configuration database not locked", None)
                }
            }
            "close-session" => {
                log(&mut state, session, RequestKind::Close, "");
                release(&mut state, session);
                String::from("<ok/>")
            }
            other => {
                log(&mut state, session, RequestKind::Other, other);
                rpc_error("error", "syntax error", Some(other))
            }
        };
        Ok(format!(
            r#"<rpc-reply message-id="{message_id}">{body}</rpc-reply>"#
        ))
    }

    fn disconnect(&self, session: u64) {
        release(&mut self.state(), session);
    }
}

fn log(state: &mut DeviceState, session: u64, kind: RequestKind, detail: &str) {
    state.log.push(LoggedRequest {
        session,
        kind,
        detail: detail.to_owned(),
    });
}

fn release(state: &mut DeviceState, session: u64) {
    if state.lock_owner == Some(session) {
        state.lock_owner = None;
        state.candidate = state.running.clone();
    }
}

fn rpc_error(severity: &str, message: &str, bad_element: Option<&str>) -> String {
    let info = bad_element.map_or_else(String::new, |element| {
        format!("<error-info><bad-element>{}</bad-element></error-info>", escape(element))
    });
    format!(
        "<rpc-error><error-severity>{severity}</error-severity>{info}\
         <error-message>{}</error-message></rpc-error>",
        escape(message)
    )
}

fn command_reply(state: &DeviceState, text: &str) -> String {
    let Some(rest) = text.strip_prefix("show configuration") else {
        return String::from("<output></output>");
    };
    let (path_text, display) = rest.split_once('|').unwrap_or((rest, ""));
    let Ok(tokens) = tokenize(path_text) else {
        return rpc_error("error", "syntax error", Some(path_text.trim()));
    };
    let path = ConfigPath::new(tokens);
    let relative = display.contains("relative");
    let matching: Vec<Vec<String>> = state
        .running
        .iter()
        .filter(|statement| path.strip_from(statement).is_some())
        .cloned()
        .collect();
    let skip = if relative { path.tokens().len() } else { 0 };
    let lines = render(&matching, skip);
    let mut output = String::from("\n");
    for line in lines {
        output.push_str(&line);
        output.push('\n');
    }
    format!(
        "<configuration-output>{}</configuration-output>",
        escape(output.as_str())
    )
}

fn load(state: &mut DeviceState, session: u64, text: &str) -> String {
    if state.lock_owner != Some(session) {
        return rpc_error("error", "configuration database locked by another session", None);
    }
    let mut parsed = Vec::new();
    for statement in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let line = match statement.parse::<ConfigLine>() {
            Ok(line) => line,
            Err(error) => return rpc_error("error", &error.to_string(), None),
        };
        if let Some(token) = line
            .tokens()
            .iter()
            .find(|token| state.rejected_tokens.contains(token.as_str()))
        {
            return rpc_error("error", "syntax error", Some(token.as_str()));
        }
        parsed.push(line);
    }
    for line in &parsed {
        apply(&mut state.candidate, &state.single_valued, line);
    }
    String::from("<load-configuration-results><ok/></load-configuration-results>")
}

fn commit(state: &mut DeviceState, session: u64, check: bool, comment: Option<String>) -> String {
    if state.lock_owner != Some(session) {
        return rpc_error("error", "configuration database locked by another session", None);
    }
    if let Some(message) = &state.commit_failure {
        return format!(
            "<commit-results>{}</commit-results>",
            rpc_error("error", message, None)
        );
    }
    let warnings: String = state
        .commit_warnings
        .iter()
        .map(|message| rpc_error("warning", message, None))
        .collect();
    if check {
        return format!("<commit-results>{warnings}<ok/></commit-results>");
    }
    state.running = state.candidate.clone();
    state.commits.push(CommitRecord { session, comment });
    format!(
        "<commit-results>{warnings}<routing-engine><name>re0</name><commit-success/>\
         </routing-engine><ok/></commit-results>"
    )
}

fn apply(config: &mut Vec<Vec<String>>, single_valued: &BTreeSet<String>, line: &ConfigLine) {
    let tokens = line.tokens();
    match line.verb() {
        Verb::Set => {
            if let Some(leaf) = single_valued_leaf(tokens, single_valued) {
                config.retain(|statement| {
                    statement.len() != tokens.len() || !statement.starts_with(leaf)
                });
            }
            if !config.iter().any(|statement| statement.as_slice() == tokens) {
                config.push(tokens.to_vec());
            }
        }
        Verb::Delete => {
            let path = line.path();
            config.retain(|statement| path.strip_from(statement).is_none());
        }
    }
}

/// Returns the path of the leaf `tokens` assigns when its keyword is
/// single-valued.
fn single_valued_leaf<'t>(
    tokens: &'t [String],
    single_valued: &BTreeSet<String>,
) -> Option<&'t [String]> {
    let (_, leaf) = tokens.split_last()?;
    let keyword = leaf.last()?;
    single_valued.contains(keyword).then_some(leaf)
}

fn render(statements: &[Vec<String>], skip: usize) -> Vec<String> {
    statements
        .iter()
        .filter_map(|statement| statement.get(skip..))
        .filter(|tokens| !tokens.is_empty())
        .map(|tokens| ConfigLine::set(ConfigPath::new(tokens.iter().cloned())).to_string())
        .collect()
}

/// Transport connected to a [`SimulatedDevice`].
#[derive(Debug)]
pub struct SimulatedTransport {
    device: SimulatedDevice,
    session: u64,
    closed: bool,
}

impl SimulatedTransport {
    /// Returns the simulated session number used in the request log.
    #[must_use]
    pub const fn session(&self) -> u64 {
        self.session
    }
}

impl Transport for SimulatedTransport {
    fn round_trip(&mut self, request: &str) -> Result<String, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.device.handle(self.session, request)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.device.disconnect(self.session);
        }
        Ok(())
    }
}
