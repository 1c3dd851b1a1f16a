//! Session and transaction tests against scripted and simulated devices.


use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use mockall::mock;
use rstest::{fixture, rstest};
use setline_codec::{AttributeTree, ConfigLine, ConfigPath, Schema, ValueKind, build};

use crate::simulator::{LoggedRequest, RequestKind, SimulatedDevice};
use crate::{
    CancellationToken, ClearStep, CommitOptions, ConfigSession, DryRunSession, ErrorKind,
    MemorySink, OperationContext, RecordingClearObserver, SerializationGate, Session,
    SessionError, Transaction, Transport, TransportError, execute, scan,
};

mock! {
    Wire {}
    impl Transport for Wire {
        fn round_trip(&mut self, request: &str) -> Result<String, TransportError>;
        fn close(&mut self) -> Result<(), TransportError>;
    }
}

type RequestLog = Arc<Mutex<Vec<String>>>;

/// Builds a transport that answers requests from `replies` in order and
/// records every request it receives.
fn scripted(replies: Vec<Result<String, TransportError>>) -> (MockWire, RequestLog) {
    let requests: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);
    let mut queue: VecDeque<_> = replies.into();
    let mut transport = MockWire::new();
    transport.expect_round_trip().returning(move |request| {
        seen.lock().expect("request log").push(request.to_owned());
        queue.pop_front().unwrap_or(Err(TransportError::Closed))
    });
    transport.expect_close().times(1).returning(|| Ok(()));
    (transport, requests)
}

fn reply(body: &str) -> Result<String, TransportError> {
    Ok(format!("<rpc-reply>{body}</rpc-reply>"))
}

fn facts_reply() -> Result<String, TransportError> {
    reply(
        "<software-information><host-name>r1</host-name><product-model>mx204</product-model>\
         <junos-version>21.4R3-S2.3</junos-version></software-information>",
    )
}

fn ok() -> Result<String, TransportError> {
    reply("<ok/>")
}

fn rpc_error(message: &str) -> Result<String, TransportError> {
    reply(&format!(
        "<rpc-error><error-severity>error</error-severity>\
         <error-message>{message}</error-message></rpc-error>"
    ))
}

/// Returns the RPC element name of each recorded request.
fn operations(requests: &RequestLog) -> Vec<String> {
    requests
        .lock()
        .expect("request log")
        .iter()
        .map(|request| {
            scan(request)
                .expect("request is XML")
                .get(1)
                .map(|element| element.name().to_owned())
                .unwrap_or_default()
        })
        .collect()
}

fn line(text: &str) -> ConfigLine {
    text.parse().expect("statement")
}

#[fixture]
fn ctx() -> OperationContext {
    OperationContext::new()
}

#[fixture]
fn device() -> SimulatedDevice {
    SimulatedDevice::new("mx204", "21.4R3-S2.3")
}

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

#[rstest]
fn open_reads_facts_and_close_is_idempotent(ctx: OperationContext) {
    let (transport, requests) = scripted(vec![facts_reply(), ok()]);
    let mut session = Session::open(transport, &ctx).expect("open");
    assert_eq!(session.facts().model(), "mx204");
    assert_eq!(session.facts().hostname(), Some("r1"));

    session.close();
    session.close();
    assert!(session.is_closed());
    assert_eq!(
        operations(&requests),
        ["get-software-information", "close-session"]
    );
    assert!(matches!(
        session.command(&ctx, "show version"),
        Err(SessionError::Closed)
    ));
}

#[rstest]
fn open_failure_is_a_connection_error(ctx: OperationContext) {
    let (transport, _requests) = scripted(vec![Err(TransportError::Closed)]);
    let Err(error) = Session::open(transport, &ctx) else {
        panic!("open must fail");
    };
    assert_eq!(error.kind(), ErrorKind::Connection);
}

#[rstest]
fn command_errors_carry_device_diagnostics(ctx: OperationContext) {
    let (transport, _requests) = scripted(vec![facts_reply(), rpc_error("syntax error, expecting a command")]);
    let mut session = Session::open(transport, &ctx).expect("open");
    let error = session.command(&ctx, "show frobnicate").expect_err("must fail");
    assert_eq!(error.kind(), ErrorKind::Command);
    assert_eq!(
        error.to_string(),
        "command 'show frobnicate' failed: syntax error, expecting a command"
    );
}

#[rstest]
fn refused_lock_leaves_session_idle(ctx: OperationContext) {
    let (transport, _requests) = scripted(vec![
        facts_reply(),
        rpc_error("configuration database locked by: admin"),
    ]);
    let mut session = Session::open(transport, &ctx).expect("open");
    let error = session.lock(&ctx).expect_err("must fail");
    assert_eq!(error.kind(), ErrorKind::Lock);
    assert!(!session.state().is_locked());
}

#[rstest]
fn second_lock_is_an_invalid_state(ctx: OperationContext) {
    let (transport, _requests) = scripted(vec![facts_reply(), ok()]);
    let mut session = Session::open(transport, &ctx).expect("open");
    session.lock(&ctx).expect("lock");
    let error = session.lock(&ctx).expect_err("must fail");
    assert_eq!(error.to_string(), "cannot lock while locked");
}

#[rstest]
fn failed_commit_keeps_lock_until_cleared(ctx: OperationContext) {
    let (transport, requests) = scripted(vec![
        facts_reply(),
        ok(),
        reply("<load-configuration-results><ok/></load-configuration-results>"),
        rpc_error("mtu out of range"),
        ok(),
        ok(),
    ]);
    let mut session = Session::open(transport, &ctx).expect("open");
    session.lock(&ctx).expect("lock");
    session
        .stage(&ctx, &[line("set interfaces ge-0/0/0 mtu 99999")])
        .expect("stage");

    let error = session
        .commit(&ctx, &CommitOptions::new())
        .expect_err("must fail");
    assert_eq!(error.kind(), ErrorKind::Commit);
    assert!(session.state().is_locked());
    assert_eq!(session.staged_lines().len(), 1);

    let report = session.clear();
    assert!(report.was_locked());
    assert!(report.is_clean());
    assert!(!session.state().is_locked());
    assert_eq!(
        operations(&requests),
        [
            "get-software-information",
            "lock",
            "load-configuration",
            "commit-configuration",
            "discard-changes",
            "unlock",
        ]
    );
}

#[rstest]
fn unlock_failure_after_commit_becomes_a_warning(ctx: OperationContext) {
    let (transport, _requests) = scripted(vec![
        facts_reply(),
        ok(),
        reply("<commit-results><ok/></commit-results>"),
        Err(TransportError::Closed),
    ]);
    let mut session = Session::open(transport, &ctx).expect("open");
    session.lock(&ctx).expect("lock");
    let warnings = session
        .commit(&ctx, &CommitOptions::new())
        .expect("commit");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message().starts_with("lock not released after commit"));
    assert!(!session.state().is_locked());
}

#[rstest]
fn clear_failures_reach_the_observer(ctx: OperationContext) {
    let (transport, _requests) = scripted(vec![
        facts_reply(),
        ok(),
        Err(TransportError::Closed),
        rpc_error("unlock refused"),
    ]);
    let observer = RecordingClearObserver::shared();
    let mut session = Session::open(transport, &ctx)
        .expect("open")
        .with_observer(observer.clone());
    session.lock(&ctx).expect("lock");

    let report = session.clear();
    assert!(!report.is_clean());
    assert_eq!(report.failures().len(), 2);
    assert!(!session.state().is_locked());

    let recorded = observer.failures();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].step, ClearStep::Discard);
    assert_eq!(recorded[1].step, ClearStep::Unlock);
    assert_eq!(recorded[1].error.kind(), ErrorKind::Command);
}

#[rstest]
fn cancellation_after_stage_still_clears() {
    let token = CancellationToken::new();
    let ctx = OperationContext::new().with_token(token.clone());
    let (transport, requests) = scripted(vec![
        facts_reply(),
        ok(),
        reply("<load-configuration-results><ok/></load-configuration-results>"),
        ok(),
        ok(),
    ]);
    let mut session = Session::open(transport, &ctx).expect("open");
    {
        let mut transaction = Transaction::begin(&mut session, &ctx).expect("lock");
        transaction
            .stage(&ctx, &[line("set system host-name r2")])
            .expect("stage");
        token.cancel();
        let error = transaction
            .commit(&ctx, &CommitOptions::new())
            .expect_err("must stop");
        assert_eq!(error.kind(), ErrorKind::Cancelled);
    }
    assert!(!session.state().is_locked());
    assert_eq!(
        operations(&requests),
        [
            "get-software-information",
            "lock",
            "load-configuration",
            "discard-changes",
            "unlock",
        ]
    );
}

// ---------------------------------------------------------------------------
// Simulated device
// ---------------------------------------------------------------------------

#[rstest]
fn rejected_stage_then_clear_shows_prior_state(ctx: OperationContext, device: SimulatedDevice) {
    device
        .seed(&["set interfaces ge-0/0/0 mtu 1500"])
        .expect("seed");
    device.reject_token("frobnicate");
    let mut session = Session::open(device.connect(), &ctx).expect("open");

    let mut transaction = Transaction::begin(&mut session, &ctx).expect("lock");
    transaction
        .stage(&ctx, &[line("set interfaces ge-0/0/0 description uplink")])
        .expect("first stage");
    let error = transaction
        .stage(&ctx, &[line("set interfaces ge-0/0/0 frobnicate yes")])
        .expect_err("must be rejected");
    assert_eq!(error.kind(), ErrorKind::Apply);
    assert_eq!(error.diagnostics()[0].bad_element(), Some("frobnicate"));
    assert!(transaction.clear().is_clean());

    let path = ConfigPath::parse("interfaces ge-0/0/0").expect("path");
    assert_eq!(session.show_config(&ctx, &path).expect("show"), "set mtu 1500");
    assert_eq!(device.candidate(), device.running());
    assert_eq!(device.lock_owner(), None);
}

#[rstest]
fn single_valued_leaves_replace_their_value(ctx: OperationContext, device: SimulatedDevice) {
    device
        .seed(&[
            "set interfaces ge-0/0/0 description old",
            "set interfaces ge-0/0/0 unit 0 family inet address 192.0.2.1/24",
        ])
        .expect("seed");
    let mut session = Session::open(device.connect(), &ctx).expect("open");
    let lines = [
        line("set interfaces ge-0/0/0 description \"to core\""),
        line("set interfaces ge-0/0/0 unit 0 family inet address 198.51.100.1/24"),
    ];
    execute(&mut session, &ctx, &lines, &CommitOptions::new()).expect("commit");

    assert_eq!(
        device.running(),
        [
            "set interfaces ge-0/0/0 unit 0 family inet address 192.0.2.1/24",
            "set interfaces ge-0/0/0 description \"to core\"",
            "set interfaces ge-0/0/0 unit 0 family inet address 198.51.100.1/24",
        ]
    );
}

#[rstest]
fn declared_keywords_become_single_valued(device: SimulatedDevice) {
    device.declare_single_valued("bandwidth");
    device
        .seed(&[
            "set interfaces ge-0/0/0 bandwidth 1g",
            "set interfaces ge-0/0/0 bandwidth 10g",
        ])
        .expect("seed");
    assert_eq!(device.running(), ["set interfaces ge-0/0/0 bandwidth 10g"]);
}

#[rstest]
fn dry_run_sink_matches_live_staging(ctx: OperationContext, device: SimulatedDevice) {
    let schema = Schema::builder()
        .scalar("description", "description", ValueKind::Text)
        .scalar("mtu", "mtu", ValueKind::Unsigned)
        .build()
        .expect("schema");
    let base = ConfigPath::parse("interfaces ge-0/0/1").expect("path");
    let tree = AttributeTree::new()
        .with_text("description", "to core")
        .with_unsigned("mtu", 9000);
    let lines = build(&schema, &base, &tree).expect("build");

    let mut live = Session::open(device.connect(), &ctx).expect("open");
    execute(&mut live, &ctx, &lines, &CommitOptions::new()).expect("live commit");

    let sink = MemorySink::new();
    let mut dry = DryRunSession::new(Box::new(sink.clone()));
    execute(&mut dry, &ctx, &lines, &CommitOptions::new()).expect("dry commit");

    assert_eq!(sink.lines(), lines);
    let rendered: Vec<String> = sink.lines().iter().map(ToString::to_string).collect();
    assert_eq!(device.running(), rendered);
}

#[rstest]
fn commit_warnings_do_not_roll_back(ctx: OperationContext, device: SimulatedDevice) {
    device.warn_on_commit("statement is deprecated");
    let mut session = Session::open(device.connect(), &ctx).expect("open");
    let warnings = execute(
        &mut session,
        &ctx,
        &[line("set system host-name r9")],
        &CommitOptions::new().with_comment("rename"),
    )
    .expect("commit");

    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message(), "statement is deprecated");
    assert_eq!(device.running(), ["set system host-name r9"]);
    assert_eq!(device.commits()[0].comment.as_deref(), Some("rename"));
}

#[rstest]
fn check_only_commit_stays_locked(ctx: OperationContext, device: SimulatedDevice) {
    let mut session = Session::open(device.connect(), &ctx).expect("open");
    {
        let mut transaction = Transaction::begin(&mut session, &ctx).expect("lock");
        transaction
            .stage(&ctx, &[line("set system host-name r9")])
            .expect("stage");
        transaction
            .commit(&ctx, &CommitOptions::new().check_only())
            .expect("check");
        assert!(transaction.state().is_locked());
    }
    assert!(device.running().is_empty());
    assert_eq!(device.lock_owner(), None);
}

/// Fails when any session's requests are split by another session's.
fn assert_contiguous(log: &[LoggedRequest]) {
    let mut finished = BTreeSet::new();
    let mut current = None;
    for entry in log {
        if current != Some(entry.session) {
            if let Some(previous) = current {
                finished.insert(previous);
            }
            assert!(
                !finished.contains(&entry.session),
                "session {} resumed after being interleaved: {log:?}",
                entry.session
            );
            current = Some(entry.session);
        }
    }
}

#[rstest]
fn gated_sequences_never_interleave(device: SimulatedDevice) {
    device.set_latency(Duration::from_millis(1));
    let gate = Arc::new(SerializationGate::with_poll_interval(Duration::from_millis(5)));

    let workers: Vec<_> = (0..6)
        .map(|index| {
            let device = device.clone();
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let ctx = OperationContext::new();
                let mut session = Session::open(device.connect(), &ctx).expect("open");
                let _guard = gate.acquire(&ctx).expect("gate");
                let path = ConfigPath::parse(&format!("interfaces ge-0/0/{index}")).expect("path");
                session.show_config(&ctx, &path).expect("show");
                execute(
                    &mut session,
                    &ctx,
                    &[line(&format!("set interfaces ge-0/0/{index} mtu 9000"))],
                    &CommitOptions::new(),
                )
                .expect("commit");
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker");
    }

    let gated: Vec<LoggedRequest> = device
        .log()
        .into_iter()
        .filter(|entry| !matches!(entry.kind, RequestKind::Facts | RequestKind::Close))
        .collect();
    assert_eq!(gated.len(), 6 * 5);
    assert_contiguous(&gated);
    assert_eq!(device.running().len(), 6);
}
