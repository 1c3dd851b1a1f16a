//! Engine tests against simulated devices.


use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use setline_codec::{AttributeTree, ConfigLine, ConfigPath, ListOrder, Scalar, Schema, ValueKind};
use setline_session::simulator::{RequestKind, SimulatedDevice};
use setline_session::{
    ConfigSession, DeviceFacts, Feature, MemorySink, OperationContext, SerializationGate, Session,
    SessionError,
};

use crate::{
    Action, DryRunSessionFactory, LockRetry, OperationError, ResourceEngine, ResourceSpec,
    SessionFactory,
};

/// Factory opening a fresh simulated session per call.
pub(crate) fn simulated(device: &SimulatedDevice) -> impl SessionFactory + use<> {
    let device = device.clone();
    move |ctx: &OperationContext| -> Result<Box<dyn ConfigSession>, SessionError> {
        Ok(Box::new(Session::open(device.connect(), ctx)?))
    }
}

pub(crate) fn engine(device: &SimulatedDevice) -> ResourceEngine<impl SessionFactory + use<>> {
    ResourceEngine::new(simulated(device), Arc::new(SerializationGate::new()))
}

pub(crate) fn interface_spec() -> ResourceSpec {
    let inet = Schema::builder()
        .list("address", "address", ValueKind::Text, ListOrder::Unordered)
        .build()
        .expect("inet schema");
    let family = Schema::builder()
        .block("inet", "inet", inet)
        .build()
        .expect("family schema");
    let unit = Schema::builder()
        .scalar("description", "description", ValueKind::Text)
        .block("family", "family", family)
        .build()
        .expect("unit schema");
    let schema = Schema::builder()
        .scalar("description", "description", ValueKind::Text)
        .scalar("mtu", "mtu", ValueKind::Unsigned)
        .keyed("unit", "unit", unit)
        .build()
        .expect("interface schema");
    ResourceSpec::new("interface", ConfigPath::new(["interfaces"]), schema)
}

pub(crate) fn nat_pool_spec() -> ResourceSpec {
    let schema = Schema::builder()
        .list("address", "address", ValueKind::Text, ListOrder::Unordered)
        .build()
        .expect("pool schema");
    ResourceSpec::new(
        "nat pool",
        ConfigPath::new(["security", "nat", "source", "pool"]),
        schema,
    )
    .with_feature(Feature::SecurityNat)
}

fn policy_spec() -> ResourceSpec {
    let from = Schema::builder()
        .scalar("protocol", "protocol", ValueKind::Text)
        .list("prefix_list", "prefix-list", ValueKind::Text, ListOrder::Ordered)
        .build()
        .expect("from schema");
    let term = Schema::builder()
        .block("from", "from", from)
        .flag("accept", "then accept")
        .flag("reject", "then reject")
        .build()
        .expect("term schema");
    let schema = Schema::builder()
        .keyed("term", "term", term)
        .build()
        .expect("policy schema");
    ResourceSpec::new(
        "policy",
        ConfigPath::new(["policy-options", "policy-statement"]),
        schema,
    )
}

fn policy(terms: u32) -> AttributeTree {
    (0..terms).fold(AttributeTree::new(), |tree, index| {
        tree.with_entry(
            "term",
            format!("t{index}"),
            AttributeTree::new()
                .with_block(
                    "from",
                    AttributeTree::new()
                        .with_text("protocol", "bgp")
                        .with_text_list("prefix_list", [format!("pl{index}")]),
                )
                .with_flag("accept", true),
        )
    })
}

#[fixture]
fn ctx() -> OperationContext {
    OperationContext::new()
}

#[fixture]
fn device() -> SimulatedDevice {
    SimulatedDevice::new("mx204", "21.4R3-S2.3")
}

#[rstest]
fn create_then_read_round_trips(ctx: OperationContext, device: SimulatedDevice) {
    let engine = engine(&device);
    let spec = interface_spec();
    let tree = AttributeTree::new()
        .with_text("description", "uplink to core")
        .with_unsigned("mtu", 9192);

    let summary = engine
        .create(&ctx, &spec, "ge-0/0/0", &tree)
        .expect("create");

    assert_eq!(summary.action, Action::Create);
    assert!(!summary.dry_run);
    assert_eq!(summary.lines.len(), 2);
    assert!(engine.exists(&ctx, &spec, "ge-0/0/0").expect("exists"));
    let read = engine
        .read(&ctx, &spec, "ge-0/0/0")
        .expect("read")
        .expect("resource present");
    assert_eq!(read.canonical(spec.schema()), tree.canonical(spec.schema()));
    let commits = device.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(
        commits.first().and_then(|commit| commit.comment.as_deref()),
        Some("create resource interface ge-0/0/0")
    );
    assert_eq!(device.lock_owner(), None);
}

#[rstest]
fn reading_an_absent_resource_returns_none(ctx: OperationContext, device: SimulatedDevice) {
    let read = engine(&device)
        .read(&ctx, &interface_spec(), "ge-0/0/9")
        .expect("read");
    assert!(read.is_none());
}

#[rstest]
fn reads_nested_unit_addresses(ctx: OperationContext, device: SimulatedDevice) {
    device
        .seed(&["set interfaces ge-0/0/0 unit 0 family inet address 10.0.0.1/24"])
        .expect("seed");
    let tree = engine(&device)
        .read(&ctx, &interface_spec(), "ge-0/0/0")
        .expect("read")
        .expect("present");
    let address = tree
        .entry("unit", "0")
        .and_then(|unit| unit.block("family"))
        .and_then(|family| family.block("inet"))
        .and_then(|inet| inet.list("address"))
        .and_then(<[_]>::first)
        .map(Scalar::to_token);
    assert_eq!(address.as_deref(), Some("10.0.0.1/24"));
}

#[rstest]
fn create_refuses_existing_resource_without_locking(ctx: OperationContext, device: SimulatedDevice) {
    device
        .seed(&["set interfaces ge-0/0/0 mtu 1500"])
        .expect("seed");
    let tree = AttributeTree::new().with_unsigned("mtu", 9192);

    let error = engine(&device)
        .create(&ctx, &interface_spec(), "ge-0/0/0", &tree)
        .expect_err("resource exists");

    assert!(matches!(error, OperationError::AlreadyExists { .. }), "{error}");
    assert!(device.log().iter().all(|entry| entry.kind != RequestKind::Lock));
    assert_eq!(device.running(), ["set interfaces ge-0/0/0 mtu 1500"]);
}

#[rstest]
fn unsupported_feature_fails_before_any_device_change(
    ctx: OperationContext,
    device: SimulatedDevice,
) {
    let tree = AttributeTree::new().with_text_list("address", ["192.0.2.0/24"]);

    let error = engine(&device)
        .create(&ctx, &nat_pool_spec(), "outbound", &tree)
        .expect_err("mx has no security nat");

    assert!(matches!(error, OperationError::Unsupported(_)), "{error}");
    assert_eq!(
        error.to_string(),
        "security-nat is not supported on mx204 running 21.4R3-S2.3"
    );
    assert!(
        device
            .log()
            .iter()
            .all(|entry| matches!(entry.kind, RequestKind::Facts | RequestKind::Close))
    );
}

#[rstest]
fn supported_feature_commits_on_firewalls(ctx: OperationContext) {
    let device = SimulatedDevice::new("srx345", "20.4R3");
    let tree = AttributeTree::new().with_text_list("address", ["192.0.2.0/24"]);
    engine(&device)
        .create(&ctx, &nat_pool_spec(), "outbound", &tree)
        .expect("srx supports nat");
    assert_eq!(
        device.running(),
        ["set security nat source pool outbound address 192.0.2.0/24"]
    );
}

#[rstest]
fn update_removes_attributes_missing_from_the_tree(ctx: OperationContext, device: SimulatedDevice) {
    device
        .seed(&[
            "set interfaces ge-0/0/0 description old",
            "set interfaces ge-0/0/0 mtu 1500",
        ])
        .expect("seed");
    let tree = AttributeTree::new().with_unsigned("mtu", 9192);

    let summary = engine(&device)
        .update(&ctx, &interface_spec(), "ge-0/0/0", &tree)
        .expect("update");

    assert_eq!(summary.action, Action::Update);
    assert_eq!(device.running(), ["set interfaces ge-0/0/0 mtu 9192"]);
}

#[rstest]
fn repeated_scalar_sets_read_back_the_latest_value(ctx: OperationContext, device: SimulatedDevice) {
    let engine = engine(&device);
    for description in ["first", "second"] {
        let lines: Vec<ConfigLine> = vec![
            format!("set interfaces ge-0/0/0 description {description}")
                .parse()
                .expect("line"),
        ];
        engine.apply_lines(&ctx, &lines, None).expect("apply");
    }

    let tree = engine
        .read(&ctx, &interface_spec(), "ge-0/0/0")
        .expect("read")
        .expect("present");
    assert_eq!(tree.text("description"), Some("second"));
    assert_eq!(
        device.running(),
        ["set interfaces ge-0/0/0 description second"]
    );
}

#[rstest]
fn delete_removes_the_subtree(ctx: OperationContext, device: SimulatedDevice) {
    device
        .seed(&[
            "set interfaces ge-0/0/0 mtu 1500",
            "set interfaces ge-0/0/0 unit 0 description mgmt",
            "set interfaces ge-0/0/1 mtu 1500",
        ])
        .expect("seed");
    let engine = engine(&device);
    let spec = interface_spec();

    engine.delete(&ctx, &spec, "ge-0/0/0").expect("delete");

    assert_eq!(device.running(), ["set interfaces ge-0/0/1 mtu 1500"]);
    assert!(!engine.exists(&ctx, &spec, "ge-0/0/0").expect("exists"));
}

#[rstest]
fn rejected_statement_leaves_committed_state(ctx: OperationContext, device: SimulatedDevice) {
    device
        .seed(&["set interfaces ge-0/0/0 mtu 1500"])
        .expect("seed");
    device.reject_token("frobnicate");
    let tree = AttributeTree::new().with_text("description", "frobnicate");

    let error = engine(&device)
        .update(&ctx, &interface_spec(), "ge-0/0/0", &tree)
        .expect_err("rejected");

    assert!(matches!(error, OperationError::Session(SessionError::Apply { .. })), "{error}");
    assert_eq!(device.running(), ["set interfaces ge-0/0/0 mtu 1500"]);
    assert_eq!(device.candidate(), device.running());
    assert_eq!(device.lock_owner(), None);
}

#[rstest]
fn comment_prefix_is_applied(ctx: OperationContext, device: SimulatedDevice) {
    let engine = engine(&device).with_comment_prefix("nightly");
    let lines: Vec<ConfigLine> = vec!["set system host-name edge1".parse().expect("line")];

    let summary = engine.apply_lines(&ctx, &lines, None).expect("apply");

    assert_eq!(summary.action, Action::Apply);
    assert_eq!(summary.resource, None);
    assert_eq!(
        device
            .commits()
            .first()
            .and_then(|commit| commit.comment.clone()),
        Some(String::from("nightly: apply 1 statements"))
    );
}

#[rstest]
fn dry_run_factory_writes_the_sink(ctx: OperationContext) {
    let sink = MemorySink::new();
    let facts = DeviceFacts::new("srx345", "20.4R3".parse().expect("version"));
    let factory = DryRunSessionFactory::new(sink.clone()).with_facts(facts);
    let engine = ResourceEngine::new(factory, Arc::new(SerializationGate::new()));
    let tree = AttributeTree::new().with_text_list("address", ["192.0.2.0/24"]);

    let summary = engine
        .create(&ctx, &nat_pool_spec(), "outbound", &tree)
        .expect("dry run create");

    assert!(summary.dry_run);
    assert_eq!(
        sink.script(),
        "set security nat source pool outbound address 192.0.2.0/24\n"
    );
}

#[rstest]
fn dry_run_without_facts_refuses_gated_features(ctx: OperationContext) {
    let engine = ResourceEngine::new(
        DryRunSessionFactory::new(MemorySink::new()),
        Arc::new(SerializationGate::new()),
    );
    let tree = AttributeTree::new().with_text_list("address", ["192.0.2.0/24"]);
    let error = engine
        .create(&ctx, &nat_pool_spec(), "outbound", &tree)
        .expect_err("unknown model");
    assert!(matches!(error, OperationError::Unsupported(_)));
}

#[rstest]
fn lock_held_elsewhere_fails_without_retry(ctx: OperationContext, device: SimulatedDevice) {
    device.hold_external_lock(true);
    let tree = AttributeTree::new().with_unsigned("mtu", 9192);
    let error = engine(&device)
        .create(&ctx, &interface_spec(), "ge-0/0/0", &tree)
        .expect_err("locked");
    assert!(error.is_lock_conflict());
    let locks = device
        .log()
        .iter()
        .filter(|entry| entry.kind == RequestKind::Lock)
        .count();
    assert_eq!(locks, 1);
}

#[rstest]
fn lock_retry_waits_for_release(device: SimulatedDevice) {
    device.hold_external_lock(true);
    let releaser = {
        let device = device.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            device.hold_external_lock(false);
        })
    };
    let engine = engine(&device);
    let spec = interface_spec();
    let tree = AttributeTree::new().with_unsigned("mtu", 9192);
    let ctx = OperationContext::new().with_timeout(Duration::from_secs(5));

    let summary = LockRetry::new(Duration::from_millis(10))
        .run(&ctx, || engine.create(&ctx, &spec, "ge-0/0/0", &tree))
        .expect("created after release");

    releaser.join().expect("releaser");
    assert_eq!(summary.action, Action::Create);
    assert_eq!(device.running(), ["set interfaces ge-0/0/0 mtu 9192"]);
}

#[rstest]
fn lock_retry_gives_up_at_the_deadline(device: SimulatedDevice) {
    device.hold_external_lock(true);
    let engine = engine(&device);
    let spec = interface_spec();
    let tree = AttributeTree::new().with_unsigned("mtu", 9192);
    let ctx = OperationContext::new().with_timeout(Duration::from_millis(60));

    let error = LockRetry::new(Duration::from_millis(10))
        .run(&ctx, || engine.create(&ctx, &spec, "ge-0/0/0", &tree))
        .expect_err("lock never frees");

    assert!(error.is_lock_conflict() || error.is_cancelled(), "{error}");
    assert!(device.running().is_empty());
}

#[rstest]
fn concurrent_creates_commit_contiguous_blocks(device: SimulatedDevice) {
    device.set_latency(Duration::from_millis(1));
    let engine = Arc::new(engine(&device));
    let spec = Arc::new(policy_spec());
    let start = Arc::new(Barrier::new(2));

    let workers: Vec<_> = ["P1", "P2"]
        .into_iter()
        .map(|name| {
            let engine = Arc::clone(&engine);
            let spec = Arc::clone(&spec);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                engine.create(&OperationContext::new(), &spec, name, &policy(3))
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker").expect("create");
    }

    let running = device.running();
    assert_eq!(running.len(), 18);
    for name in ["P1", "P2"] {
        let prefix = format!("set policy-options policy-statement {name} ");
        let positions: Vec<usize> = running
            .iter()
            .enumerate()
            .filter(|(_, line)| line.starts_with(&prefix))
            .map(|(index, _)| index)
            .collect();
        assert_eq!(positions.len(), 9, "{running:#?}");
        let span = positions.first().zip(positions.last()).map(|(first, last)| last - first);
        assert_eq!(span, Some(8), "{name} interleaved: {running:#?}");
    }
}
