//! Crate-level codec tests over realistic resource layouts.

use rstest::{fixture, rstest};

use crate::{
    AttributeTree, ConfigPath, DecodeError, DecodeReason, ListOrder, Schema, ValueKind, build,
    parse, replace_lines,
};


/// Layout of an interface with logical units and address families.
pub(crate) fn interface_schema() -> Schema {
    let family_inet = Schema::builder()
        .list("address", "address", ValueKind::Text, ListOrder::Unordered)
        .scalar("mtu", "mtu", ValueKind::Unsigned)
        .build()
        .expect("inet schema");
    let family_inet6 = Schema::builder()
        .list("address", "address", ValueKind::Text, ListOrder::Unordered)
        .build()
        .expect("inet6 schema");
    let family = Schema::builder()
        .block("inet", "inet", family_inet)
        .block("inet6", "inet6", family_inet6)
        .build()
        .expect("family schema");
    let unit = Schema::builder()
        .scalar("description", "description", ValueKind::Text)
        .scalar("vlan_id", "vlan-id", ValueKind::Unsigned)
        .block("family", "family", family)
        .build()
        .expect("unit schema");
    Schema::builder()
        .scalar("description", "description", ValueKind::Text)
        .flag("disable", "disable")
        .scalar("mtu", "mtu", ValueKind::Unsigned)
        .flag("vlan_tagging", "vlan-tagging")
        .keyed("unit", "unit", unit)
        .build()
        .expect("interface schema")
}

/// Layout of a BGP group.
pub(crate) fn bgp_group_schema() -> Schema {
    Schema::builder()
        .scalar("kind", "type", ValueKind::Text)
        .scalar("peer_as", "peer-as", ValueKind::Unsigned)
        .scalar("preference", "preference", ValueKind::Integer)
        .scalar("metric_out", "metric-out", ValueKind::Unsigned)
        .flag("metric_out_igp", "metric-out igp")
        .list("import", "import", ValueKind::Text, ListOrder::Ordered)
        .list("export", "export", ValueKind::Text, ListOrder::Ordered)
        .keyed(
            "neighbor",
            "neighbor",
            Schema::builder()
                .scalar("description", "description", ValueKind::Text)
                .build()
                .expect("neighbor schema"),
        )
        .build()
        .expect("bgp group schema")
}

#[fixture]
fn interface_base() -> ConfigPath {
    ConfigPath::new(["interfaces", "ge-0/0/0"])
}

#[rstest]
fn decodes_nested_keyed_address(interface_base: ConfigPath) {
    let tree = parse(
        &interface_schema(),
        &interface_base,
        "set interfaces ge-0/0/0 unit 0 family inet address 10.0.0.1/24\n",
    )
    .expect("parse");

    let inet = tree
        .entry("unit", "0")
        .and_then(|unit| unit.block("family"))
        .and_then(|family| family.block("inet"))
        .expect("inet block");
    let addresses: Vec<String> = inet
        .list("address")
        .expect("address list")
        .iter()
        .map(crate::Scalar::to_token)
        .collect();
    assert_eq!(addresses, ["10.0.0.1/24"]);
    assert!(tree.text("description").is_none());
}

#[rstest]
fn round_trips_interface_tree(interface_base: ConfigPath) {
    let schema = interface_schema();
    let tree = AttributeTree::new()
        .with_text("description", "uplink to core")
        .with_unsigned("mtu", 9192)
        .with_flag("vlan_tagging", true)
        .with_entry(
            "unit",
            "0",
            AttributeTree::new().with_unsigned("vlan_id", 100).with_block(
                "family",
                AttributeTree::new().with_block(
                    "inet",
                    AttributeTree::new().with_text_list("address", ["10.0.0.1/24", "10.0.1.1/24"]),
                ),
            ),
        )
        .with_entry(
            "unit",
            "1",
            AttributeTree::new().with_block(
                "family",
                AttributeTree::new().with_block("inet6", AttributeTree::new()),
            ),
        );

    let lines = build(&schema, &interface_base, &tree).expect("build");
    let text = lines
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    insta::assert_snapshot!(text, @r#"
    set interfaces ge-0/0/0 description "uplink to core"
    set interfaces ge-0/0/0 mtu 9192
    set interfaces ge-0/0/0 vlan-tagging
    set interfaces ge-0/0/0 unit 0 vlan-id 100
    set interfaces ge-0/0/0 unit 0 family inet address 10.0.0.1/24
    set interfaces ge-0/0/0 unit 0 family inet address 10.0.1.1/24
    set interfaces ge-0/0/0 unit 1 family inet6
    "#);

    let decoded = parse(&schema, &interface_base, &text).expect("parse");
    assert_eq!(decoded.canonical(&schema), tree.canonical(&schema));
}

#[rstest]
fn unordered_lists_compare_equal_after_canonicalisation(interface_base: ConfigPath) {
    let schema = interface_schema();
    let text = "\
set interfaces ge-0/0/0 unit 0 family inet address 10.0.1.1/24
set interfaces ge-0/0/0 unit 0 family inet address 10.0.0.1/24
";
    let expected = AttributeTree::new().with_entry(
        "unit",
        "0",
        AttributeTree::new().with_block(
            "family",
            AttributeTree::new().with_block(
                "inet",
                AttributeTree::new().with_text_list("address", ["10.0.0.1/24", "10.0.1.1/24"]),
            ),
        ),
    );
    let decoded = parse(&schema, &interface_base, text).expect("parse");
    assert_ne!(decoded, expected);
    assert_eq!(decoded.canonical(&schema), expected.canonical(&schema));
}

#[rstest]
fn skips_output_framing_and_relative_lines() {
    let schema = bgp_group_schema();
    let base = ConfigPath::new(["protocols", "bgp", "group", "R1"]);
    let text = "\
<configuration-output>

{master}
set type external
set peer-as 65001
set export P1
set export P2
set neighbor 192.0.2.1 description \"edge peer\"
set bfd-liveness-detection minimum-interval 300
</configuration-output>
]]>]]>
";
    let tree = parse(&schema, &base, text).expect("parse");
    assert_eq!(tree.text("kind"), Some("external"));
    assert_eq!(tree.unsigned("peer_as"), Some(65001));
    assert_eq!(tree.list("export").map(<[_]>::len), Some(2));
    assert_eq!(
        tree.entry("neighbor", "192.0.2.1")
            .and_then(|neighbor| neighbor.text("description")),
        Some("edge peer")
    );
    assert!(tree.integer("preference").is_none());
    assert!(!tree.contains("bfd-liveness-detection"));
}

#[rstest]
fn sibling_resources_are_outside_the_base(interface_base: ConfigPath) {
    let schema = interface_schema();
    let text = "\
set interfaces ge-0/0/1 description x
set interfaces ge-0/0/1 unit 0 description y
set interfaces ge-0/0/0 mtu 9192
set description uplink
";
    let tree = parse(&schema, &interface_base, text).expect("parse");
    assert_eq!(
        tree,
        AttributeTree::new()
            .with_unsigned("mtu", 9192)
            .with_text("description", "uplink")
    );
}

#[rstest]
fn base_token_shared_with_a_field_is_not_read_as_relative() {
    let schema = Schema::builder()
        .scalar("community", "community", ValueKind::Text)
        .scalar("contact", "contact", ValueKind::Text)
        .build()
        .expect("schema");
    let base = ConfigPath::new(["community", "public"]);
    let text = "\
set community private contact noc
set community public contact ops
";
    let tree = parse(&schema, &base, text).expect("parse");
    assert_eq!(tree, AttributeTree::new().with_text("contact", "ops"));
}

#[rstest]
#[case("set metric-out igp", Some(true), None)]
#[case("set metric-out 20", None, Some(20))]
fn longest_keyword_prefix_wins(
    #[case] text: &str,
    #[case] igp: Option<bool>,
    #[case] metric: Option<u64>,
) {
    let tree = parse(&bgp_group_schema(), &ConfigPath::default(), text).expect("parse");
    assert_eq!(tree.flag("metric_out_igp"), igp);
    assert_eq!(tree.unsigned("metric_out"), metric);
}

#[rstest]
fn malformed_integer_names_line_and_field(interface_base: ConfigPath) {
    let line = "set interfaces ge-0/0/0 unit 0 vlan-id lots";
    let error = parse(&interface_schema(), &interface_base, line).expect_err("must fail");
    assert_eq!(error.line(), line);
    assert_eq!(error.field_path(), Some("unit[0].vlan_id"));
    assert_eq!(
        error,
        DecodeError::Field {
            line: line.to_owned(),
            field: String::from("unit[0].vlan_id"),
            reason: DecodeReason::InvalidNumber {
                token: String::from("lots"),
                kind: ValueKind::Unsigned,
            },
        }
    );
}

#[rstest]
fn unbalanced_quote_is_a_tokenise_failure() {
    let error = parse(
        &bgp_group_schema(),
        &ConfigPath::default(),
        "set neighbor 192.0.2.1 description \"open",
    )
    .expect_err("must fail");
    assert!(matches!(error, DecodeError::Tokenize { .. }));
    assert!(error.field_path().is_none());
}

#[rstest]
fn replacement_unsets_absent_attributes() {
    let schema = bgp_group_schema();
    let base = ConfigPath::new(["protocols", "bgp", "group", "R1"]);
    let tree = AttributeTree::new().with_text_list("export", ["P1"]);
    let lines = replace_lines(&schema, &base, &tree).expect("build");
    let rendered: Vec<String> = lines.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        [
            "delete protocols bgp group R1",
            "set protocols bgp group R1 export P1",
        ]
    );
}
