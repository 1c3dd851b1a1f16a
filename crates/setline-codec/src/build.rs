//! Statement emission from attribute trees.

use crate::error::EncodeError;
use crate::line::{ConfigLine, ConfigPath};
use crate::schema::{FieldKind, Schema, ValueKind};
use crate::tree::{AttributeTree, Scalar, Value};

/// Builds `set` statements for every present value in `tree`.
///
/// Fields are visited in schema order; list fields emit one statement per
/// element in element order. A flag set to `false` and an empty list emit
/// nothing. A present but empty block or keyed entry emits a bare container
/// statement so its presence survives on the device.
///
/// # Errors
///
/// Returns [`EncodeError::UnknownAttribute`] when `tree` carries a name the
/// schema does not declare, and [`EncodeError::KindMismatch`] when a value
/// does not match the declared field kind.
pub fn build(
    schema: &Schema,
    base: &ConfigPath,
    tree: &AttributeTree,
) -> Result<Vec<ConfigLine>, EncodeError> {
    let mut lines = Vec::new();
    emit_level(schema, base, tree, "", &mut lines)?;
    Ok(lines)
}

/// Returns the statement that removes `base` and everything beneath it.
#[must_use]
pub fn delete_lines(base: &ConfigPath) -> Vec<ConfigLine> {
    vec![ConfigLine::delete(base.clone())]
}

/// Returns statements that replace the subtree at `base` with `tree`.
///
/// The subtree is deleted first, so attributes absent from `tree` end up
/// unset on the device once the batch is committed.
///
/// # Errors
///
/// Propagates [`build`] failures.
pub fn replace_lines(
    schema: &Schema,
    base: &ConfigPath,
    tree: &AttributeTree,
) -> Result<Vec<ConfigLine>, EncodeError> {
    let mut lines = delete_lines(base);
    lines.extend(build(schema, base, tree)?);
    Ok(lines)
}

fn attribute_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

fn emit_level(
    schema: &Schema,
    base: &ConfigPath,
    tree: &AttributeTree,
    prefix: &str,
    lines: &mut Vec<ConfigLine>,
) -> Result<(), EncodeError> {
    if let Some((name, _)) = tree.iter().find(|(name, _)| schema.field(name).is_none()) {
        return Err(EncodeError::UnknownAttribute {
            attribute: attribute_path(prefix, name),
        });
    }

    for field in schema.fields() {
        let Some(value) = tree.get(field.name()) else {
            continue;
        };
        let attribute = attribute_path(prefix, field.name());
        let keyed_path = base.join(field.keyword().iter().cloned());
        let mismatch = || EncodeError::KindMismatch {
            attribute: attribute.clone(),
            expected: field.kind().describe(),
        };

        match (field.kind(), value) {
            (FieldKind::Scalar(kind), Value::Scalar(scalar)) => {
                check_scalar(*kind, scalar).ok_or_else(mismatch)?;
                lines.push(ConfigLine::set(keyed_path.child(scalar.to_token())));
            }
            (FieldKind::Flag, Value::Flag(enabled)) => {
                if *enabled {
                    lines.push(ConfigLine::set(keyed_path));
                }
            }
            (FieldKind::List { value: kind, .. }, Value::List(values)) => {
                for scalar in values {
                    check_scalar(*kind, scalar).ok_or_else(mismatch)?;
                    lines.push(ConfigLine::set(keyed_path.child(scalar.to_token())));
                }
            }
            (FieldKind::Block(nested), Value::Block(block)) => {
                emit_container(nested, &keyed_path, block, &attribute, lines)?;
            }
            (FieldKind::Keyed(nested), Value::Keyed(entries)) => {
                for (index, entry) in entries.iter().enumerate() {
                    let entry_path = keyed_path.child(entry.key());
                    let entry_attribute = format!("{attribute}[{index}]");
                    emit_container(nested, &entry_path, entry.tree(), &entry_attribute, lines)?;
                }
            }
            _ => return Err(mismatch()),
        }
    }
    Ok(())
}

fn emit_container(
    schema: &Schema,
    path: &ConfigPath,
    tree: &AttributeTree,
    attribute: &str,
    lines: &mut Vec<ConfigLine>,
) -> Result<(), EncodeError> {
    let before = lines.len();
    emit_level(schema, path, tree, attribute, lines)?;
    if lines.len() == before {
        lines.push(ConfigLine::set(path.clone()));
    }
    Ok(())
}

fn check_scalar(kind: ValueKind, scalar: &Scalar) -> Option<()> {
    let matches = matches!(
        (kind, scalar),
        (ValueKind::Text, Scalar::Text(_))
            | (ValueKind::Integer, Scalar::Integer(_))
            | (ValueKind::Unsigned, Scalar::Unsigned(_))
    );
    matches.then_some(())
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::schema::ListOrder;

    #[fixture]
    fn group_schema() -> Schema {
        Schema::builder()
            .scalar("peer_as", "peer-as", ValueKind::Unsigned)
            .scalar("preference", "preference", ValueKind::Integer)
            .list("import", "import", ValueKind::Text, ListOrder::Ordered)
            .list("export", "export", ValueKind::Text, ListOrder::Ordered)
            .flag("passive", "passive")
            .block(
                "multipath",
                "multipath",
                Schema::builder()
                    .flag("multiple_as", "multiple-as")
                    .build()
                    .expect("nested schema"),
            )
            .build()
            .expect("schema")
    }

    #[fixture]
    fn base() -> ConfigPath {
        ConfigPath::new(["protocols", "bgp", "group", "R1"])
    }

    fn render(lines: &[ConfigLine]) -> Vec<String> {
        lines.iter().map(ToString::to_string).collect()
    }

    #[rstest]
    fn emits_only_present_values(group_schema: Schema, base: ConfigPath) {
        let tree = AttributeTree::new().with_text_list("export", ["P1", "P2"]);
        let lines = build(&group_schema, &base, &tree).expect("build");
        assert_eq!(
            render(&lines),
            [
                "set protocols bgp group R1 export P1",
                "set protocols bgp group R1 export P2",
            ]
        );
    }

    #[rstest]
    fn follows_schema_order_not_insertion_order(group_schema: Schema, base: ConfigPath) {
        let tree = AttributeTree::new()
            .with_flag("passive", true)
            .with_integer("preference", 0)
            .with_unsigned("peer_as", 65001);
        let lines = build(&group_schema, &base, &tree).expect("build");
        assert_eq!(
            render(&lines),
            [
                "set protocols bgp group R1 peer-as 65001",
                "set protocols bgp group R1 preference 0",
                "set protocols bgp group R1 passive",
            ]
        );
    }

    #[rstest]
    fn disabled_flag_and_empty_list_emit_nothing(group_schema: Schema, base: ConfigPath) {
        let tree = AttributeTree::new()
            .with_flag("passive", false)
            .with_list("import", Vec::new());
        assert!(build(&group_schema, &base, &tree).expect("build").is_empty());
    }

    #[rstest]
    fn empty_block_keeps_presence(group_schema: Schema, base: ConfigPath) {
        let tree = AttributeTree::new().with_block("multipath", AttributeTree::new());
        let lines = build(&group_schema, &base, &tree).expect("build");
        assert_eq!(render(&lines), ["set protocols bgp group R1 multipath"]);

        let tree = AttributeTree::new().with_block(
            "multipath",
            AttributeTree::new().with_flag("multiple_as", true),
        );
        let lines = build(&group_schema, &base, &tree).expect("build");
        assert_eq!(
            render(&lines),
            ["set protocols bgp group R1 multipath multiple-as"]
        );
    }

    #[rstest]
    fn rejects_unknown_attribute(group_schema: Schema, base: ConfigPath) {
        let tree = AttributeTree::new().with_text("neighbour", "10.0.0.1");
        let error = build(&group_schema, &base, &tree).expect_err("must fail");
        assert_eq!(
            error,
            EncodeError::UnknownAttribute {
                attribute: String::from("neighbour")
            }
        );
    }

    #[rstest]
    #[case(AttributeTree::new().with_text("preference", "high"), "preference")]
    #[case(AttributeTree::new().with_integer("peer_as", 65001), "peer_as")]
    #[case(AttributeTree::new().with_flag("export", true), "export")]
    fn rejects_kind_mismatch(
        group_schema: Schema,
        base: ConfigPath,
        #[case] tree: AttributeTree,
        #[case] attribute: &str,
    ) {
        let error = build(&group_schema, &base, &tree).expect_err("must fail");
        assert!(matches!(
            error,
            EncodeError::KindMismatch { attribute: ref name, .. } if name == attribute
        ));
    }

    #[rstest]
    fn replace_deletes_before_setting(group_schema: Schema, base: ConfigPath) {
        let tree = AttributeTree::new().with_integer("preference", 170);
        let lines = replace_lines(&group_schema, &base, &tree).expect("build");
        assert_eq!(
            render(&lines),
            [
                "delete protocols bgp group R1",
                "set protocols bgp group R1 preference 170",
            ]
        );
    }
}
