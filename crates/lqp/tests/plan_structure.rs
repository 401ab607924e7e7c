use std::sync::Arc;

use ciq_common::ColumnId;
use ciq_lqp::{
    plan_nodes, AggregateFunction, ColumnDefinition, DataType, DescriptionMode, EncodingType,
    Expression, JoinMode, LqpNode, NodeMapping, PredicateCondition, SortMode, TableDefinition,
    UnionMode, Value,
};

fn table(name: &str, columns: &[&str]) -> TableDefinition {
    TableDefinition {
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|column_name| ColumnDefinition {
                name: column_name.to_string(),
                data_type: DataType::Int,
                encoding: EncodingType::Dictionary,
                nullable: false,
            })
            .collect(),
        row_count: 500,
        key_constraints: vec![vec![ColumnId(0)]],
    }
}

fn column(node: &Arc<LqpNode>, id: u16) -> Arc<Expression> {
    Expression::column(node, ColumnId(id)).expect("column")
}

/// A representative plan exercising every node kind:
/// Limit over Sort over Aggregate over Join over (Predicate over scan, Validate over scan).
fn sample_plan() -> Arc<LqpNode> {
    let customers = LqpNode::stored_table(table("customers", &["id", "region"]));
    let orders = LqpNode::stored_table(table("orders", &["id", "customer_id", "total"]));

    let filtered = LqpNode::predicate(
        Expression::binary_predicate(
            column(&orders, 2),
            PredicateCondition::GreaterThan,
            Expression::value(Value::Int(100)),
        )
        .expect("predicate"),
        &orders,
    );
    let validated = LqpNode::validate(&customers);

    let join = LqpNode::join(
        JoinMode::Inner,
        vec![Expression::binary_predicate(
            column(&orders, 1),
            PredicateCondition::Equals,
            column(&customers, 0),
        )
        .expect("predicate")],
        &filtered,
        &validated,
    )
    .expect("join");

    let aggregate = LqpNode::aggregate(
        vec![column(&customers, 1)],
        vec![
            Expression::aggregate(AggregateFunction::Sum, Some(column(&orders, 2)))
                .expect("aggregate"),
        ],
        &join,
    )
    .expect("aggregate node");

    let sorted = LqpNode::sort(
        vec![column(&customers, 1)],
        vec![SortMode::Descending],
        &aggregate,
    )
    .expect("sort");
    LqpNode::limit(10, &sorted)
}

#[test]
fn shallow_copy_is_shallow_equal_under_identity_mapping() {
    let root = sample_plan();
    for node in plan_nodes(&root) {
        let mut mapping = NodeMapping::identity(&root);
        let copy = node.shallow_copy(&mut mapping);

        assert!(
            copy.shallow_equals(&node, &mapping),
            "shallow copy of {node} must shallow-equal the original"
        );
        assert!(copy.left_input().is_none());
        assert!(copy.right_input().is_none());
    }
}

#[test]
fn shallow_hash_is_stable_across_shallow_copy() {
    let root = sample_plan();
    for node in plan_nodes(&root) {
        let mut mapping = NodeMapping::identity(&root);
        let copy = node.shallow_copy(&mut mapping);
        assert_eq!(node.shallow_hash(), copy.shallow_hash());
    }
}

#[test]
fn shallow_equals_distinguishes_kinds_and_attributes() {
    let scan = LqpNode::stored_table(table("t", &["a"]));
    let identity = NodeMapping::default();

    let limit_10 = LqpNode::limit(10, &scan);
    let limit_20 = LqpNode::limit(20, &scan);
    assert!(!limit_10.shallow_equals(&limit_20, &identity));

    let validate = LqpNode::validate(&scan);
    assert!(!limit_10.shallow_equals(&validate, &identity));

    let other_limit_10 = LqpNode::limit(10, &scan);
    assert!(limit_10.shallow_equals(&other_limit_10, &identity));
}

#[test]
fn deep_copy_reproduces_structure_with_fresh_identities() {
    let root = sample_plan();
    let copy = root.deep_copy();

    let original_nodes = plan_nodes(&root);
    let copied_nodes = plan_nodes(&copy);
    assert_eq!(original_nodes.len(), copied_nodes.len());

    for (original, copied) in original_nodes.iter().zip(copied_nodes.iter()) {
        assert!(!Arc::ptr_eq(original, copied), "copies are distinct nodes");
        assert_eq!(original.shallow_hash(), copied.shallow_hash());
        assert_eq!(
            original.description(DescriptionMode::Detailed),
            copied.description(DescriptionMode::Detailed)
        );
    }

    // Derived properties agree.
    assert_eq!(
        root.output_column_count().expect("count"),
        copy.output_column_count().expect("count")
    );
    assert_eq!(
        root.constraints().expect("constraints").len(),
        copy.constraints().expect("constraints").len()
    );
}

#[test]
fn deep_copy_keeps_shared_subplans_shared() {
    let scan = LqpNode::stored_table(table("t", &["a"]));
    let cheap = LqpNode::predicate(
        Expression::binary_predicate(
            column(&scan, 0),
            PredicateCondition::LessThan,
            Expression::value(Value::Int(10)),
        )
        .expect("predicate"),
        &scan,
    );
    let expensive = LqpNode::predicate(
        Expression::binary_predicate(
            column(&scan, 0),
            PredicateCondition::GreaterThan,
            Expression::value(Value::Int(90)),
        )
        .expect("predicate"),
        &scan,
    );
    let union = LqpNode::union_node(UnionMode::All, &cheap, &expensive);

    let copy = union.deep_copy();
    let copied_left_scan = copy
        .left_input()
        .and_then(|n| n.left_input())
        .expect("left scan");
    let copied_right_scan = copy
        .right_input()
        .and_then(|n| n.left_input())
        .expect("right scan");

    // The shared scan was copied once, not duplicated per parent.
    assert!(Arc::ptr_eq(&copied_left_scan, &copied_right_scan));
    assert!(!Arc::ptr_eq(&copied_left_scan, &scan));
    assert_eq!(plan_nodes(&copy).len(), plan_nodes(&union).len());
}

#[test]
fn deep_copy_rewires_column_references_onto_copied_leaves() {
    let scan = LqpNode::stored_table(table("t", &["a"]));
    let filtered = LqpNode::predicate(
        Expression::binary_predicate(
            column(&scan, 0),
            PredicateCondition::Equals,
            Expression::value(Value::Int(1)),
        )
        .expect("predicate"),
        &scan,
    );

    let copy = filtered.deep_copy();
    let copied_scan = copy.left_input().expect("copied scan");

    // The copied predicate's column reference resolves within the copied plan.
    let copied_columns = copy.column_expressions().expect("columns");
    let reference = column(&copied_scan, 0);
    assert!(reference.semantically_equals(&copied_columns[0], &NodeMapping::default()));

    // Constraints of the copy are self-contained as well.
    assert!(copy
        .has_unique_constraint(&[reference])
        .expect("unique check"));
}

#[test]
fn column_expressions_and_nullability_are_index_aligned() {
    let root = sample_plan();
    for node in plan_nodes(&root) {
        let count = node.output_column_count().expect("count");
        for idx in 0..count {
            node.is_column_nullable(ColumnId(idx as u16))
                .expect("nullability defined for every output column");
        }
    }
}
