use std::sync::Arc;

use ciq_common::ColumnId;
use ciq_lqp::{
    AggregateFunction, ColumnDefinition, DataType, EncodingType, Expression, JoinMode, LqpNode,
    PredicateCondition, TableDefinition, UnionMode, Value,
};

fn table(name: &str, columns: &[(&str, bool)]) -> TableDefinition {
    TableDefinition {
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|(column_name, nullable)| ColumnDefinition {
                name: column_name.to_string(),
                data_type: DataType::Int,
                encoding: EncodingType::Dictionary,
                nullable: *nullable,
            })
            .collect(),
        row_count: 100,
        key_constraints: vec![],
    }
}

fn column(node: &Arc<LqpNode>, id: u16) -> Arc<Expression> {
    Expression::column(node, ColumnId(id)).expect("column")
}

fn equi_join(mode: JoinMode, left: &Arc<LqpNode>, right: &Arc<LqpNode>) -> Arc<LqpNode> {
    LqpNode::join(
        mode,
        vec![Expression::binary_predicate(
            column(left, 0),
            PredicateCondition::Equals,
            column(right, 0),
        )
        .expect("predicate")],
        left,
        right,
    )
    .expect("join")
}

fn nullable(node: &Arc<LqpNode>, id: u16) -> bool {
    node.is_column_nullable(ColumnId(id)).expect("nullability")
}

#[test]
fn left_outer_join_makes_right_side_nullable() {
    let left = LqpNode::stored_table(table("l", &[("a", false), ("x", true)]));
    let right = LqpNode::stored_table(table("r", &[("b", false)]));
    let join = equi_join(JoinMode::Left, &left, &right);

    // Left side keeps its input nullability.
    assert!(!nullable(&join, 0));
    assert!(nullable(&join, 1));
    // Right side columns become nullable through null padding.
    assert!(nullable(&join, 2));
}

#[test]
fn right_outer_join_makes_left_side_nullable() {
    let left = LqpNode::stored_table(table("l", &[("a", false)]));
    let right = LqpNode::stored_table(table("r", &[("b", false), ("y", true)]));
    let join = equi_join(JoinMode::Right, &left, &right);

    assert!(nullable(&join, 0));
    assert!(!nullable(&join, 1));
    assert!(nullable(&join, 2));
}

#[test]
fn full_outer_join_makes_both_sides_nullable() {
    let left = LqpNode::stored_table(table("l", &[("a", false)]));
    let right = LqpNode::stored_table(table("r", &[("b", false)]));
    let join = equi_join(JoinMode::FullOuter, &left, &right);

    assert!(nullable(&join, 0));
    assert!(nullable(&join, 1));
}

#[test]
fn inner_and_semi_joins_pass_nullability_through() {
    let left = LqpNode::stored_table(table("l", &[("a", false), ("x", true)]));
    let right = LqpNode::stored_table(table("r", &[("b", true)]));

    let inner = equi_join(JoinMode::Inner, &left, &right);
    assert!(!nullable(&inner, 0));
    assert!(nullable(&inner, 1));
    assert!(nullable(&inner, 2));

    let semi = equi_join(JoinMode::Semi, &left, &right);
    assert_eq!(semi.output_column_count().expect("count"), 2);
    assert!(!nullable(&semi, 0));
    assert!(nullable(&semi, 1));
}

#[test]
fn predicate_does_not_alter_column_nullability() {
    let scan = LqpNode::stored_table(table("t", &[("a", false), ("x", true)]));
    let filtered = LqpNode::predicate(
        Expression::binary_predicate(
            column(&scan, 0),
            PredicateCondition::GreaterThan,
            Expression::value(Value::Int(0)),
        )
        .expect("predicate"),
        &scan,
    );

    assert!(!nullable(&filtered, 0));
    assert!(nullable(&filtered, 1));
}

#[test]
fn projection_nullability_follows_projected_expressions() {
    let scan = LqpNode::stored_table(table("t", &[("a", false), ("x", true)]));
    let projection = LqpNode::projection(
        vec![
            column(&scan, 1),
            column(&scan, 0),
            Expression::value(Value::Null),
        ],
        &scan,
    );

    assert!(nullable(&projection, 0));
    assert!(!nullable(&projection, 1));
    assert!(nullable(&projection, 2));
}

#[test]
fn projection_over_outer_join_sees_padded_nullability() {
    let left = LqpNode::stored_table(table("l", &[("a", false)]));
    let right = LqpNode::stored_table(table("r", &[("b", false)]));
    let join = equi_join(JoinMode::Left, &left, &right);

    // `b` is NOT NULL in the catalog, but the outer join pads it.
    let projection = LqpNode::projection(vec![column(&right, 0)], &join);
    assert!(nullable(&projection, 0));
}

#[test]
fn union_nullability_is_per_position_or() {
    let left = LqpNode::stored_table(table("l", &[("a", false), ("x", true), ("k", false)]));
    let right = LqpNode::stored_table(table("r", &[("b", true), ("y", false), ("m", false)]));
    let union = LqpNode::union_node(UnionMode::All, &left, &right);

    assert!(nullable(&union, 0));
    assert!(nullable(&union, 1));
    assert!(!nullable(&union, 2));
}

#[test]
fn ungrouped_aggregates_are_nullable_except_count() {
    let scan = LqpNode::stored_table(table("t", &[("a", false)]));
    let aggregate = LqpNode::aggregate(
        vec![],
        vec![
            Expression::aggregate(AggregateFunction::Count, None).expect("aggregate"),
            Expression::aggregate(AggregateFunction::Sum, Some(column(&scan, 0)))
                .expect("aggregate"),
            Expression::aggregate(AggregateFunction::Min, Some(column(&scan, 0)))
                .expect("aggregate"),
        ],
        &scan,
    )
    .expect("aggregate node");

    // COUNT(*) is never NULL; SUM/MIN over an empty input are.
    assert!(!nullable(&aggregate, 0));
    assert!(nullable(&aggregate, 1));
    assert!(nullable(&aggregate, 2));
}

#[test]
fn grouped_aggregates_follow_argument_nullability() {
    let scan = LqpNode::stored_table(table("t", &[("a", false), ("g", false)]));
    let aggregate = LqpNode::aggregate(
        vec![column(&scan, 1)],
        vec![
            Expression::aggregate(AggregateFunction::Sum, Some(column(&scan, 0)))
                .expect("aggregate"),
        ],
        &scan,
    )
    .expect("aggregate node");

    // Groups are non-empty by construction, so SUM over a NOT NULL column
    // cannot be NULL.
    assert!(!nullable(&aggregate, 0));
    assert!(!nullable(&aggregate, 1));
}
