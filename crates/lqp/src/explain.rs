use std::collections::HashMap;
use std::sync::Arc;

use crate::expression::DescriptionMode;
use crate::node::LqpNode;

/// Render an LQP as human-readable multiline text.
///
/// Shared sub-plans are printed in full once; later occurrences are marked as
/// recurring.
pub fn explain_lqp(root: &Arc<LqpNode>) -> String {
    let mut out = String::new();
    let mut seen: HashMap<*const LqpNode, ()> = HashMap::new();
    fmt_node(root, 0, &mut seen, &mut out);
    out
}

fn fmt_node(
    node: &Arc<LqpNode>,
    indent: usize,
    seen: &mut HashMap<*const LqpNode, ()>,
    out: &mut String,
) {
    let pad = "  ".repeat(indent);
    let label = node.description(DescriptionMode::Short);
    if seen.insert(Arc::as_ptr(node), ()).is_some() {
        out.push_str(&format!("{pad}{label} (recurring subplan)\n"));
        return;
    }
    out.push_str(&format!("{pad}{label}\n"));
    if let Some(left) = node.left_input() {
        fmt_node(&left, indent + 1, seen, out);
    }
    if let Some(right) = node.right_input() {
        fmt_node(&right, indent + 1, seen, out);
    }
}

#[cfg(test)]
mod tests {
    use super::explain_lqp;
    use crate::catalog::{ColumnDefinition, TableDefinition};
    use crate::data_type::{DataType, EncodingType, Value};
    use crate::expression::{Expression, PredicateCondition};
    use crate::node::{JoinMode, LqpNode};
    use ciq_common::ColumnId;

    fn table(name: &str) -> TableDefinition {
        TableDefinition {
            name: name.to_string(),
            columns: vec![ColumnDefinition {
                name: "a".to_string(),
                data_type: DataType::Int,
                encoding: EncodingType::Dictionary,
                nullable: false,
            }],
            row_count: 10,
            key_constraints: vec![],
        }
    }

    #[test]
    fn explain_indents_inputs() {
        let scan = LqpNode::stored_table(table("t"));
        let a = Expression::column(&scan, ColumnId(0)).expect("column");
        let predicate = Expression::binary_predicate(
            a,
            PredicateCondition::GreaterThan,
            Expression::value(Value::Int(5)),
        )
        .expect("predicate");
        let filtered = LqpNode::predicate(predicate, &scan);

        let rendered = explain_lqp(&filtered);
        assert_eq!(rendered, "[Predicate] [a > 5]\n  [StoredTable] Name: 't'\n");
    }

    #[test]
    fn explain_marks_shared_subplans() {
        let scan = LqpNode::stored_table(table("t"));
        let a = Expression::column(&scan, ColumnId(0)).expect("column");
        let predicate = Expression::binary_predicate(
            a.clone(),
            PredicateCondition::Equals,
            a,
        )
        .expect("predicate");
        let join = LqpNode::join(JoinMode::Inner, vec![predicate], &scan, &scan).expect("join");

        let rendered = explain_lqp(&join);
        assert!(rendered.contains("(recurring subplan)"), "{rendered}");
        // The shared scan is expanded only once.
        assert_eq!(
            rendered
                .lines()
                .filter(|l| l.trim() == "[StoredTable] Name: 't'")
                .count(),
            1,
            "{rendered}"
        );
    }
}
