use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use ciq_common::{CiqError, ColumnId, Result};
use serde::{Deserialize, Serialize};

use crate::data_type::{data_types_compatible, DataType, Value};
use crate::node::{LqpNode, NodeKind, NodeMapping};

/// Rendering mode for plan and expression descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionMode {
    /// Column references render as bare column names.
    Short,
    /// Column references render qualified as `table.column`.
    Detailed,
}

/// Condition of a predicate expression.
///
/// The `Between*` conditions belong to the ternary [`Expression::Between`]
/// form; binary construction rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredicateCondition {
    /// `=`
    Equals,
    /// `!=`
    NotEquals,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEquals,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEquals,
    /// SQL `LIKE` over strings.
    Like,
    /// SQL `NOT LIKE` over strings.
    NotLike,
    /// Membership probe.
    In,
    /// Negated membership probe.
    NotIn,
    /// `BETWEEN` with both bounds inclusive.
    BetweenInclusive,
    /// `BETWEEN` with the lower bound exclusive.
    BetweenLowerExclusive,
    /// `BETWEEN` with the upper bound exclusive.
    BetweenUpperExclusive,
    /// `BETWEEN` with both bounds exclusive.
    BetweenExclusive,
}

impl PredicateCondition {
    /// Returns whether this is one of the ternary BETWEEN conditions.
    pub fn is_between(self) -> bool {
        matches!(
            self,
            PredicateCondition::BetweenInclusive
                | PredicateCondition::BetweenLowerExclusive
                | PredicateCondition::BetweenUpperExclusive
                | PredicateCondition::BetweenExclusive
        )
    }
}

impl fmt::Display for PredicateCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PredicateCondition::Equals => "=",
            PredicateCondition::NotEquals => "!=",
            PredicateCondition::LessThan => "<",
            PredicateCondition::LessThanEquals => "<=",
            PredicateCondition::GreaterThan => ">",
            PredicateCondition::GreaterThanEquals => ">=",
            PredicateCondition::Like => "LIKE",
            PredicateCondition::NotLike => "NOT LIKE",
            PredicateCondition::In => "IN",
            PredicateCondition::NotIn => "NOT IN",
            PredicateCondition::BetweenInclusive => "BETWEEN",
            PredicateCondition::BetweenLowerExclusive => "BETWEEN (lower exclusive)",
            PredicateCondition::BetweenUpperExclusive => "BETWEEN (upper exclusive)",
            PredicateCondition::BetweenExclusive => "BETWEEN (exclusive)",
        };
        write!(f, "{s}")
    }
}

/// Binary logical combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOperator {
    /// Conjunction.
    And,
    /// Disjunction.
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        };
        write!(f, "{s}")
    }
}

/// Aggregate function tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    /// `COUNT(expr)` or `COUNT(*)`.
    Count,
    /// `SUM(expr)`.
    Sum,
    /// `MIN(expr)`.
    Min,
    /// `MAX(expr)`.
    Max,
    /// `AVG(expr)`.
    Avg,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Avg => "AVG",
        };
        write!(f, "{s}")
    }
}

/// A scalar expression tree attached to LQP nodes.
///
/// Closed tagged union; function/arithmetic expressions are the designated
/// extension point. Construction goes through the checked factories below,
/// which enforce the operand compatibility matrix.
#[derive(Debug)]
pub enum Expression {
    /// A typed constant.
    Value(Value),
    /// Back-reference to a column defined by a stored table node.
    ///
    /// Identity is `(node identity, column id)`. The reference is weak: it
    /// confers no ownership, and structural copies rewrite it through a
    /// [`NodeMapping`].
    LqpColumn {
        /// The node defining the column.
        node: Weak<LqpNode>,
        /// Position of the column within the node's output.
        column_id: ColumnId,
    },
    /// Binary predicate, e.g. `a <= 5`.
    BinaryPredicate {
        /// Left operand.
        left: Arc<Expression>,
        /// Predicate condition.
        condition: PredicateCondition,
        /// Right operand.
        right: Arc<Expression>,
    },
    /// Logical combinator over two predicates.
    Logical {
        /// Left operand.
        left: Arc<Expression>,
        /// AND / OR.
        operator: LogicalOperator,
        /// Right operand.
        right: Arc<Expression>,
    },
    /// Ternary range predicate, e.g. `a BETWEEN 1 AND 10`.
    Between {
        /// One of the `Between*` conditions.
        condition: PredicateCondition,
        /// The probed operand.
        value: Arc<Expression>,
        /// Lower bound.
        lower: Arc<Expression>,
        /// Upper bound.
        upper: Arc<Expression>,
    },
    /// Aggregate over an optional argument; `COUNT(*)` carries none.
    Aggregate {
        /// Aggregate function tag.
        function: AggregateFunction,
        /// Aggregated expression, absent for `COUNT(*)`.
        argument: Option<Arc<Expression>>,
    },
}

impl Expression {
    /// Wraps a constant.
    pub fn value(value: Value) -> Arc<Expression> {
        Arc::new(Expression::Value(value))
    }

    /// Creates a column reference into `node`, which must be a stored table
    /// defining the column.
    pub fn column(node: &Arc<LqpNode>, column_id: ColumnId) -> Result<Arc<Expression>> {
        match node.kind() {
            NodeKind::StoredTable { table } => {
                if table.column(column_id).is_none() {
                    return Err(CiqError::UnknownColumn(format!(
                        "table '{}' has no column {column_id}",
                        table.name
                    )));
                }
            }
            _ => {
                return Err(CiqError::UnknownColumn(
                    "column references must name a stored table column".to_string(),
                ))
            }
        }
        Ok(Arc::new(Expression::LqpColumn {
            node: Arc::downgrade(node),
            column_id,
        }))
    }

    /// Creates a binary predicate, enforcing the operand compatibility matrix.
    pub fn binary_predicate(
        left: Arc<Expression>,
        condition: PredicateCondition,
        right: Arc<Expression>,
    ) -> Result<Arc<Expression>> {
        if condition.is_between() {
            return Err(CiqError::InvariantViolation(
                "BETWEEN predicates are ternary; use Expression::between".to_string(),
            ));
        }
        let left_type = left.data_type()?;
        let right_type = right.data_type()?;
        match condition {
            PredicateCondition::Like | PredicateCondition::NotLike => {
                if left_type != DataType::String || right_type != DataType::String {
                    return Err(CiqError::IncompatibleTypes(format!(
                        "{condition} requires string operands, got {left_type} and {right_type}"
                    )));
                }
            }
            _ => {
                if !data_types_compatible(left_type, right_type) {
                    return Err(CiqError::IncompatibleTypes(format!(
                        "cannot compare {left_type} against {right_type}"
                    )));
                }
            }
        }
        Ok(Arc::new(Expression::BinaryPredicate {
            left,
            condition,
            right,
        }))
    }

    /// Combines two predicates with AND / OR.
    ///
    /// Predicate results surface as `int`; both operands must carry that type.
    pub fn logical(
        left: Arc<Expression>,
        operator: LogicalOperator,
        right: Arc<Expression>,
    ) -> Result<Arc<Expression>> {
        let left_type = left.data_type()?;
        let right_type = right.data_type()?;
        if left_type != DataType::Int || right_type != DataType::Int {
            return Err(CiqError::IncompatibleTypes(format!(
                "{operator} requires predicate operands, got {left_type} and {right_type}"
            )));
        }
        Ok(Arc::new(Expression::Logical {
            left,
            operator,
            right,
        }))
    }

    /// Creates a ternary BETWEEN predicate.
    pub fn between(
        condition: PredicateCondition,
        value: Arc<Expression>,
        lower: Arc<Expression>,
        upper: Arc<Expression>,
    ) -> Result<Arc<Expression>> {
        if !condition.is_between() {
            return Err(CiqError::InvariantViolation(format!(
                "{condition} is not a BETWEEN condition"
            )));
        }
        let value_type = value.data_type()?;
        for bound in [&lower, &upper] {
            let bound_type = bound.data_type()?;
            if !data_types_compatible(value_type, bound_type) {
                return Err(CiqError::IncompatibleTypes(format!(
                    "cannot bound {value_type} by {bound_type}"
                )));
            }
        }
        Ok(Arc::new(Expression::Between {
            condition,
            value,
            lower,
            upper,
        }))
    }

    /// Creates an aggregate expression. `COUNT` accepts a missing argument
    /// (`COUNT(*)`); all other functions require one, and `SUM`/`AVG` require
    /// it to be numeric.
    pub fn aggregate(
        function: AggregateFunction,
        argument: Option<Arc<Expression>>,
    ) -> Result<Arc<Expression>> {
        match (&argument, function) {
            (None, AggregateFunction::Count) => {}
            (None, _) => {
                return Err(CiqError::InvariantViolation(format!(
                    "{function} requires an argument"
                )))
            }
            (Some(arg), AggregateFunction::Sum | AggregateFunction::Avg) => {
                let arg_type = arg.data_type()?;
                if !arg_type.is_numeric() {
                    return Err(CiqError::IncompatibleTypes(format!(
                        "{function} requires a numeric argument, got {arg_type}"
                    )));
                }
            }
            (Some(_), _) => {}
        }
        Ok(Arc::new(Expression::Aggregate { function, argument }))
    }

    /// The scalar type this expression produces.
    ///
    /// Predicates and logical combinators surface as `int`; the type registry
    /// carries no bool tag.
    pub fn data_type(&self) -> Result<DataType> {
        match self {
            Expression::Value(value) => Ok(value.data_type()),
            Expression::LqpColumn { node, column_id } => {
                let node = node.upgrade().ok_or_else(|| {
                    CiqError::UnknownColumn("referenced node has been released".to_string())
                })?;
                match node.kind() {
                    NodeKind::StoredTable { table } => table
                        .column(*column_id)
                        .map(|c| c.data_type)
                        .ok_or_else(|| {
                            CiqError::UnknownColumn(format!(
                                "table '{}' has no column {column_id}",
                                table.name
                            ))
                        }),
                    _ => Err(CiqError::UnknownColumn(
                        "column reference does not name a stored table column".to_string(),
                    )),
                }
            }
            Expression::BinaryPredicate { .. }
            | Expression::Logical { .. }
            | Expression::Between { .. } => Ok(DataType::Int),
            Expression::Aggregate { function, argument } => match function {
                AggregateFunction::Count => Ok(DataType::Long),
                AggregateFunction::Avg => Ok(DataType::Double),
                AggregateFunction::Sum => {
                    let arg = argument.as_ref().ok_or_else(|| {
                        CiqError::InvariantViolation("SUM requires an argument".to_string())
                    })?;
                    Ok(match arg.data_type()? {
                        DataType::Int | DataType::Long => DataType::Long,
                        DataType::Float | DataType::Double => DataType::Double,
                        other => other,
                    })
                }
                AggregateFunction::Min | AggregateFunction::Max => {
                    let arg = argument.as_ref().ok_or_else(|| {
                        CiqError::InvariantViolation(format!("{function} requires an argument"))
                    })?;
                    arg.data_type()
                }
            },
        }
    }

    /// Whether the expression may yield NULL when evaluated on the output of
    /// `lqp`.
    ///
    /// Standard three-valued logic: a compound expression is nullable when any
    /// operand is. Column references resolve their nullability against `lqp`,
    /// so outer-join null-padding upstream is honored.
    pub fn is_nullable_on(&self, lqp: &LqpNode) -> Result<bool> {
        match self {
            Expression::Value(value) => Ok(value.is_null()),
            Expression::LqpColumn { .. } => {
                let columns = lqp.column_expressions()?;
                let idx = find_expression_idx(self, &columns).ok_or_else(|| {
                    CiqError::UnknownColumn(
                        "column reference is not part of the given plan's output".to_string(),
                    )
                })?;
                lqp.is_column_nullable(ColumnId(idx as u16))
            }
            Expression::BinaryPredicate { left, right, .. } => {
                Ok(left.is_nullable_on(lqp)? || right.is_nullable_on(lqp)?)
            }
            Expression::Logical { left, right, .. } => {
                Ok(left.is_nullable_on(lqp)? || right.is_nullable_on(lqp)?)
            }
            Expression::Between {
                value,
                lower,
                upper,
                ..
            } => Ok(value.is_nullable_on(lqp)?
                || lower.is_nullable_on(lqp)?
                || upper.is_nullable_on(lqp)?),
            Expression::Aggregate { function, argument } => match function {
                AggregateFunction::Count => Ok(false),
                _ => match argument {
                    Some(arg) => arg.is_nullable_on(lqp),
                    None => Ok(false),
                },
            },
        }
    }

    /// Human-readable infix rendering.
    pub fn description(&self, mode: DescriptionMode) -> String {
        match self {
            Expression::Value(value) => value.to_string(),
            Expression::LqpColumn { node, column_id } => match node.upgrade() {
                Some(node) => match node.kind() {
                    NodeKind::StoredTable { table } => match table.column(*column_id) {
                        Some(column) => match mode {
                            DescriptionMode::Short => column.name.clone(),
                            DescriptionMode::Detailed => {
                                format!("{}.{}", table.name, column.name)
                            }
                        },
                        None => format!("Column#{column_id}"),
                    },
                    _ => format!("Column#{column_id}"),
                },
                None => format!("Column#{column_id}"),
            },
            Expression::BinaryPredicate {
                left,
                condition,
                right,
            } => format!(
                "{} {condition} {}",
                left.description(mode),
                right.description(mode)
            ),
            Expression::Logical {
                left,
                operator,
                right,
            } => format!(
                "({}) {operator} ({})",
                left.description(mode),
                right.description(mode)
            ),
            Expression::Between {
                condition,
                value,
                lower,
                upper,
            } => format!(
                "{} {condition} {} AND {}",
                value.description(mode),
                lower.description(mode),
                upper.description(mode)
            ),
            Expression::Aggregate { function, argument } => match argument {
                Some(arg) => format!("{function}({})", arg.description(mode)),
                None => format!("{function}(*)"),
            },
        }
    }

    /// Structural hash; column references hash by node identity and index.
    ///
    /// Stable under the identity mapping, so it agrees with
    /// [`Expression::semantically_equals`] within a single plan.
    pub fn semantic_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_into(&mut hasher);
        hasher.finish()
    }

    fn hash_into<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Expression::Value(value) => value.hash_into(state),
            Expression::LqpColumn { node, column_id } => {
                (node.as_ptr() as usize).hash(state);
                column_id.hash(state);
            }
            Expression::BinaryPredicate {
                left,
                condition,
                right,
            } => {
                condition.hash(state);
                left.hash_into(state);
                right.hash_into(state);
            }
            Expression::Logical {
                left,
                operator,
                right,
            } => {
                operator.hash(state);
                left.hash_into(state);
                right.hash_into(state);
            }
            Expression::Between {
                condition,
                value,
                lower,
                upper,
            } => {
                condition.hash(state);
                value.hash_into(state);
                lower.hash_into(state);
                upper.hash_into(state);
            }
            Expression::Aggregate { function, argument } => {
                function.hash(state);
                if let Some(arg) = argument {
                    arg.hash_into(state);
                }
            }
        }
    }

    /// Structural equality with column-reference node identity compared
    /// through `mapping`; nodes absent from the mapping compare by their own
    /// identity.
    pub fn semantically_equals(&self, other: &Expression, mapping: &NodeMapping) -> bool {
        match (self, other) {
            (Expression::Value(a), Expression::Value(b)) => a == b,
            (
                Expression::LqpColumn { node, column_id },
                Expression::LqpColumn {
                    node: other_node,
                    column_id: other_column_id,
                },
            ) => {
                column_id == other_column_id
                    && std::ptr::eq(mapping.resolve_ptr(node), other_node.as_ptr())
            }
            (
                Expression::BinaryPredicate {
                    left,
                    condition,
                    right,
                },
                Expression::BinaryPredicate {
                    left: other_left,
                    condition: other_condition,
                    right: other_right,
                },
            ) => {
                condition == other_condition
                    && left.semantically_equals(other_left, mapping)
                    && right.semantically_equals(other_right, mapping)
            }
            (
                Expression::Logical {
                    left,
                    operator,
                    right,
                },
                Expression::Logical {
                    left: other_left,
                    operator: other_operator,
                    right: other_right,
                },
            ) => {
                operator == other_operator
                    && left.semantically_equals(other_left, mapping)
                    && right.semantically_equals(other_right, mapping)
            }
            (
                Expression::Between {
                    condition,
                    value,
                    lower,
                    upper,
                },
                Expression::Between {
                    condition: other_condition,
                    value: other_value,
                    lower: other_lower,
                    upper: other_upper,
                },
            ) => {
                condition == other_condition
                    && value.semantically_equals(other_value, mapping)
                    && lower.semantically_equals(other_lower, mapping)
                    && upper.semantically_equals(other_upper, mapping)
            }
            (
                Expression::Aggregate { function, argument },
                Expression::Aggregate {
                    function: other_function,
                    argument: other_argument,
                },
            ) => {
                function == other_function
                    && match (argument, other_argument) {
                        (None, None) => true,
                        (Some(a), Some(b)) => a.semantically_equals(b, mapping),
                        _ => false,
                    }
            }
            _ => false,
        }
    }

    /// Clones the tree, rewriting column references through `mapping`.
    pub fn deep_copy_with(&self, mapping: &NodeMapping) -> Arc<Expression> {
        match self {
            Expression::Value(value) => Arc::new(Expression::Value(value.clone())),
            Expression::LqpColumn { node, column_id } => Arc::new(Expression::LqpColumn {
                node: mapping.resolve_weak(node),
                column_id: *column_id,
            }),
            Expression::BinaryPredicate {
                left,
                condition,
                right,
            } => Arc::new(Expression::BinaryPredicate {
                left: left.deep_copy_with(mapping),
                condition: *condition,
                right: right.deep_copy_with(mapping),
            }),
            Expression::Logical {
                left,
                operator,
                right,
            } => Arc::new(Expression::Logical {
                left: left.deep_copy_with(mapping),
                operator: *operator,
                right: right.deep_copy_with(mapping),
            }),
            Expression::Between {
                condition,
                value,
                lower,
                upper,
            } => Arc::new(Expression::Between {
                condition: *condition,
                value: value.deep_copy_with(mapping),
                lower: lower.deep_copy_with(mapping),
                upper: upper.deep_copy_with(mapping),
            }),
            Expression::Aggregate { function, argument } => Arc::new(Expression::Aggregate {
                function: *function,
                argument: argument.as_ref().map(|arg| arg.deep_copy_with(mapping)),
            }),
        }
    }
}

/// Slice-wise [`Expression::semantically_equals`].
pub fn expressions_equal_across_plans(
    a: &[Arc<Expression>],
    b: &[Arc<Expression>],
    mapping: &NodeMapping,
) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.semantically_equals(y, mapping))
}

/// Slice-wise [`Expression::deep_copy_with`].
pub fn expressions_deep_copy(
    expressions: &[Arc<Expression>],
    mapping: &NodeMapping,
) -> Vec<Arc<Expression>> {
    expressions
        .iter()
        .map(|e| e.deep_copy_with(mapping))
        .collect()
}

/// Position of `needle` within `haystack`, compared within a single plan
/// (identity mapping).
pub fn find_expression_idx(needle: &Expression, haystack: &[Arc<Expression>]) -> Option<usize> {
    let identity = NodeMapping::default();
    haystack
        .iter()
        .position(|candidate| needle.semantically_equals(candidate, &identity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDefinition, TableDefinition};
    use crate::data_type::EncodingType;
    use crate::node::LqpNode;
    use ciq_common::ColumnId;

    fn orders_table() -> Arc<LqpNode> {
        LqpNode::stored_table(TableDefinition {
            name: "orders".to_string(),
            columns: vec![
                ColumnDefinition {
                    name: "id".to_string(),
                    data_type: DataType::Int,
                    encoding: EncodingType::Dictionary,
                    nullable: false,
                },
                ColumnDefinition {
                    name: "note".to_string(),
                    data_type: DataType::String,
                    encoding: EncodingType::Unencoded,
                    nullable: true,
                },
            ],
            row_count: 50,
            key_constraints: vec![vec![ColumnId(0)]],
        })
    }

    #[test]
    fn binary_predicate_rejects_incompatible_operands() {
        let scan = orders_table();
        let id = Expression::column(&scan, ColumnId(0)).expect("column");
        let note = Expression::column(&scan, ColumnId(1)).expect("column");

        let err = Expression::binary_predicate(id, PredicateCondition::Equals, note)
            .expect_err("string vs int must fail");
        assert!(err.to_string().contains("incompatible types"), "{err}");
    }

    #[test]
    fn like_requires_string_operands() {
        let scan = orders_table();
        let id = Expression::column(&scan, ColumnId(0)).expect("column");
        let pattern = Expression::value(Value::String("a%".to_string()));

        let err = Expression::binary_predicate(id, PredicateCondition::Like, pattern)
            .expect_err("LIKE over int must fail");
        assert!(err.to_string().contains("string operands"), "{err}");

        let note = Expression::column(&scan, ColumnId(1)).expect("column");
        let pattern = Expression::value(Value::String("a%".to_string()));
        Expression::binary_predicate(note, PredicateCondition::Like, pattern)
            .expect("LIKE over strings");
    }

    #[test]
    fn between_conditions_are_ternary_only() {
        let scan = orders_table();
        let id = Expression::column(&scan, ColumnId(0)).expect("column");

        let err = Expression::binary_predicate(
            id.clone(),
            PredicateCondition::BetweenInclusive,
            Expression::value(Value::Int(1)),
        )
        .expect_err("binary BETWEEN must fail");
        assert!(err.to_string().contains("ternary"), "{err}");

        let between = Expression::between(
            PredicateCondition::BetweenInclusive,
            id,
            Expression::value(Value::Int(1)),
            Expression::value(Value::Int(10)),
        )
        .expect("ternary BETWEEN");
        assert_eq!(
            between.description(DescriptionMode::Short),
            "id BETWEEN 1 AND 10"
        );
    }

    #[test]
    fn null_literal_compares_against_anything() {
        let scan = orders_table();
        let id = Expression::column(&scan, ColumnId(0)).expect("column");
        Expression::binary_predicate(id, PredicateCondition::Equals, Expression::value(Value::Null))
            .expect("NULL comparison");
    }

    #[test]
    fn nullability_is_three_valued() {
        let scan = orders_table();
        let id = Expression::column(&scan, ColumnId(0)).expect("column");
        let note = Expression::column(&scan, ColumnId(1)).expect("column");

        assert!(!id.is_nullable_on(&scan).expect("nullability"));
        assert!(note.is_nullable_on(&scan).expect("nullability"));

        let predicate = Expression::binary_predicate(
            note,
            PredicateCondition::Equals,
            Expression::value(Value::String("x".to_string())),
        )
        .expect("predicate");
        assert!(predicate.is_nullable_on(&scan).expect("nullability"));

        let predicate = Expression::binary_predicate(
            id,
            PredicateCondition::LessThan,
            Expression::value(Value::Int(7)),
        )
        .expect("predicate");
        assert!(!predicate.is_nullable_on(&scan).expect("nullability"));
    }

    #[test]
    fn count_is_never_nullable() {
        let scan = orders_table();
        let note = Expression::column(&scan, ColumnId(1)).expect("column");
        let count =
            Expression::aggregate(AggregateFunction::Count, Some(note)).expect("aggregate");
        assert!(!count.is_nullable_on(&scan).expect("nullability"));
        assert_eq!(count.data_type().expect("type"), DataType::Long);
    }

    #[test]
    fn sum_requires_numeric_argument_and_widens() {
        let scan = orders_table();
        let note = Expression::column(&scan, ColumnId(1)).expect("column");
        let err = Expression::aggregate(AggregateFunction::Sum, Some(note))
            .expect_err("SUM over string must fail");
        assert!(err.to_string().contains("numeric"), "{err}");

        let id = Expression::column(&scan, ColumnId(0)).expect("column");
        let sum = Expression::aggregate(AggregateFunction::Sum, Some(id)).expect("aggregate");
        assert_eq!(sum.data_type().expect("type"), DataType::Long);
    }

    #[test]
    fn descriptions_render_infix() {
        let scan = orders_table();
        let id = Expression::column(&scan, ColumnId(0)).expect("column");
        let note = Expression::column(&scan, ColumnId(1)).expect("column");

        let left = Expression::binary_predicate(
            id,
            PredicateCondition::GreaterThanEquals,
            Expression::value(Value::Int(3)),
        )
        .expect("predicate");
        let right = Expression::binary_predicate(
            note,
            PredicateCondition::NotLike,
            Expression::value(Value::String("b%".to_string())),
        )
        .expect("predicate");
        let or = Expression::logical(left, LogicalOperator::Or, right).expect("logical");

        assert_eq!(
            or.description(DescriptionMode::Short),
            "(id >= 3) OR (note NOT LIKE 'b%')"
        );
        assert_eq!(
            or.description(DescriptionMode::Detailed),
            "(orders.id >= 3) OR (orders.note NOT LIKE 'b%')"
        );
    }

    #[test]
    fn deep_copy_rewrites_column_references_through_mapping() {
        let scan = orders_table();
        let copy = scan.deep_copy();
        let mut mapping = NodeMapping::default();
        mapping.insert(&scan, copy.clone());

        let id = Expression::column(&scan, ColumnId(0)).expect("column");
        let rewritten = id.deep_copy_with(&mapping);

        // The rewritten reference points at the copied node.
        assert!(!id.semantically_equals(&rewritten, &NodeMapping::default()));
        assert!(id.semantically_equals(&rewritten, &mapping));
        assert!(rewritten.semantically_equals(
            &Expression::column(&copy, ColumnId(0)).expect("column"),
            &NodeMapping::default()
        ));
    }

    #[test]
    fn semantic_hash_agrees_with_equality_within_a_plan() {
        let scan = orders_table();
        let a = Expression::binary_predicate(
            Expression::column(&scan, ColumnId(0)).expect("column"),
            PredicateCondition::Equals,
            Expression::value(Value::Int(1)),
        )
        .expect("predicate");
        let b = Expression::binary_predicate(
            Expression::column(&scan, ColumnId(0)).expect("column"),
            PredicateCondition::Equals,
            Expression::value(Value::Int(1)),
        )
        .expect("predicate");

        assert!(a.semantically_equals(&b, &NodeMapping::default()));
        assert_eq!(a.semantic_hash(), b.semantic_hash());
    }
}
