use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock, Weak};

use ciq_common::{CiqError, ColumnId, Result};
use serde::{Deserialize, Serialize};

use crate::catalog::TableDefinition;
use crate::constraints::{ConstraintSet, UniqueConstraint};
use crate::data_type::DataType;
use crate::expression::{
    expressions_deep_copy, expressions_equal_across_plans, find_expression_idx, AggregateFunction,
    DescriptionMode, Expression, PredicateCondition,
};

/// Row-combination and null-padding semantics of a join node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinMode {
    /// Inner equi/theta join.
    Inner,
    /// Left outer join; unmatched left rows are padded with NULLs on the right.
    Left,
    /// Right outer join; unmatched right rows are padded with NULLs on the left.
    Right,
    /// Full outer join; both sides may be padded.
    FullOuter,
    /// Cartesian product; carries no predicates.
    Cross,
    /// Left rows with at least one match on the right.
    Semi,
    /// Anti join treating NULL comparisons as TRUE.
    AntiNullAsTrue,
    /// Anti join treating NULL comparisons as FALSE.
    AntiNullAsFalse,
}

impl JoinMode {
    /// Whether the join outputs only the left input's columns.
    pub fn outputs_left_input_only(self) -> bool {
        matches!(
            self,
            JoinMode::Semi | JoinMode::AntiNullAsTrue | JoinMode::AntiNullAsFalse
        )
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinMode::Inner => "Inner",
            JoinMode::Left => "Left",
            JoinMode::Right => "Right",
            JoinMode::FullOuter => "FullOuter",
            JoinMode::Cross => "Cross",
            JoinMode::Semi => "Semi",
            JoinMode::AntiNullAsTrue => "AntiNullAsTrue",
            JoinMode::AntiNullAsFalse => "AntiNullAsFalse",
        };
        write!(f, "{s}")
    }
}

/// How a predicate node expects to be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanType {
    /// Sequential table scan.
    TableScan,
    /// Index-backed scan.
    IndexScan,
}

/// Sort direction for one sort expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortMode {
    /// Ascending order.
    Ascending,
    /// Descending order.
    Descending,
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortMode::Ascending => "Ascending",
            SortMode::Descending => "Descending",
        };
        write!(f, "{s}")
    }
}

/// Set-combination mode of a union node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnionMode {
    /// Bag union of both inputs (UNION ALL).
    All,
    /// Positional merge of row selections over the same source, used for
    /// side-by-side alternative scans.
    Positions,
}

impl fmt::Display for UnionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnionMode::All => "All",
            UnionMode::Positions => "Positions",
        };
        write!(f, "{s}")
    }
}

/// Kind-specific payload of an LQP node.
///
/// Closed tagged union; nodes are created through the checked factories on
/// [`LqpNode`], which uphold the per-kind structural invariants.
#[derive(Debug)]
pub enum NodeKind {
    /// Leaf over a catalog table.
    StoredTable {
        /// Catalog snapshot of the table.
        table: TableDefinition,
    },
    /// Row filter.
    Predicate {
        /// The filter predicate.
        predicate: Arc<Expression>,
        /// Requested scan flavor.
        scan_type: ScanType,
    },
    /// Column list rewrite.
    Projection {
        /// The projection list; defines the output columns.
        expressions: Vec<Arc<Expression>>,
    },
    /// Two-input join.
    Join {
        /// Join mode.
        mode: JoinMode,
        /// Join predicates; empty exactly for cross joins.
        predicates: Vec<Arc<Expression>>,
    },
    /// Grouping aggregation.
    Aggregate {
        /// Group-by column expressions; lead the output columns.
        group_by: Vec<Arc<Expression>>,
        /// Aggregate expressions; trail the output columns.
        aggregates: Vec<Arc<Expression>>,
    },
    /// Row reordering.
    Sort {
        /// Sort expressions.
        expressions: Vec<Arc<Expression>>,
        /// Per-expression direction, same length as `expressions`.
        sort_modes: Vec<SortMode>,
    },
    /// Row-count cap.
    Limit {
        /// Maximum number of rows to pass through.
        num_rows: usize,
    },
    /// Two-input set combination.
    Union {
        /// Set-combination mode.
        mode: UnionMode,
    },
    /// MVCC visibility filter; passes the schema through.
    Validate,
}

/// A vertex of the logical query plan DAG.
///
/// Identity is by pointer: two structurally equal nodes are distinct unless an
/// external pass deduplicates them. Nodes are held by shared handles so a
/// sub-plan may feed several parents; inputs are wired after construction and
/// must not be reassigned once the plan is published to concurrent readers.
///
/// Derived properties (`column_expressions`, `is_column_nullable`,
/// `constraints`) are recomputed from live inputs on every call. An overhead,
/// but it keeps the LQP code simple; propagating input-changed notifications
/// through the DAG required a lot of feeble bookkeeping.
#[derive(Debug)]
pub struct LqpNode {
    kind: NodeKind,
    inputs: RwLock<[Option<Arc<LqpNode>>; 2]>,
    outputs: RwLock<Vec<Weak<LqpNode>>>,
    self_weak: Weak<LqpNode>,
}

impl LqpNode {
    fn make(kind: NodeKind) -> Arc<LqpNode> {
        Arc::new_cyclic(|self_weak| LqpNode {
            kind,
            inputs: RwLock::new([None, None]),
            outputs: RwLock::new(Vec::new()),
            self_weak: self_weak.clone(),
        })
    }

    /// Creates a leaf node over a catalog table.
    pub fn stored_table(table: TableDefinition) -> Arc<LqpNode> {
        Self::make(NodeKind::StoredTable { table })
    }

    /// Creates a predicate node over `input` with a sequential scan.
    pub fn predicate(predicate: Arc<Expression>, input: &Arc<LqpNode>) -> Arc<LqpNode> {
        Self::predicate_with_scan_type(predicate, ScanType::TableScan, input)
    }

    /// Creates a predicate node with an explicit scan flavor.
    pub fn predicate_with_scan_type(
        predicate: Arc<Expression>,
        scan_type: ScanType,
        input: &Arc<LqpNode>,
    ) -> Arc<LqpNode> {
        let node = Self::make(NodeKind::Predicate {
            predicate,
            scan_type,
        });
        node.set_left_input(Some(input.clone()));
        node
    }

    /// Creates a projection node over `input`.
    pub fn projection(expressions: Vec<Arc<Expression>>, input: &Arc<LqpNode>) -> Arc<LqpNode> {
        let node = Self::make(NodeKind::Projection { expressions });
        node.set_left_input(Some(input.clone()));
        node
    }

    /// Creates a join node.
    ///
    /// Cross joins take no predicates; every other mode requires at least one.
    pub fn join(
        mode: JoinMode,
        predicates: Vec<Arc<Expression>>,
        left: &Arc<LqpNode>,
        right: &Arc<LqpNode>,
    ) -> Result<Arc<LqpNode>> {
        if mode == JoinMode::Cross && !predicates.is_empty() {
            return Err(CiqError::InvariantViolation(
                "cross joins take no predicate".to_string(),
            ));
        }
        if mode != JoinMode::Cross && predicates.is_empty() {
            return Err(CiqError::InvariantViolation(
                "non-cross joins require predicates".to_string(),
            ));
        }
        let node = Self::make(NodeKind::Join { mode, predicates });
        node.set_left_input(Some(left.clone()));
        node.set_right_input(Some(right.clone()));
        Ok(node)
    }

    /// Creates a cross join node.
    pub fn cross_join(left: &Arc<LqpNode>, right: &Arc<LqpNode>) -> Arc<LqpNode> {
        let node = Self::make(NodeKind::Join {
            mode: JoinMode::Cross,
            predicates: Vec::new(),
        });
        node.set_left_input(Some(left.clone()));
        node.set_right_input(Some(right.clone()));
        node
    }

    /// Creates an aggregate node; every element of `aggregates` must be an
    /// aggregate expression.
    pub fn aggregate(
        group_by: Vec<Arc<Expression>>,
        aggregates: Vec<Arc<Expression>>,
        input: &Arc<LqpNode>,
    ) -> Result<Arc<LqpNode>> {
        for expression in &aggregates {
            if !matches!(expression.as_ref(), Expression::Aggregate { .. }) {
                return Err(CiqError::InvariantViolation(format!(
                    "'{}' is not an aggregate expression",
                    expression.description(DescriptionMode::Short)
                )));
            }
        }
        let node = Self::make(NodeKind::Aggregate {
            group_by,
            aggregates,
        });
        node.set_left_input(Some(input.clone()));
        Ok(node)
    }

    /// Creates a sort node; `sort_modes` must match `expressions` in length.
    pub fn sort(
        expressions: Vec<Arc<Expression>>,
        sort_modes: Vec<SortMode>,
        input: &Arc<LqpNode>,
    ) -> Result<Arc<LqpNode>> {
        if expressions.len() != sort_modes.len() {
            return Err(CiqError::InvariantViolation(format!(
                "{} sort expressions but {} sort modes",
                expressions.len(),
                sort_modes.len()
            )));
        }
        let node = Self::make(NodeKind::Sort {
            expressions,
            sort_modes,
        });
        node.set_left_input(Some(input.clone()));
        Ok(node)
    }

    /// Creates a limit node.
    pub fn limit(num_rows: usize, input: &Arc<LqpNode>) -> Arc<LqpNode> {
        let node = Self::make(NodeKind::Limit { num_rows });
        node.set_left_input(Some(input.clone()));
        node
    }

    /// Creates a union node. Column-count agreement of the inputs is checked
    /// when derived properties are computed.
    pub fn union_node(mode: UnionMode, left: &Arc<LqpNode>, right: &Arc<LqpNode>) -> Arc<LqpNode> {
        let node = Self::make(NodeKind::Union { mode });
        node.set_left_input(Some(left.clone()));
        node.set_right_input(Some(right.clone()));
        node
    }

    /// Creates a validate node over `input`.
    pub fn validate(input: &Arc<LqpNode>) -> Arc<LqpNode> {
        let node = Self::make(NodeKind::Validate);
        node.set_left_input(Some(input.clone()));
        node
    }

    /// The node's kind-specific payload.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Number of inputs this node kind wires: none for leaves, two for joins
    /// and unions, one otherwise.
    pub fn input_count(&self) -> usize {
        match &self.kind {
            NodeKind::StoredTable { .. } => 0,
            NodeKind::Join { .. } | NodeKind::Union { .. } => 2,
            _ => 1,
        }
    }

    /// The left input, if wired.
    pub fn left_input(&self) -> Option<Arc<LqpNode>> {
        self.inputs.read().expect("inputs lock poisoned")[0].clone()
    }

    /// The right input, if wired.
    pub fn right_input(&self) -> Option<Arc<LqpNode>> {
        self.inputs.read().expect("inputs lock poisoned")[1].clone()
    }

    /// Rewires the left input, maintaining output back-references.
    pub fn set_left_input(&self, input: Option<Arc<LqpNode>>) {
        self.set_input(0, input);
    }

    /// Rewires the right input, maintaining output back-references.
    pub fn set_right_input(&self, input: Option<Arc<LqpNode>>) {
        self.set_input(1, input);
    }

    fn set_input(&self, side: usize, input: Option<Arc<LqpNode>>) {
        let mut inputs = self.inputs.write().expect("inputs lock poisoned");
        if let Some(old) = inputs[side].take() {
            old.remove_output(&self.self_weak);
        }
        if let Some(new) = &input {
            new.add_output(self.self_weak.clone());
        }
        inputs[side] = input;
    }

    fn add_output(&self, parent: Weak<LqpNode>) {
        self.outputs
            .write()
            .expect("outputs lock poisoned")
            .push(parent);
    }

    fn remove_output(&self, parent: &Weak<LqpNode>) {
        let mut outputs = self.outputs.write().expect("outputs lock poisoned");
        if let Some(pos) = outputs
            .iter()
            .position(|o| std::ptr::eq(o.as_ptr(), parent.as_ptr()))
        {
            outputs.remove(pos);
        }
        outputs.retain(|o| o.strong_count() > 0);
    }

    /// The live parents referencing this node as an input.
    pub fn outputs(&self) -> Vec<Arc<LqpNode>> {
        self.outputs
            .read()
            .expect("outputs lock poisoned")
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Number of live parents.
    pub fn output_count(&self) -> usize {
        self.outputs().len()
    }

    /// The expressions specific to this node kind: the filter predicate, the
    /// projection list, the join predicates, group-by plus aggregates, or the
    /// sort expressions.
    pub fn node_expressions(&self) -> Vec<Arc<Expression>> {
        match &self.kind {
            NodeKind::Predicate { predicate, .. } => vec![predicate.clone()],
            NodeKind::Projection { expressions } => expressions.clone(),
            NodeKind::Join { predicates, .. } => predicates.clone(),
            NodeKind::Aggregate {
                group_by,
                aggregates,
            } => group_by.iter().chain(aggregates.iter()).cloned().collect(),
            NodeKind::Sort { expressions, .. } => expressions.clone(),
            NodeKind::StoredTable { .. }
            | NodeKind::Limit { .. }
            | NodeKind::Union { .. }
            | NodeKind::Validate => Vec::new(),
        }
    }

    fn left_input_required(&self) -> Result<Arc<LqpNode>> {
        self.left_input().ok_or_else(|| {
            CiqError::InvariantViolation(format!(
                "{} requires its input to be set",
                self.kind_name()
            ))
        })
    }

    fn both_inputs_required(&self) -> Result<(Arc<LqpNode>, Arc<LqpNode>)> {
        match (self.left_input(), self.right_input()) {
            (Some(left), Some(right)) => Ok((left, right)),
            _ => Err(CiqError::InvariantViolation(format!(
                "{} requires both inputs to be set",
                self.kind_name()
            ))),
        }
    }

    fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::StoredTable { .. } => "StoredTable",
            NodeKind::Predicate { .. } => "Predicate",
            NodeKind::Projection { .. } => "Projection",
            NodeKind::Join { .. } => "Join",
            NodeKind::Aggregate { .. } => "Aggregate",
            NodeKind::Sort { .. } => "Sort",
            NodeKind::Limit { .. } => "Limit",
            NodeKind::Union { .. } => "Union",
            NodeKind::Validate => "Validate",
        }
    }

    /// The column expressions this node outputs, recomputed from live inputs
    /// on every call.
    pub fn column_expressions(&self) -> Result<Vec<Arc<Expression>>> {
        match &self.kind {
            NodeKind::StoredTable { table } => Ok((0..table.columns.len())
                .map(|idx| {
                    Arc::new(Expression::LqpColumn {
                        node: self.self_weak.clone(),
                        column_id: ColumnId(idx as u16),
                    })
                })
                .collect()),
            NodeKind::Projection { expressions } => Ok(expressions.clone()),
            NodeKind::Aggregate {
                group_by,
                aggregates,
            } => Ok(group_by.iter().chain(aggregates.iter()).cloned().collect()),
            NodeKind::Predicate { .. }
            | NodeKind::Sort { .. }
            | NodeKind::Limit { .. }
            | NodeKind::Validate => self.left_input_required()?.column_expressions(),
            NodeKind::Union { .. } => {
                let (left, right) = self.both_inputs_required()?;
                let left_columns = left.column_expressions()?;
                let right_columns = right.column_expressions()?;
                if left_columns.len() != right_columns.len() {
                    return Err(CiqError::InvariantViolation(format!(
                        "positional union over mismatched column counts: {} vs {}",
                        left_columns.len(),
                        right_columns.len()
                    )));
                }
                Ok(left_columns)
            }
            NodeKind::Join { mode, .. } => {
                let (left, right) = self.both_inputs_required()?;
                let mut columns = left.column_expressions()?;
                if !mode.outputs_left_input_only() {
                    columns.extend(right.column_expressions()?);
                }
                Ok(columns)
            }
        }
    }

    /// Number of output columns.
    pub fn output_column_count(&self) -> Result<usize> {
        Ok(self.column_expressions()?.len())
    }

    /// Position of `expression` within this node's output, if present.
    pub fn find_column_id(&self, expression: &Expression) -> Result<Option<ColumnId>> {
        Ok(find_expression_idx(expression, &self.column_expressions()?)
            .map(|idx| ColumnId(idx as u16)))
    }

    /// Position of `expression` within this node's output; [`CiqError::UnknownColumn`]
    /// if absent.
    pub fn get_column_id(&self, expression: &Expression) -> Result<ColumnId> {
        self.find_column_id(expression)?.ok_or_else(|| {
            CiqError::UnknownColumn(format!(
                "'{}' is not an output of this node",
                expression.description(DescriptionMode::Short)
            ))
        })
    }

    /// The scalar type of the output column at `column_id`.
    pub fn column_data_type(&self, column_id: ColumnId) -> Result<DataType> {
        let columns = self.column_expressions()?;
        columns
            .get(column_id.as_usize())
            .ok_or_else(|| {
                CiqError::UnknownColumn(format!("{} has no column {column_id}", self.kind_name()))
            })?
            .data_type()
    }

    /// Whether the output column at `column_id` may hold NULLs.
    pub fn is_column_nullable(&self, column_id: ColumnId) -> Result<bool> {
        match &self.kind {
            NodeKind::StoredTable { table } => table
                .column(column_id)
                .map(|c| c.nullable)
                .ok_or_else(|| {
                    CiqError::UnknownColumn(format!(
                        "table '{}' has no column {column_id}",
                        table.name
                    ))
                }),
            NodeKind::Predicate { .. }
            | NodeKind::Sort { .. }
            | NodeKind::Limit { .. }
            | NodeKind::Validate => self.left_input_required()?.is_column_nullable(column_id),
            NodeKind::Projection { expressions } => {
                let input = self.left_input_required()?;
                let expression = expressions.get(column_id.as_usize()).ok_or_else(|| {
                    CiqError::UnknownColumn(format!("projection has no column {column_id}"))
                })?;
                expression.is_nullable_on(&input)
            }
            NodeKind::Aggregate {
                group_by,
                aggregates,
            } => {
                let input = self.left_input_required()?;
                if column_id.as_usize() < group_by.len() {
                    return group_by[column_id.as_usize()].is_nullable_on(&input);
                }
                let aggregate = aggregates
                    .get(column_id.as_usize() - group_by.len())
                    .ok_or_else(|| {
                        CiqError::UnknownColumn(format!("aggregate has no column {column_id}"))
                    })?;
                match aggregate.as_ref() {
                    Expression::Aggregate { function, argument } => match function {
                        AggregateFunction::Count => Ok(false),
                        // SUM/MIN/MAX/AVG are NULL over an empty group, which
                        // can only occur without grouping columns.
                        _ => Ok(group_by.is_empty()
                            || match argument {
                                Some(arg) => arg.is_nullable_on(&input)?,
                                None => false,
                            }),
                    },
                    _ => aggregate.is_nullable_on(&input),
                }
            }
            NodeKind::Union { .. } => {
                let (left, right) = self.both_inputs_required()?;
                Ok(left.is_column_nullable(column_id)? || right.is_column_nullable(column_id)?)
            }
            NodeKind::Join { mode, .. } => {
                let (left, right) = self.both_inputs_required()?;
                let left_column_count = left.output_column_count()?;
                let column_is_from_left_input = column_id.as_usize() < left_column_count;

                if *mode == JoinMode::Left && !column_is_from_left_input {
                    return Ok(true);
                }
                if *mode == JoinMode::Right && column_is_from_left_input {
                    return Ok(true);
                }
                if *mode == JoinMode::FullOuter {
                    return Ok(true);
                }

                if column_is_from_left_input {
                    left.is_column_nullable(column_id)
                } else {
                    let right_column_id =
                        ColumnId((column_id.as_usize() - left_column_count) as u16);
                    right.is_column_nullable(right_column_id)
                }
            }
        }
    }

    /// The unique constraints holding on this node's output.
    ///
    /// Conservative-is-safe: every shape without a propagation rule yields the
    /// empty set rather than an error.
    pub fn constraints(&self) -> Result<ConstraintSet> {
        match &self.kind {
            NodeKind::StoredTable { table } => {
                let mut set = ConstraintSet::new();
                for key in &table.key_constraints {
                    let mut columns = Vec::with_capacity(key.len());
                    for column_id in key {
                        if table.column(*column_id).is_none() {
                            return Err(CiqError::UnknownColumn(format!(
                                "key constraint of table '{}' names missing column {column_id}",
                                table.name
                            )));
                        }
                        columns.push(Arc::new(Expression::LqpColumn {
                            node: self.self_weak.clone(),
                            column_id: *column_id,
                        }));
                    }
                    set.insert(UniqueConstraint::new(columns));
                }
                Ok(set)
            }
            // Filtering and reordering can only shrink or permute the
            // relation, which preserves uniqueness.
            NodeKind::Predicate { .. }
            | NodeKind::Sort { .. }
            | NodeKind::Limit { .. }
            | NodeKind::Validate => self.forward_constraints(),
            NodeKind::Projection { expressions } => {
                let input = self.left_input_required()?;
                Ok(input
                    .constraints()?
                    .iter()
                    .filter(|constraint| constraint.is_covered_by(expressions))
                    .cloned()
                    .collect())
            }
            NodeKind::Aggregate {
                group_by,
                aggregates: _,
            } => {
                let input = self.left_input_required()?;
                let output = self.column_expressions()?;
                let mut set: ConstraintSet = input
                    .constraints()?
                    .iter()
                    .filter(|constraint| constraint.is_covered_by(&output))
                    .cloned()
                    .collect();
                // Grouping collapses each group to one row, making the
                // group-by columns a key of the output.
                if !group_by.is_empty() {
                    set.insert(UniqueConstraint::new(group_by.clone()));
                }
                Ok(set)
            }
            // A union may introduce duplicates, voiding all input keys.
            NodeKind::Union { .. } => Ok(ConstraintSet::new()),
            NodeKind::Join { mode, predicates } => self.join_constraints(*mode, predicates),
        }
    }

    /// Default constraint propagation: the union of the input constraint sets,
    /// unchanged.
    pub fn forward_constraints(&self) -> Result<ConstraintSet> {
        let mut set = ConstraintSet::new();
        if let Some(left) = self.left_input() {
            set.extend(left.constraints()?);
        }
        if let Some(right) = self.right_input() {
            set.extend(right.constraints()?);
        }
        Ok(set)
    }

    /// Whether some declared constraint's columns are all contained in
    /// `expressions`, i.e. the given column set is unique on this node's
    /// output.
    pub fn has_unique_constraint(&self, expressions: &[Arc<Expression>]) -> Result<bool> {
        Ok(self
            .constraints()?
            .iter()
            .any(|constraint| constraint.is_covered_by(expressions)))
    }

    fn join_constraints(
        &self,
        mode: JoinMode,
        predicates: &[Arc<Expression>],
    ) -> Result<ConstraintSet> {
        // The semi join outputs left rows without adding rows or columns;
        // tuples may only be filtered out, so the left keys survive.
        if mode == JoinMode::Semi {
            return self.left_input_required()?.constraints();
        }

        // No guarantees for multi-predicate joins.
        if predicates.len() > 1 {
            return Ok(ConstraintSet::new());
        }

        // No guarantees for non-equi joins; a cross join has no predicate at all.
        let Some(predicate) = predicates.first() else {
            return Ok(ConstraintSet::new());
        };
        let Expression::BinaryPredicate {
            left: left_operand,
            condition: PredicateCondition::Equals,
            right: right_operand,
        } = predicate.as_ref()
        else {
            return Ok(ConstraintSet::new());
        };

        let (left, right) = self.both_inputs_required()?;
        let left_operand_unique =
            left.has_unique_constraint(std::slice::from_ref(left_operand))?;
        let right_operand_unique =
            right.has_unique_constraint(std::slice::from_ref(right_operand))?;

        match mode {
            JoinMode::Inner => {
                if left_operand_unique && right_operand_unique {
                    // A one-to-one match; the keys of both sides remain valid.
                    Ok(left.constraints()?.union(right.constraints()?))
                } else if left_operand_unique {
                    // Uniqueness on the left prevents duplication of records
                    // on the right.
                    right.constraints()
                } else if right_operand_unique {
                    // Uniqueness on the right prevents duplication of records
                    // on the left.
                    left.constraints()
                } else {
                    Ok(ConstraintSet::new())
                }
            }
            JoinMode::Left => {
                // The left outer join pads unmatched left rows with NULLs on
                // the right, so right-side constraints do not survive.
                // TODO: forward the left input's constraints if applicable.
                Ok(ConstraintSet::new())
            }
            JoinMode::Right => {
                // The right outer join pads unmatched right rows with NULLs on
                // the left, so left-side constraints do not survive.
                // TODO: forward the right input's constraints if applicable.
                Ok(ConstraintSet::new())
            }
            JoinMode::FullOuter => {
                // Either side may be padded with NULLs; discard everything.
                Ok(ConstraintSet::new())
            }
            JoinMode::Cross => Ok(ConstraintSet::new()),
            JoinMode::Semi => unreachable!("semi joins are handled above"),
            JoinMode::AntiNullAsTrue | JoinMode::AntiNullAsFalse => {
                // ? Constraint forwarding for anti joins is unresolved; stay
                // conservative until the optimiser team settles it.
                Ok(ConstraintSet::new())
            }
        }
    }

    /// Bracketed human-readable label: kind, kind attributes, expressions.
    pub fn description(&self, mode: DescriptionMode) -> String {
        match &self.kind {
            NodeKind::StoredTable { table } => {
                format!("[StoredTable] Name: '{}'", table.name)
            }
            NodeKind::Predicate {
                predicate,
                scan_type,
            } => {
                let scan = match scan_type {
                    ScanType::TableScan => String::new(),
                    ScanType::IndexScan => " ScanType: Index".to_string(),
                };
                format!("[Predicate]{scan} [{}]", predicate.description(mode))
            }
            NodeKind::Projection { expressions } => {
                format!("[Projection]{}", Self::bracketed(expressions, mode))
            }
            NodeKind::Join {
                mode: join_mode,
                predicates,
            } => format!(
                "[Join] Mode: {join_mode}{}",
                Self::bracketed(predicates, mode)
            ),
            NodeKind::Aggregate {
                group_by,
                aggregates,
            } => format!(
                "[Aggregate] GroupBy:{} Aggregates:{}",
                Self::bracketed(group_by, mode),
                Self::bracketed(aggregates, mode)
            ),
            NodeKind::Sort {
                expressions,
                sort_modes,
            } => {
                let mut out = "[Sort]".to_string();
                for (expression, sort_mode) in expressions.iter().zip(sort_modes.iter()) {
                    out.push_str(&format!(" [{} ({sort_mode})]", expression.description(mode)));
                }
                out
            }
            NodeKind::Limit { num_rows } => format!("[Limit] NumRows: {num_rows}"),
            NodeKind::Union { mode } => format!("[Union] Mode: {mode}"),
            NodeKind::Validate => "[Validate]".to_string(),
        }
    }

    fn bracketed(expressions: &[Arc<Expression>], mode: DescriptionMode) -> String {
        let mut out = String::new();
        for expression in expressions {
            out.push_str(&format!(" [{}]", expression.description(mode)));
        }
        out
    }

    /// Creates a new node of the same kind with expressions rewritten through
    /// `mapping`; inputs are left unwired for the caller. The original→copy
    /// association is recorded in `mapping`.
    pub fn shallow_copy(&self, mapping: &mut NodeMapping) -> Arc<LqpNode> {
        let kind = match &self.kind {
            NodeKind::StoredTable { table } => NodeKind::StoredTable {
                table: table.clone(),
            },
            NodeKind::Predicate {
                predicate,
                scan_type,
            } => NodeKind::Predicate {
                predicate: predicate.deep_copy_with(mapping),
                scan_type: *scan_type,
            },
            NodeKind::Projection { expressions } => NodeKind::Projection {
                expressions: expressions_deep_copy(expressions, mapping),
            },
            NodeKind::Join { mode, predicates } => NodeKind::Join {
                mode: *mode,
                predicates: expressions_deep_copy(predicates, mapping),
            },
            NodeKind::Aggregate {
                group_by,
                aggregates,
            } => NodeKind::Aggregate {
                group_by: expressions_deep_copy(group_by, mapping),
                aggregates: expressions_deep_copy(aggregates, mapping),
            },
            NodeKind::Sort {
                expressions,
                sort_modes,
            } => NodeKind::Sort {
                expressions: expressions_deep_copy(expressions, mapping),
                sort_modes: sort_modes.clone(),
            },
            NodeKind::Limit { num_rows } => NodeKind::Limit {
                num_rows: *num_rows,
            },
            NodeKind::Union { mode } => NodeKind::Union { mode: *mode },
            NodeKind::Validate => NodeKind::Validate,
        };
        let copy = Self::make(kind);
        mapping.insert(self, copy.clone());
        copy
    }

    /// Kind-identical with node expressions equal up to `mapping` and
    /// kind-specific attributes equal. Inputs are not compared.
    pub fn shallow_equals(&self, other: &LqpNode, mapping: &NodeMapping) -> bool {
        match (&self.kind, &other.kind) {
            (NodeKind::StoredTable { table }, NodeKind::StoredTable { table: other_table }) => {
                table == other_table
            }
            (
                NodeKind::Predicate {
                    predicate,
                    scan_type,
                },
                NodeKind::Predicate {
                    predicate: other_predicate,
                    scan_type: other_scan_type,
                },
            ) => {
                scan_type == other_scan_type
                    && predicate.semantically_equals(other_predicate, mapping)
            }
            (
                NodeKind::Projection { expressions },
                NodeKind::Projection {
                    expressions: other_expressions,
                },
            ) => expressions_equal_across_plans(expressions, other_expressions, mapping),
            (
                NodeKind::Join { mode, predicates },
                NodeKind::Join {
                    mode: other_mode,
                    predicates: other_predicates,
                },
            ) => {
                mode == other_mode
                    && expressions_equal_across_plans(predicates, other_predicates, mapping)
            }
            (
                NodeKind::Aggregate {
                    group_by,
                    aggregates,
                },
                NodeKind::Aggregate {
                    group_by: other_group_by,
                    aggregates: other_aggregates,
                },
            ) => {
                expressions_equal_across_plans(group_by, other_group_by, mapping)
                    && expressions_equal_across_plans(aggregates, other_aggregates, mapping)
            }
            (
                NodeKind::Sort {
                    expressions,
                    sort_modes,
                },
                NodeKind::Sort {
                    expressions: other_expressions,
                    sort_modes: other_sort_modes,
                },
            ) => {
                sort_modes == other_sort_modes
                    && expressions_equal_across_plans(expressions, other_expressions, mapping)
            }
            (
                NodeKind::Limit { num_rows },
                NodeKind::Limit {
                    num_rows: other_num_rows,
                },
            ) => num_rows == other_num_rows,
            (NodeKind::Union { mode }, NodeKind::Union { mode: other_mode }) => mode == other_mode,
            (NodeKind::Validate, NodeKind::Validate) => true,
            _ => false,
        }
    }

    /// Hash over the kind and its scalar attributes; inputs and expressions
    /// are excluded, so the hash is stable across [`LqpNode::shallow_copy`].
    pub fn shallow_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        std::mem::discriminant(&self.kind).hash(&mut hasher);
        match &self.kind {
            NodeKind::StoredTable { table } => {
                table.name.hash(&mut hasher);
                table.row_count.hash(&mut hasher);
            }
            NodeKind::Predicate { scan_type, .. } => scan_type.hash(&mut hasher),
            NodeKind::Join { mode, .. } => mode.hash(&mut hasher),
            NodeKind::Aggregate { group_by, .. } => group_by.len().hash(&mut hasher),
            NodeKind::Sort { sort_modes, .. } => sort_modes.hash(&mut hasher),
            NodeKind::Limit { num_rows } => num_rows.hash(&mut hasher),
            NodeKind::Union { mode } => mode.hash(&mut hasher),
            NodeKind::Projection { .. } | NodeKind::Validate => {}
        }
        hasher.finish()
    }

    /// Structural copy of the whole reachable sub-DAG. Shared children are
    /// copied once and stay shared; column references are rewritten onto the
    /// copied nodes.
    pub fn deep_copy(&self) -> Arc<LqpNode> {
        let mut mapping = NodeMapping::default();
        let copy = self.deep_copy_with_mapping(&mut mapping);
        tracing::trace!(root = %copy, "deep-copied plan");
        copy
    }

    /// [`LqpNode::deep_copy`] reusing the caller's mapping, so several roots
    /// can be copied while keeping their shared sub-plans shared.
    pub fn deep_copy_with_mapping(&self, mapping: &mut NodeMapping) -> Arc<LqpNode> {
        if let Some(copy) = mapping.get(self) {
            return copy;
        }
        // Inputs first: expression rewriting needs the copied leaves in the
        // mapping before this node's expressions are copied.
        let left = self.left_input().map(|n| n.deep_copy_with_mapping(mapping));
        let right = self
            .right_input()
            .map(|n| n.deep_copy_with_mapping(mapping));
        let copy = self.shallow_copy(mapping);
        copy.set_left_input(left);
        copy.set_right_input(right);
        copy
    }
}

impl fmt::Display for LqpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description(DescriptionMode::Short))
    }
}

/// All nodes reachable from `root` via inputs, pre-order, each exactly once.
pub fn plan_nodes(root: &Arc<LqpNode>) -> Vec<Arc<LqpNode>> {
    let mut visited: HashMap<*const LqpNode, ()> = HashMap::new();
    let mut nodes = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if visited.insert(Arc::as_ptr(&node), ()).is_some() {
            continue;
        }
        if let Some(right) = node.right_input() {
            stack.push(right);
        }
        if let Some(left) = node.left_input() {
            stack.push(left);
        }
        nodes.push(node);
    }
    nodes
}

/// Identity map from nodes of one plan to nodes of another, keyed by node
/// identity (pointer), used to compare and copy expressions across plans.
#[derive(Debug, Default)]
pub struct NodeMapping {
    entries: HashMap<usize, Arc<LqpNode>>,
}

impl NodeMapping {
    /// Maps every node reachable from `root` to itself.
    pub fn identity(root: &Arc<LqpNode>) -> NodeMapping {
        let mut mapping = NodeMapping::default();
        for node in plan_nodes(root) {
            mapping
                .entries
                .insert(Arc::as_ptr(&node) as usize, node.clone());
        }
        mapping
    }

    /// Records that `original` corresponds to `copy`.
    pub fn insert(&mut self, original: &LqpNode, copy: Arc<LqpNode>) {
        self.entries
            .insert(original.self_weak.as_ptr() as usize, copy);
    }

    /// The node `original` maps to, if recorded.
    pub fn get(&self, original: &LqpNode) -> Option<Arc<LqpNode>> {
        self.entries
            .get(&(original.self_weak.as_ptr() as usize))
            .cloned()
    }

    pub(crate) fn resolve_ptr(&self, node: &Weak<LqpNode>) -> *const LqpNode {
        self.entries
            .get(&(node.as_ptr() as usize))
            .map(Arc::as_ptr)
            .unwrap_or_else(|| node.as_ptr())
    }

    pub(crate) fn resolve_weak(&self, node: &Weak<LqpNode>) -> Weak<LqpNode> {
        self.entries
            .get(&(node.as_ptr() as usize))
            .map(Arc::downgrade)
            .unwrap_or_else(|| node.clone())
    }
}
