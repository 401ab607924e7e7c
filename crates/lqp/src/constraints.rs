use std::sync::Arc;

use crate::expression::Expression;
use crate::node::NodeMapping;

/// A set of column expressions declared to form a key of the relation at a
/// given point in the plan.
///
/// Set semantics: element order is irrelevant for equality and hashing.
#[derive(Debug, Clone)]
pub struct UniqueConstraint {
    expressions: Vec<Arc<Expression>>,
}

impl UniqueConstraint {
    /// Creates a constraint over the given column expressions.
    pub fn new(expressions: Vec<Arc<Expression>>) -> Self {
        Self { expressions }
    }

    /// The constraint's column expressions.
    pub fn expressions(&self) -> &[Arc<Expression>] {
        &self.expressions
    }

    /// Set equality with column-reference identity resolved through `mapping`.
    pub fn semantically_equals(&self, other: &UniqueConstraint, mapping: &NodeMapping) -> bool {
        self.expressions.len() == other.expressions.len()
            && self.expressions.iter().all(|e| {
                other
                    .expressions
                    .iter()
                    .any(|o| e.semantically_equals(o, mapping))
            })
    }

    /// Order-insensitive combined hash of the element hashes.
    pub fn semantic_hash(&self) -> u64 {
        self.expressions
            .iter()
            .fold(0u64, |acc, e| acc ^ e.semantic_hash())
    }

    /// Whether every column of this constraint appears in `expressions`
    /// (same-plan comparison).
    pub fn is_covered_by(&self, expressions: &[Arc<Expression>]) -> bool {
        let identity = NodeMapping::default();
        self.expressions.iter().all(|column| {
            expressions
                .iter()
                .any(|candidate| column.semantically_equals(candidate, &identity))
        })
    }
}

/// The unique constraints known to hold at one node of the plan.
///
/// A deduplicating collection with set equality; kept as a plain vector since
/// element equality is mapping-dependent.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: Vec<UniqueConstraint>,
}

impl ConstraintSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a constraint unless an equal one is already present.
    pub fn insert(&mut self, constraint: UniqueConstraint) {
        if !self.contains(&constraint) {
            self.constraints.push(constraint);
        }
    }

    /// Inserts every constraint of `other`.
    pub fn extend(&mut self, other: ConstraintSet) {
        for constraint in other.constraints {
            self.insert(constraint);
        }
    }

    /// The union of two sets.
    pub fn union(mut self, other: ConstraintSet) -> ConstraintSet {
        self.extend(other);
        self
    }

    /// Whether an equal constraint is present (same-plan comparison).
    pub fn contains(&self, constraint: &UniqueConstraint) -> bool {
        let identity = NodeMapping::default();
        self.constraints
            .iter()
            .any(|c| c.semantically_equals(constraint, &identity))
    }

    /// Iterates over the constraints.
    pub fn iter(&self) -> impl Iterator<Item = &UniqueConstraint> {
        self.constraints.iter()
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl PartialEq for ConstraintSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.constraints.iter().all(|c| other.contains(c))
    }
}

impl FromIterator<UniqueConstraint> for ConstraintSet {
    fn from_iter<I: IntoIterator<Item = UniqueConstraint>>(iter: I) -> Self {
        let mut set = ConstraintSet::new();
        for constraint in iter {
            set.insert(constraint);
        }
        set
    }
}
