//! Typed identifiers shared across plan and calibration components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a column within a node's output (or a stored table's column list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnId(
    /// Raw numeric id value.
    pub u16,
);

impl ColumnId {
    /// Returns the id as a usize index.
    pub fn as_usize(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for ColumnId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}
