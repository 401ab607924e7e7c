use std::collections::HashMap;

use ciq_common::{CiqError, ColumnId, Result};
use serde::{Deserialize, Serialize};

use crate::data_type::{DataType, EncodingType};

/// Catalog metadata for a single table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name, unique within its table.
    pub name: String,
    /// Scalar type of the column's values.
    pub data_type: DataType,
    /// Physical encoding tag; opaque at the plan layer.
    pub encoding: EncodingType,
    /// Whether the column may hold NULLs.
    pub nullable: bool,
}

/// Immutable catalog snapshot of a stored table.
///
/// Published once; plan nodes hold it by value and never mutate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Ordered column list.
    pub columns: Vec<ColumnDefinition>,
    /// Row count as reported by the catalog.
    pub row_count: u64,
    /// Declared unique constraints, each a set of column ids forming a key.
    pub key_constraints: Vec<Vec<ColumnId>>,
}

impl TableDefinition {
    /// Looks up a column id by name.
    pub fn column_id(&self, name: &str) -> Option<ColumnId> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|idx| ColumnId(idx as u16))
    }

    /// Returns the column definition at `id`, if in range.
    pub fn column(&self, id: ColumnId) -> Option<&ColumnDefinition> {
        self.columns.get(id.as_usize())
    }
}

/// Read-only table metadata source consumed by the plan layer.
///
/// The engine's storage manager implements this; tests and the calibration
/// generator use [`StaticCatalog`].
pub trait CatalogProvider {
    /// Returns the definition of a table by name.
    fn table(&self, name: &str) -> Result<TableDefinition>;

    /// Returns all known table names, sorted.
    fn table_names(&self) -> Vec<String>;
}

/// In-memory [`CatalogProvider`] over a fixed set of table definitions.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    tables: HashMap<String, TableDefinition>,
}

impl StaticCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, replacing any previous definition with the same name.
    pub fn with_table(mut self, table: TableDefinition) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }
}

impl CatalogProvider for StaticCatalog {
    fn table(&self, name: &str) -> Result<TableDefinition> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| CiqError::InvalidConfig(format!("unknown table: {name}")))
    }

    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableDefinition {
        TableDefinition {
            name: "t".to_string(),
            columns: vec![
                ColumnDefinition {
                    name: "a".to_string(),
                    data_type: DataType::Int,
                    encoding: EncodingType::Dictionary,
                    nullable: false,
                },
                ColumnDefinition {
                    name: "b".to_string(),
                    data_type: DataType::String,
                    encoding: EncodingType::Unencoded,
                    nullable: true,
                },
            ],
            row_count: 100,
            key_constraints: vec![vec![ColumnId(0)]],
        }
    }

    #[test]
    fn column_lookup_by_name_and_id() {
        let t = table();
        assert_eq!(t.column_id("b"), Some(ColumnId(1)));
        assert_eq!(t.column_id("missing"), None);
        assert_eq!(t.column(ColumnId(0)).map(|c| c.name.as_str()), Some("a"));
        assert!(t.column(ColumnId(9)).is_none());
    }

    #[test]
    fn static_catalog_resolves_tables() {
        let catalog = StaticCatalog::new().with_table(table());
        assert_eq!(catalog.table("t").expect("table").row_count, 100);
        assert!(catalog.table("nope").is_err());
        assert_eq!(catalog.table_names(), vec!["t".to_string()]);
    }
}
