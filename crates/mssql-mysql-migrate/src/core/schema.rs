//! Introspected schema representation.

use std::collections::BTreeMap;

/// One column as reported by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Table the column belongs to.
    pub table: String,

    /// Column name.
    pub name: String,

    /// Source data type name, e.g. `nvarchar` or `datetime2`.
    pub data_type: String,
}

/// Mapping from table name to its columns in source catalog order.
///
/// Backed by a `BTreeMap` so iteration (and therefore DDL execution) is in
/// alphabetical table order rather than whatever order an unordered map
/// happens to produce.
#[derive(Debug, Default)]
pub struct TableSchema {
    tables: BTreeMap<String, Vec<ColumnDescriptor>>,
}

impl TableSchema {
    /// Group introspected column rows by table, preserving the order in
    /// which each table's columns first appear.
    pub fn from_columns(columns: Vec<ColumnDescriptor>) -> Self {
        let mut tables: BTreeMap<String, Vec<ColumnDescriptor>> = BTreeMap::new();
        for col in columns {
            tables.entry(col.table.clone()).or_default().push(col);
        }
        Self { tables }
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True when no tables were introspected.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterate tables in alphabetical order with their columns in source
    /// catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ColumnDescriptor])> {
        self.tables
            .iter()
            .map(|(name, cols)| (name.as_str(), cols.as_slice()))
    }

    /// Columns for one table, if present.
    pub fn columns(&self, table: &str) -> Option<&[ColumnDescriptor]> {
        self.tables.get(table).map(|c| c.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: &str, name: &str, data_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            table: table.into(),
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    #[test]
    fn groups_columns_by_table_preserving_order() {
        let schema = TableSchema::from_columns(vec![
            col("users", "id", "int"),
            col("users", "name", "varchar"),
            col("users", "created", "datetime"),
            col("orders", "id", "int"),
        ]);

        assert_eq!(schema.len(), 2);
        let users: Vec<_> = schema
            .columns("users")
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(users, ["id", "name", "created"]);
    }

    #[test]
    fn iterates_tables_alphabetically() {
        let schema = TableSchema::from_columns(vec![
            col("zebra", "id", "int"),
            col("apple", "id", "int"),
            col("mango", "id", "int"),
        ]);

        let order: Vec<_> = schema.iter().map(|(name, _)| name).collect();
        assert_eq!(order, ["apple", "mango", "zebra"]);
    }

    #[test]
    fn empty_schema() {
        let schema = TableSchema::from_columns(Vec::new());
        assert!(schema.is_empty());
        assert!(schema.columns("missing").is_none());
    }
}
