//! Table storage for relstore
//!
//! This module combines a table definition, its row store and its indexes.
//! Every row mutation goes through [`Table`], which keeps all indexes in step
//! with the row store. Constraint checks happen before these calls.

use indexmap::IndexMap;
use std::sync::Arc;

use super::index::Index;
use super::row_store::{RowId, RowStore};
use super::value::Row;
use crate::catalog::{IndexDef, Schema, TableDef};
use crate::error::{Error, Result};

/// A table combining schema, rows and indexes
#[derive(Debug, Clone)]
pub struct Table {
    /// Table definition (metadata)
    def: Arc<TableDef>,
    /// Row storage
    rows: RowStore,
    /// Indexes by name
    indexes: IndexMap<String, Index>,
}

impl Table {
    /// Create a new empty table
    pub fn new(def: Arc<TableDef>) -> Self {
        Self::with_rows(def, RowStore::new())
    }

    /// Create a table over existing rows, without indexes
    pub fn with_rows(def: Arc<TableDef>, rows: RowStore) -> Self {
        Self {
            def,
            rows,
            indexes: IndexMap::new(),
        }
    }

    /// Get table name
    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// Get table schema
    pub fn schema(&self) -> &Schema {
        self.def.schema()
    }

    /// Get table definition
    pub fn definition(&self) -> &Arc<TableDef> {
        &self.def
    }

    /// Row storage, read-only
    pub fn row_store(&self) -> &RowStore {
        &self.rows
    }

    /// Create an index on the table, populated from the current rows
    pub fn create_index(&mut self, def: IndexDef) -> Result<()> {
        let index = Index::build(def, self.def.schema(), self.rows.scan())?;
        // Keep indexes ordered by id, also when a dropped one is rebuilt
        let position = self
            .indexes
            .values()
            .position(|existing| existing.def().id > index.def().id)
            .unwrap_or(self.indexes.len());
        self.indexes
            .shift_insert(position, index.name().to_string(), index);
        Ok(())
    }

    /// Remove an index from the table
    pub fn drop_index(&mut self, name: &str) -> Option<Index> {
        self.indexes.shift_remove(name)
    }

    /// Get index by name
    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.indexes.get(name)
    }

    /// All indexes, oldest first
    pub fn indexes(&self) -> impl Iterator<Item = &Index> {
        self.indexes.values()
    }

    /// Get a row by identifier
    pub fn get(&self, row_id: RowId) -> Result<&Row> {
        self.rows.get(row_id).ok_or_else(|| self.row_not_found(row_id))
    }

    /// Insert a row into the table
    pub fn insert(&mut self, row: Row) -> RowId {
        let row_id = self.rows.insert(row);
        if let Some(row) = self.rows.get(row_id) {
            for index in self.indexes.values_mut() {
                index.on_insert(row_id, row);
            }
        }
        row_id
    }

    /// Re-insert a row under its original identifier
    pub fn restore(&mut self, row_id: RowId, row: Row) -> Result<()> {
        if self.rows.get(row_id).is_some() {
            return Err(Error::Internal(format!(
                "row {} already present in table '{}'",
                row_id,
                self.name()
            )));
        }
        for index in self.indexes.values_mut() {
            index.on_insert(row_id, &row);
        }
        self.rows.restore(row_id, row);
        Ok(())
    }

    /// Replace a row, returning the previous version
    pub fn update(&mut self, row_id: RowId, row: Row) -> Result<Row> {
        let old = self.get(row_id)?.clone();
        for index in self.indexes.values_mut() {
            index.on_update(row_id, &old, &row);
        }
        self.rows.update(row_id, row);
        Ok(old)
    }

    /// Delete a row, returning it
    pub fn delete(&mut self, row_id: RowId) -> Result<Row> {
        let row = self
            .rows
            .delete(row_id)
            .ok_or_else(|| self.row_not_found(row_id))?;
        for index in self.indexes.values_mut() {
            index.on_delete(row_id, &row);
        }
        Ok(row)
    }

    /// Scan all rows in insertion order
    pub fn scan(&self) -> impl Iterator<Item = (RowId, &Row)> + '_ {
        self.rows.scan()
    }

    /// Get row count
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get column index by name
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.def.schema().get_column_index(name)
    }

    fn row_not_found(&self, row_id: RowId) -> Error {
        Error::RowNotFound {
            table: self.name().to_string(),
            row_id: row_id.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType};
    use crate::storage::btree::IndexKey;
    use crate::storage::Value;

    fn create_test_table() -> Table {
        let mut schema = Schema::new();
        schema.add_column(Column::new("id", DataType::Integer).primary_key(true));
        schema.add_column(Column::new("name", DataType::Text).nullable(false));
        schema.add_column(Column::new("age", DataType::Integer));

        Table::new(Arc::new(TableDef::new("users", schema, 1)))
    }

    fn user(id: i64, name: &str, age: i64) -> Row {
        Row::new(vec![
            Value::Integer(id),
            Value::from(name),
            Value::Integer(age),
        ])
    }

    #[test]
    fn test_table_insert() {
        let mut table = create_test_table();

        let row = user(1, "Alice", 25);
        let row_id = table.insert(row.clone());
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.get(row_id).unwrap(), &row);
    }

    #[test]
    fn test_missing_row() {
        let mut table = create_test_table();

        assert!(matches!(
            table.get(RowId(5)),
            Err(Error::RowNotFound { row_id: 5, .. })
        ));
        assert!(matches!(
            table.update(RowId(5), user(1, "x", 1)),
            Err(Error::RowNotFound { .. })
        ));
        assert!(matches!(
            table.delete(RowId(5)),
            Err(Error::RowNotFound { .. })
        ));
    }

    #[test]
    fn test_table_scan() {
        let mut table = create_test_table();

        for i in 0..5 {
            table.insert(user(i, &format!("User{}", i), 20 + i));
        }

        let ids: Vec<RowId> = table.scan().map(|(id, _)| id).collect();
        assert_eq!(ids.len(), 5);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_table_index_sync() {
        let mut table = create_test_table();
        table
            .create_index(IndexDef::new("name_idx", "users", vec!["name".to_string()], 1))
            .unwrap();

        let row_id = table.insert(user(1, "Alice", 25));

        let index = table.get_index("name_idx").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.lookup(&IndexKey::new(Value::from("Alice"))),
            &[row_id]
        );

        // Update
        table.update(row_id, user(1, "Bob", 25)).unwrap();

        let index = table.get_index("name_idx").unwrap();
        assert!(index.lookup(&IndexKey::new(Value::from("Alice"))).is_empty());
        assert_eq!(index.lookup(&IndexKey::new(Value::from("Bob"))), &[row_id]);

        // Delete
        let removed = table.delete(row_id).unwrap();
        let index = table.get_index("name_idx").unwrap();
        assert_eq!(index.len(), 0);

        // Restore
        table.restore(row_id, removed).unwrap();
        let index = table.get_index("name_idx").unwrap();
        assert_eq!(index.lookup(&IndexKey::new(Value::from("Bob"))), &[row_id]);
        assert!(table.restore(row_id, user(1, "Bob", 25)).is_err());
    }
}
