//! Secondary indexes for relstore
//!
//! An [`Index`] binds an index definition to a B+ tree over the indexed
//! columns of one table. Rows whose key has a NULL component are left out of
//! the tree, so UNIQUE indexes accept any number of NULLs.

use std::ops::Bound;

use super::btree::{BPlusTree, IndexKey};
use super::row_store::RowId;
use super::value::Row;
use crate::catalog::{IndexDef, Schema};
use crate::error::{Error, Result};

/// A built index over one table
#[derive(Debug, Clone)]
pub struct Index {
    def: IndexDef,
    /// Positions of the indexed columns in the table schema
    positions: Vec<usize>,
    tree: BPlusTree,
}

impl Index {
    /// Build an index from the current table contents.
    ///
    /// Fails with `ConstraintViolation` if the index is unique and two rows
    /// share a non-NULL key.
    pub fn build<'a>(
        def: IndexDef,
        schema: &Schema,
        rows: impl Iterator<Item = (RowId, &'a Row)>,
    ) -> Result<Self> {
        let mut positions = Vec::with_capacity(def.columns.len());
        for col_name in &def.columns {
            let pos = schema.get_column_index(col_name).ok_or_else(|| {
                Error::schema(format!(
                    "column '{}' not found in table '{}'",
                    col_name, def.table_name
                ))
            })?;
            positions.push(pos);
        }

        let mut index = Self {
            def,
            positions,
            tree: BPlusTree::new(),
        };

        for (row_id, row) in rows {
            if index.conflict(row, None).is_some() {
                return Err(index.violation());
            }
            index.on_insert(row_id, row);
        }

        Ok(index)
    }

    /// Index definition
    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Positions of the indexed columns in the table schema
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Key of `row` for this index, or `None` when it is omitted (NULL component)
    pub fn key_for(&self, row: &Row) -> Option<IndexKey> {
        let key = IndexKey::composite(
            self.positions
                .iter()
                .map(|&pos| row.get(pos).cloned().unwrap_or(crate::storage::Value::Null))
                .collect(),
        );
        if key.has_null() {
            None
        } else {
            Some(key)
        }
    }

    /// For a unique index, the row (other than `except`) already holding
    /// `row`'s key
    pub fn conflict(&self, row: &Row, except: Option<RowId>) -> Option<RowId> {
        if !self.def.unique {
            return None;
        }
        let key = self.key_for(row)?;
        self.tree
            .search(&key)
            .iter()
            .copied()
            .find(|id| Some(*id) != except)
    }

    /// The error reported when this index rejects a key
    pub fn violation(&self) -> Error {
        Error::ConstraintViolation {
            kind: self.def.constraint_kind(),
            table: self.def.table_name.clone(),
            columns: self.def.columns.clone(),
        }
    }

    /// Row store hook: a row was inserted
    pub fn on_insert(&mut self, row_id: RowId, row: &Row) {
        if let Some(key) = self.key_for(row) {
            self.tree.insert(key, row_id);
        }
    }

    /// Row store hook: a row changed from `old` to `new`
    pub fn on_update(&mut self, row_id: RowId, old: &Row, new: &Row) {
        let old_key = self.key_for(old);
        let new_key = self.key_for(new);
        if old_key == new_key {
            return;
        }
        if let Some(key) = old_key {
            self.tree.remove(&key, row_id);
        }
        if let Some(key) = new_key {
            self.tree.insert(key, row_id);
        }
    }

    /// Row store hook: a row was deleted
    pub fn on_delete(&mut self, row_id: RowId, row: &Row) {
        if let Some(key) = self.key_for(row) {
            self.tree.remove(&key, row_id);
        }
    }

    /// Row ids whose key equals `key`
    pub fn lookup(&self, key: &IndexKey) -> &[RowId] {
        self.tree.search(key)
    }

    /// Row ids whose key lies within the bounds, ascending by key
    pub fn range(&self, lower: Bound<&IndexKey>, upper: Bound<&IndexKey>) -> Vec<RowId> {
        self.tree.range(lower, upper)
    }

    /// All (key, row ids) entries in key order
    pub fn entries(&self) -> Vec<(IndexKey, Vec<RowId>)> {
        self.tree.entries()
    }

    /// Number of indexed rows
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType};
    use crate::error::ConstraintKind;
    use crate::storage::Value;

    fn schema() -> Schema {
        Schema::from_columns(vec![
            Column::new("id", DataType::Integer),
            Column::new("email", DataType::Text),
        ])
    }

    fn row(id: i64, email: Option<&str>) -> Row {
        Row::new(vec![Value::Integer(id), Value::from(email)])
    }

    fn email_key(email: &str) -> IndexKey {
        IndexKey::new(Value::from(email))
    }

    #[test]
    fn test_build_and_lookup() {
        let rows = vec![
            (RowId(1), row(1, Some("a@x.com"))),
            (RowId(2), row(2, Some("b@x.com"))),
            (RowId(3), row(3, None)),
        ];
        let def = IndexDef::new("idx_email", "users", vec!["email".into()], 1);
        let index = Index::build(def, &schema(), rows.iter().map(|(id, r)| (*id, r))).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup(&email_key("b@x.com")), &[RowId(2)]);
        assert!(index.key_for(&rows[2].1).is_none());
    }

    #[test]
    fn test_unique_build_rejects_duplicates() {
        let rows = vec![
            (RowId(1), row(1, Some("a@x.com"))),
            (RowId(2), row(2, Some("a@x.com"))),
        ];
        let def = IndexDef::new("uq_email", "users", vec!["email".into()], 1).unique(true);
        let err = Index::build(def, &schema(), rows.iter().map(|(id, r)| (*id, r))).unwrap_err();

        assert!(matches!(
            err,
            Error::ConstraintViolation {
                kind: ConstraintKind::Unique,
                ..
            }
        ));
    }

    #[test]
    fn test_unique_allows_many_nulls() {
        let rows = vec![(RowId(1), row(1, None)), (RowId(2), row(2, None))];
        let def = IndexDef::new("uq_email", "users", vec!["email".into()], 1).unique(true);
        let index = Index::build(def, &schema(), rows.iter().map(|(id, r)| (*id, r))).unwrap();

        assert!(index.is_empty());
        assert_eq!(index.conflict(&row(3, None), None), None);
    }

    #[test]
    fn test_hooks_keep_tree_in_sync() {
        let def = IndexDef::new("uq_email", "users", vec!["email".into()], 1).unique(true);
        let mut index = Index::build(def, &schema(), std::iter::empty()).unwrap();

        let a = row(1, Some("a@x.com"));
        index.on_insert(RowId(1), &a);
        assert_eq!(index.conflict(&row(9, Some("a@x.com")), None), Some(RowId(1)));
        assert_eq!(index.conflict(&a, Some(RowId(1))), None);

        let b = row(1, Some("b@x.com"));
        index.on_update(RowId(1), &a, &b);
        assert!(index.lookup(&email_key("a@x.com")).is_empty());
        assert_eq!(index.lookup(&email_key("b@x.com")), &[RowId(1)]);

        index.on_delete(RowId(1), &b);
        assert!(index.is_empty());
    }

    #[test]
    fn test_unknown_column() {
        let def = IndexDef::new("bad", "users", vec!["nope".into()], 1);
        let result = Index::build(def, &schema(), std::iter::empty());
        assert!(matches!(result, Err(Error::Schema(_))));
    }
}
