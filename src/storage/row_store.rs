//! Row storage for relstore
//!
//! Rows live in memory, keyed by a row identifier that is handed out once and
//! never reused. Because identifiers only grow, ascending id order is the
//! insertion order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::value::Row;

/// Stable row identifier, unique for the lifetime of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-table row collection
#[derive(Debug, Clone, PartialEq)]
pub struct RowStore {
    rows: BTreeMap<RowId, Row>,
    next_row_id: u64,
}

impl RowStore {
    /// Create an empty row store
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_row_id: 1,
        }
    }

    /// Rebuild a row store from persisted parts
    pub fn from_parts(rows: BTreeMap<RowId, Row>, next_row_id: u64) -> Self {
        Self { rows, next_row_id }
    }

    /// Store a row under a fresh identifier
    pub fn insert(&mut self, row: Row) -> RowId {
        let row_id = RowId(self.next_row_id);
        self.next_row_id += 1;
        self.rows.insert(row_id, row);
        row_id
    }

    /// Put a row back under its original identifier
    pub fn restore(&mut self, row_id: RowId, row: Row) -> Option<Row> {
        if row_id.0 >= self.next_row_id {
            self.next_row_id = row_id.0 + 1;
        }
        self.rows.insert(row_id, row)
    }

    /// Get a row by identifier
    pub fn get(&self, row_id: RowId) -> Option<&Row> {
        self.rows.get(&row_id)
    }

    /// Replace a row, returning the previous version
    pub fn update(&mut self, row_id: RowId, row: Row) -> Option<Row> {
        let slot = self.rows.get_mut(&row_id)?;
        Some(std::mem::replace(slot, row))
    }

    /// Remove a row, returning it
    pub fn delete(&mut self, row_id: RowId) -> Option<Row> {
        self.rows.remove(&row_id)
    }

    /// Scan all rows in insertion order
    pub fn scan(&self) -> impl Iterator<Item = (RowId, &Row)> + '_ {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    /// Number of live rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The identifier the next insert will receive
    pub fn next_row_id(&self) -> u64 {
        self.next_row_id
    }
}

impl Default for RowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    fn row(id: i64, name: &str) -> Row {
        Row::new(vec![Value::Integer(id), Value::from(name)])
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = RowStore::new();

        let a = store.insert(row(1, "Alice"));
        let b = store.insert(row(2, "Bob"));

        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(a), Some(&row(1, "Alice")));
        assert_eq!(store.get(RowId(99)), None);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut store = RowStore::new();

        let a = store.insert(row(1, "Alice"));
        store.delete(a).unwrap();
        let b = store.insert(row(2, "Bob"));

        assert!(b > a);
        assert!(store.get(a).is_none());
    }

    #[test]
    fn test_update_returns_previous() {
        let mut store = RowStore::new();
        let id = store.insert(row(1, "Alice"));

        let old = store.update(id, row(1, "Alicia")).unwrap();
        assert_eq!(old, row(1, "Alice"));
        assert_eq!(store.get(id), Some(&row(1, "Alicia")));
        assert!(store.update(RowId(42), row(0, "x")).is_none());
    }

    #[test]
    fn test_scan_is_insertion_ordered_and_restartable() {
        let mut store = RowStore::new();
        for i in 0..5 {
            store.insert(row(i, &format!("User{}", i)));
        }
        let removed = store.delete(RowId(2)).unwrap();
        store.restore(RowId(2), removed);

        let first: Vec<RowId> = store.scan().map(|(id, _)| id).collect();
        let second: Vec<RowId> = store.scan().map(|(id, _)| id).collect();
        assert_eq!(first, vec![RowId(1), RowId(2), RowId(3), RowId(4), RowId(5)]);
        assert_eq!(first, second);
        assert_eq!(store.next_row_id(), 6);
    }
}
