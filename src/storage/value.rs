//! Value and Row types for relstore
//!
//! This module defines how data values are represented in memory.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A value in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Integer value (64-bit)
    Integer(i64),
    /// Floating point value (64-bit)
    Real(f64),
    /// Text value
    Text(String),
    /// Boolean value
    Boolean(bool),
}

// Floats compare bitwise so that Value can key hash maps and round-trip exactly
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Integer(v) => v.hash(state),
            Value::Real(v) => v.to_bits().hash(state),
            Value::Text(v) => v.hash(state),
            Value::Boolean(v) => v.hash(state),
        }
    }
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }


    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Boolean(_) => "BOOLEAN",
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Real(_) => 2,
            Value::Text(_) => 3,
        }
    }

    /// Total order used by indexes and ORDER BY.
    ///
    /// NULL sorts first, then booleans, numbers (INTEGER and REAL compared by
    /// value) and text.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => cmp_real(*a, *b),
            (Value::Integer(a), Value::Real(b)) => cmp_real(*a as f64, *b),
            (Value::Real(a), Value::Integer(b)) => cmp_real(*a, *b as f64),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Compare two values for a WHERE clause.
    ///
    /// Returns `None` when either side is NULL or the types are not
    /// comparable, which makes every comparison on them false.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() || self.type_rank() != other.type_rank() {
            return None;
        }
        Some(self.total_cmp(other))
    }
}

// -0.0 and 0.0 are the same number
fn cmp_real(a: f64, b: f64) -> Ordering {
    if a == b {
        Ordering::Equal
    } else {
        a.total_cmp(&b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A row in a table: values in column declaration order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Create a new row from values
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Get a value by column position
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Set a value by column position
    pub fn set(&mut self, index: usize, value: Value) {
        if index < self.values.len() {
            self.values[index] = value;
        }
    }

    /// Get all values
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if row is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the row and return the values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Project specific columns
    pub fn project(&self, indices: &[usize]) -> Row {
        let values = indices
            .iter()
            .filter_map(|&i| self.values.get(i).cloned())
            .collect();
        Row::new(values)
    }
}

impl FromIterator<Value> for Row {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Row::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Build a [`Row`] from a list of expressions convertible into [`Value`]
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::storage::Value::from($value)),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_comparison() {
        assert_eq!(
            Value::Integer(5).compare(&Value::Integer(3)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::from("abc").compare(&Value::from("def")),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Integer(2).compare(&Value::Real(2.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Real(-0.0).compare(&Value::Integer(0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Real(-0.0).compare(&Value::Real(0.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Real(-0.5).compare(&Value::Real(-0.0)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert_eq!(Value::from("1").compare(&Value::Integer(1)), None);
    }

    #[test]
    fn test_total_order() {
        let mut values = vec![
            Value::from("b"),
            Value::Integer(3),
            Value::Null,
            Value::Real(2.5),
            Value::Boolean(true),
            Value::from("a"),
        ];
        values.sort_by(|a, b| a.total_cmp(b));

        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Boolean(true),
                Value::Real(2.5),
                Value::Integer(3),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn test_row_operations() {
        let row = Row::new(vec![
            Value::Integer(1),
            Value::from("hello"),
            Value::Boolean(true),
        ]);

        assert_eq!(row.len(), 3);
        assert_eq!(row.get(0), Some(&Value::Integer(1)));

        let projected = row.project(&[0, 2]);
        assert_eq!(projected.len(), 2);
        assert_eq!(projected.get(1), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_row_macro() {
        let values = row![1, "a@x.com", None::<i64>, 2.5];
        assert_eq!(
            values,
            vec![
                Value::Integer(1),
                Value::from("a@x.com"),
                Value::Null,
                Value::Real(2.5),
            ]
        );
    }
}
