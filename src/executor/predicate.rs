//! WHERE clause predicates
//!
//! Predicates name columns; before evaluation they are bound to a schema,
//! which resolves names to positions and rejects unknown columns.
//!
//! Evaluation follows SQL three-valued logic. A comparison involving NULL is
//! unknown, and a row only matches when the whole predicate is true.

use std::cmp::Ordering;
use std::fmt;

use crate::catalog::Schema;
use crate::error::{Error, Result};
use crate::storage::{Row, Value};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::LtEq => "<=",
            CompareOp::GtEq => ">=",
        };
        write!(f, "{}", s)
    }
}

/// A filter over the rows of one table
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull(String),
    IsNotNull(String),
    /// `%` matches any run of characters, `_` exactly one
    Like { column: String, pattern: String },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::NotEq, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn lt_eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::LtEq, value)
    }

    pub fn gt_eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::GtEq, value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::IsNull(column.into())
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Predicate::IsNotNull(column.into())
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Resolve column names against a table schema
    pub fn bind(&self, table: &str, schema: &Schema) -> Result<BoundPredicate> {
        let position = |column: &str| {
            schema.get_column_index(column).ok_or_else(|| {
                Error::schema(format!(
                    "column '{}' not found in table '{}'",
                    column, table
                ))
            })
        };

        Ok(match self {
            Predicate::Compare { column, op, value } => BoundPredicate::Compare {
                position: position(column)?,
                op: *op,
                value: value.clone(),
            },
            Predicate::IsNull(column) => BoundPredicate::IsNull(position(column)?),
            Predicate::IsNotNull(column) => BoundPredicate::IsNotNull(position(column)?),
            Predicate::Like { column, pattern } => BoundPredicate::Like {
                position: position(column)?,
                pattern: pattern.chars().collect(),
            },
            Predicate::And(l, r) => BoundPredicate::And(
                Box::new(l.bind(table, schema)?),
                Box::new(r.bind(table, schema)?),
            ),
            Predicate::Or(l, r) => BoundPredicate::Or(
                Box::new(l.bind(table, schema)?),
                Box::new(r.bind(table, schema)?),
            ),
            Predicate::Not(inner) => BoundPredicate::Not(Box::new(inner.bind(table, schema)?)),
        })
    }
}

impl std::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Self::Output {
        Predicate::Not(Box::new(self))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { column, op, value } => match value {
                Value::Text(s) => write!(f, "{} {} '{}'", column, op, s),
                _ => write!(f, "{} {} {}", column, op, value),
            },
            Predicate::IsNull(column) => write!(f, "{} IS NULL", column),
            Predicate::IsNotNull(column) => write!(f, "{} IS NOT NULL", column),
            Predicate::Like { column, pattern } => write!(f, "{} LIKE '{}'", column, pattern),
            Predicate::And(l, r) => write!(f, "({} AND {})", l, r),
            Predicate::Or(l, r) => write!(f, "({} OR {})", l, r),
            Predicate::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}

/// A predicate with columns resolved to positions
#[derive(Debug, Clone, PartialEq)]
pub enum BoundPredicate {
    Compare {
        position: usize,
        op: CompareOp,
        value: Value,
    },
    IsNull(usize),
    IsNotNull(usize),
    Like {
        position: usize,
        pattern: Vec<char>,
    },
    And(Box<BoundPredicate>, Box<BoundPredicate>),
    Or(Box<BoundPredicate>, Box<BoundPredicate>),
    Not(Box<BoundPredicate>),
}

impl BoundPredicate {
    /// Whether the row satisfies the predicate
    pub fn matches(&self, row: &Row) -> bool {
        self.evaluate(row) == Some(true)
    }

    /// Three-valued evaluation; `None` is unknown
    fn evaluate(&self, row: &Row) -> Option<bool> {
        match self {
            BoundPredicate::Compare {
                position,
                op,
                value,
            } => {
                let ordering = row.get(*position)?.compare(value)?;
                Some(op.holds(ordering))
            }
            BoundPredicate::IsNull(position) => {
                Some(row.get(*position).map_or(true, Value::is_null))
            }
            BoundPredicate::IsNotNull(position) => {
                Some(row.get(*position).map_or(false, |v| !v.is_null()))
            }
            BoundPredicate::Like { position, pattern } => match row.get(*position)? {
                Value::Null => None,
                Value::Text(s) => Some(like_match(s, pattern)),
                other => Some(like_match(&other.to_string(), pattern)),
            },
            BoundPredicate::And(l, r) => match (l.evaluate(row), r.evaluate(row)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            BoundPredicate::Or(l, r) => match (l.evaluate(row), r.evaluate(row)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            BoundPredicate::Not(inner) => inner.evaluate(row).map(|b| !b),
        }
    }

    /// The top-level AND-ed terms
    pub fn conjuncts(&self) -> Vec<&BoundPredicate> {
        match self {
            BoundPredicate::And(l, r) => {
                let mut terms = l.conjuncts();
                terms.extend(r.conjuncts());
                terms
            }
            other => vec![other],
        }
    }
}

/// Match `text` against a LIKE pattern
fn like_match(text: &str, pattern: &[char]) -> bool {
    let text: Vec<char> = text.chars().collect();
    let (mut t, mut p) = (0, 0);
    // Position of the last `%` and the text index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('_') => {
                t += 1;
                p += 1;
            }
            Some(c) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, tried)) => {
                    p = star + 1;
                    t = tried + 1;
                    backtrack = Some((star, tried + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType};

    fn schema() -> Schema {
        Schema::from_columns(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Text),
            Column::new("score", DataType::Real),
        ])
    }

    fn row(id: i64, name: Option<&str>, score: Option<f64>) -> Row {
        Row::new(vec![Value::Integer(id), Value::from(name), Value::from(score)])
    }

    fn matches(predicate: Predicate, row: &Row) -> bool {
        predicate.bind("t", &schema()).unwrap().matches(row)
    }

    #[test]
    fn test_comparisons() {
        let r = row(5, Some("bob"), Some(2.5));
        assert!(matches(Predicate::eq("id", 5), &r));
        assert!(matches(Predicate::not_eq("id", 4), &r));
        assert!(matches(Predicate::lt("score", 3), &r));
        assert!(matches(Predicate::gt_eq("id", 5), &r));
        assert!(matches(Predicate::lt_eq("score", 2.5), &r));
        assert!(!matches(Predicate::lt_eq("id", 4), &r));
        assert!(!matches(Predicate::gt("name", "c"), &r));
        assert!(!matches(Predicate::eq("name", 5), &r));
    }

    #[test]
    fn test_null_semantics() {
        let r = row(1, None, None);
        assert!(!matches(Predicate::eq("name", Value::Null), &r));
        assert!(!matches(Predicate::not_eq("name", "x"), &r));
        assert!(!matches(!Predicate::eq("name", "x"), &r));
        assert!(matches(Predicate::is_null("name"), &r));
        assert!(!matches(Predicate::is_not_null("score"), &r));
        assert!(matches(
            Predicate::eq("name", "x").or(Predicate::eq("id", 1)),
            &r
        ));
        assert!(!matches(
            Predicate::eq("name", "x").and(Predicate::eq("id", 1)),
            &r
        ));
    }

    #[test]
    fn test_like() {
        let pattern = |p: &str| p.chars().collect::<Vec<_>>();
        assert!(like_match("a@x.com", &pattern("%@x.com")));
        assert!(like_match("a@x.com", &pattern("a%")));
        assert!(like_match("abc", &pattern("a_c")));
        assert!(like_match("", &pattern("%")));
        assert!(like_match("aXbXc", &pattern("a%b%c")));
        assert!(!like_match("abc", &pattern("a_")));
        assert!(!like_match("abc", &pattern("b%")));

        assert!(matches(
            Predicate::like("name", "b_b"),
            &row(1, Some("bob"), None)
        ));
        assert!(!matches(Predicate::like("name", "%"), &row(1, None, None)));
    }

    #[test]
    fn test_unknown_column() {
        let err = Predicate::eq("age", 3).bind("t", &schema()).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_conjuncts_and_display() {
        let p = Predicate::eq("id", 1)
            .and(Predicate::gt("score", 1.5))
            .and(Predicate::like("name", "a%"));
        assert_eq!(p.to_string(), "((id = 1 AND score > 1.5) AND name LIKE 'a%')");
        assert_eq!(p.bind("t", &schema()).unwrap().conjuncts().len(), 3);
    }
}
