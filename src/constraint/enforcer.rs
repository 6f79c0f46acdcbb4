//! Constraint Enforcer for relstore
//!
//! Validation never touches the table. It returns the normalized row that
//! the caller stores, or the first constraint the values break.
//!
//! Checks run in a fixed order:
//! 1. the value count matches the column count
//! 2. NOT NULL columns hold a value
//! 3. every value has its column's type (INTEGER widens into REAL)
//! 4. no unique index already holds the row's key

use crate::catalog::Schema;
use crate::error::{ConstraintKind, Error, Result};
use crate::storage::{Row, RowId, Table, Value};

/// Validate values for a new row
pub fn validate_for_insert(table: &Table, values: Vec<Value>) -> Result<Row> {
    let row = check_values(table.name(), table.schema(), values)?;
    check_unique(table, &row, None)?;
    Ok(row)
}

/// Validate the replacement values of an existing row
pub fn validate_for_update(table: &Table, row_id: RowId, values: Vec<Value>) -> Result<Row> {
    table.get(row_id)?;
    let row = check_values(table.name(), table.schema(), values)?;
    check_unique(table, &row, Some(row_id))?;
    Ok(row)
}

/// Check arity, nullability and types of a row against a schema.
///
/// Returns the row with values coerced to their column types.
pub fn check_values(table_name: &str, schema: &Schema, values: Vec<Value>) -> Result<Row> {
    if values.len() != schema.column_count() {
        return Err(Error::schema(format!(
            "table '{}' has {} columns but {} values were supplied",
            table_name,
            schema.column_count(),
            values.len()
        )));
    }

    for (col, value) in schema.columns().iter().zip(&values) {
        if value.is_null() && !col.nullable {
            return Err(Error::ConstraintViolation {
                kind: ConstraintKind::NotNull,
                table: table_name.to_string(),
                columns: vec![col.name.clone()],
            });
        }
    }

    let mut normalized = Vec::with_capacity(values.len());
    for (col, value) in schema.columns().iter().zip(values) {
        if value.is_null() {
            normalized.push(value);
            continue;
        }
        let finite = !matches!(value, Value::Real(f) if !f.is_finite());
        if !col.data_type.accepts(&value) || !finite {
            return Err(Error::TypeMismatch {
                column: col.name.clone(),
                expected: col.data_type.to_string(),
                found: if finite {
                    value.type_name().to_string()
                } else {
                    format!("non-finite {}", value.type_name())
                },
            });
        }
        normalized.push(col.data_type.coerce(value));
    }

    Ok(Row::new(normalized))
}

fn check_unique(table: &Table, row: &Row, except: Option<RowId>) -> Result<()> {
    for index in table.indexes() {
        if index.conflict(row, except).is_some() {
            tracing::debug!(
                table = table.name(),
                index = index.name(),
                "unique key already present"
            );
            return Err(index.violation());
        }
    }
    Ok(())
}
