//! Data types for relstore
//!
//! This module defines the column types supported by the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::storage::Value;

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit signed integer
    Integer,
    /// UTF-8 text
    Text,
    /// Double-precision floating point
    Real,
    /// Boolean
    Boolean,
}

impl DataType {
    /// Check whether a non-null value may be stored in a column of this type.
    ///
    /// INTEGER values are accepted by REAL columns (they are widened on store).
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (DataType::Integer, Value::Integer(_))
                | (DataType::Real, Value::Real(_))
                | (DataType::Real, Value::Integer(_))
                | (DataType::Text, Value::Text(_))
                | (DataType::Boolean, Value::Boolean(_))
        )
    }

    /// Convert an accepted value into the representation stored for this type
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (DataType::Real, Value::Integer(i)) => Value::Real(i as f64),
            // Store a single zero
            (DataType::Real, Value::Real(f)) if f == 0.0 => Value::Real(0.0),
            (_, v) => v,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Real => write!(f, "REAL"),
            DataType::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "BIGINT" => Ok(DataType::Integer),
            "TEXT" | "VARCHAR" | "STRING" => Ok(DataType::Text),
            "REAL" | "FLOAT" | "DOUBLE" => Ok(DataType::Real),
            "BOOLEAN" | "BOOL" => Ok(DataType::Boolean),
            other => Err(Error::schema(format!("unknown data type '{}'", other))),
        }
    }
}
