//! Schema definitions for relstore
//!
//! This module defines table schemas, column metadata and index definitions.

use super::types::DataType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConstraintKind;

/// Column definition in a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Data type
    pub data_type: DataType,
    /// Column position (0-indexed)
    pub position: usize,
    /// Is this column nullable?
    pub nullable: bool,
    /// Is this the primary key?
    pub primary_key: bool,
    /// Is this column unique?
    pub unique: bool,
}

impl Column {
    /// Create a new nullable column with no constraints
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            position: 0,
            nullable: true,
            primary_key: false,
            unique: false,
        }
    }

    /// Set nullable flag
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set primary key flag. A primary key is always NOT NULL.
    pub fn primary_key(mut self, pk: bool) -> Self {
        self.primary_key = pk;
        if pk {
            self.nullable = false;
        }
        self
    }

    /// Set unique flag
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Constraint flags in display order
    pub fn constraint_labels(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.primary_key {
            flags.push("PRIMARY KEY");
        }
        if self.unique {
            flags.push("UNIQUE");
        }
        if !self.nullable {
            flags.push("NOT NULL");
        }
        flags
    }
}

/// Table schema - defines the structure of a table
///
/// Serialized as its plain column list; the lookup map is rebuilt on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Column>", into = "Vec<Column>")]
pub struct Schema {
    /// Ordered list of columns
    columns: Vec<Column>,
    /// Column name to index mapping
    name_to_index: HashMap<String, usize>,
}

impl Schema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            name_to_index: HashMap::new(),
        }
    }

    /// Create a schema from a list of columns
    pub fn from_columns(columns: Vec<Column>) -> Self {
        let mut schema = Self::new();
        for col in columns {
            schema.add_column(col);
        }
        schema
    }

    /// Add a column to the schema
    pub fn add_column(&mut self, mut column: Column) {
        column.position = self.columns.len();
        self.name_to_index
            .insert(column.name.clone(), column.position);
        self.columns.push(column);
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.name_to_index.get(name).map(|&idx| &self.columns[idx])
    }

    /// Get column index by name
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// The primary key column, if any
    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Schema of a row made by joining a `left` row with a `right` row.
    ///
    /// Columns are named `table.column`. A bare column name still resolves
    /// when only one of the two tables has it.
    pub fn joined(left_name: &str, left: &Schema, right_name: &str, right: &Schema) -> Schema {
        let mut schema = Schema::new();
        for (table, side) in [(left_name, left), (right_name, right)] {
            for col in side.columns() {
                let mut col = col.clone();
                col.name = format!("{}.{}", table, col.name);
                schema.add_column(col);
            }
        }

        for (table, side, other) in [(left_name, left, right), (right_name, right, left)] {
            for col in side.columns() {
                if other.has_column(&col.name) {
                    continue;
                }
                if let Some(position) = schema.get_column_index(&format!("{}.{}", table, col.name)) {
                    schema.name_to_index.insert(col.name.clone(), position);
                }
            }
        }
        schema
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Column>> for Schema {
    fn from(columns: Vec<Column>) -> Self {
        Schema::from_columns(columns)
    }
}

impl From<Schema> for Vec<Column> {
    fn from(schema: Schema) -> Self {
        schema.columns
    }
}

/// Table definition - full table metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name
    pub name: String,
    /// Table schema
    pub schema: Schema,
    /// Table ID (for internal use)
    pub id: u32,
}

impl TableDef {
    /// Create a new table definition
    pub fn new(name: impl Into<String>, schema: Schema, id: u32) -> Self {
        Self {
            name: name.into(),
            schema,
            id,
        }
    }

    /// Get the table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the table schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.schema.get_column(name)
    }
}

/// Index definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name
    pub name: String,
    /// Table this index belongs to
    pub table_name: String,
    /// Columns included in the index
    pub columns: Vec<String>,
    /// Is this a unique index?
    pub unique: bool,
    /// Is this the primary key index?
    pub primary: bool,
    /// Created by the catalog to back a PRIMARY KEY or UNIQUE column
    pub implicit: bool,
    /// Index ID
    pub id: u32,
}

impl IndexDef {
    /// Create a new index definition
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<String>,
        id: u32,
    ) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            columns,
            unique: false,
            primary: false,
            implicit: false,
            id,
        }
    }

    /// Set unique flag
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set primary flag
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    /// Set implicit flag
    pub fn implicit(mut self, implicit: bool) -> Self {
        self.implicit = implicit;
        self
    }

    /// The constraint reported when this index rejects a key
    pub fn constraint_kind(&self) -> ConstraintKind {
        if self.primary {
            ConstraintKind::PrimaryKey
        } else {
            ConstraintKind::Unique
        }
    }
}
