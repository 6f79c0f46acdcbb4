//! System Catalog for relstore
//!
//! This module manages metadata about tables and indexes.

use super::schema::{Column, IndexDef, Schema, TableDef};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// System Catalog - manages all database metadata
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Table definitions by name, in creation order
    tables: IndexMap<String, Arc<TableDef>>,
    /// Index definitions by name
    indexes: IndexMap<String, IndexDef>,
    /// Next table ID
    next_table_id: u32,
    /// Next index ID
    next_index_id: u32,
}

/// Implicit index name backing a PRIMARY KEY column
pub fn primary_index_name(table: &str) -> String {
    format!("{}_pkey", table)
}

/// Implicit index name backing a UNIQUE column
pub fn unique_index_name(table: &str, column: &str) -> String {
    format!("{}_{}_key", table, column)
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self {
            tables: IndexMap::new(),
            indexes: IndexMap::new(),
            next_table_id: 1,
            next_index_id: 1,
        }
    }

    /// Create a new table together with the unique indexes its constraints need.
    ///
    /// Returns the table definition and the implicit index definitions that
    /// were registered for it.
    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<Column>,
    ) -> Result<(Arc<TableDef>, Vec<IndexDef>)> {
        if self.tables.contains_key(name) {
            return Err(Error::schema(format!("table '{}' already exists", name)));
        }
        if columns.is_empty() {
            return Err(Error::schema(format!(
                "table '{}' must have at least one column",
                name
            )));
        }

        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(Error::schema(format!(
                    "duplicate column '{}' in table '{}'",
                    col.name, name
                )));
            }
        }
        if columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(Error::schema(format!(
                "table '{}' declares more than one PRIMARY KEY",
                name
            )));
        }

        // A primary key is NOT NULL and UNIQUE whatever the caller passed in
        let columns = columns
            .into_iter()
            .map(|c| if c.primary_key { c.primary_key(true) } else { c })
            .collect();
        let schema = Schema::from_columns(columns);

        let mut implicit: Vec<(String, String, bool)> = Vec::new();
        for col in schema.columns() {
            let (base, primary) = if col.primary_key {
                (primary_index_name(name), true)
            } else if col.unique {
                (unique_index_name(name, &col.name), false)
            } else {
                continue;
            };
            let taken = |candidate: &str| {
                self.indexes.contains_key(candidate)
                    || implicit.iter().any(|(n, _, _)| n == candidate)
            };
            // Numbered suffix when another index already owns the name
            let mut index_name = base.clone();
            let mut suffix = 1;
            while taken(&index_name) {
                index_name = format!("{}{}", base, suffix);
                suffix += 1;
            }
            implicit.push((index_name, col.name.clone(), primary));
        }

        let table_def = Arc::new(TableDef::new(name, schema, self.next_table_id));
        self.next_table_id += 1;
        self.tables.insert(name.to_string(), table_def.clone());

        let mut index_defs = Vec::with_capacity(implicit.len());
        for (index_name, column, primary) in implicit {
            let def = IndexDef::new(index_name, name, vec![column], self.next_index_id)
                .unique(true)
                .primary(primary)
                .implicit(true);
            self.next_index_id += 1;
            self.indexes.insert(def.name.clone(), def.clone());
            index_defs.push(def);
        }

        Ok((table_def, index_defs))
    }

    /// Get a table by name
    pub fn get_table(&self, name: &str) -> Result<Arc<TableDef>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Get a table's schema by name
    pub fn get_schema(&self, name: &str) -> Result<&Schema> {
        self.tables
            .get(name)
            .map(|t| t.schema())
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Check if a table exists
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Drop a table and every index defined on it.
    ///
    /// Returns the removed definitions and the table's catalog position so
    /// the drop can be reversed exactly.
    pub fn drop_table(&mut self, name: &str) -> Result<(usize, Arc<TableDef>, Vec<IndexDef>)> {
        let (position, _, table_def) = self
            .tables
            .shift_remove_full(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;

        let mut removed = Vec::new();
        self.indexes.retain(|_, idx| {
            if idx.table_name == name {
                removed.push(idx.clone());
                false
            } else {
                true
            }
        });
        removed.sort_by_key(|idx| idx.id);

        Ok((position, table_def, removed))
    }

    /// Put back a table removed by [`Catalog::drop_table`]; used only while
    /// undoing DDL.
    pub(crate) fn restore_table(
        &mut self,
        position: usize,
        table_def: Arc<TableDef>,
        indexes: Vec<IndexDef>,
    ) {
        let position = position.min(self.tables.len());
        self.tables
            .shift_insert(position, table_def.name.clone(), table_def);
        for idx in indexes {
            self.indexes.insert(idx.name.clone(), idx);
        }
    }

    /// List all table names in creation order
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Validate a new index and allocate its definition.
    ///
    /// The definition is not registered until [`Catalog::add_index`] is
    /// called, so a failed build leaves the catalog untouched.
    pub fn new_index_def(
        &mut self,
        name: &str,
        table_name: &str,
        columns: Vec<String>,
        unique: bool,
    ) -> Result<IndexDef> {
        let table = self.get_table(table_name)?;

        if self.indexes.contains_key(name) {
            return Err(Error::schema(format!("index '{}' already exists", name)));
        }
        if columns.is_empty() {
            return Err(Error::schema(format!(
                "index '{}' must cover at least one column",
                name
            )));
        }

        let mut seen = HashSet::new();
        for col_name in &columns {
            if table.get_column(col_name).is_none() {
                return Err(Error::schema(format!(
                    "column '{}' not found in table '{}'",
                    col_name, table_name
                )));
            }
            if !seen.insert(col_name.as_str()) {
                return Err(Error::schema(format!(
                    "column '{}' listed twice in index '{}'",
                    col_name, name
                )));
            }
        }

        let def = IndexDef::new(name, table_name, columns, self.next_index_id).unique(unique);
        self.next_index_id += 1;
        Ok(def)
    }

    /// Register an index definition
    pub fn add_index(&mut self, def: IndexDef) -> Result<()> {
        if self.indexes.contains_key(&def.name) {
            return Err(Error::schema(format!(
                "index '{}' already exists",
                def.name
            )));
        }
        self.indexes.insert(def.name.clone(), def);
        Ok(())
    }

    /// Get an index by name
    pub fn get_index(&self, name: &str) -> Result<&IndexDef> {
        self.indexes
            .get(name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    /// Drop a user-created index
    pub fn drop_index(&mut self, name: &str) -> Result<IndexDef> {
        let def = self.get_index(name)?;
        if def.implicit {
            return Err(Error::schema(format!(
                "index '{}' backs a table constraint and cannot be dropped",
                name
            )));
        }
        self.indexes
            .shift_remove(name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    /// Remove an index regardless of origin; used only while undoing DDL
    pub(crate) fn remove_index(&mut self, name: &str) -> Option<IndexDef> {
        self.indexes.shift_remove(name)
    }

    /// Get all indexes for a table, oldest first
    pub fn table_indexes(&self, table_name: &str) -> Vec<&IndexDef> {
        let mut indexes: Vec<&IndexDef> = self
            .indexes
            .values()
            .filter(|idx| idx.table_name == table_name)
            .collect();
        indexes.sort_by_key(|idx| idx.id);
        indexes
    }

    /// List all index names
    pub fn list_indexes(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    /// Get table schema info as a formatted string
    pub fn get_table_info(&self, name: &str) -> Result<String> {
        let table = self.get_table(name)?;
        let mut info = format!("Table: {}\n", table.name());
        info.push_str("Columns:\n");

        for col in table.schema().columns() {
            let flags = col.constraint_labels();
            let flags_str = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };

            info.push_str(&format!("  {} {}{}\n", col.name, col.data_type, flags_str));
        }

        let indexes = self.table_indexes(name);
        if !indexes.is_empty() {
            info.push_str("Indexes:\n");
            for idx in indexes {
                info.push_str(&format!(
                    "  {} ({}){}\n",
                    idx.name,
                    idx.columns.join(", "),
                    if idx.unique { " UNIQUE" } else { "" }
                ));
            }
        }

        Ok(info)
    }

    fn indexes_by_id(&self) -> Vec<IndexDef> {
        let mut indexes: Vec<IndexDef> = self.indexes.values().cloned().collect();
        indexes.sort_by_key(|idx| idx.id);
        indexes
    }

    /// Snapshot the catalog for persistence
    pub fn to_data(&self) -> CatalogData {
        CatalogData {
            tables: self.tables.values().map(|t| (**t).clone()).collect(),
            indexes: self.indexes_by_id(),
            next_table_id: self.next_table_id,
            next_index_id: self.next_index_id,
        }
    }

    /// Rebuild a catalog from persisted data, checking its internal consistency
    pub fn from_data(data: CatalogData) -> Result<Self> {
        let mut tables = IndexMap::new();
        for table in data.tables {
            if table.id >= data.next_table_id {
                return Err(Error::corrupt(format!(
                    "table '{}' has id {} beyond the id counter",
                    table.name, table.id
                )));
            }
            if table.schema.columns().iter().filter(|c| c.primary_key).count() > 1 {
                return Err(Error::corrupt(format!(
                    "table '{}' has several primary keys",
                    table.name
                )));
            }
            let name = table.name.clone();
            if tables.insert(name.clone(), Arc::new(table)).is_some() {
                return Err(Error::corrupt(format!("table '{}' listed twice", name)));
            }
        }

        let mut indexes = IndexMap::new();
        for index in data.indexes {
            let table = tables.get(&index.table_name).ok_or_else(|| {
                Error::corrupt(format!(
                    "index '{}' refers to missing table '{}'",
                    index.name, index.table_name
                ))
            })?;
            if index.columns.is_empty()
                || index.columns.iter().any(|c| !table.schema.has_column(c))
            {
                return Err(Error::corrupt(format!(
                    "index '{}' refers to unknown columns",
                    index.name
                )));
            }
            if index.id >= data.next_index_id {
                return Err(Error::corrupt(format!(
                    "index '{}' has id {} beyond the id counter",
                    index.name, index.id
                )));
            }
            let name = index.name.clone();
            if indexes.insert(name.clone(), index).is_some() {
                return Err(Error::corrupt(format!("index '{}' listed twice", name)));
            }
        }

        Ok(Self {
            tables,
            indexes,
            next_table_id: data.next_table_id,
            next_index_id: data.next_index_id,
        })
    }
}

/// Serializable proxy for Catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogData {
    pub tables: Vec<TableDef>,
    pub indexes: Vec<IndexDef>,
    pub next_table_id: u32,
    pub next_index_id: u32,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for table column lists with a fluent API
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
}

impl TableBuilder {
    /// Start building a new table
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column
    pub fn column(mut self, name: impl Into<String>, data_type: super::DataType) -> Self {
        self.columns.push(Column::new(name, data_type));
        self
    }

    /// Add a primary key column
    pub fn primary_key(mut self, name: impl Into<String>, data_type: super::DataType) -> Self {
        self.columns
            .push(Column::new(name, data_type).primary_key(true));
        self
    }

    /// Add a NOT NULL column
    pub fn column_not_null(mut self, name: impl Into<String>, data_type: super::DataType) -> Self {
        self.columns
            .push(Column::new(name, data_type).nullable(false));
        self
    }

    /// Add a UNIQUE column
    pub fn column_unique(mut self, name: impl Into<String>, data_type: super::DataType) -> Self {
        self.columns.push(Column::new(name, data_type).unique(true));
        self
    }

    /// Table name and columns, ready for `create_table`
    pub fn build(self) -> (String, Vec<Column>) {
        (self.name, self.columns)
    }
}
