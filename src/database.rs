//! Database state for relstore
//!
//! [`Database`] owns the catalog, the table storage and the transaction
//! manager. Every mutation goes through [`Database::apply`], which performs
//! the change and logs its undo record in one step, so rollback can always
//! reverse what was applied.

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::catalog::{Catalog, Column, TableDef};
use crate::constraint::{validate_for_insert, validate_for_update};
use crate::error::{Error, Result};
use crate::storage::{DatabaseImage, RowId, Table, Value};
use crate::transaction::{TransactionManager, UndoRecord};

/// A mutation routed through the apply-and-log path
#[derive(Debug, Clone)]
pub enum WriteOp {
    CreateTable {
        name: String,
        columns: Vec<Column>,
    },
    DropTable {
        name: String,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        unique: bool,
    },
    DropIndex {
        name: String,
    },
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Update {
        table: String,
        row_id: RowId,
        values: Vec<Value>,
    },
    Delete {
        table: String,
        row_id: RowId,
    },
}

/// The complete logical database
#[derive(Debug, Clone, Default)]
pub struct Database {
    catalog: Catalog,
    tables: IndexMap<String, Table>,
    transactions: TransactionManager,
    /// Nesting depth of running statements
    statement_depth: usize,
}

impl Database {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a database from a persisted image
    pub fn from_image(image: DatabaseImage) -> Result<Self> {
        let (catalog, tables) = image.restore()?;
        Ok(Self {
            catalog,
            tables,
            ..Self::default()
        })
    }

    /// Capture the last committed state.
    ///
    /// Effects of an open transaction are reverted in a scratch copy first,
    /// so they never reach the image.
    pub fn committed_image(&self) -> Result<DatabaseImage> {
        let pending: Vec<UndoRecord> = self.transactions.pending_undo().cloned().collect();
        if pending.is_empty() {
            return DatabaseImage::capture(&self.catalog, &self.tables);
        }

        let mut scratch = self.clone();
        scratch.replay(pending)?;
        DatabaseImage::capture(&scratch.catalog, &scratch.tables)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Get table storage by name
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    // ========== Transactions ==========

    /// Begin an explicit transaction
    pub fn begin(&mut self) -> Result<u64> {
        let trans_id = self.transactions.begin()?;
        info!(trans_id, "transaction started");
        Ok(trans_id)
    }

    /// Commit the explicit transaction, returning the number of logged operations
    pub fn commit(&mut self) -> Result<usize> {
        let trans = self.transactions.commit()?;
        info!(
            trans_id = trans.id,
            operations = trans.operation_count(),
            "transaction committed"
        );
        Ok(trans.operation_count())
    }

    /// Roll back the explicit transaction, returning the number of undone operations
    pub fn rollback(&mut self) -> Result<usize> {
        let (trans, records) = self.transactions.rollback()?;
        let count = records.len();
        self.replay(records)?;
        info!(trans_id = trans.id, operations = count, "transaction rolled back");
        Ok(count)
    }

    pub fn in_transaction(&self) -> bool {
        self.transactions.is_active()
    }

    /// Run one statement atomically.
    ///
    /// If `f` fails, everything it applied is undone; an enclosing explicit
    /// transaction stays active. Outside a transaction a successful
    /// statement is committed on return.
    pub fn statement<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let savepoint = self.transactions.savepoint();
        self.statement_depth += 1;
        let result = f(self);
        self.statement_depth -= 1;

        match result {
            Ok(value) => {
                if self.statement_depth == 0 {
                    self.transactions.end_statement();
                }
                Ok(value)
            }
            Err(e) => {
                let records = self.transactions.rollback_to(savepoint);
                if !records.is_empty() {
                    debug!(operations = records.len(), "undoing failed statement");
                }
                self.replay(records)?;
                if self.statement_depth == 0 {
                    self.transactions.end_statement();
                }
                Err(e)
            }
        }
    }

    // ========== Mutations ==========

    /// Create a table and its constraint indexes
    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> Result<Arc<TableDef>> {
        self.apply(WriteOp::CreateTable {
            name: name.to_string(),
            columns,
        })?;
        self.catalog.get_table(name)
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.apply(WriteOp::DropTable {
            name: name.to_string(),
        })?;
        Ok(())
    }

    pub fn create_index(
        &mut self,
        name: &str,
        table: &str,
        columns: Vec<String>,
        unique: bool,
    ) -> Result<()> {
        self.apply(WriteOp::CreateIndex {
            name: name.to_string(),
            table: table.to_string(),
            columns,
            unique,
        })?;
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        self.apply(WriteOp::DropIndex {
            name: name.to_string(),
        })?;
        Ok(())
    }

    /// Validate and insert a row, returning its identifier
    pub fn insert_row(&mut self, table: &str, values: Vec<Value>) -> Result<RowId> {
        self.apply(WriteOp::Insert {
            table: table.to_string(),
            values,
        })?
        .ok_or_else(|| Error::Internal("insert produced no row id".to_string()))
    }

    /// Validate and replace a row
    pub fn update_row(&mut self, table: &str, row_id: RowId, values: Vec<Value>) -> Result<()> {
        self.apply(WriteOp::Update {
            table: table.to_string(),
            row_id,
            values,
        })?;
        Ok(())
    }

    pub fn delete_row(&mut self, table: &str, row_id: RowId) -> Result<()> {
        self.apply(WriteOp::Delete {
            table: table.to_string(),
            row_id,
        })?;
        Ok(())
    }

    /// Apply a mutation and log how to reverse it.
    ///
    /// Returns the new row id for inserts. A failed operation leaves the
    /// database unchanged and logs nothing.
    pub fn apply(&mut self, op: WriteOp) -> Result<Option<RowId>> {
        let record = self.perform(op)?;
        let row_id = match &record {
            UndoRecord::InsertRow { row_id, .. } => Some(*row_id),
            _ => None,
        };
        if self.transactions.is_active() || self.statement_depth > 0 {
            self.transactions.record(record);
        }
        Ok(row_id)
    }

    fn perform(&mut self, op: WriteOp) -> Result<UndoRecord> {
        match op {
            WriteOp::CreateTable { name, columns } => {
                let (def, index_defs) = self.catalog.create_table(&name, columns)?;
                let mut table = Table::new(def);
                for index_def in index_defs {
                    if let Err(e) = table.create_index(index_def) {
                        self.catalog.drop_table(&name)?;
                        return Err(e);
                    }
                }
                self.tables.insert(name.clone(), table);
                info!(table = %name, "table created");
                Ok(UndoRecord::CreateTable { name })
            }
            WriteOp::DropTable { name } => {
                let (position, def, indexes) = self.catalog.drop_table(&name)?;
                let table = self
                    .tables
                    .shift_remove(&name)
                    .ok_or_else(|| Error::Internal(format!("table '{}' has no storage", name)))?;
                info!(table = %name, rows = table.row_count(), "table dropped");
                Ok(UndoRecord::DropTable {
                    position,
                    def,
                    indexes,
                    table: Box::new(table),
                })
            }
            WriteOp::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => {
                let def = self.catalog.new_index_def(&name, &table, columns, unique)?;
                let storage = self.table_mut(&table)?;
                storage.create_index(def.clone())?;
                if let Err(e) = self.catalog.add_index(def) {
                    self.table_mut(&table)?.drop_index(&name);
                    return Err(e);
                }
                info!(index = %name, table = %table, unique, "index created");
                Ok(UndoRecord::CreateIndex { name, table })
            }
            WriteOp::DropIndex { name } => {
                let def = self.catalog.drop_index(&name)?;
                self.table_mut(&def.table_name)?.drop_index(&name);
                info!(index = %name, "index dropped");
                Ok(UndoRecord::DropIndex { def })
            }
            WriteOp::Insert { table, values } => {
                let row = validate_for_insert(self.table(&table)?, values)?;
                let row_id = self.table_mut(&table)?.insert(row);
                debug!(table = %table, %row_id, "row inserted");
                Ok(UndoRecord::InsertRow { table, row_id })
            }
            WriteOp::Update {
                table,
                row_id,
                values,
            } => {
                let row = validate_for_update(self.table(&table)?, row_id, values)?;
                let before = self.table_mut(&table)?.update(row_id, row)?;
                debug!(table = %table, %row_id, "row updated");
                Ok(UndoRecord::UpdateRow {
                    table,
                    row_id,
                    before,
                })
            }
            WriteOp::Delete { table, row_id } => {
                let row = self.table_mut(&table)?.delete(row_id)?;
                debug!(table = %table, %row_id, "row deleted");
                Ok(UndoRecord::DeleteRow { table, row_id, row })
            }
        }
    }

    // ========== Undo ==========

    /// Replay undo records, newest first.
    ///
    /// Any failure means the log no longer matches the data, which is an
    /// internal invariant violation.
    fn replay(&mut self, records: Vec<UndoRecord>) -> Result<()> {
        for record in records {
            if let Err(e) = self.revert(record) {
                error!(error = %e, "undo log replay failed");
                return Err(Error::Internal(format!("undo log replay failed: {}", e)));
            }
        }
        Ok(())
    }

    fn revert(&mut self, record: UndoRecord) -> Result<()> {
        match record {
            UndoRecord::InsertRow { table, row_id } => {
                self.table_mut(&table)?.delete(row_id)?;
            }
            UndoRecord::UpdateRow {
                table,
                row_id,
                before,
            } => {
                self.table_mut(&table)?.update(row_id, before)?;
            }
            UndoRecord::DeleteRow { table, row_id, row } => {
                self.table_mut(&table)?.restore(row_id, row)?;
            }
            UndoRecord::CreateTable { name } => {
                self.catalog.drop_table(&name)?;
                self.tables.shift_remove(&name);
            }
            UndoRecord::DropTable {
                position,
                def,
                indexes,
                table,
            } => {
                let name = def.name.clone();
                self.catalog.restore_table(position, def, indexes);
                self.tables.insert(name, *table);
            }
            UndoRecord::CreateIndex { name, table } => {
                self.catalog.remove_index(&name);
                self.table_mut(&table)?.drop_index(&name);
            }
            UndoRecord::DropIndex { def } => {
                self.table_mut(&def.table_name)?.create_index(def.clone())?;
                self.catalog.add_index(def)?;
            }
        }
        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }
}
