//! Transaction Manager
//!
//! Handles transaction lifecycle (Begin, Commit, Rollback) and the undo log.
//!
//! Every mutation appends an [`UndoRecord`] describing how to reverse it.
//! Outside an explicit transaction the records of the running statement are
//! kept in a statement log that is discarded when the statement succeeds.

use std::sync::Arc;

use crate::catalog::{IndexDef, TableDef};
use crate::error::{Error, Result};
use crate::storage::{Row, RowId, Table};

/// Transaction State
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// How to reverse one logged mutation
#[derive(Debug, Clone)]
pub enum UndoRecord {
    /// A row was inserted; delete it
    InsertRow { table: String, row_id: RowId },
    /// A row was updated; put back the prior version
    UpdateRow {
        table: String,
        row_id: RowId,
        before: Row,
    },
    /// A row was deleted; restore it under its identifier
    DeleteRow {
        table: String,
        row_id: RowId,
        row: Row,
    },
    /// A table was created; drop it
    CreateTable { name: String },
    /// A table was dropped; put it back with rows, indexes and counters
    DropTable {
        position: usize,
        def: Arc<TableDef>,
        indexes: Vec<IndexDef>,
        table: Box<Table>,
    },
    /// An index was created; drop it
    CreateIndex { name: String, table: String },
    /// An index was dropped; rebuild it from its definition
    DropIndex { def: IndexDef },
}

/// Transaction Context
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: u64,
    pub state: TransactionState,
    undo_log: Vec<UndoRecord>,
}

impl Transaction {
    fn new(id: u64) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            undo_log: Vec::new(),
        }
    }

    /// Number of logged operations
    pub fn operation_count(&self) -> usize {
        self.undo_log.len()
    }

    /// Logged records, oldest first
    pub fn undo_log(&self) -> &[UndoRecord] {
        &self.undo_log
    }
}

/// Position in the undo log at the start of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint(usize);

/// Transaction Manager
#[derive(Debug, Clone)]
pub struct TransactionManager {
    /// The explicit transaction, if one is open
    current: Option<Transaction>,
    /// Undo records of the running auto-commit statement
    statement_log: Vec<UndoRecord>,
    /// Next Transaction ID
    next_trans_id: u64,
}

impl TransactionManager {
    /// Create a new transaction manager
    pub fn new() -> Self {
        Self {
            current: None,
            statement_log: Vec::new(),
            next_trans_id: 1,
        }
    }

    /// Begin a new transaction
    pub fn begin(&mut self) -> Result<u64> {
        if let Some(trans) = &self.current {
            return Err(Error::Transaction(format!(
                "transaction {} is already active",
                trans.id
            )));
        }

        let trans_id = self.next_trans_id;
        self.next_trans_id += 1;
        self.current = Some(Transaction::new(trans_id));
        Ok(trans_id)
    }

    /// Commit the active transaction, discarding its undo log
    pub fn commit(&mut self) -> Result<Transaction> {
        let mut trans = self.take_active()?;
        trans.state = TransactionState::Committed;
        Ok(trans)
    }

    /// End the active transaction as aborted.
    ///
    /// Returns the transaction and its undo records, newest first, for the
    /// caller to replay.
    pub fn rollback(&mut self) -> Result<(Transaction, Vec<UndoRecord>)> {
        let mut trans = self.take_active()?;
        trans.state = TransactionState::Aborted;
        let mut records = std::mem::take(&mut trans.undo_log);
        records.reverse();
        Ok((trans, records))
    }

    /// Check if an explicit transaction is active
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// The active transaction
    pub fn current(&self) -> Option<&Transaction> {
        self.current.as_ref()
    }

    /// Append an undo record for a mutation that was just applied
    pub fn record(&mut self, record: UndoRecord) {
        self.log_mut().push(record);
    }

    /// Mark the start of a statement
    pub fn savepoint(&self) -> Savepoint {
        Savepoint(self.log().len())
    }

    /// Remove the records logged since `savepoint`, newest first
    pub fn rollback_to(&mut self, savepoint: Savepoint) -> Vec<UndoRecord> {
        let log = self.log_mut();
        let start = savepoint.0.min(log.len());
        let mut records: Vec<UndoRecord> = log.drain(start..).collect();
        records.reverse();
        records
    }

    /// Finish a successful statement; auto-commit records are dropped
    pub fn end_statement(&mut self) {
        if self.current.is_none() {
            self.statement_log.clear();
        }
    }

    /// The undo records that would be replayed to reach the last committed
    /// state, newest first
    pub fn pending_undo(&self) -> impl Iterator<Item = &UndoRecord> {
        self.log().iter().rev()
    }

    fn take_active(&mut self) -> Result<Transaction> {
        self.current
            .take()
            .ok_or_else(|| Error::Transaction("no active transaction".to_string()))
    }

    fn log(&self) -> &Vec<UndoRecord> {
        match &self.current {
            Some(trans) => &trans.undo_log,
            None => &self.statement_log,
        }
    }

    fn log_mut(&mut self) -> &mut Vec<UndoRecord> {
        match &mut self.current {
            Some(trans) => &mut trans.undo_log,
            None => &mut self.statement_log,
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
