//! Transaction module
//!
//! Transaction lifecycle and the undo log.

pub mod transaction;

pub use transaction::{Savepoint, Transaction, TransactionManager, TransactionState, UndoRecord};
