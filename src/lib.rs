//! relstore - A single-node relational storage engine written in Rust
//!
//! This library provides the core components of the engine:
//! - System catalog (tables, columns, index definitions)
//! - Storage (row store, B+ tree indexes, persisted JSON image)
//! - Constraint enforcement (NOT NULL, types, PRIMARY KEY, UNIQUE)
//! - Transactions with an undo log
//! - Query execution (predicates, index selection, ordering)

pub mod catalog;
pub mod config;
pub mod constraint;
pub mod database;
pub mod error;
pub mod executor;
pub mod storage;
pub mod transaction;

pub use config::EngineConfig;
pub use database::Database;
pub use error::{ConstraintKind, Error, Result};
pub use executor::{AccessPath, ExecutionEngine, OrderBy, Predicate, QueryResult, Select};
pub use storage::{Row, RowId, Value};
