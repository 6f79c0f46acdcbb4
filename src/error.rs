//! Error types for relstore
//!
//! This module defines all error types used throughout the storage engine.

use std::fmt;

use thiserror::Error;

/// Which constraint a rejected row would have broken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    NotNull,
    Unique,
    PrimaryKey,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::NotNull => write!(f, "NOT NULL"),
            ConstraintKind::Unique => write!(f, "UNIQUE"),
            ConstraintKind::PrimaryKey => write!(f, "PRIMARY KEY"),
        }
    }
}

/// The main error type for relstore
#[derive(Error, Debug)]
pub enum Error {
    // ========== Catalog Errors ==========
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Catalog error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Catalog error: index '{0}' not found")]
    IndexNotFound(String),

    // ========== Storage Errors ==========
    #[error("Storage error: row {row_id} not found in table '{table}'")]
    RowNotFound { table: String, row_id: u64 },

    // ========== Validation Errors ==========
    #[error("Type error: column '{column}' expects {expected}, got {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error(
        "Constraint error: {kind} constraint violated on {table}({})",
        .columns.join(", ")
    )]
    ConstraintViolation {
        kind: ConstraintKind,
        table: String,
        columns: Vec<String>,
    },

    // ========== Transaction Errors ==========
    #[error("Transaction error: {0}")]
    Transaction(String),

    // ========== Persistence Errors ==========
    #[error("Corrupt state: {0}")]
    CorruptState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptState(msg.into())
    }
}

/// Result type alias for relstore operations
pub type Result<T> = std::result::Result<T, Error>;
