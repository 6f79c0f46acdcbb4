//! Query execution module
//!
//! This module contains the predicates and the execution engine.

pub mod executor;
pub mod predicate;

pub use executor::{
    AccessPath, Direction, ExecutionEngine, Join, OrderBy, QueryResult, Select, TableInfo,
};
pub use predicate::{BoundPredicate, CompareOp, Predicate};
