//! Constraint enforcement module
//!
//! Row validation run before every insert and update.

pub mod enforcer;

pub use enforcer::{check_values, validate_for_insert, validate_for_update};
