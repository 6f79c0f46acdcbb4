//! Storage engine module
//!
//! This module contains the storage engine components:
//! - Values and rows
//! - Row store
//! - B+ tree and secondary indexes
//! - Tables combining rows and indexes
//! - The persisted database image

pub mod btree;
pub mod index;
pub mod persistence;
pub mod row_store;
pub mod table;
pub mod value;

pub use btree::{BPlusTree, IndexKey};
pub use index::Index;
pub use persistence::{DatabaseImage, FORMAT_TAG, FORMAT_VERSION};
pub use row_store::{RowId, RowStore};
pub use table::Table;
pub use value::{Row, Value};
