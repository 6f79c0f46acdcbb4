//! Persistence for relstore
//!
//! The whole database is saved as one JSON document: a format tag, a
//! version, the catalog, and for every table its rows (keyed by row id), its
//! row id counter and its index entries.
//!
//! Saving writes `<path>.tmp`, syncs it and renames it over `<path>`, so a
//! crash leaves either the old or the new image. Loading checks the image
//! against itself: rows must fit their schema and every index is rebuilt
//! from the rows and compared with the stored entries.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::btree::IndexKey;
use super::row_store::{RowId, RowStore};
use super::table::Table;
use super::value::Row;
use crate::catalog::{Catalog, CatalogData};
use crate::constraint::check_values;
use crate::error::{Error, Result};

/// Format tag written into every image
pub const FORMAT_TAG: &str = "relstore";

/// Image layout version
pub const FORMAT_VERSION: u32 = 1;

/// Persisted form of a whole database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseImage {
    pub format: String,
    pub version: u32,
    pub catalog: CatalogData,
    pub tables: Vec<TableImage>,
}

/// Persisted form of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableImage {
    pub name: String,
    pub next_row_id: u64,
    pub rows: Vec<(RowId, Row)>,
    pub indexes: Vec<IndexImage>,
}

/// Persisted entries of one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexImage {
    pub name: String,
    pub entries: Vec<(IndexKey, Vec<RowId>)>,
}

impl DatabaseImage {
    /// Capture the catalog and table contents
    pub fn capture(catalog: &Catalog, tables: &IndexMap<String, Table>) -> Result<Self> {
        let mut images = Vec::with_capacity(tables.len());
        for name in catalog.list_tables() {
            let table = tables.get(&name).ok_or_else(|| {
                Error::Internal(format!("table '{}' has no storage", name))
            })?;
            images.push(TableImage::capture(table));
        }

        Ok(Self {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            catalog: catalog.to_data(),
            tables: images,
        })
    }

    /// Rebuild the catalog and tables, validating the image
    pub fn restore(self) -> Result<(Catalog, IndexMap<String, Table>)> {
        check_header(&self.format, self.version)?;
        let catalog = Catalog::from_data(self.catalog)?;

        if self.tables.len() != catalog.list_tables().len() {
            return Err(Error::corrupt(format!(
                "catalog lists {} tables but the image stores {}",
                catalog.list_tables().len(),
                self.tables.len()
            )));
        }

        let mut tables = IndexMap::with_capacity(self.tables.len());
        for image in self.tables {
            let name = image.name.clone();
            let table = image.restore(&catalog)?;
            if tables.insert(name.clone(), table).is_some() {
                return Err(Error::corrupt(format!("table '{}' stored twice", name)));
            }
        }

        Ok((catalog, tables))
    }

    /// Write the image to `path` atomically
    pub fn write(&self, path: &Path, pretty: bool) -> Result<()> {
        let bytes = if pretty {
            serde_json::to_vec_pretty(self)
        } else {
            serde_json::to_vec(self)
        }
        .map_err(|e| Error::Internal(format!("failed to serialize database: {}", e)))?;

        let temp_path = temp_path(path);
        let result = write_synced(&temp_path, &bytes).and_then(|()| fs::rename(&temp_path, path));
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::Io(e));
        }
        Ok(())
    }

    /// Read an image from `path`.
    ///
    /// A missing or unreadable file is an I/O error; anything that is not a
    /// well-formed image of a supported version is corrupt state.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;

        let json: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|e| Error::corrupt(format!("invalid JSON: {}", e)))?;

        let format = json.get("format").and_then(|v| v.as_str()).unwrap_or("");
        let version = json
            .get("version")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);
        check_header(format, version)?;

        serde_json::from_value(json)
            .map_err(|e| Error::corrupt(format!("malformed database image: {}", e)))
    }
}

impl TableImage {
    fn capture(table: &Table) -> Self {
        Self {
            name: table.name().to_string(),
            next_row_id: table.row_store().next_row_id(),
            rows: table.scan().map(|(id, row)| (id, row.clone())).collect(),
            indexes: table
                .indexes()
                .map(|index| IndexImage {
                    name: index.name().to_string(),
                    entries: index.entries(),
                })
                .collect(),
        }
    }

    fn restore(self, catalog: &Catalog) -> Result<Table> {
        let def = catalog.get_table(&self.name).map_err(|_| {
            Error::corrupt(format!("stored table '{}' is not in the catalog", self.name))
        })?;

        let mut rows = BTreeMap::new();
        for (row_id, row) in self.rows {
            if row_id.0 == 0 || row_id.0 >= self.next_row_id {
                return Err(Error::corrupt(format!(
                    "row {} of table '{}' is outside the row id counter {}",
                    row_id, self.name, self.next_row_id
                )));
            }
            let checked = check_values(&self.name, def.schema(), row.values().to_vec())
                .map_err(|e| {
                    Error::corrupt(format!("row {} of table '{}': {}", row_id, self.name, e))
                })?;
            if checked != row {
                return Err(Error::corrupt(format!(
                    "row {} of table '{}' does not match its column types",
                    row_id, self.name
                )));
            }
            if rows.insert(row_id, row).is_some() {
                return Err(Error::corrupt(format!(
                    "row {} of table '{}' stored twice",
                    row_id, self.name
                )));
            }
        }

        let mut table = Table::with_rows(def, RowStore::from_parts(rows, self.next_row_id));

        let index_defs = catalog.table_indexes(&self.name);
        if index_defs.len() != self.indexes.len() {
            return Err(Error::corrupt(format!(
                "table '{}' stores {} indexes but the catalog defines {}",
                self.name,
                self.indexes.len(),
                index_defs.len()
            )));
        }

        for index_def in index_defs {
            let stored = self
                .indexes
                .iter()
                .find(|i| i.name == index_def.name)
                .ok_or_else(|| {
                    Error::corrupt(format!("entries for index '{}' are missing", index_def.name))
                })?;

            table.create_index(index_def.clone()).map_err(|e| {
                Error::corrupt(format!("cannot rebuild index '{}': {}", index_def.name, e))
            })?;

            let rebuilt = table
                .get_index(&index_def.name)
                .map(|index| index.entries())
                .unwrap_or_default();
            if rebuilt != stored.entries {
                return Err(Error::corrupt(format!(
                    "entries of index '{}' disagree with the rows of '{}'",
                    index_def.name, self.name
                )));
            }
        }

        Ok(table)
    }
}

fn check_header(format: &str, version: u32) -> Result<()> {
    if format != FORMAT_TAG {
        return Err(Error::corrupt(format!(
            "unexpected format tag '{}', expected '{}'",
            format, FORMAT_TAG
        )));
    }
    if version != FORMAT_VERSION {
        return Err(Error::corrupt(format!(
            "unsupported image version {}, expected {}",
            version, FORMAT_VERSION
        )));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
