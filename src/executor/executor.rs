//! Query Executor for relstore
//!
//! [`ExecutionEngine`] is the public call surface of the engine. It resolves
//! rows for SELECT, UPDATE and DELETE (through an index when the predicate
//! allows it), and runs every mutating call as one atomic statement on the
//! [`Database`].

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::ops::Bound;
use std::path::Path;
use tracing::{debug, info, warn};

use super::predicate::{BoundPredicate, CompareOp, Predicate};
use crate::catalog::{Column, IndexDef, Schema};
use crate::config::EngineConfig;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::storage::{DatabaseImage, IndexKey, Row, RowId, Table, Value};

/// How the rows of a query were located
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AccessPath {
    /// Every row of the table was examined
    FullScan,
    /// Equality lookup on an index
    IndexLookup { index: String },
    /// Key range scan on a single-column index
    IndexRange { index: String },
    /// Join probing the joined table through an index on its join column
    IndexJoin { index: String },
    /// Join comparing every pair of rows
    NestedLoop,
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPath::FullScan => write!(f, "full scan"),
            AccessPath::IndexLookup { index } => write!(f, "index lookup on {}", index),
            AccessPath::IndexRange { index } => write!(f, "index range on {}", index),
            AccessPath::IndexJoin { index } => write!(f, "index join on {}", index),
            AccessPath::NestedLoop => write!(f, "nested loop join"),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ORDER BY term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// Inner equi-join of the FROM table with a second table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    /// Column of the FROM table
    pub left_column: String,
    /// Column of the joined table
    pub right_column: String,
}

/// A SELECT over one table, or two joined tables
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    table: String,
    join: Option<Join>,
    /// `None` selects every column
    columns: Option<Vec<String>>,
    predicate: Option<Predicate>,
    order_by: Vec<OrderBy>,
}

impl Select {
    /// Start a `SELECT * FROM table`
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            join: None,
            columns: None,
            predicate: None,
            order_by: Vec::new(),
        }
    }

    /// `JOIN table ON from_table.left_column = table.right_column`.
    ///
    /// Result columns are then named `table.column`; bare names still work
    /// in projections, filters and ORDER BY when they are not ambiguous.
    pub fn join(
        mut self,
        table: impl Into<String>,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        self.join = Some(Join {
            table: table.into(),
            left_column: left_column.into(),
            right_column: right_column.into(),
        });
        self
    }

    /// Project the named columns, in the given order
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Add a WHERE condition; repeated calls are AND-ed
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Add an ORDER BY term
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }
}

/// Query result
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Result rows, projected to `columns`
    pub rows: Vec<Row>,
    /// Identifier of each result row (the FROM-table row for a join)
    pub row_ids: Vec<RowId>,
    /// How the rows were located
    pub access_path: AccessPath,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in result row `row`
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let position = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(position)
    }
}

/// Description of a table
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: usize,
    pub indexes: Vec<IndexDef>,
}

/// Execution Engine
#[derive(Debug)]
pub struct ExecutionEngine {
    db: Database,
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Create an engine over an empty database, with no data file
    pub fn new() -> Self {
        Self {
            db: Database::new(),
            config: EngineConfig::default(),
        }
    }

    /// Open an engine, loading the configured data file when it exists
    pub fn open(config: EngineConfig) -> Result<Self> {
        let db = match &config.data_file {
            Some(path) if path.exists() => {
                let db = Database::from_image(DatabaseImage::read(path)?)?;
                info!(path = %path.display(), tables = db.catalog().list_tables().len(), "database loaded");
                db
            }
            Some(path) => {
                info!(path = %path.display(), "no data file yet, starting empty");
                Database::new()
            }
            None => Database::new(),
        };
        Ok(Self { db, config })
    }

    /// Load a saved database.
    ///
    /// The file becomes the engine's data file. A missing file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::from_image(DatabaseImage::read(path)?)?;
        info!(path = %path.display(), tables = db.catalog().list_tables().len(), "database loaded");
        Ok(Self {
            db,
            config: EngineConfig::new().data_file(path),
        })
    }

    /// Save the last committed state to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.db.in_transaction() {
            debug!("transaction open, saving last committed state");
        }
        let image = self.db.committed_image()?;
        image.write(path, self.config.pretty_json)?;
        info!(path = %path.display(), tables = image.tables.len(), "database saved");
        Ok(())
    }

    /// Shut the engine down, saving to the data file when configured.
    ///
    /// An open transaction is rolled back first.
    pub fn shutdown(mut self) -> Result<()> {
        if self.db.in_transaction() {
            warn!("shutting down with an open transaction, rolling back");
            self.db.rollback()?;
        }
        match &self.config.data_file {
            Some(path) if self.config.save_on_shutdown => self.save(path),
            _ => Ok(()),
        }
    }

    /// The underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========== Schema ==========

    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> Result<()> {
        self.db
            .statement(|db| db.create_table(name, columns))
            .map(|_| ())
            .map_err(|e| rejected("create table", e))
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.db
            .statement(|db| db.drop_table(name))
            .map_err(|e| rejected("drop table", e))
    }

    /// Table names in creation order
    pub fn list_tables(&self) -> Vec<String> {
        self.db.catalog().list_tables()
    }

    pub fn describe_table(&self, name: &str) -> Result<TableInfo> {
        let def = self.db.catalog().get_table(name)?;
        let table = self.db.table(name)?;
        Ok(TableInfo {
            name: def.name.clone(),
            columns: def.schema().columns().to_vec(),
            row_count: table.row_count(),
            indexes: self
                .db
                .catalog()
                .table_indexes(name)
                .into_iter()
                .cloned()
                .collect(),
        })
    }

    // ========== Indexes ==========

    pub fn create_index(
        &mut self,
        name: &str,
        table: &str,
        columns: &[&str],
        unique: bool,
    ) -> Result<()> {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        self.db
            .statement(|db| db.create_index(name, table, columns, unique))
            .map_err(|e| rejected("create index", e))
    }

    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        self.db
            .statement(|db| db.drop_index(name))
            .map_err(|e| rejected("drop index", e))
    }

    // ========== Data ==========

    /// Insert a row given in column order, returning its identifier
    pub fn insert(&mut self, table: &str, values: Vec<Value>) -> Result<RowId> {
        self.db
            .statement(|db| db.insert_row(table, values))
            .map_err(|e| rejected("insert", e))
    }

    /// Insert a row by column name; unlisted columns are NULL
    pub fn insert_named(&mut self, table: &str, pairs: &[(&str, Value)]) -> Result<RowId> {
        let values = {
            let schema = self.db.table(table)?.schema();
            let mut values = vec![Value::Null; schema.column_count()];
            let mut seen = HashSet::new();
            for (column, value) in pairs {
                let position = column_position(table, schema, column)?;
                if !seen.insert(position) {
                    return Err(Error::schema(format!(
                        "column '{}' listed twice",
                        column
                    )));
                }
                values[position] = value.clone();
            }
            values
        };
        self.insert(table, values)
    }

    /// `SELECT * FROM table [WHERE predicate] [ORDER BY ...]`
    pub fn select(
        &self,
        table: &str,
        predicate: Option<Predicate>,
        order_by: Vec<OrderBy>,
    ) -> Result<QueryResult> {
        self.query(Select {
            table: table.to_string(),
            join: None,
            columns: None,
            predicate,
            order_by,
        })
    }

    /// Run a SELECT
    pub fn query(&self, select: Select) -> Result<QueryResult> {
        match &select.join {
            Some(join) => self.query_join(&select, join),
            None => self.query_table(&select),
        }
    }

    fn query_table(&self, select: &Select) -> Result<QueryResult> {
        let table = self.db.table(&select.table)?;
        let schema = table.schema();

        let predicate = bind(&select.table, schema, select.predicate.as_ref())?;
        let (projection, order) = output_positions(&select.table, schema, select)?;

        let (row_ids, access_path) = matching_rows(table, predicate.as_ref())?;
        let mut matched = Vec::with_capacity(row_ids.len());
        for row_id in row_ids {
            matched.push((row_id, table.get(row_id)?));
        }

        debug!(
            table = %select.table,
            rows = matched.len(),
            access = %access_path,
            "select"
        );
        Ok(assemble(schema, &projection, &order, matched, access_path))
    }

    /// Nested-loop inner join; the joined table is probed through an index
    /// on its join column when there is one.
    fn query_join(&self, select: &Select, join: &Join) -> Result<QueryResult> {
        if join.table == select.table {
            return Err(Error::schema(format!(
                "table '{}' cannot be joined with itself",
                join.table
            )));
        }
        let left = self.db.table(&select.table)?;
        let right = self.db.table(&join.table)?;
        let left_pos = column_position(&select.table, left.schema(), &join.left_column)?;
        let right_pos = column_position(&join.table, right.schema(), &join.right_column)?;

        let schema = Schema::joined(&select.table, left.schema(), &join.table, right.schema());
        let label = format!("{} JOIN {}", select.table, join.table);
        let predicate = bind(&label, &schema, select.predicate.as_ref())?;
        let (projection, order) = output_positions(&label, &schema, select)?;

        let probe = right
            .indexes()
            .find(|i| matches!(i.positions(), [p] if *p == right_pos));
        let access_path = match probe {
            Some(index) => AccessPath::IndexJoin {
                index: index.name().to_string(),
            },
            None => AccessPath::NestedLoop,
        };

        let mut joined = Vec::new();
        for (left_id, left_row) in left.scan() {
            // NULL never equals anything, so it joins nothing
            let Some(key) = left_row.get(left_pos).filter(|v| !v.is_null()) else {
                continue;
            };
            let mut partners: Vec<RowId> = match probe {
                Some(index) => index.lookup(&IndexKey::new(key.clone())).to_vec(),
                None => right
                    .scan()
                    .filter(|(_, row)| {
                        row.get(right_pos).and_then(|v| v.compare(key)) == Some(Ordering::Equal)
                    })
                    .map(|(id, _)| id)
                    .collect(),
            };
            partners.sort_unstable();

            for right_id in partners {
                let right_row = right.get(right_id)?;
                let row = Row::new(
                    left_row
                        .values()
                        .iter()
                        .chain(right_row.values())
                        .cloned()
                        .collect(),
                );
                if predicate.as_ref().map_or(true, |p| p.matches(&row)) {
                    joined.push((left_id, row));
                }
            }
        }

        debug!(
            table = %select.table,
            join = %join.table,
            rows = joined.len(),
            access = %access_path,
            "select"
        );
        let matched = joined.iter().map(|(id, row)| (*id, row)).collect();
        Ok(assemble(&schema, &projection, &order, matched, access_path))
    }

    /// Set columns on every matching row, returning the number of rows updated
    pub fn update(
        &mut self,
        table: &str,
        predicate: Option<Predicate>,
        assignments: &[(&str, Value)],
    ) -> Result<usize> {
        let targets = self
            .update_targets(table, predicate.as_ref(), assignments)
            .map_err(|e| rejected("update", e))?;

        let count = targets.len();
        self.db
            .statement(|db| {
                for (row_id, values) in targets {
                    db.update_row(table, row_id, values)?;
                }
                Ok(())
            })
            .map_err(|e| rejected("update", e))?;

        debug!(table, rows = count, "update");
        Ok(count)
    }

    /// Delete every matching row, returning the number of rows deleted
    pub fn delete(&mut self, table: &str, predicate: Option<Predicate>) -> Result<usize> {
        let targets = {
            let storage = self.db.table(table)?;
            let predicate = bind(table, storage.schema(), predicate.as_ref())?;
            matching_rows(storage, predicate.as_ref())?.0
        };

        let count = targets.len();
        self.db
            .statement(|db| {
                for row_id in targets {
                    db.delete_row(table, row_id)?;
                }
                Ok(())
            })
            .map_err(|e| rejected("delete", e))?;

        debug!(table, rows = count, "delete");
        Ok(count)
    }

    fn update_targets(
        &self,
        table: &str,
        predicate: Option<&Predicate>,
        assignments: &[(&str, Value)],
    ) -> Result<Vec<(RowId, Vec<Value>)>> {
        if assignments.is_empty() {
            return Err(Error::schema("UPDATE needs at least one assignment"));
        }

        let storage = self.db.table(table)?;
        let schema = storage.schema();
        let resolved: Vec<(usize, &Value)> = assignments
            .iter()
            .map(|(column, value)| Ok((column_position(table, schema, column)?, value)))
            .collect::<Result<_>>()?;
        let predicate = bind(table, schema, predicate)?;

        let (row_ids, _) = matching_rows(storage, predicate.as_ref())?;
        let mut targets = Vec::with_capacity(row_ids.len());
        for row_id in row_ids {
            let mut values = storage.get(row_id)?.values().to_vec();
            for (position, value) in &resolved {
                values[*position] = (*value).clone();
            }
            targets.push((row_id, values));
        }
        Ok(targets)
    }

    // ========== Transactions ==========

    pub fn begin(&mut self) -> Result<u64> {
        self.db.begin()
    }

    /// Commit, returning the number of operations the transaction performed
    pub fn commit(&mut self) -> Result<usize> {
        self.db.commit()
    }

    /// Roll back, returning the number of operations undone
    pub fn rollback(&mut self) -> Result<usize> {
        self.db.rollback()
    }

    pub fn in_transaction(&self) -> bool {
        self.db.in_transaction()
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn rejected(operation: &str, e: Error) -> Error {
    warn!(operation, error = %e, "statement rejected");
    e
}

fn column_position(table: &str, schema: &Schema, column: &str) -> Result<usize> {
    schema.get_column_index(column).ok_or_else(|| {
        Error::schema(format!(
            "column '{}' not found in table '{}'",
            column, table
        ))
    })
}

/// Resolve the projection and ORDER BY columns of `select`
fn output_positions(
    label: &str,
    schema: &Schema,
    select: &Select,
) -> Result<(Vec<usize>, Vec<(usize, Direction)>)> {
    let projection = match &select.columns {
        None => (0..schema.column_count()).collect(),
        Some(columns) => columns
            .iter()
            .map(|c| column_position(label, schema, c))
            .collect::<Result<_>>()?,
    };
    let order = select
        .order_by
        .iter()
        .map(|o| Ok((column_position(label, schema, &o.column)?, o.direction)))
        .collect::<Result<_>>()?;
    Ok((projection, order))
}

fn assemble(
    schema: &Schema,
    projection: &[usize],
    order: &[(usize, Direction)],
    mut matched: Vec<(RowId, &Row)>,
    access_path: AccessPath,
) -> QueryResult {
    if !order.is_empty() {
        // Stable sort keeps the scan order between equal keys
        matched.sort_by(|a, b| compare_rows(a.1, b.1, order));
    }
    QueryResult {
        columns: projection
            .iter()
            .map(|&i| schema.columns()[i].name.clone())
            .collect(),
        rows: matched.iter().map(|(_, row)| row.project(projection)).collect(),
        row_ids: matched.into_iter().map(|(id, _)| id).collect(),
        access_path,
    }
}

fn bind(
    table: &str,
    schema: &Schema,
    predicate: Option<&Predicate>,
) -> Result<Option<BoundPredicate>> {
    predicate.map(|p| p.bind(table, schema)).transpose()
}

fn compare_rows(a: &Row, b: &Row, order: &[(usize, Direction)]) -> Ordering {
    for (position, direction) in order {
        let ordering = match (a.get(*position), b.get(*position)) {
            (Some(x), Some(y)) => x.total_cmp(y),
            _ => Ordering::Equal,
        };
        let ordering = match direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Planned way of locating candidate rows
enum Access {
    Scan,
    Lookup {
        index: String,
        key: IndexKey,
    },
    Range {
        index: String,
        lower: Bound<IndexKey>,
        upper: Bound<IndexKey>,
    },
}

/// Choose an index for the top-level conjuncts of `predicate`.
///
/// Equality on every column of an index wins; otherwise a bounded
/// comparison on a single-column index; otherwise a full scan.
fn plan_access(table: &Table, predicate: Option<&BoundPredicate>) -> Access {
    let Some(predicate) = predicate else {
        return Access::Scan;
    };
    let terms = predicate.conjuncts();

    for index in table.indexes() {
        let key: Option<Vec<Value>> = index
            .positions()
            .iter()
            .map(|&pos| equality_on(&terms, pos).cloned())
            .collect();
        if let Some(key) = key {
            return Access::Lookup {
                index: index.name().to_string(),
                key: IndexKey::composite(key),
            };
        }
    }

    for index in table.indexes() {
        if let [pos] = index.positions() {
            let (lower, upper) = range_on(&terms, *pos);
            if lower != Bound::Unbounded || upper != Bound::Unbounded {
                return Access::Range {
                    index: index.name().to_string(),
                    lower,
                    upper,
                };
            }
        }
    }

    Access::Scan
}

fn equality_on<'a>(terms: &[&'a BoundPredicate], position: usize) -> Option<&'a Value> {
    terms.iter().copied().find_map(|term| match term {
        BoundPredicate::Compare {
            position: p,
            op: CompareOp::Eq,
            value,
        } if *p == position && !value.is_null() => Some(value),
        _ => None,
    })
}

fn range_on(terms: &[&BoundPredicate], position: usize) -> (Bound<IndexKey>, Bound<IndexKey>) {
    let mut lower = Bound::Unbounded;
    let mut upper = Bound::Unbounded;
    for term in terms {
        if let BoundPredicate::Compare {
            position: p,
            op,
            value,
        } = term
        {
            if *p != position || value.is_null() {
                continue;
            }
            let key = IndexKey::new(value.clone());
            match op {
                CompareOp::Gt if lower == Bound::Unbounded => lower = Bound::Excluded(key),
                CompareOp::GtEq if lower == Bound::Unbounded => lower = Bound::Included(key),
                CompareOp::Lt if upper == Bound::Unbounded => upper = Bound::Excluded(key),
                CompareOp::LtEq if upper == Bound::Unbounded => upper = Bound::Included(key),
                _ => {}
            }
        }
    }
    (lower, upper)
}

/// Identifiers of the rows matching `predicate`, ascending
fn matching_rows(
    table: &Table,
    predicate: Option<&BoundPredicate>,
) -> Result<(Vec<RowId>, AccessPath)> {
    let accept = |row: &Row| predicate.map_or(true, |p| p.matches(row));

    let (mut candidates, path) = match plan_access(table, predicate) {
        Access::Scan => {
            let row_ids = table
                .scan()
                .filter(|(_, row)| accept(row))
                .map(|(id, _)| id)
                .collect();
            return Ok((row_ids, AccessPath::FullScan));
        }
        Access::Lookup { index, key } => {
            let row_ids = table
                .get_index(&index)
                .map(|i| i.lookup(&key).to_vec())
                .unwrap_or_default();
            (row_ids, AccessPath::IndexLookup { index })
        }
        Access::Range {
            index,
            lower,
            upper,
        } => {
            let row_ids = table
                .get_index(&index)
                .map(|i| i.range(lower.as_ref(), upper.as_ref()))
                .unwrap_or_default();
            (row_ids, AccessPath::IndexRange { index })
        }
    };

    candidates.sort_unstable();
    candidates.dedup();
    let mut row_ids = Vec::with_capacity(candidates.len());
    for row_id in candidates {
        if accept(table.get(row_id)?) {
            row_ids.push(row_id);
        }
    }
    Ok((row_ids, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, TableBuilder};
    use crate::error::ConstraintKind;
    use crate::row;

    fn create_test_engine() -> ExecutionEngine {
        let mut engine = ExecutionEngine::new();
        let (name, columns) = TableBuilder::new("users")
            .primary_key("id", DataType::Integer)
            .column_unique("email", DataType::Text)
            .column("age", DataType::Integer)
            .build();
        engine.create_table(&name, columns).unwrap();
        engine
    }

    fn seed(engine: &mut ExecutionEngine) {
        engine.insert("users", row![1, "a@x.com", 30]).unwrap();
        engine.insert("users", row![2, "b@x.com", 25]).unwrap();
        engine.insert("users", row![3, "c@x.com", 30]).unwrap();
        engine.insert("users", row![4, None::<&str>, None::<i64>]).unwrap();
    }

    fn ids(result: &QueryResult) -> Vec<i64> {
        result
            .rows
            .iter()
            .filter_map(|r| r.get(0).and_then(Value::as_i64))
            .collect()
    }

    #[test]
    fn test_insert_and_select() {
        let mut engine = create_test_engine();
        seed(&mut engine);

        let result = engine.select("users", None, vec![]).unwrap();
        assert_eq!(result.columns, vec!["id", "email", "age"]);
        assert_eq!(ids(&result), vec![1, 2, 3, 4]);
        assert_eq!(result.access_path, AccessPath::FullScan);
    }

    #[test]
    fn test_primary_key_lookup() {
        let mut engine = create_test_engine();
        seed(&mut engine);

        let result = engine
            .select("users", Some(Predicate::eq("id", 3)), vec![])
            .unwrap();
        assert_eq!(ids(&result), vec![3]);
        assert_eq!(
            result.access_path,
            AccessPath::IndexLookup {
                index: "users_pkey".to_string()
            }
        );
    }

    #[test]
    fn test_index_result_equals_full_scan() {
        let mut engine = create_test_engine();
        seed(&mut engine);
        engine
            .create_index("idx_age", "users", &["age"], false)
            .unwrap();

        let predicate = Predicate::eq("age", 30);
        let indexed = engine.select("users", Some(predicate.clone()), vec![]).unwrap();
        assert_eq!(
            indexed.access_path,
            AccessPath::IndexLookup {
                index: "idx_age".to_string()
            }
        );

        // A NOT wrapper hides the conjunct from index selection
        let scanned = engine
            .select("users", Some(!!predicate), vec![])
            .unwrap();
        assert_eq!(scanned.access_path, AccessPath::FullScan);
        assert_eq!(indexed.rows, scanned.rows);
        assert_eq!(indexed.row_ids, scanned.row_ids);
    }

    #[test]
    fn test_range_scan() {
        let mut engine = create_test_engine();
        seed(&mut engine);

        let predicate = Predicate::gt_eq("id", 2).and(Predicate::lt("id", 4));
        let result = engine.select("users", Some(predicate), vec![]).unwrap();
        assert_eq!(ids(&result), vec![2, 3]);

        let inclusive = Predicate::gt("id", 1).and(Predicate::lt_eq("id", 3));
        assert_eq!(
            ids(&engine.select("users", Some(inclusive), vec![]).unwrap()),
            vec![2, 3]
        );
        assert_eq!(
            result.access_path,
            AccessPath::IndexRange {
                index: "users_pkey".to_string()
            }
        );
    }

    #[test]
    fn test_negative_zero_is_zero() {
        let mut engine = ExecutionEngine::new();
        let (name, columns) = TableBuilder::new("readings")
            .column_unique("v", DataType::Real)
            .build();
        engine.create_table(&name, columns).unwrap();

        engine.insert("readings", row![-0.0]).unwrap();
        let err = engine.insert("readings", row![0.0]).unwrap_err();
        assert!(matches!(
            err,
            Error::ConstraintViolation {
                kind: ConstraintKind::Unique,
                ..
            }
        ));

        let scanned = engine
            .select("readings", Some(Predicate::eq("v", 0)), vec![])
            .unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned.rows[0].values(), &[Value::Real(0.0)]);
    }

    #[test]
    fn test_order_by_and_projection() {
        let mut engine = create_test_engine();
        seed(&mut engine);

        let result = engine
            .query(
                Select::from("users")
                    .columns(["age", "id"])
                    .filter(Predicate::is_not_null("age"))
                    .order_by(OrderBy::desc("age")),
            )
            .unwrap();
        assert_eq!(result.columns, vec!["age", "id"]);
        // Ties keep row-id order
        let pairs: Vec<(i64, i64)> = result
            .rows
            .iter()
            .map(|r| (r.values()[0].as_i64().unwrap(), r.values()[1].as_i64().unwrap()))
            .collect();
        assert_eq!(pairs, vec![(30, 1), (30, 3), (25, 2)]);
        assert_eq!(result.value(2, "id"), Some(&Value::Integer(2)));
    }

    fn seed_orders(engine: &mut ExecutionEngine) {
        let (name, columns) = TableBuilder::new("orders")
            .primary_key("id", DataType::Integer)
            .column("user_id", DataType::Integer)
            .column("amount", DataType::Real)
            .build();
        engine.create_table(&name, columns).unwrap();
        engine.insert("orders", row![10, 1, 9.5]).unwrap();
        engine.insert("orders", row![11, 3, 20.0]).unwrap();
        engine.insert("orders", row![12, 1, 5.0]).unwrap();
        engine.insert("orders", row![13, None::<i64>, 1.0]).unwrap();
        engine.insert("orders", row![14, 99, 2.0]).unwrap();
    }

    fn order_ids(result: &QueryResult) -> Vec<i64> {
        (0..result.len())
            .filter_map(|i| result.value(i, "orders.id").and_then(Value::as_i64))
            .collect()
    }

    #[test]
    fn test_join() {
        let mut engine = create_test_engine();
        seed(&mut engine);
        seed_orders(&mut engine);

        let join = Select::from("users").join("orders", "id", "user_id");
        let scanned = engine.query(join.clone()).unwrap();
        assert_eq!(
            scanned.columns,
            vec![
                "users.id",
                "users.email",
                "users.age",
                "orders.id",
                "orders.user_id",
                "orders.amount"
            ]
        );
        assert_eq!(scanned.access_path, AccessPath::NestedLoop);
        assert_eq!(scanned.row_ids, vec![RowId(1), RowId(1), RowId(3)]);
        assert_eq!(order_ids(&scanned), vec![10, 12, 11]);

        engine
            .create_index("idx_orders_user", "orders", &["user_id"], false)
            .unwrap();
        let probed = engine.query(join).unwrap();
        assert_eq!(
            probed.access_path,
            AccessPath::IndexJoin {
                index: "idx_orders_user".to_string()
            }
        );
        assert_eq!(probed.rows, scanned.rows);
    }

    #[test]
    fn test_join_filter_projection_and_order() {
        let mut engine = create_test_engine();
        seed(&mut engine);
        seed_orders(&mut engine);

        let result = engine
            .query(
                Select::from("users")
                    .join("orders", "id", "user_id")
                    .columns(["email", "orders.id", "amount"])
                    .filter(Predicate::gt("amount", 6))
                    .order_by(OrderBy::desc("amount")),
            )
            .unwrap();
        assert_eq!(result.columns, vec!["users.email", "orders.id", "orders.amount"]);
        assert_eq!(
            result.rows,
            vec![
                Row::new(row!["c@x.com", 11, 20.0]),
                Row::new(row!["a@x.com", 10, 9.5]),
            ]
        );

        let reversed = engine
            .query(Select::from("orders").join("users", "user_id", "id"))
            .unwrap();
        assert_eq!(
            reversed.access_path,
            AccessPath::IndexJoin {
                index: "users_pkey".to_string()
            }
        );
        assert_eq!(reversed.row_ids, vec![RowId(1), RowId(2), RowId(3)]);
    }

    #[test]
    fn test_join_errors() {
        let mut engine = create_test_engine();
        seed_orders(&mut engine);

        let ambiguous = Select::from("users")
            .join("orders", "id", "user_id")
            .filter(Predicate::eq("id", 1));
        assert!(matches!(engine.query(ambiguous), Err(Error::Schema(_))));
        assert!(matches!(
            engine.query(Select::from("users").join("users", "id", "id")),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            engine.query(Select::from("users").join("ghost", "id", "id")),
            Err(Error::TableNotFound(_))
        ));
        assert!(matches!(
            engine.query(Select::from("users").join("orders", "id", "nope")),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_unknown_columns() {
        let engine = create_test_engine();
        assert!(matches!(
            engine.select("users", Some(Predicate::eq("nope", 1)), vec![]),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            engine.query(Select::from("users").columns(["nope"])),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            engine.select("ghosts", None, vec![]),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_update_and_delete() {
        let mut engine = create_test_engine();
        seed(&mut engine);

        let updated = engine
            .update(
                "users",
                Some(Predicate::eq("age", 30)),
                &[("age", Value::Integer(31))],
            )
            .unwrap();
        assert_eq!(updated, 2);

        let deleted = engine
            .delete("users", Some(Predicate::like("email", "%@x.com")))
            .unwrap();
        assert_eq!(deleted, 3);

        let result = engine.select("users", None, vec![]).unwrap();
        assert_eq!(ids(&result), vec![4]);
    }

    #[test]
    fn test_failed_update_is_atomic() {
        let mut engine = create_test_engine();
        seed(&mut engine);
        engine.begin().unwrap();

        // The second row would collide on email
        let err = engine
            .update(
                "users",
                Some(Predicate::lt("id", 3)),
                &[("email", Value::from("same@x.com"))],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ConstraintViolation {
                kind: ConstraintKind::Unique,
                ..
            }
        ));
        assert!(engine.in_transaction());

        let result = engine
            .select("users", Some(Predicate::eq("email", "same@x.com")), vec![])
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(engine.commit().unwrap(), 0);
    }

    #[test]
    fn test_insert_named() {
        let mut engine = create_test_engine();
        let row_id = engine
            .insert_named("users", &[("email", Value::from("n@x.com")), ("id", Value::Integer(9))])
            .unwrap();

        let result = engine
            .select("users", Some(Predicate::eq("id", 9)), vec![])
            .unwrap();
        assert_eq!(result.row_ids, vec![row_id]);
        assert_eq!(result.value(0, "age"), Some(&Value::Null));

        assert!(matches!(
            engine.insert_named("users", &[("bogus", Value::Integer(1))]),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            engine.insert_named("users", &[("email", Value::from("x"))]),
            Err(Error::ConstraintViolation {
                kind: ConstraintKind::NotNull,
                ..
            })
        ));
    }

    #[test]
    fn test_describe_table() {
        let mut engine = create_test_engine();
        seed(&mut engine);
        engine
            .create_index("idx_age", "users", &["age"], false)
            .unwrap();

        let info = engine.describe_table("users").unwrap();
        assert_eq!(info.name, "users");
        assert_eq!(info.row_count, 4);
        assert_eq!(info.columns.len(), 3);
        let index_names: Vec<&str> = info.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(index_names, vec!["users_pkey", "users_email_key", "idx_age"]);
        assert_eq!(engine.list_tables(), vec!["users".to_string()]);
    }
}
