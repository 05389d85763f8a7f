//! In-memory gateway
//!
//! [`MemoryGateway`] is a small wide-column store that executes structured
//! statements directly. Families hold rows sorted by key; rows hold columns
//! sorted by name, each with a write timestamp. It reproduces the store
//! behaviors the mapping layer depends on:
//!
//! - families may use a reversed comparator (columns sorted descending)
//! - a whole-row delete leaves the key behind with no columns; selecting
//!   `*` or several columns from such a row returns a single key column
//! - `FIRST` bounds columns per row, `LIMIT` bounds rows
//! - column slices with inclusive bounds, walked in comparator order or
//!   against it when `REVERSED`
//! - counter updates, `COUNT(*)`, and predicates on the key or on any column
//!   joined with `AND`
//!
//! Failures can be queued with [`MemoryGateway::fail_next`], and every
//! executed statement is recorded for inspection.

use crate::gateway::{EventSink, Gateway, LogLevel, QueryMetadata, QueryResult};
use async_trait::async_trait;
use casio_core::{Column, Error, Predicate, Result, Row, Statement, StatementKind, Value};
use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::OnceLock;

#[derive(Debug, Clone)]
struct Cell {
    value: Value,
    timestamp: i64,
}

#[derive(Debug, Clone)]
struct StoredRow {
    key: Value,
    columns: BTreeMap<String, Cell>,
}

#[derive(Debug, Default)]
struct Family {
    reversed: bool,
    rows: BTreeMap<String, StoredRow>,
}

impl Family {
    fn row_mut(&mut self, key: &Value) -> &mut StoredRow {
        self.rows
            .entry(key.to_key_string())
            .or_insert_with(|| StoredRow {
                key: key.clone(),
                columns: BTreeMap::new(),
            })
    }
}

/// In-memory wide-column store implementing [`Gateway`]
pub struct MemoryGateway {
    families: DashMap<String, Family>,
    failures: Mutex<VecDeque<(Option<String>, Error)>>,
    metadata: Mutex<Option<QueryMetadata>>,
    events: Mutex<Option<EventSink>>,
    statements: Mutex<Vec<Statement>>,
    clock: AtomicI64,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// Empty store
    pub fn new() -> Self {
        Self {
            families: DashMap::new(),
            failures: Mutex::new(VecDeque::new()),
            metadata: Mutex::new(None),
            events: Mutex::new(None),
            statements: Mutex::new(Vec::new()),
            clock: AtomicI64::new(1),
        }
    }

    /// Declare a family, optionally with a reversed comparator
    pub fn create_family(&self, name: &str, reversed: bool) {
        self.families.entry(name.to_string()).or_default().reversed = reversed;
    }

    /// Write one column directly, bypassing statements
    pub fn put_column(&self, family: &str, key: impl Into<Value>, column: Column) {
        let mut fam = self.families.entry(family.to_string()).or_default();
        fam.row_mut(&key.into()).columns.insert(
            column.name,
            Cell {
                value: column.value,
                timestamp: column.timestamp,
            },
        );
    }

    /// Stored columns of one row in name order; `None` when the key was never written
    pub fn row_columns(&self, family: &str, key: impl Into<Value>) -> Option<Vec<Column>> {
        let fam = self.families.get(family)?;
        let row = fam.rows.get(&key.into().to_key_string())?;
        Some(
            row.columns
                .iter()
                .map(|(name, cell)| Column::new(name.as_str(), cell.value.clone(), cell.timestamp))
                .collect(),
        )
    }

    /// Fail the next executed statement with `error`
    pub fn fail_next(&self, error: Error) {
        self.failures.lock().push_back((None, error));
    }

    /// Fail the next statement against `family` with `error`
    pub fn fail_next_on(&self, family: &str, error: Error) {
        self.failures
            .lock()
            .push_back((Some(family.to_string()), error));
    }

    fn take_failure(&self, statement: &Statement) -> Option<Error> {
        let mut failures = self.failures.lock();
        let at = failures.iter().position(|(family, _)| {
            family.as_deref().map_or(true, |f| f == statement.family())
        })?;
        failures.remove(at).map(|(_, error)| error)
    }

    /// Metadata attached to every result from now on
    pub fn set_metadata(&self, metadata: Option<QueryMetadata>) {
        *self.metadata.lock() = metadata;
    }

    /// Forward a driver log line to the attached keyspace
    pub fn log(&self, level: LogLevel, message: &str) {
        if let Some(events) = self.events.lock().as_ref() {
            events.log(level, message);
        }
    }

    /// Every statement executed so far, oldest first
    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().clone()
    }

    /// The most recently executed statement
    pub fn last_statement(&self) -> Option<Statement> {
        self.statements.lock().last().cloned()
    }

    /// Forget recorded statements
    pub fn clear_statements(&self) {
        self.statements.lock().clear();
    }

    fn tick(&self) -> i64 {
        self.clock.fetch_add(1, AtomicOrdering::Relaxed)
    }

    fn apply(&self, statement: &Statement) -> Result<Vec<Row>> {
        match statement.kind() {
            StatementKind::Select => self.select(statement),
            StatementKind::Count => self.count(statement),
            StatementKind::Insert => self.insert(statement).map(|_| Vec::new()),
            StatementKind::Update => self.update(statement).map(|_| Vec::new()),
            StatementKind::CounterUpdate => self.counter(statement).map(|_| Vec::new()),
            StatementKind::Delete => self.delete(statement).map(|_| Vec::new()),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    fn matching_rows(&self, statement: &Statement) -> Result<Vec<StoredRow>> {
        let Some(fam) = self.families.get(statement.family()) else {
            return Ok(Vec::new());
        };
        let conditions = match statement.predicate() {
            Some(p) => parse_predicate(p)?,
            None => Vec::new(),
        };
        let key_alias = statement.key_column();
        let mut rows: Vec<StoredRow> = fam
            .rows
            .values()
            .filter(|row| conditions.iter().all(|c| c.matches(row, key_alias)))
            .cloned()
            .collect();
        if let Some(limit) = statement.limit_count() {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn select(&self, statement: &Statement) -> Result<Vec<Row>> {
        let family_reversed = self
            .families
            .get(statement.family())
            .map(|f| f.reversed)
            .unwrap_or(false);
        let rows = self.matching_rows(statement)?;
        let wants_many = statement.selects_all() || statement.columns().len() > 1;

        Ok(rows
            .into_iter()
            .map(|row| {
                if row.columns.is_empty() {
                    let columns = if wants_many {
                        vec![Column::new(statement.key_column(), row.key.clone(), 0)]
                    } else {
                        Vec::new()
                    };
                    return Row::new(row.key, columns);
                }
                let columns = project(&row, statement, family_reversed);
                Row::new(row.key, columns)
            })
            .collect())
    }

    fn count(&self, statement: &Statement) -> Result<Vec<Row>> {
        let live = self
            .matching_rows(statement)?
            .iter()
            .filter(|row| !row.columns.is_empty())
            .count();
        let count = i64::try_from(live).unwrap_or(i64::MAX);
        Ok(vec![Row::new(Value::Null, vec![Column::new("count", count, 0)])])
    }

    // =========================================================================
    // Writes
    // =========================================================================

    fn write_timestamp(&self, statement: &Statement) -> i64 {
        statement.write_timestamp().unwrap_or_else(|| self.tick())
    }

    fn target_keys(&self, statement: &Statement) -> Result<Vec<Value>> {
        let predicate = statement
            .predicate()
            .ok_or_else(|| Error::storage(format!("{} requires a key predicate", statement.label())))?;
        let key_alias = statement.key_column();
        for condition in parse_predicate(predicate)? {
            if condition.column != key_alias {
                continue;
            }
            match condition.op {
                Op::Eq => return Ok(condition.values),
                Op::In => return Ok(condition.values),
                _ => {}
            }
        }
        Err(Error::storage(format!(
            "{} requires an equality or IN on {}",
            statement.label(),
            key_alias
        )))
    }

    fn insert(&self, statement: &Statement) -> Result<()> {
        let key_alias = statement.key_column();
        let key = statement
            .assignments()
            .iter()
            .find(|(name, _)| name == key_alias)
            .map(|(_, v)| v.clone())
            .filter(Value::is_present)
            .ok_or_else(|| Error::storage(format!("insert into {} without {}", statement.family(), key_alias)))?;
        let ts = self.write_timestamp(statement);

        let mut fam = self.families.entry(statement.family().to_string()).or_default();
        let row = fam.row_mut(&key);
        for (name, value) in statement.assignments() {
            if name == key_alias {
                continue;
            }
            write_cell(row, name, value.clone(), ts);
        }
        Ok(())
    }

    fn update(&self, statement: &Statement) -> Result<()> {
        let keys = self.target_keys(statement)?;
        let ts = self.write_timestamp(statement);
        let mut fam = self.families.entry(statement.family().to_string()).or_default();
        for key in keys {
            let row = fam.row_mut(&key);
            for (name, value) in statement.assignments() {
                write_cell(row, name, value.clone(), ts);
            }
        }
        Ok(())
    }

    fn counter(&self, statement: &Statement) -> Result<()> {
        let keys = self.target_keys(statement)?;
        let ts = self.write_timestamp(statement);
        let mut fam = self.families.entry(statement.family().to_string()).or_default();
        for key in keys {
            let row = fam.row_mut(&key);
            for (name, delta) in statement.counters() {
                let current = row
                    .columns
                    .get(name)
                    .and_then(|c| c.value.as_int())
                    .unwrap_or(0);
                row.columns.insert(
                    name.clone(),
                    Cell {
                        value: Value::Int(current + delta),
                        timestamp: ts,
                    },
                );
            }
        }
        Ok(())
    }

    fn delete(&self, statement: &Statement) -> Result<()> {
        let keys = self.target_keys(statement)?;
        let Some(mut fam) = self.families.get_mut(statement.family()) else {
            return Ok(());
        };
        for key in keys {
            let Some(row) = fam.rows.get_mut(&key.to_key_string()) else {
                continue;
            };
            if statement.columns().is_empty() {
                row.columns.clear();
            } else {
                for name in statement.columns() {
                    row.columns.remove(name);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn execute(&self, statement: &Statement) -> Result<QueryResult> {
        self.statements.lock().push(statement.clone());
        if let Some(error) = self.take_failure(statement) {
            return Err(error);
        }
        let rows = self.apply(statement)?;
        Ok(QueryResult {
            rows,
            metadata: self.metadata.lock().clone(),
        })
    }

    fn attach(&self, events: EventSink) {
        *self.events.lock() = Some(events);
    }
}

fn write_cell(row: &mut StoredRow, name: &str, value: Value, timestamp: i64) {
    if value.is_null() {
        row.columns.remove(name);
    } else {
        row.columns.insert(name.to_string(), Cell { value, timestamp });
    }
}

/// Columns of a live row under the statement's projection
fn project(row: &StoredRow, statement: &Statement, family_reversed: bool) -> Vec<Column> {
    let to_column = |(name, cell): (&String, &Cell)| {
        Column::new(name.as_str(), cell.value.clone(), cell.timestamp)
    };

    let mut columns: Vec<Column> = if let Some(range) = statement.range() {
        let descending = family_reversed != statement.is_reversed();
        let in_bounds = |name: &str| {
            let (low, high) = if descending {
                (&range.end, &range.start)
            } else {
                (&range.start, &range.end)
            };
            (low.is_empty() || name >= low.as_str()) && (high.is_empty() || name <= high.as_str())
        };
        let mut cols: Vec<Column> = row
            .columns
            .iter()
            .filter(|(name, _)| in_bounds(name))
            .map(to_column)
            .collect();
        if descending {
            cols.reverse();
        }
        cols
    } else if statement.selects_all() {
        let mut cols: Vec<Column> = row.columns.iter().map(to_column).collect();
        if family_reversed {
            cols.reverse();
        }
        cols
    } else {
        statement
            .columns()
            .iter()
            .filter_map(|name| row.columns.get_key_value(name).map(to_column))
            .collect()
    };

    if let Some(first) = statement.first_count() {
        columns.truncate(first);
    }
    columns
}

// =============================================================================
// Predicates
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    In,
}

#[derive(Debug, Clone)]
struct Condition {
    column: String,
    op: Op,
    values: Vec<Value>,
}

impl Condition {
    fn matches(&self, row: &StoredRow, key_alias: &str) -> bool {
        let actual = if self.column == key_alias {
            &row.key
        } else {
            match row.columns.get(&self.column) {
                Some(cell) => &cell.value,
                None => return false,
            }
        };
        match self.op {
            Op::Eq | Op::In => self
                .values
                .iter()
                .any(|v| compare(actual, v) == Ordering::Equal),
            op => self.values.first().is_some_and(|v| {
                let ord = compare(actual, v);
                match op {
                    Op::Lt => ord == Ordering::Less,
                    Op::Gt => ord == Ordering::Greater,
                    Op::Le => ord != Ordering::Greater,
                    _ => ord != Ordering::Less,
                }
            }),
        }
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
        _ => a.to_key_string().cmp(&b.to_key_string()),
    }
}

fn comparison_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)^\s*(\w+)\s*(<=|>=|=|<|>|\bin\b)\s*(.+?)\s*$").expect("valid regex")
    })
}

fn and_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\s+and\s+").expect("valid regex"))
}

fn parse_predicate(predicate: &Predicate) -> Result<Vec<Condition>> {
    and_pattern()
        .split(&predicate.clause)
        .map(|part| parse_condition(part, predicate))
        .collect()
}

fn parse_condition(part: &str, predicate: &Predicate) -> Result<Condition> {
    let bad = || Error::storage(format!("unsupported predicate: {}", predicate.clause));
    let caps = comparison_pattern().captures(part).ok_or_else(bad)?;
    let column = caps[1].to_string();
    let op = match caps[2].to_ascii_lowercase().as_str() {
        "=" => Op::Eq,
        "<" => Op::Lt,
        ">" => Op::Gt,
        "<=" => Op::Le,
        ">=" => Op::Ge,
        _ => Op::In,
    };

    let mut rhs = caps[3].trim();
    if op == Op::In {
        rhs = rhs
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(bad)?
            .trim();
    }

    let values = if let Some(name) = rhs.strip_prefix(':') {
        match predicate.args.get(name) {
            Some(Value::Array(items)) => items.clone(),
            Some(value) => vec![value.clone()],
            None => return Err(Error::storage(format!("unbound parameter :{name}"))),
        }
    } else {
        rhs.split(',').map(|lit| parse_literal(lit.trim())).collect()
    };
    Ok(Condition { column, op, values })
}

fn parse_literal(lit: &str) -> Value {
    if let Some(inner) = lit.strip_prefix('\'').and_then(|l| l.strip_suffix('\'')) {
        return Value::from(inner.replace("''", "'"));
    }
    if let Ok(i) = lit.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = lit.parse::<f64>() {
        return Value::Float(f);
    }
    Value::from(lit)
}
