//! Wide-row pagination
//!
//! A [`ModelArray`] is one logical wide row addressed by a key: an ordered
//! run of `{name, value, timestamp}` columns. It pages through the row with
//! `range`, then extends the loaded window with `next` (toward larger names)
//! and `prev` (toward smaller names).
//!
//! ## Ordering
//!
//! Loaded rows are always ascending by column name. Families declared with a
//! reversed comparator store columns descending; the physical scan flag is
//! flipped for them so callers never see the storage direction.
//!
//! ## Page accounting
//!
//! Every bounded query asks for one column more than the caller wants. The
//! extra column, when present, proves another page exists. `has_next` and
//! `has_prev` read as true until a bounded query proves otherwise.
//!
//! ## Shards
//!
//! With `shards` configured, reads fan out to one row per shard key and the
//! results are merged by [`merge_columns`](crate::merge::merge_columns)
//! before the page accounting runs. Writes always target the bare key.

use crate::config::ArrayOptions;
use crate::keyspace::Keyspace;
use crate::merge::{merge_columns, shard_key};
use crate::model::{counter_statement, now_millis};
use casio_core::{Column, ColumnRange, Error, Predicate, Result, Statement, Value};
use futures::future::try_join_all;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Frozen wide-row type declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    name: String,
    options: ArrayOptions,
}

impl ArraySchema {
    pub(crate) fn new(name: &str, options: ArrayOptions) -> Self {
        Self {
            name: name.to_string(),
            options,
        }
    }

    /// Storage name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type options
    pub fn options(&self) -> &ArrayOptions {
        &self.options
    }
}

/// Handle for one registered wide-row type
#[derive(Clone)]
pub struct ArrayType {
    schema: Arc<ArraySchema>,
    keyspace: Keyspace,
}

impl ArrayType {
    pub(crate) fn new(schema: Arc<ArraySchema>, keyspace: Keyspace) -> Self {
        Self { schema, keyspace }
    }

    /// The frozen declaration
    pub fn schema(&self) -> &ArraySchema {
        &self.schema
    }

    /// Storage name
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Public name of the key attribute
    pub fn primary(&self) -> &str {
        &self.schema.options.primary
    }

    /// Instance for an existing key
    pub fn instance(&self, key: impl Into<String>) -> ModelArray {
        ModelArray::new(self.clone(), key.into())
    }

    /// Instance under a freshly generated key
    pub fn generate(&self) -> ModelArray {
        self.instance(uuid::Uuid::new_v4().to_string())
    }

    /// Add `delta` (default 1) to a counter column of row `key`
    pub async fn incr(&self, key: &str, column: &str, delta: Option<i64>) -> Result<()> {
        let options = &self.schema.options;
        let statement = counter_statement(
            self.name(),
            &options.key_alias,
            options.consistency.update,
            Value::from(key),
            column,
            delta.unwrap_or(1),
        );
        self.keyspace.execute(&statement).await?;
        Ok(())
    }

    /// Subtract `delta` (default 1) from a counter column of row `key`
    pub async fn decr(&self, key: &str, column: &str, delta: Option<i64>) -> Result<()> {
        self.incr(key, column, Some(-delta.unwrap_or(1))).await
    }
}

impl fmt::Debug for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayType").field("name", &self.name()).finish()
    }
}

/// Range query shape
///
/// `start`/`end` are column-name bounds, empty meaning open. A reversed
/// range walks downward from `start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeArgs {
    /// First bound in walk order
    pub start: String,
    /// Last bound in walk order
    pub end: String,
    /// Columns to return
    pub first: Option<usize>,
    /// Walk from high names to low names
    pub reversed: bool,
}

impl RangeArgs {
    /// Open range, no bound on columns
    pub fn new() -> Self {
        Self::default()
    }

    /// First bound
    pub fn start(mut self, start: &str) -> Self {
        self.start = start.to_string();
        self
    }

    /// Last bound
    pub fn end(mut self, end: &str) -> Self {
        self.end = end.to_string();
        self
    }

    /// Columns to return
    pub fn first(mut self, n: usize) -> Self {
        self.first = Some(n);
        self
    }

    /// Walk downward
    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }
}

/// A bare count: fetch this many from the current cursor
impl From<usize> for RangeArgs {
    fn from(first: usize) -> Self {
        RangeArgs::new().first(first)
    }
}

/// Row lookup by column name or position
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRef {
    /// Column name
    Name(String),
    /// Position in the loaded rows
    Index(usize),
}

impl From<&str> for RowRef {
    fn from(name: &str) -> Self {
        RowRef::Name(name.to_string())
    }
}

impl From<usize> for RowRef {
    fn from(index: usize) -> Self {
        RowRef::Index(index)
    }
}

/// One physical query
struct Scan<'a> {
    start: &'a str,
    end: &'a str,
    limit: Option<usize>,
    descending: bool,
}

/// One logical wide row
#[derive(Clone)]
pub struct ModelArray {
    ty: ArrayType,
    key: String,
    rows: Vec<Column>,
    args: Option<RangeArgs>,
    has_next: Option<bool>,
    has_prev: Option<bool>,
    created: bool,
    deleted: bool,
    ttl: Option<u32>,
}

impl ModelArray {
    fn new(ty: ArrayType, key: String) -> Self {
        Self {
            ty,
            key,
            rows: Vec::new(),
            args: None,
            has_next: None,
            has_prev: None,
            created: false,
            deleted: false,
            ttl: None,
        }
    }

    /// Row key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Type handle
    pub fn array_type(&self) -> &ArrayType {
        &self.ty
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Reset the cursor and load the first page described by `args`
    pub async fn range(&mut self, args: impl Into<RangeArgs>) -> Result<&[Column]> {
        let args = args.into();
        self.reset();
        self.args = Some(args.clone());

        let fetched = self
            .scan(Scan {
                start: &args.start,
                end: &args.end,
                limit: args.first.map(|n| n + 1),
                descending: args.reversed,
            })
            .await?;

        let mut page = fetched;
        if args.reversed {
            if let Some(n) = args.first {
                self.has_prev = Some(page.len() > n);
                page.truncate(n);
            }
            page.reverse();
        } else if let Some(n) = args.first {
            self.has_next = Some(page.len() > n);
            page.truncate(n);
        }
        self.rows = page;
        Ok(&self.rows)
    }

    fn continuation(&self, op: &str) -> Result<&RangeArgs> {
        match &self.args {
            Some(args) if !self.rows.is_empty() => Ok(args),
            _ => Err(Error::precondition(format!(
                "must call range() with results before calling {op}()"
            ))),
        }
    }

    /// Load the page after the last loaded column and append it
    pub async fn next(&mut self, args: impl Into<RangeArgs>) -> Result<Vec<Column>> {
        let args = args.into();
        let first = args.first.or(self.continuation("next")?.first);
        let start = match self.rows.last() {
            Some(last) => format!("{}\0", last.name),
            None => String::new(),
        };

        let mut page = self
            .scan(Scan {
                start: &start,
                end: &args.end,
                limit: first.map(|n| n + 1),
                descending: false,
            })
            .await?;
        if let Some(n) = first {
            self.has_next = Some(page.len() > n);
            page.truncate(n);
        }
        self.rows.extend(page.iter().cloned());
        Ok(page)
    }

    /// Load the page before the first loaded column and prepend it
    pub async fn prev(&mut self, args: impl Into<RangeArgs>) -> Result<Vec<Column>> {
        let args = args.into();
        let first = args.first.or(self.continuation("prev")?.first);
        let anchor = self.rows.first().map(|c| c.name.clone()).unwrap_or_default();

        // The walk starts at the anchor itself, which is already loaded.
        let fetched = self
            .scan(Scan {
                start: &anchor,
                end: &args.end,
                limit: first.map(|n| n + 2),
                descending: true,
            })
            .await?;
        let mut page: Vec<Column> = fetched.into_iter().filter(|c| c.name != anchor).collect();
        if let Some(n) = first {
            self.has_prev = Some(page.len() > n);
            page.truncate(n);
        }
        page.reverse();

        let mut rows = page.clone();
        rows.append(&mut self.rows);
        self.rows = rows;
        Ok(page)
    }

    async fn scan(&self, scan: Scan<'_>) -> Result<Vec<Column>> {
        let options = &self.ty.schema.options;
        match &options.shards {
            Some(suffixes) if !suffixes.is_empty() => {
                let queries = suffixes
                    .iter()
                    .map(|suffix| self.scan_key(shard_key(&self.key, suffix), &scan));
                let shards = try_join_all(queries).await?;
                debug!(
                    target: "casio::array",
                    family = self.ty.name(),
                    shards = shards.len(),
                    "Merging shard results"
                );
                Ok(merge_columns(shards, scan.descending))
            }
            _ => self.scan_key(self.key.clone(), &scan).await,
        }
    }

    async fn scan_key(&self, key: String, scan: &Scan<'_>) -> Result<Vec<Column>> {
        let options = &self.ty.schema.options;
        let physical_reversed = scan.descending != options.reversed;
        let statement = Statement::select_range(
            "range",
            self.ty.name(),
            ColumnRange::new(scan.start, scan.end),
        )
        .key_alias(&options.key_alias)
        .reversed(physical_reversed)
        .first(scan.limit)
        .consistency(options.consistency.select)
        .filter(Predicate::equals(&options.key_alias, key));

        let result = self.ty.keyspace.execute(&statement).await?;
        Ok(result
            .rows
            .into_iter()
            .next()
            .map(|row| {
                row.into_columns()
                    .into_iter()
                    .filter(|c| c.name != options.key_alias)
                    .collect()
            })
            .unwrap_or_default())
    }

    // =========================================================================
    // Local state
    // =========================================================================

    /// Number of loaded columns
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Loaded columns, ascending by name
    pub fn rows(&self) -> &[Column] {
        &self.rows
    }

    /// One loaded column by name or position
    pub fn row(&self, at: impl Into<RowRef>) -> Option<&Column> {
        match at.into() {
            RowRef::Name(name) => self.rows.iter().find(|c| c.name == name),
            RowRef::Index(i) => self.rows.get(i),
        }
    }

    /// False only once a bounded query proved there is nothing after the window
    pub fn has_next(&self) -> bool {
        self.has_next != Some(false)
    }

    /// False only once a bounded query proved there is nothing before the window
    pub fn has_prev(&self) -> bool {
        self.has_prev != Some(false)
    }

    /// Drop loaded columns and cursor state; the key is kept
    pub fn reset(&mut self) {
        self.rows.clear();
        self.args = None;
        self.has_next = None;
        self.has_prev = None;
    }

    /// Merge columns into the loaded window
    ///
    /// A name already present is replaced; the window stays sorted by name.
    pub fn set<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = Column>,
    {
        for row in rows {
            match self.rows.binary_search_by(|c| c.name.cmp(&row.name)) {
                Ok(i) => self.rows[i] = row,
                Err(i) => self.rows.insert(i, row),
            }
        }
    }

    /// Set one column with the current time as its timestamp
    pub fn push(&mut self, name: &str, value: impl Into<Value>) {
        self.set([Column::new(name, value, now_millis())]);
    }

    /// Persisted by `create`
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Removed by a whole-row `delete`
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// TTL in seconds for the next create or update only
    pub fn ttl(&mut self, seconds: u32) {
        self.ttl = Some(seconds);
    }

    // =========================================================================
    // Writes
    // =========================================================================

    fn assignments(&self) -> Vec<(String, Value)> {
        self.rows
            .iter()
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect()
    }

    /// Insert the key and every loaded column
    pub async fn create(&mut self) -> Result<()> {
        let options = &self.ty.schema.options;
        let mut values = vec![(options.key_alias.clone(), Value::from(self.key.as_str()))];
        values.extend(self.assignments());

        let statement = Statement::insert("create", self.ty.name(), values)
            .key_alias(&options.key_alias)
            .consistency(options.consistency.insert)
            .ttl(self.ttl.take())
            .timestamp(now_millis());
        self.ty.keyspace.execute(&statement).await?;
        self.created = true;
        Ok(())
    }

    /// Merge `rows` into the window and write every loaded column
    pub async fn update<I>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = Column>,
    {
        self.set(rows);
        if self.rows.is_empty() {
            return Ok(());
        }
        let options = &self.ty.schema.options;
        let statement = Statement::update("update", self.ty.name(), self.assignments())
            .key_alias(&options.key_alias)
            .consistency(options.consistency.update)
            .ttl(self.ttl.take())
            .timestamp(now_millis())
            .filter(Predicate::equals(&options.key_alias, self.key.as_str()));
        self.ty.keyspace.execute(&statement).await?;
        Ok(())
    }

    /// Delete `columns`, or the whole row when none are given
    pub async fn delete<S: AsRef<str>>(&mut self, columns: &[S]) -> Result<()> {
        let options = &self.ty.schema.options;
        let statement = Statement::delete("delete", self.ty.name(), columns)
            .key_alias(&options.key_alias)
            .consistency(options.consistency.delete)
            .timestamp(now_millis())
            .filter(Predicate::equals(&options.key_alias, self.key.as_str()));
        self.ty.keyspace.execute(&statement).await?;

        if columns.is_empty() {
            self.deleted = true;
            self.rows.clear();
        } else {
            self.rows
                .retain(|c| !columns.iter().any(|name| name.as_ref() == c.name));
        }
        Ok(())
    }

    /// Add `delta` (default 1) to one of this row's counter columns
    pub async fn incr(&self, column: &str, delta: Option<i64>) -> Result<()> {
        self.ty.incr(&self.key, column, delta).await
    }

    /// Subtract `delta` (default 1) from one of this row's counter columns
    pub async fn decr(&self, column: &str, delta: Option<i64>) -> Result<()> {
        self.ty.decr(&self.key, column, delta).await
    }
}

impl fmt::Debug for ModelArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArray")
            .field("family", &self.ty.name())
            .field("key", &self.key)
            .field("rows", &self.rows)
            .field("has_next", &self.has_next)
            .field("has_prev", &self.has_prev)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryGateway;

    fn array() -> ModelArray {
        let ks = Keyspace::new(Arc::new(MemoryGateway::new()));
        ks.register_array("Feed", ks.array_options())
            .unwrap()
            .instance("k")
    }

    #[test]
    fn test_set_dedupes_and_sorts() {
        let mut a = array();
        a.set([Column::new("c", 1i64, 0), Column::new("a", 1i64, 0)]);
        a.set([Column::new("b", 2i64, 0), Column::new("c", 3i64, 0)]);
        let names: Vec<&str> = a.rows().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(a.row("c").unwrap().value, Value::Int(3));
        assert_eq!(a.row(1usize).unwrap().name, "b");
        assert!(a.row(7usize).is_none());
    }

    #[test]
    fn test_cursor_flags_default_to_true() {
        let mut a = array();
        assert!(a.has_next());
        assert!(a.has_prev());
        a.has_next = Some(false);
        a.reset();
        assert!(a.has_next());
    }

    #[tokio::test]
    async fn test_next_before_range_is_precondition() {
        let mut a = array();
        assert!(matches!(a.next(5usize).await, Err(Error::Precondition { .. })));
        assert!(matches!(a.prev(5usize).await, Err(Error::Precondition { .. })));
    }

    #[test]
    fn test_generated_keys_differ() {
        let ks = Keyspace::new(Arc::new(MemoryGateway::new()));
        let ty = ks.register_array("Feed", ks.array_options()).unwrap();
        assert_ne!(ty.generate().key(), ty.generate().key());
        assert_eq!(ty.primary(), "key");
    }
}
