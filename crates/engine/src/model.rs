//! Entity type operations
//!
//! A [`Model`] is the handle for one registered entity type. It builds
//! statements for the type-level operations (`find`, `get`, `delete`,
//! `count`, `incr`, `decr`), runs them through the keyspace, materializes
//! the rows and optionally eager-loads associations.

use crate::association::{self, EagerSpec};
use crate::clause::{self, WhereSpec};
use crate::config::GetProjection;
use crate::entity::Entity;
use crate::keyspace::Keyspace;
use crate::materialize::{self, MaterializedRow, Projection};
use crate::schema::ModelSchema;
use casio_core::{ColumnRange, Consistency, Error, Predicate, Result, Statement, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Query shape shared by `find`, `get` and `delete`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Explicit columns; `*` selects everything
    pub columns: Option<Vec<String>>,
    /// Column slice, used by `get` instead of columns
    pub range: Option<ColumnRange>,
    /// Which rows
    pub filter: Option<WhereSpec>,
    /// Columns per row
    pub first: Option<usize>,
    /// Rows
    pub limit: Option<usize>,
    /// Associations to load on every returned entity
    pub eager: Option<EagerSpec>,
}

impl Query {
    /// Empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Select these columns
    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.as_ref().to_string()).collect());
        self
    }

    /// Select a column slice
    pub fn range(mut self, start: &str, end: &str) -> Self {
        self.range = Some(ColumnRange::new(start, end));
        self
    }

    /// Restrict rows
    pub fn filter(mut self, spec: impl Into<WhereSpec>) -> Self {
        self.filter = Some(spec.into());
        self
    }

    /// At most `n` columns per row
    pub fn first(mut self, n: usize) -> Self {
        self.first = Some(n);
        self
    }

    /// At most `n` rows
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Eager-load associations
    pub fn eager(mut self, eager: impl Into<EagerSpec>) -> Self {
        self.eager = Some(eager.into());
        self
    }
}

impl From<WhereSpec> for Query {
    fn from(spec: WhereSpec) -> Self {
        Query::new().filter(spec)
    }
}

impl From<&str> for Query {
    fn from(id: &str) -> Self {
        Query::new().filter(id)
    }
}

impl From<String> for Query {
    fn from(id: String) -> Self {
        Query::new().filter(id)
    }
}

impl From<Value> for Query {
    fn from(id: Value) -> Self {
        Query::new().filter(id)
    }
}

/// Handle for one registered entity type
#[derive(Clone)]
pub struct Model {
    schema: Arc<ModelSchema>,
    keyspace: Keyspace,
}

impl Model {
    pub(crate) fn new(schema: Arc<ModelSchema>, keyspace: Keyspace) -> Self {
        Self { schema, keyspace }
    }

    /// The frozen declaration
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    /// Storage name
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Owning keyspace
    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// Fresh, unsaved instance with schema defaults
    pub fn new_entity(&self) -> Entity {
        Entity::fresh(self.clone())
    }

    /// Fresh instance with `attrs` batch-set on top of the defaults
    pub fn build<I, K, V>(&self, attrs: I) -> Entity
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut entity = self.new_entity();
        entity.set(attrs);
        entity
    }

    pub(crate) fn predicate(&self, spec: &WhereSpec) -> Result<Predicate> {
        clause::resolve(spec, self.schema.key_alias(), self.schema.primary())
    }

    fn select_statement(&self, label: &str, query: &Query, columns: Vec<String>) -> Result<Statement> {
        let levels = self.schema.options().consistency;
        let predicate = query.filter.as_ref().map(|w| self.predicate(w)).transpose()?;
        let statement = match &query.range {
            Some(range) => Statement::select_range(label, self.name(), range.clone()),
            None => Statement::select(label, self.name(), &columns),
        };
        Ok(statement
            .key_alias(self.schema.key_alias())
            .consistency(levels.select)
            .filter_opt(predicate)
            .first(query.first)
            .limit(query.limit))
    }

    async fn fetch_rows(&self, statement: &Statement) -> Result<Vec<MaterializedRow>> {
        let result = self.keyspace.execute(statement).await?;
        materialize::materialize_all(&self.schema, result.rows, statement)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Every present row matching `query`, as entities
    ///
    /// Columns default to `*`. Tombstones are dropped.
    pub async fn find(&self, query: impl Into<Query>) -> Result<Vec<Entity>> {
        let query = query.into();
        let columns = query.columns.clone().unwrap_or_else(|| vec!["*".to_string()]);
        let statement = self.select_statement("find", &query, columns)?;
        let rows = self.fetch_rows(&statement).await?;

        let mut entities: Vec<Entity> = rows
            .into_iter()
            .map(|row| Entity::from_row(self.clone(), row))
            .collect();
        if let Some(eager) = &query.eager {
            association::resolve(self, &mut entities, eager).await?;
        }
        debug!(target: "casio::model", family = self.name(), count = entities.len(), "find");
        Ok(entities)
    }

    /// Every present row matching `query`, built as `P`
    pub async fn find_as<P: Projection>(&self, query: impl Into<Query>) -> Result<Vec<P>> {
        let query = query.into();
        let columns = query.columns.clone().unwrap_or_else(|| vec!["*".to_string()]);
        let statement = self.select_statement("find", &query, columns)?;
        self.fetch_rows(&statement)
            .await?
            .into_iter()
            .map(P::from_row)
            .collect()
    }

    fn get_statement(&self, query: &mut Query) -> Result<Statement> {
        if query.filter.is_none() {
            return Err(Error::invalid_where("get needs a key or a where clause"));
        }
        if query.columns.is_none() && query.range.is_none() {
            match &self.schema.options().get {
                GetProjection::Columns(columns) => query.columns = Some(columns.clone()),
                GetProjection::Range { start, end } => {
                    query.range = Some(ColumnRange::new(start.as_str(), end.as_str()))
                }
            }
        }
        let columns = query.columns.clone().unwrap_or_default();
        self.select_statement("get", query, columns)
    }

    /// The first present row matching `query`
    ///
    /// A bare key is an equality on the storage key. Without explicit
    /// columns the type's default `get` projection applies.
    pub async fn get(&self, query: impl Into<Query>) -> Result<Option<Entity>> {
        let mut query = query.into();
        let statement = self.get_statement(&mut query)?;
        let result = self.keyspace.execute(&statement).await?;
        let Some(row) = result.rows.into_iter().next() else {
            return Ok(None);
        };
        let Some(row) = materialize::materialize(&self.schema, row, &statement)? else {
            return Ok(None);
        };

        let mut entities = vec![Entity::from_row(self.clone(), row)];
        if let Some(eager) = &query.eager {
            association::resolve(self, &mut entities, eager).await?;
        }
        Ok(entities.pop())
    }

    /// The first present row matching `query`, built as `P`
    pub async fn get_as<P: Projection>(&self, query: impl Into<Query>) -> Result<Option<P>> {
        let mut query = query.into();
        let statement = self.get_statement(&mut query)?;
        let result = self.keyspace.execute(&statement).await?;
        match result.rows.into_iter().next() {
            Some(row) => materialize::materialize(&self.schema, row, &statement)?
                .map(P::from_row)
                .transpose(),
            None => Ok(None),
        }
    }

    /// Number of rows matching `filter`
    pub async fn count(&self, filter: Option<WhereSpec>) -> Result<u64> {
        let predicate = filter.as_ref().map(|w| self.predicate(w)).transpose()?;
        let statement = Statement::count("count", self.name())
            .key_alias(self.schema.key_alias())
            .consistency(self.schema.options().consistency.select)
            .filter_opt(predicate);
        let result = self.keyspace.execute(&statement).await?;
        let count = result
            .rows
            .first()
            .and_then(|row| row.column("count"))
            .and_then(|c| c.value.as_int())
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Delete columns from the rows matching `query`
    ///
    /// Without columns the type's default delete columns apply; `*` removes
    /// whole rows.
    pub async fn delete(&self, query: impl Into<Query>) -> Result<()> {
        let query = query.into();
        let filter = query
            .filter
            .as_ref()
            .ok_or_else(|| Error::invalid_where("delete needs a key or a where clause"))?;
        let predicate = self.predicate(filter)?;
        let mut columns = query
            .columns
            .unwrap_or_else(|| self.schema.options().delete_columns.clone());
        if columns.iter().any(|c| c == "*") {
            columns.clear();
        }

        let statement = Statement::delete("delete", self.name(), &columns)
            .key_alias(self.schema.key_alias())
            .consistency(self.schema.options().consistency.delete)
            .timestamp(now_millis())
            .filter(predicate);
        self.keyspace.execute(&statement).await?;
        Ok(())
    }

    /// Add `delta` (default 1) to a counter column of row `key`
    pub async fn incr(&self, key: impl Into<Value>, column: &str, delta: Option<i64>) -> Result<()> {
        let statement = counter_statement(
            self.name(),
            self.schema.key_alias(),
            self.schema.options().consistency.update,
            key.into(),
            column,
            delta.unwrap_or(1),
        );
        self.keyspace.execute(&statement).await?;
        Ok(())
    }

    /// Subtract `delta` (default 1) from a counter column of row `key`
    pub async fn decr(&self, key: impl Into<Value>, column: &str, delta: Option<i64>) -> Result<()> {
        self.incr(key, column, Some(-delta.unwrap_or(1))).await
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model").field("name", &self.name()).finish()
    }
}

/// `UPDATE family SET column = column + delta WHERE key_alias = key`
pub(crate) fn counter_statement(
    family: &str,
    key_alias: &str,
    consistency: Consistency,
    key: Value,
    column: &str,
    delta: i64,
) -> Statement {
    let label = if delta < 0 { "decr" } else { "incr" };
    Statement::counter(label, family, vec![(column.to_string(), delta)])
        .key_alias(key_alias)
        .consistency(consistency)
        .filter(Predicate::equals(key_alias, key))
}

/// Current time in epoch millis
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
