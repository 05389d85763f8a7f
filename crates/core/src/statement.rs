//! Structured statements
//!
//! A [`Statement`] is the structured form of one query against a column
//! family: projection, source, predicate with bound arguments, consistency,
//! TTL, write timestamp, ordering and column range. Gateways consume the
//! structure directly; [`fmt::Display`] renders CQL-2 text for logs and
//! timing events.
//!
//! ## Column ranges
//!
//! Range bounds follow slice semantics: `start` is the first bound in
//! iteration order and `end` the last, both inclusive, an empty string
//! meaning open. A reversed slice iterates against the family's comparator,
//! so its `start` is the upper bound.

use crate::consistency::Consistency;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Bound arguments, keyed by placeholder name (without the leading `:`)
pub type Args = BTreeMap<String, Value>;

/// A predicate clause plus its bound arguments
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    /// Clause text with `:name` placeholders, e.g. `KEY IN (:KEY)`
    pub clause: String,
    /// Values bound to the placeholders
    pub args: Args,
}

impl Predicate {
    /// Create a predicate
    pub fn new(clause: impl Into<String>, args: Args) -> Self {
        Self {
            clause: clause.into(),
            args,
        }
    }

    /// `column = :column` bound to `value`
    pub fn equals(column: &str, value: impl Into<Value>) -> Self {
        let mut args = Args::new();
        args.insert(column.to_string(), value.into());
        Self::new(format!("{column}=:{column}"), args)
    }

    /// Clause text with placeholders substituted by literal values.
    ///
    /// Placeholders with no bound value are left untouched.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.clause.len());
        let mut chars = self.clause.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c != ':' {
                out.push(c);
                continue;
            }
            let start = i + 1;
            let mut end = start;
            while let Some(&(j, n)) = chars.peek() {
                if n.is_alphanumeric() || n == '_' {
                    end = j + n.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let name = &self.clause[start..end];
            match self.args.get(name) {
                Some(value) if !name.is_empty() => out.push_str(&value.to_string()),
                _ => {
                    out.push(':');
                    out.push_str(name);
                }
            }
        }
        out
    }
}

/// Inclusive column slice bounds
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnRange {
    /// First bound in iteration order, empty = open
    pub start: String,
    /// Last bound in iteration order, empty = open
    pub end: String,
}

impl ColumnRange {
    /// Create a range
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// The operation a statement performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Read columns
    Select,
    /// Count matching rows
    Count,
    /// Insert a row
    Insert,
    /// Overwrite columns on matching rows
    Update,
    /// Add deltas to counter columns
    CounterUpdate,
    /// Remove columns or whole rows
    Delete,
}

/// A structured query against one column family
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    label: String,
    kind: StatementKind,
    family: String,
    key_alias: String,
    columns: Vec<String>,
    range: Option<ColumnRange>,
    reversed: bool,
    first: Option<usize>,
    limit: Option<usize>,
    predicate: Option<Predicate>,
    assignments: Vec<(String, Value)>,
    counters: Vec<(String, i64)>,
    consistency: Consistency,
    ttl: Option<u32>,
    timestamp: Option<i64>,
}

impl Statement {
    fn new(label: &str, kind: StatementKind, family: &str) -> Self {
        Self {
            label: label.to_string(),
            kind,
            family: family.to_string(),
            key_alias: "KEY".to_string(),
            columns: Vec::new(),
            range: None,
            reversed: false,
            first: None,
            limit: None,
            predicate: None,
            assignments: Vec::new(),
            counters: Vec::new(),
            consistency: Consistency::default(),
            ttl: None,
            timestamp: None,
        }
    }

    /// `SELECT <columns> FROM family`; `*` selects everything
    pub fn select<S: AsRef<str>>(label: &str, family: &str, columns: &[S]) -> Self {
        let mut stmt = Self::new(label, StatementKind::Select, family);
        stmt.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        stmt
    }

    /// `SELECT <start>..<end> FROM family`
    pub fn select_range(label: &str, family: &str, range: ColumnRange) -> Self {
        let mut stmt = Self::new(label, StatementKind::Select, family);
        stmt.range = Some(range);
        stmt
    }

    /// `SELECT COUNT(*) FROM family`
    pub fn count(label: &str, family: &str) -> Self {
        Self::new(label, StatementKind::Count, family)
    }

    /// `INSERT INTO family (...) VALUES (...)`; column order is preserved
    pub fn insert(label: &str, family: &str, values: Vec<(String, Value)>) -> Self {
        let mut stmt = Self::new(label, StatementKind::Insert, family);
        stmt.assignments = values;
        stmt
    }

    /// `UPDATE family SET ...`
    pub fn update(label: &str, family: &str, set: Vec<(String, Value)>) -> Self {
        let mut stmt = Self::new(label, StatementKind::Update, family);
        stmt.assignments = set;
        stmt
    }

    /// `UPDATE family SET c = c + n`
    pub fn counter(label: &str, family: &str, deltas: Vec<(String, i64)>) -> Self {
        let mut stmt = Self::new(label, StatementKind::CounterUpdate, family);
        stmt.counters = deltas;
        stmt
    }

    /// `DELETE <columns> FROM family`; no columns removes the whole row
    pub fn delete<S: AsRef<str>>(label: &str, family: &str, columns: &[S]) -> Self {
        let mut stmt = Self::new(label, StatementKind::Delete, family);
        stmt.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        stmt
    }

    // ========== Clause setters ==========

    /// Name of the column standing for the row key
    pub fn key_alias(mut self, alias: &str) -> Self {
        self.key_alias = alias.to_string();
        self
    }

    /// Attach a predicate
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Attach a predicate if one is given
    pub fn filter_opt(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    /// Consistency level
    pub fn consistency(mut self, level: Consistency) -> Self {
        self.consistency = level;
        self
    }

    /// Time-to-live in seconds for written columns
    pub fn ttl(mut self, seconds: Option<u32>) -> Self {
        self.ttl = seconds;
        self
    }

    /// Write timestamp (epoch millis)
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// At most `n` columns per row
    pub fn first(mut self, n: Option<usize>) -> Self {
        self.first = n;
        self
    }

    /// At most `n` rows
    pub fn limit(mut self, n: Option<usize>) -> Self {
        self.limit = n;
        self
    }

    /// Iterate columns against the family's comparator
    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    // ========== Accessors ==========

    /// Diagnostic label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Statement kind
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Column family name
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Row key column name
    pub fn key_column(&self) -> &str {
        &self.key_alias
    }

    /// Selected or deleted columns
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// True when the projection is `*` or a range
    pub fn selects_all(&self) -> bool {
        self.range.is_some() || self.columns.is_empty() || self.columns.iter().any(|c| c == "*")
    }

    /// Column slice, if any
    pub fn range(&self) -> Option<&ColumnRange> {
        self.range.as_ref()
    }

    /// Reversed iteration flag
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Columns-per-row bound
    pub fn first_count(&self) -> Option<usize> {
        self.first
    }

    /// Row bound
    pub fn limit_count(&self) -> Option<usize> {
        self.limit
    }

    /// Predicate, if any
    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Insert values or update assignments, in statement order
    pub fn assignments(&self) -> &[(String, Value)] {
        &self.assignments
    }

    /// Counter deltas
    pub fn counters(&self) -> &[(String, i64)] {
        &self.counters
    }

    /// Consistency level
    pub fn consistency_level(&self) -> Consistency {
        self.consistency
    }

    /// TTL in seconds
    pub fn ttl_seconds(&self) -> Option<u32> {
        self.ttl
    }

    /// Write timestamp
    pub fn write_timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    fn using_clause(&self, with_writes: bool) -> String {
        let mut parts = vec![format!("CONSISTENCY {}", self.consistency)];
        if with_writes {
            if let Some(ttl) = self.ttl {
                parts.push(format!("TTL {}", ttl));
            }
            if let Some(ts) = self.timestamp {
                parts.push(format!("TIMESTAMP {}", ts));
            }
        }
        format!(" USING {}", parts.join(" AND "))
    }

    fn where_clause(&self) -> String {
        match &self.predicate {
            Some(p) => format!(" WHERE {}", p.render()),
            None => String::new(),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StatementKind::Select => {
                write!(f, "SELECT ")?;
                if let Some(n) = self.first {
                    write!(f, "FIRST {} ", n)?;
                }
                if self.reversed {
                    write!(f, "REVERSED ")?;
                }
                match &self.range {
                    Some(r) => write!(
                        f,
                        "{}..{}",
                        Value::from(r.start.as_str()),
                        Value::from(r.end.as_str())
                    )?,
                    None if self.columns.is_empty() => write!(f, "*")?,
                    None => write!(f, "{}", self.columns.join(", "))?,
                }
                write!(
                    f,
                    " FROM {}{}{}",
                    self.family,
                    self.using_clause(false),
                    self.where_clause()
                )?;
                if let Some(n) = self.limit {
                    write!(f, " LIMIT {}", n)?;
                }
                Ok(())
            }
            StatementKind::Count => write!(
                f,
                "SELECT COUNT(*) FROM {}{}{}",
                self.family,
                self.using_clause(false),
                self.where_clause()
            ),
            StatementKind::Insert => {
                let names: Vec<&str> = self.assignments.iter().map(|(n, _)| n.as_str()).collect();
                let values: Vec<String> =
                    self.assignments.iter().map(|(_, v)| v.to_string()).collect();
                write!(
                    f,
                    "INSERT INTO {} ({}) VALUES ({}){}",
                    self.family,
                    names.join(", "),
                    values.join(", "),
                    self.using_clause(true)
                )
            }
            StatementKind::Update => {
                let set: Vec<String> = self
                    .assignments
                    .iter()
                    .map(|(n, v)| format!("{} = {}", n, v))
                    .collect();
                write!(
                    f,
                    "UPDATE {}{} SET {}{}",
                    self.family,
                    self.using_clause(true),
                    set.join(", "),
                    self.where_clause()
                )
            }
            StatementKind::CounterUpdate => {
                let set: Vec<String> = self
                    .counters
                    .iter()
                    .map(|(n, d)| {
                        if *d < 0 {
                            format!("{n} = {n} - {}", d.unsigned_abs())
                        } else {
                            format!("{n} = {n} + {d}")
                        }
                    })
                    .collect();
                write!(
                    f,
                    "UPDATE {}{} SET {}{}",
                    self.family,
                    self.using_clause(false),
                    set.join(", "),
                    self.where_clause()
                )
            }
            StatementKind::Delete => {
                write!(f, "DELETE ")?;
                if !self.columns.is_empty() {
                    write!(f, "{} ", self.columns.join(", "))?;
                }
                write!(
                    f,
                    "FROM {}{}{}",
                    self.family,
                    self.using_clause(true),
                    self.where_clause()
                )
            }
        }
    }
}
