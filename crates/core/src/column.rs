//! Wide-row data shapes returned by the execution gateway
//!
//! A row is addressed by a key and holds a sparse, ordered list of named
//! columns. Every column carries the write timestamp the store recorded for
//! it, which is what the shard merger uses to settle conflicts.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single named column with its write timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column value
    pub value: Value,
    /// Write timestamp (epoch millis as recorded by the store)
    pub timestamp: i64,
}

impl Column {
    /// Create a column
    pub fn new(name: impl Into<String>, value: impl Into<Value>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp,
        }
    }
}

/// One row of a query result
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    /// Row key
    pub key: Value,
    /// Columns in the order the store returned them
    pub columns: Vec<Column>,
}

impl Row {
    /// Create a row from a key and its columns
    pub fn new(key: impl Into<Value>, columns: Vec<Column>) -> Self {
        Self {
            key: key.into(),
            columns,
        }
    }

    /// Number of columns present in the row
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Hash-map view of the columns, name to value
    pub fn column_map(&self) -> BTreeMap<String, Value> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Consume the row, keeping only its columns
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}
