//! Keyspace configuration via `casio.toml`
//!
//! Process bootstrapping is left to the embedding application; this module
//! only covers the defaults every registered type inherits. Per-type
//! overrides live in [`ModelOptions`] and [`ArrayOptions`].

use casio_core::{ConsistencyLevels, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "casio.toml";

/// Default storage key column name
pub const DEFAULT_KEY_ALIAS: &str = "KEY";

fn default_key_alias() -> String {
    DEFAULT_KEY_ALIAS.to_string()
}

fn default_event_capacity() -> usize {
    1024
}

/// Keyspace configuration loaded from `casio.toml`.
///
/// # Example
///
/// ```toml
/// key_alias = "KEY"
/// event_capacity = 1024
///
/// [consistency]
/// select = "ONE"
/// insert = "QUORUM"
/// update = "QUORUM"
/// delete = "ALL"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasioConfig {
    /// Default consistency per operation
    #[serde(default)]
    pub consistency: ConsistencyLevels,
    /// Default storage key column name
    #[serde(default = "default_key_alias")]
    pub key_alias: String,
    /// Undelivered events kept per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for CasioConfig {
    fn default() -> Self {
        Self {
            consistency: ConsistencyLevels::default(),
            key_alias: default_key_alias(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl CasioConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Casio keyspace configuration
#
# Storage key column name used when a type does not override it.
key_alias = "KEY"

# Events kept per subscriber before the oldest are dropped.
event_capacity = 1024

# Default consistency levels: ANY, ONE, TWO, THREE, QUORUM,
# LOCAL_QUORUM, EACH_QUORUM or ALL.
[consistency]
select = "ONE"
insert = "ONE"
update = "ONE"
delete = "ONE"
"#
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config {
            reason: format!("failed to parse config: {}", e),
        })
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults for a new entity type
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            consistency: self.consistency,
            key_alias: self.key_alias.clone(),
            get: GetProjection::default(),
            delete_columns: vec!["*".to_string()],
        }
    }

    /// Defaults for a new wide-row type
    pub fn array_options(&self) -> ArrayOptions {
        ArrayOptions {
            consistency: self.consistency,
            key_alias: self.key_alias.clone(),
            primary: "key".to_string(),
            reversed: false,
            shards: None,
        }
    }
}

/// What `get` selects when the caller names no columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetProjection {
    /// Explicit column list; `*` selects everything
    Columns(Vec<String>),
    /// A column slice
    Range {
        /// First column, empty = open
        start: String,
        /// Last column, empty = open
        end: String,
    },
}

impl Default for GetProjection {
    fn default() -> Self {
        GetProjection::Columns(vec!["*".to_string()])
    }
}

/// Per-entity-type options
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    /// Consistency per operation
    pub consistency: ConsistencyLevels,
    /// Storage key column name
    pub key_alias: String,
    /// Default `get` projection
    pub get: GetProjection,
    /// Columns removed by a type-level delete; `*` removes the row
    pub delete_columns: Vec<String>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        CasioConfig::default().model_options()
    }
}

/// Per-wide-row-type options
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayOptions {
    /// Consistency per operation
    pub consistency: ConsistencyLevels,
    /// Storage key column name
    pub key_alias: String,
    /// Public name of the key attribute
    pub primary: String,
    /// The family sorts columns with a reversed comparator
    pub reversed: bool,
    /// Shard suffixes; `Some` spreads one logical key over `key:suffix` rows.
    /// An empty suffix addresses the bare key.
    pub shards: Option<Vec<String>>,
}

impl Default for ArrayOptions {
    fn default() -> Self {
        CasioConfig::default().array_options()
    }
}
