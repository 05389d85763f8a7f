//! Consistency levels attached to every statement

use serde::{Deserialize, Serialize};
use std::fmt;

/// Replica consistency level for a read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Consistency {
    /// Any node, including hinted handoff (writes only)
    Any,
    /// One replica
    #[default]
    One,
    /// Two replicas
    Two,
    /// Three replicas
    Three,
    /// Majority of replicas
    Quorum,
    /// Majority of replicas in the local data center
    LocalQuorum,
    /// Majority of replicas in every data center
    EachQuorum,
    /// Every replica
    All,
}

impl Consistency {
    /// Keyword used in rendered statements
    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::Any => "ANY",
            Consistency::One => "ONE",
            Consistency::Two => "TWO",
            Consistency::Three => "THREE",
            Consistency::Quorum => "QUORUM",
            Consistency::LocalQuorum => "LOCAL_QUORUM",
            Consistency::EachQuorum => "EACH_QUORUM",
            Consistency::All => "ALL",
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-operation consistency defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsistencyLevels {
    /// Reads
    #[serde(default)]
    pub select: Consistency,
    /// Inserts
    #[serde(default)]
    pub insert: Consistency,
    /// Updates and counter changes
    #[serde(default)]
    pub update: Consistency,
    /// Deletes
    #[serde(default)]
    pub delete: Consistency,
}

impl ConsistencyLevels {
    /// Use the same level for every operation
    pub fn uniform(level: Consistency) -> Self {
        Self {
            select: level,
            insert: level,
            update: level,
            delete: level,
        }
    }
}
