//! Core types for Casio
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: Unified value enum for attributes, columns and bound arguments
//! - Column / Row: Wide-row result shapes with per-column write timestamps
//! - Consistency: Replica consistency levels and per-operation defaults
//! - Statement: Structured query clauses handed to the execution gateway
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod column;
pub mod consistency;
pub mod error;
pub mod statement;
pub mod value;

pub use column::{Column, Row};
pub use consistency::{Consistency, ConsistencyLevels};
pub use error::{Error, Result, ValidationErrors};
pub use statement::{Args, ColumnRange, Predicate, Statement, StatementKind};
pub use value::Value;
