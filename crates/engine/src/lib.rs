//! Entity mapping engine for Casio
//!
//! This crate turns raw wide rows into typed entities and back:
//! - Keyspace: registry of entity types and the gateway binding
//! - Model / Entity: type-level queries and per-instance persistence
//! - Association: eager loading of belongsTo / hasOne / hasMany graphs
//! - ModelArray: cursor pagination over one wide row, optionally sharded
//! - Gateway: the execution boundary, plus an in-memory implementation
//!
//! The engine never talks to the network itself. Every statement goes
//! through a [`Gateway`] owned by the [`Keyspace`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod association;
pub mod clause;
pub mod config;
pub mod entity;
pub mod gateway;
pub mod keyspace;
pub mod materialize;
pub mod merge;
pub mod model;
pub mod model_array;
pub mod schema;
pub mod testing;

pub use association::EagerSpec;
pub use clause::WhereSpec;
pub use config::{ArrayOptions, CasioConfig, GetProjection, ModelOptions};
pub use entity::{Entity, Related};
pub use gateway::{EventSink, Gateway, GatewayEvent, LogLevel, QueryMetadata, QueryResult};
pub use keyspace::{Keyspace, Registered};
pub use materialize::{MaterializedRow, Projection};
pub use model::{Model, Query};
pub use model_array::{ArraySchema, ArrayType, ModelArray, RangeArgs, RowRef};
pub use schema::{
    Association, AssociationKind, Attribute, AttributeType, ModelSchema, SchemaBuilder,
};
pub use testing::MemoryGateway;
