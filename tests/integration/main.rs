//! Integration Tests
//!
//! End-to-end tests over the in-memory gateway, organized by surface:
//! - Entity lifecycle: create, load, dirty-tracked update, delete
//! - Queries: where resolution, projections, counts
//! - Associations: eager graphs across entity types
//! - Wide rows: pagination through the facade
//! - Events: process-wide timing, error and log events

#[path = "../common/mod.rs"]
mod common;

mod associations;
mod entity_lifecycle;
mod events;
mod queries;
mod wide_rows;
