//! Casio - typed entity mapping over wide-column stores
//!
//! Casio maps declared entity types onto rows of a wide-column store and
//! back. It resolves `where` specifications into statements, materializes
//! rows into entities with dirty tracking, eager-loads associations and
//! pages through single wide rows, including rows sharded over several
//! physical keys.
//!
//! # Quick Start
//!
//! ```ignore
//! use casio::{Attribute, AttributeType, Keyspace, MemoryGateway};
//! use std::sync::Arc;
//!
//! let keyspace = Keyspace::new(Arc::new(MemoryGateway::new()));
//! let mut user = keyspace.model("User");
//! user.property("userId", Attribute::new(AttributeType::Uuid).primary())?
//!     .property("name", Attribute::new(AttributeType::Text))?;
//! let users = keyspace.register(user)?;
//!
//! let mut ann = users.build([("name", "ann")]);
//! ann.create().await?;
//! let found = users.get(ann.get("userId")).await?;
//! ```
//!
//! # Architecture
//!
//! Statement execution is delegated to a [`Gateway`]; the crate never opens
//! connections itself. [`MemoryGateway`] is an in-process implementation
//! for tests and local tooling.

pub use casio_core::*;
pub use casio_engine::*;
