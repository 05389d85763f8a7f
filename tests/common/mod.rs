//! Shared fixtures for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::{Arc, Once};

pub use casio::{
    ArrayType, Association, Attribute, AttributeType, Column, Entity, Error, Keyspace,
    MemoryGateway, Model, Query, Value, WhereSpec,
};
use serde::Deserialize;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route engine logs to the test writer; `RUST_LOG=casio=debug` shows them.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Fixture - keyspace with the sample types registered
// ============================================================================

/// A keyspace over an in-memory store with four sample types:
///
/// - `User`: primary `userId`, hasOne `person`, hasMany `pets`
/// - `Person`: belongsTo `user` through `userId`
/// - `Pet`: belongsTo `owner` (a User) through `userId`
/// - `Vote`: wide-row type
pub struct Fixture {
    pub gateway: Arc<MemoryGateway>,
    pub keyspace: Keyspace,
    pub user: Model,
    pub person: Model,
    pub pet: Model,
    pub vote: ArrayType,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let gateway = Arc::new(MemoryGateway::new());
        let keyspace = Keyspace::new(Arc::clone(&gateway));

        // Pet is declared before User on purpose: targets resolve lazily.
        let mut pet = keyspace.model("Pet");
        pet.property("petId", Attribute::new(AttributeType::Uuid).primary())
            .unwrap()
            .property("userId", Attribute::new(AttributeType::Uuid))
            .unwrap()
            .property("name", Attribute::new(AttributeType::Text))
            .unwrap()
            .belongs_to("owner", "User")
            .unwrap();
        let pet = keyspace.register(pet).unwrap();

        let mut user = keyspace.model("User");
        user.property("userId", Attribute::new(AttributeType::Uuid).primary())
            .unwrap()
            .property(
                "name",
                Attribute::new(AttributeType::Text).default_value("anonymous"),
            )
            .unwrap()
            .property(
                "email",
                Attribute::new(AttributeType::Text).not_null().validator(|v| {
                    match v.as_str() {
                        Some(s) if !s.contains('@') => Some(":prop is not an address".into()),
                        _ => None,
                    }
                }),
            )
            .unwrap()
            .property("age", Attribute::new(AttributeType::Int))
            .unwrap()
            .property("visits", Attribute::new(AttributeType::BigInt))
            .unwrap()
            .property("password", Attribute::new(AttributeType::Text).hidden())
            .unwrap()
            .property("createdAt", Attribute::new(AttributeType::Date))
            .unwrap()
            .property("updatedAt", Attribute::new(AttributeType::Date))
            .unwrap()
            .associate("person", Association::has_one("Person"))
            .unwrap()
            .has_many("pets", "Pet")
            .unwrap()
            .getter("greeting", |e| {
                Value::from(format!("hello {}", e.raw("name").to_key_string()))
            })
            .unwrap();
        let user = keyspace.register(user).unwrap();

        let mut person = keyspace.model("Person");
        person
            .property("personId", Attribute::new(AttributeType::Uuid).primary())
            .unwrap()
            .property("userId", Attribute::new(AttributeType::Uuid))
            .unwrap()
            .property("bio", Attribute::new(AttributeType::Text))
            .unwrap()
            .associate("user", Association::belongs_to("User").fk("userId"))
            .unwrap();
        let person = keyspace.register(person).unwrap();

        let vote = keyspace
            .register_array("Vote", keyspace.array_options())
            .unwrap();

        Self {
            gateway,
            keyspace,
            user,
            person,
            pet,
            vote,
        }
    }

    /// Create a user and return it
    pub async fn create_user(&self, name: &str, email: &str) -> Entity {
        let mut user = self.user.build([("name", name), ("email", email)]);
        user.create().await.unwrap();
        user
    }

    /// Create a pet owned by `owner`
    pub async fn create_pet(&self, owner: &Entity, name: &str) -> Entity {
        let mut pet = self.pet.new_entity();
        pet.set_one("userId", owner.get("userId"));
        pet.set_one("name", name);
        pet.create().await.unwrap();
        pet
    }
}

// ============================================================================
// Projections
// ============================================================================

/// Narrow read model built straight from a row
#[derive(Debug, Deserialize, PartialEq)]
pub struct UserShort {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub name: String,
}

impl casio::Projection for UserShort {
    fn from_row(row: casio::MaterializedRow) -> casio::Result<Self> {
        row.deserialize()
    }
}
