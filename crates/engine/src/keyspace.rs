//! Keyspace: type registry plus statement execution
//!
//! A [`Keyspace`] owns the execution gateway, the event channel and the
//! registry of declared types. It is the single process-scoped entry point:
//! entity types and wide-row types are registered on it by storage name and
//! every statement flows through [`Keyspace::execute`].
//!
//! ## Registry
//!
//! Types are looked up by name when associations resolve, so two types may
//! reference each other in either declaration order. Registering a name
//! twice is rejected. The registry lives as long as the keyspace.
//!
//! ## Events
//!
//! Every statement failure is logged with `tracing` and broadcast as a
//! [`GatewayEvent::Error`] before the error is returned to the caller. When
//! the gateway reports timing metadata a [`GatewayEvent::Timing`] is
//! broadcast as well.

use crate::config::{ArrayOptions, CasioConfig};
use crate::gateway::{EventSink, Gateway, GatewayEvent, QueryResult};
use crate::model::Model;
use crate::model_array::{ArraySchema, ArrayType};
use crate::schema::{AssociationKind, ModelSchema, SchemaBuilder};
use casio_core::{Error, Result, Statement};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// A registered type
#[derive(Debug, Clone)]
pub enum Registered {
    /// Entity type
    Model(Arc<ModelSchema>),
    /// Wide-row type
    Array(Arc<ArraySchema>),
}

struct KeyspaceInner {
    gateway: Arc<dyn Gateway>,
    registry: RwLock<HashMap<String, Registered>>,
    events: EventSink,
    config: CasioConfig,
}

/// Process-scoped registry and execution context
///
/// Cloning is cheap; clones share the registry and the gateway.
#[derive(Clone)]
pub struct Keyspace {
    inner: Arc<KeyspaceInner>,
}

impl Keyspace {
    /// Keyspace with default configuration
    pub fn new<G: Gateway + 'static>(gateway: Arc<G>) -> Self {
        Self::with_config(gateway, CasioConfig::default())
    }

    /// Keyspace with explicit configuration
    ///
    /// # Arguments
    /// * `gateway` - Statement executor; receives the event sink on attach
    /// * `config` - Defaults inherited by every registered type
    pub fn with_config<G: Gateway + 'static>(gateway: Arc<G>, config: CasioConfig) -> Self {
        let events = EventSink::new(config.event_capacity);
        gateway.attach(events.clone());
        info!(target: "casio::keyspace", key_alias = %config.key_alias, "Keyspace opened");
        Self {
            inner: Arc::new(KeyspaceInner {
                gateway,
                registry: RwLock::new(HashMap::new()),
                events,
                config,
            }),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &CasioConfig {
        &self.inner.config
    }

    /// Receive process-wide timing, error and log events
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.events.subscribe()
    }

    /// The event sink shared with the gateway
    pub fn events(&self) -> &EventSink {
        &self.inner.events
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Start declaring an entity type with the keyspace defaults
    pub fn model(&self, name: &str) -> SchemaBuilder {
        SchemaBuilder::new(name, self.inner.config.model_options())
    }

    /// Register a declared entity type
    ///
    /// Fails if the name is taken or a hasMany association targets a
    /// registered wide-row type.
    pub fn register(&self, builder: SchemaBuilder) -> Result<Model> {
        let schema = Arc::new(builder.build());
        let mut registry = self.inner.registry.write();
        if registry.contains_key(schema.name()) {
            return Err(duplicate_type(schema.name()));
        }
        for (name, association) in schema.associations() {
            if association.kind == AssociationKind::HasMany {
                if let Some(Registered::Array(_)) = registry.get(&association.target) {
                    return Err(has_many_array(schema.name(), name));
                }
            }
        }
        registry.insert(
            schema.name().to_string(),
            Registered::Model(Arc::clone(&schema)),
        );
        drop(registry);

        debug!(target: "casio::keyspace", name = schema.name(), "Registered model");
        Ok(Model::new(schema, self.clone()))
    }

    /// Wide-row options seeded from the keyspace defaults
    pub fn array_options(&self) -> ArrayOptions {
        self.inner.config.array_options()
    }

    /// Register a wide-row type
    pub fn register_array(&self, name: &str, options: ArrayOptions) -> Result<ArrayType> {
        let schema = Arc::new(ArraySchema::new(name, options));
        let mut registry = self.inner.registry.write();
        if registry.contains_key(name) {
            return Err(duplicate_type(name));
        }
        registry.insert(name.to_string(), Registered::Array(Arc::clone(&schema)));
        drop(registry);

        debug!(target: "casio::keyspace", name, "Registered array");
        Ok(ArrayType::new(schema, self.clone()))
    }

    /// Look up any registered type
    pub fn lookup(&self, name: &str) -> Option<Registered> {
        self.inner.registry.read().get(name).cloned()
    }

    /// Handle for a registered entity type
    pub fn model_named(&self, name: &str) -> Result<Model> {
        match self.lookup(name) {
            Some(Registered::Model(schema)) => Ok(Model::new(schema, self.clone())),
            Some(Registered::Array(_)) => Err(Error::precondition(format!(
                "{name} is a wide-row type, not an entity type"
            ))),
            None => Err(Error::UnknownType {
                name: name.to_string(),
            }),
        }
    }

    /// Handle for a registered wide-row type
    pub fn array_named(&self, name: &str) -> Result<ArrayType> {
        match self.lookup(name) {
            Some(Registered::Array(schema)) => Ok(ArrayType::new(schema, self.clone())),
            Some(Registered::Model(_)) => Err(Error::precondition(format!(
                "{name} is an entity type, not a wide-row type"
            ))),
            None => Err(Error::UnknownType {
                name: name.to_string(),
            }),
        }
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.registry.read().keys().cloned().collect();
        names.sort();
        names
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Run one statement through the gateway
    ///
    /// Failures are broadcast as error events and returned unchanged.
    pub async fn execute(&self, statement: &Statement) -> Result<QueryResult> {
        debug!(
            target: "casio::keyspace",
            label = statement.label(),
            family = statement.family(),
            "Executing statement"
        );

        match self.inner.gateway.execute(statement).await {
            Ok(result) => {
                if let Some(meta) = &result.metadata {
                    self.inner.events.emit(GatewayEvent::Timing {
                        statement: statement.to_string(),
                        host: meta.host.clone(),
                        query_latency: meta.query_latency,
                        pool_latency: meta.pool_latency,
                        rows: result.rows.len(),
                    });
                }
                debug!(
                    target: "casio::keyspace",
                    label = statement.label(),
                    rows = result.rows.len(),
                    "Statement complete"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(
                    target: "casio::keyspace",
                    label = statement.label(),
                    error = %e,
                    "Statement failed"
                );
                self.inner.events.emit(GatewayEvent::Error {
                    statement: statement.to_string(),
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyspace")
            .field("config", &self.inner.config)
            .field("types", &self.type_names())
            .finish()
    }
}

fn duplicate_type(name: &str) -> Error {
    Error::DuplicateName {
        owner: "keyspace".to_string(),
        name: name.to_string(),
    }
}

pub(crate) fn has_many_array(owner: &str, association: &str) -> Error {
    Error::precondition(format!(
        "{owner}.{association}: hasMany onto a wide-row type is not supported; use hasOne or belongsTo"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{LogLevel, QueryMetadata};
    use crate::schema::{Attribute, AttributeType};
    use crate::testing::MemoryGateway;
    use std::time::Duration;

    fn keyspace() -> (Arc<MemoryGateway>, Keyspace) {
        let gateway = Arc::new(MemoryGateway::new());
        let ks = Keyspace::new(Arc::clone(&gateway));
        (gateway, ks)
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let (_, ks) = keyspace();
        ks.register(ks.model("User")).unwrap();
        let err = ks.register(ks.model("User")).unwrap_err();
        assert!(matches!(err, Error::DuplicateName { name, .. } if name == "User"));
        assert!(ks.register_array("User", ks.array_options()).is_err());
    }

    #[test]
    fn test_has_many_onto_array_rejected_at_registration() {
        let (_, ks) = keyspace();
        ks.register_array("Feed", ks.array_options()).unwrap();
        let mut user = ks.model("User");
        user.property("userId", Attribute::new(AttributeType::Uuid).primary())
            .unwrap()
            .has_many("feeds", "Feed")
            .unwrap();
        let err = ks.register(user).unwrap_err();
        assert!(matches!(err, Error::Precondition { .. }));
    }

    #[test]
    fn test_lookup_by_kind() {
        let (_, ks) = keyspace();
        ks.register(ks.model("User")).unwrap();
        ks.register_array("Feed", ks.array_options()).unwrap();
        assert!(ks.model_named("User").is_ok());
        assert!(ks.array_named("Feed").is_ok());
        assert!(matches!(ks.model_named("Feed"), Err(Error::Precondition { .. })));
        assert!(matches!(ks.model_named("Nope"), Err(Error::UnknownType { .. })));
        assert_eq!(ks.type_names(), vec!["Feed".to_string(), "User".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_is_broadcast_and_returned() {
        let (gateway, ks) = keyspace();
        let mut rx = ks.subscribe();
        gateway.fail_next(Error::storage("node down"));

        let stmt = Statement::select("find", "User", &["*"]);
        let err = ks.execute(&stmt).await.unwrap_err();
        assert!(err.is_storage());

        match rx.recv().await.unwrap() {
            GatewayEvent::Error { error, statement } => {
                assert_eq!(error, Error::storage("node down"));
                assert!(statement.starts_with("SELECT * FROM User"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timing_event_from_metadata() {
        let (gateway, ks) = keyspace();
        gateway.set_metadata(Some(QueryMetadata {
            host: "10.0.0.1".into(),
            query_latency: Duration::from_millis(3),
            pool_latency: Duration::from_millis(1),
        }));
        let mut rx = ks.subscribe();

        ks.execute(&Statement::select("find", "User", &["*"]))
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            GatewayEvent::Timing { host, rows, .. } => {
                assert_eq!(host, "10.0.0.1");
                assert_eq!(rows, 0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gateway_logs_reach_subscribers() {
        let (gateway, ks) = keyspace();
        let mut rx = ks.subscribe();
        gateway.log(LogLevel::Info, "pool ready");
        match rx.recv().await.unwrap() {
            GatewayEvent::Log { message, .. } => assert_eq!(message, "pool ready"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
