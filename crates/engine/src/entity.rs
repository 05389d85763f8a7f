//! Entity instances with dirty tracking
//!
//! An [`Entity`] carries current attribute values, a shadow copy of the last
//! persisted values (`props`), the set of attributes changed through the
//! batch-set path (`dirty`), per-column write timestamps when loaded from
//! storage, and lifecycle flags.
//!
//! ## Dirty tracking
//!
//! - `set` / `set_one` write and mark dirty; a declared setter takes over the
//!   write when present.
//! - `assign` writes without marking dirty; the change is invisible to
//!   `update`.
//! - `dirty` is empty after loading from storage and after every successful
//!   create or update.
//!
//! `update` persists only dirty attributes (plus the `updatedat` stamp) and
//! is a no-op when nothing is dirty.

use crate::association::EagerSpec;
use crate::model::{now_millis, Model};
use crate::materialize::MaterializedRow;
use crate::schema::{AssociationKind, AttributeType};
use casio_core::{Error, Predicate, Result, Statement, ValidationErrors, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Loaded association value
#[derive(Debug, Clone)]
pub enum Related {
    /// belongsTo / hasOne result; `None` when nothing matched
    One(Option<Box<Entity>>),
    /// hasMany result, possibly empty
    Many(Vec<Entity>),
}

/// One instance of an entity type
#[derive(Clone)]
pub struct Entity {
    model: Model,
    values: BTreeMap<String, Value>,
    props: BTreeMap<String, Value>,
    dirty: BTreeSet<String>,
    cftimestamp: BTreeMap<String, i64>,
    key: Option<Value>,
    externals: Vec<String>,
    errors: ValidationErrors,
    related: BTreeMap<String, Related>,
    eager: Option<EagerSpec>,
    created: bool,
    deleted: bool,
    loaded: bool,
    ttl: Option<u32>,
}

impl Entity {
    pub(crate) fn fresh(model: Model) -> Self {
        let values: BTreeMap<String, Value> = model
            .schema()
            .attributes()
            .map(|(name, attr)| (name.to_string(), attr.default.clone()))
            .collect();
        Self {
            props: values.clone(),
            values,
            model,
            dirty: BTreeSet::new(),
            cftimestamp: BTreeMap::new(),
            key: None,
            externals: Vec::new(),
            errors: ValidationErrors::new(),
            related: BTreeMap::new(),
            eager: None,
            created: false,
            deleted: false,
            loaded: false,
            ttl: None,
        }
    }

    pub(crate) fn from_row(model: Model, row: MaterializedRow) -> Self {
        let mut entity = Self::fresh(model);
        entity.values.extend(row.attributes);
        entity.cftimestamp = row.timestamps;
        entity.key = Some(row.key);
        entity.loaded = true;
        entity.shadow();
        entity
    }

    /// Entity type handle
    pub fn model(&self) -> &Model {
        &self.model
    }

    // =========================================================================
    // Attribute access
    // =========================================================================

    /// Read `name` through its getter if one is declared
    pub fn get(&self, name: &str) -> Value {
        match self.model.schema().getter(name) {
            Some(getter) => getter(self),
            None => self.raw(name).clone(),
        }
    }

    /// Stored value of `name`, bypassing getters
    pub fn raw(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&Value::Null)
    }

    /// Write without marking dirty
    pub fn assign(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Write one attribute through the batch-set path
    pub fn set_one(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(setter) = self.model.schema().setter(name).cloned() {
            setter(self, value);
            return;
        }
        self.values.insert(name.to_string(), value);
        self.dirty.insert(name.to_string());
    }

    /// Batch-set attributes; every written name becomes dirty
    pub fn set<I, K, V>(&mut self, attrs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in attrs {
            let name: String = name.into();
            self.set_one(&name, value);
        }
    }

    /// Flag `name` for the next update
    pub fn mark_dirty(&mut self, name: &str) {
        self.dirty.insert(name.to_string());
    }

    /// True if `name` will be written by the next update
    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    /// Names written by the next update
    pub fn dirty(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// Last persisted value of a schema attribute
    pub fn persisted(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    /// Value of the primary attribute, or null
    pub fn primary_value(&self) -> Value {
        match self.model.schema().primary() {
            Some(primary) => self.raw(primary).clone(),
            None => Value::Null,
        }
    }

    /// Row key this instance was loaded from
    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    /// Write timestamp of a column as recorded by the store
    pub fn cftimestamp(&self, column: &str) -> Option<i64> {
        self.cftimestamp.get(column).copied()
    }

    /// Refresh the shadow copy and clear `dirty`
    pub fn shadow(&mut self) {
        self.dirty.clear();
        let names: Vec<String> = self
            .model
            .schema()
            .attributes()
            .map(|(n, _)| n.to_string())
            .collect();
        for name in names {
            let value = self.raw(&name).clone();
            self.props.insert(name, value);
        }
    }

    /// Clear `dirty` without touching the shadow
    pub fn clean(&mut self) {
        self.dirty.clear();
    }

    // =========================================================================
    // Flags and extras
    // =========================================================================

    /// Persisted by `create`
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Removed by `delete`
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Built from a query result
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// TTL in seconds for the next create or update only
    pub fn ttl(&mut self, seconds: u32) {
        self.ttl = Some(seconds);
    }

    /// Include a non-schema field in serialization
    pub fn add_external(&mut self, name: &str) {
        if !self.externals.iter().any(|e| e == name) {
            self.externals.push(name.to_string());
        }
    }

    /// The association graph this instance was loaded with
    pub fn eager_graph(&self) -> Option<&EagerSpec> {
        self.eager.as_ref()
    }

    pub(crate) fn set_eager_graph(&mut self, eager: EagerSpec) {
        self.eager = Some(eager);
    }

    // =========================================================================
    // Associations
    // =========================================================================

    /// Loaded association
    pub fn related(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    /// Loaded belongsTo / hasOne target
    pub fn related_one(&self, name: &str) -> Option<&Entity> {
        match self.related.get(name) {
            Some(Related::One(Some(e))) => Some(e),
            _ => None,
        }
    }

    /// Loaded hasMany list; empty when not loaded
    pub fn related_many(&self, name: &str) -> &[Entity] {
        match self.related.get(name) {
            Some(Related::Many(list)) => list,
            _ => &[],
        }
    }

    /// Attach an association value
    pub fn attach(&mut self, name: &str, value: Related) {
        self.related.insert(name.to_string(), value);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validation messages from the last `validate`
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Record a validation message; `:prop` is replaced by `name`
    pub fn error(&mut self, name: &str, message: &str) {
        self.errors.add(name, message);
    }

    /// Reset `errors` and run every validator; true when nothing failed
    pub fn validate(&mut self) -> bool {
        self.errors.clear();
        let model = self.model.clone();
        for (name, attribute) in model.schema().attributes() {
            let value = self.get(name);
            if attribute.not_null && value.is_null() {
                self.errors.add(name, ":prop is null.");
            }
            for validator in &attribute.validators {
                if let Some(message) = validator(&value) {
                    self.errors.add(name, &message);
                }
            }
        }
        self.errors.is_empty()
    }

    fn ensure_valid(&mut self) -> Result<()> {
        if self.validate() {
            Ok(())
        } else {
            Err(Error::Validation(self.errors.clone()))
        }
    }

    fn stamp(&mut self, stamp: &str, now: i64) -> Option<String> {
        let column = self.model.schema().stamp_attribute(stamp)?.to_string();
        self.values.insert(column.clone(), Value::Int(now));
        Some(column)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Insert this instance
    ///
    /// Generates a UUID primary when none is set and the primary is a uuid
    /// or text attribute; any other primary must be supplied. Stamps
    /// `createdat` and `updatedat`, and writes the key column first followed
    /// by every non-null attribute in declaration order.
    pub async fn create(&mut self) -> Result<()> {
        self.ensure_valid()?;
        let model = self.model.clone();
        let schema = model.schema();
        let primary = schema.require_primary()?;

        if !self.raw(primary).is_present() {
            let generated = schema
                .attribute(primary)
                .is_some_and(|a| matches!(a.ty, AttributeType::Uuid | AttributeType::Text));
            if !generated {
                return Err(Error::MissingPrimary {
                    model: schema.name().to_string(),
                });
            }
            let id = uuid::Uuid::new_v4().to_string();
            debug!(target: "casio::entity", family = schema.name(), id = %id, "Generated primary");
            self.values.insert(primary.to_string(), Value::String(id));
        }

        let now = now_millis();
        self.stamp("createdat", now);
        self.stamp("updatedat", now);

        let mut values = vec![(schema.key_alias().to_string(), self.raw(primary).clone())];
        for (name, _) in schema.attributes() {
            if name == primary {
                continue;
            }
            let value = self.raw(name);
            if !value.is_null() {
                values.push((name.to_string(), value.clone()));
            }
        }

        let statement = Statement::insert("create", schema.name(), values)
            .key_alias(schema.key_alias())
            .consistency(schema.options().consistency.insert)
            .ttl(self.ttl.take())
            .timestamp(now);
        model.keyspace().execute(&statement).await?;

        self.shadow();
        self.created = true;
        Ok(())
    }

    /// Write every dirty attribute
    ///
    /// Loaded belongsTo targets first copy their primary value into the
    /// local foreign key. Nothing is written when nothing is dirty.
    pub async fn update(&mut self) -> Result<()> {
        self.ensure_valid()?;
        let model = self.model.clone();
        let schema = model.schema();
        self.sync_foreign_keys()?;

        if self.dirty.is_empty() {
            return Ok(());
        }

        let key = self.primary_value();
        if !key.is_present() {
            return Err(Error::precondition(format!(
                "{} cannot update an instance without a primary value",
                schema.name()
            )));
        }

        let now = now_millis();
        if let Some(column) = self.stamp("updatedat", now) {
            self.dirty.insert(column);
        }

        let set: Vec<(String, Value)> = self
            .dirty
            .iter()
            .map(|name| (name.clone(), self.raw(name).clone()))
            .collect();
        let statement = Statement::update("update", schema.name(), set)
            .key_alias(schema.key_alias())
            .consistency(schema.options().consistency.update)
            .ttl(self.ttl.take())
            .timestamp(now)
            .filter(Predicate::equals(schema.key_alias(), key));
        model.keyspace().execute(&statement).await?;

        self.shadow();
        Ok(())
    }

    /// Batch-set `attrs` then update
    pub async fn update_with<I, K, V>(&mut self, attrs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.set(attrs);
        self.update().await
    }

    fn sync_foreign_keys(&mut self) -> Result<()> {
        let model = self.model.clone();
        let schema = model.schema();
        for (name, association) in schema.associations() {
            if association.kind != AssociationKind::BelongsTo {
                continue;
            }
            let Some(target) = self.related_one(name) else {
                continue;
            };
            let target_primary = target.model().schema().require_primary()?.to_string();
            let value = target.raw(&target_primary).clone();
            let fk = association.local.clone().unwrap_or(target_primary);
            if self.raw(&fk) != &value {
                self.values.insert(fk.clone(), value);
                self.dirty.insert(fk);
            }
        }
        Ok(())
    }

    /// Update when this instance is known to be persisted, create otherwise
    pub async fn save(&mut self) -> Result<()> {
        if self.primary_value().is_present() && (self.loaded || self.created) {
            self.update().await
        } else {
            self.create().await
        }
    }

    /// Delete this instance's row using the type's default delete columns
    pub async fn delete(&mut self) -> Result<()> {
        let key = self.primary_value();
        if !key.is_present() {
            return Err(Error::precondition(format!(
                "{} cannot delete an instance without a primary value",
                self.model.name()
            )));
        }
        self.model.delete(key).await?;
        self.deleted = true;
        Ok(())
    }

    /// Add `delta` (default 1) to one of this row's counter columns
    pub async fn incr(&self, column: &str, delta: Option<i64>) -> Result<()> {
        self.model.incr(self.primary_value(), column, delta).await
    }

    /// Subtract `delta` (default 1) from one of this row's counter columns
    pub async fn decr(&self, column: &str, delta: Option<i64>) -> Result<()> {
        self.model.decr(self.primary_value(), column, delta).await
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// JSON view of serializable attributes, getters, loaded associations
    /// and externals, optionally restricted to `subset`
    ///
    /// 64-bit integers are rendered as strings. A hasMany that was never
    /// loaded renders as an empty list.
    pub fn to_serializable(&self, subset: Option<&[&str]>) -> serde_json::Value {
        let wanted = |name: &str| subset.map_or(true, |s| s.contains(&name));
        let schema = self.model.schema();
        let mut out = serde_json::Map::new();

        for (name, attribute) in schema.attributes() {
            if !attribute.serializable || !wanted(name) {
                continue;
            }
            let value = self.get(name);
            let json = match (attribute.ty, &value) {
                (AttributeType::BigInt, Value::Int(i)) => serde_json::Value::String(i.to_string()),
                _ => serde_json::Value::from(value),
            };
            out.insert(name.to_string(), json);
        }

        for name in schema.getter_names() {
            if wanted(name) && !out.contains_key(name) && !schema.has_attribute(name) {
                out.insert(name.to_string(), serde_json::Value::from(self.get(name)));
            }
        }

        for (name, association) in schema.associations() {
            if !association.serializable || !wanted(name) {
                continue;
            }
            let json = match self.related.get(name) {
                Some(Related::One(Some(e))) => e.to_serializable(None),
                Some(Related::One(None)) => serde_json::Value::Null,
                Some(Related::Many(list)) => {
                    serde_json::Value::Array(list.iter().map(|e| e.to_serializable(None)).collect())
                }
                None if association.kind == AssociationKind::HasMany => {
                    serde_json::Value::Array(Vec::new())
                }
                None => continue,
            };
            out.insert(name.to_string(), json);
        }

        for name in &self.externals {
            if wanted(name) {
                out.insert(name.clone(), serde_json::Value::from(self.get(name)));
            }
        }

        serde_json::Value::Object(out)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &self.model.name())
            .field("values", &self.values)
            .field("dirty", &self.dirty)
            .field("related", &self.related)
            .field("created", &self.created)
            .field("deleted", &self.deleted)
            .field("loaded", &self.loaded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyspace::Keyspace;
    use crate::schema::{Attribute, AttributeType};
    use crate::testing::MemoryGateway;
    use std::sync::Arc;

    fn user_model() -> Model {
        let ks = Keyspace::new(Arc::new(MemoryGateway::new()));
        let mut b = ks.model("User");
        b.property("userId", Attribute::new(AttributeType::Uuid).primary())
            .unwrap()
            .property("name", Attribute::new(AttributeType::Text).default_value("anon"))
            .unwrap()
            .property("email", Attribute::new(AttributeType::Text).not_null())
            .unwrap()
            .property("visits", Attribute::new(AttributeType::BigInt))
            .unwrap()
            .property("password", Attribute::new(AttributeType::Text).hidden())
            .unwrap()
            .getter("display", |e| {
                Value::from(format!("{} <{}>", e.raw("name").to_key_string(), e.raw("email").to_key_string()))
            })
            .unwrap()
            .setter("display", |e, v| {
                e.set_one("name", v);
            })
            .unwrap();
        ks.register(b).unwrap()
    }

    #[test]
    fn test_fresh_entity_has_defaults_and_clean_state() {
        let user = user_model().new_entity();
        assert_eq!(user.raw("name"), &Value::from("anon"));
        assert_eq!(user.dirty().count(), 0);
        assert!(!user.is_loaded());
        assert!(!user.is_created());
    }

    #[test]
    fn test_set_marks_dirty_assign_does_not() {
        let mut user = user_model().new_entity();
        user.assign("name", "quiet");
        assert!(!user.is_dirty("name"));
        user.set([("email", "a@b.c")]);
        assert!(user.is_dirty("email"));
        assert_eq!(user.dirty().collect::<Vec<_>>(), vec!["email"]);
    }

    #[test]
    fn test_setter_dispatch() {
        let mut user = user_model().new_entity();
        user.set_one("display", "Ann");
        assert_eq!(user.raw("name"), &Value::from("Ann"));
        assert!(user.is_dirty("name"));
        assert!(!user.is_dirty("display"));
    }

    #[test]
    fn test_validate_not_null() {
        let mut user = user_model().new_entity();
        assert!(!user.validate());
        assert_eq!(user.errors().get("email").unwrap(), ["email is null."]);
        user.assign("email", "x@y.z");
        assert!(user.validate());
        assert!(user.errors().is_empty());
    }

    #[test]
    fn test_serialization_rules() {
        let mut user = user_model().new_entity();
        user.assign("userId", "u1");
        user.assign("email", "e@x");
        user.assign("visits", 9_007_199_254_740_993i64);
        user.assign("password", "secret");
        user.assign("score", 7i64);
        user.add_external("score");

        let json = user.to_serializable(None);
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["visits"], "9007199254740993");
        assert!(json.get("password").is_none());
        assert_eq!(json["display"], "anon <e@x>");
        assert_eq!(json["score"], 7);

        let subset = user.to_serializable(Some(&["email"][..]));
        assert_eq!(subset, serde_json::json!({"email": "e@x"}));
    }

    fn account_model() -> (Arc<MemoryGateway>, Model) {
        let gateway = Arc::new(MemoryGateway::new());
        let ks = Keyspace::new(Arc::clone(&gateway));
        let mut b = ks.model("Acct");
        b.property("acctId", Attribute::new(AttributeType::Int).primary())
            .unwrap()
            .property("name", Attribute::new(AttributeType::Text))
            .unwrap();
        (gateway, ks.register(b).unwrap())
    }

    #[tokio::test]
    async fn test_create_requires_non_uuid_primary() {
        let (gateway, accounts) = account_model();
        let mut acct = accounts.build([("name", "x")]);
        let err = acct.create().await.unwrap_err();
        assert!(matches!(err, Error::MissingPrimary { .. }));
        assert!(acct.raw("acctId").is_null());
        assert!(gateway.statements().is_empty());
    }

    #[tokio::test]
    async fn test_int_primary_round_trips_through_storage() {
        let (_, accounts) = account_model();
        let mut acct = accounts.build([("name", "x")]);
        acct.set_one("acctId", 42i64);
        acct.create().await.unwrap();

        let mut loaded = accounts.get(Value::Int(42)).await.unwrap().unwrap();
        assert_eq!(loaded.get("acctId"), Value::Int(42));
        assert_eq!(loaded.key(), Some(&Value::Int(42)));

        loaded.set_one("name", "y");
        loaded.update().await.unwrap();
        let reread = accounts.get(Value::Int(42)).await.unwrap().unwrap();
        assert_eq!(reread.get("name"), Value::from("y"));
    }

    #[test]
    fn test_shadow_resets_dirty() {
        let mut user = user_model().new_entity();
        user.set([("email", "e@x")]);
        user.shadow();
        assert_eq!(user.dirty().count(), 0);
        assert_eq!(user.persisted("email"), Some(&Value::from("e@x")));
    }
}
