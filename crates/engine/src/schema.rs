//! Entity type declarations
//!
//! A [`ModelSchema`] is the per-type descriptor table: attributes with their
//! type, default, validators and flags, the primary attribute, association
//! descriptors, and computed getters/setters. Schemas are assembled with a
//! [`SchemaBuilder`] and frozen when registered on a keyspace.
//!
//! Every declaration is checked against the names already on the type, so a
//! collision fails at declaration time instead of shadowing something at
//! runtime.
//!
//! Associations name their target type by storage name. The target is looked
//! up in the keyspace registry when the association is resolved, which lets
//! two types refer to each other regardless of declaration order.

use crate::config::ModelOptions;
use crate::entity::Entity;
use casio_core::{Error, Result, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Instance field and operation names no declaration may reuse
pub const RESERVED_NAMES: &[&str] = &[
    "key",
    "errors",
    "created",
    "deleted",
    "loaded",
    "dirty",
    "props",
    "cftimestamp",
    "externals",
    "eager",
    "ttl",
    "create",
    "update",
    "save",
    "delete",
    "set",
    "validate",
    "incr",
    "decr",
];

/// Declared storage type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    /// UTF-8 text
    Text,
    /// Integer truncated to 32 bits on load
    Int,
    /// Integer truncated to 64 bits on load
    BigInt,
    /// Floating point
    Float,
    /// Boolean, decoded from bytes, numbers or strings on load
    Boolean,
    /// Epoch milliseconds
    Date,
    /// Distributed counter
    Counter,
    /// UUID text
    Uuid,
    /// Opaque bytes
    Bytes,
    /// Nested structured value
    Object,
}

/// Attribute validator; returns a message (`:prop` is replaced) on failure
pub type Validator = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Computed read accessor
pub type Getter = Arc<dyn Fn(&Entity) -> Value + Send + Sync>;

/// Computed write accessor
pub type Setter = Arc<dyn Fn(&mut Entity, Value) + Send + Sync>;

/// Attribute descriptor
#[derive(Clone)]
pub struct Attribute {
    /// Declared type
    pub ty: AttributeType,
    /// Value a fresh instance starts with
    pub default: Value,
    /// Validators run by `validate()`
    pub validators: Vec<Validator>,
    /// Null fails validation
    pub not_null: bool,
    /// Included in serialization
    pub serializable: bool,
    /// This is the primary attribute
    pub primary: bool,
}

impl Attribute {
    /// Attribute of the given type with a null default
    pub fn new(ty: AttributeType) -> Self {
        Self {
            ty,
            default: Value::Null,
            validators: Vec::new(),
            not_null: false,
            serializable: true,
            primary: false,
        }
    }

    /// Flag as the primary attribute
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Default value
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Reject null values on validation
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Exclude from serialization
    pub fn hidden(mut self) -> Self {
        self.serializable = false;
        self
    }

    /// Add a validator
    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(f));
        self
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("ty", &self.ty)
            .field("default", &self.default)
            .field("validators", &self.validators.len())
            .field("not_null", &self.not_null)
            .field("serializable", &self.serializable)
            .field("primary", &self.primary)
            .finish()
    }
}

/// Relationship kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// This type holds a foreign key to the target's key
    BelongsTo,
    /// The target holds one row matching this type's key
    HasOne,
    /// The target holds many rows matching this type's key
    HasMany,
}

/// Association descriptor
///
/// `local` is the attribute read on this type, `on` the attribute matched on
/// the target. Unset names default when the association is resolved:
/// belongsTo uses the target's primary for both, hasOne/hasMany use this
/// type's primary for both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Relationship kind
    pub kind: AssociationKind,
    /// Target type storage name
    pub target: String,
    /// Target-side matching attribute
    pub on: Option<String>,
    /// Local reference attribute
    pub local: Option<String>,
    /// Included in serialization
    pub serializable: bool,
}

impl Association {
    fn new(kind: AssociationKind, target: &str) -> Self {
        Self {
            kind,
            target: target.to_string(),
            on: None,
            local: None,
            serializable: true,
        }
    }

    /// This type holds the target's key in a foreign-key attribute
    pub fn belongs_to(target: &str) -> Self {
        Self::new(AssociationKind::BelongsTo, target)
    }

    /// The target has one row referencing this type
    pub fn has_one(target: &str) -> Self {
        Self::new(AssociationKind::HasOne, target)
    }

    /// The target has many rows referencing this type
    pub fn has_many(target: &str) -> Self {
        Self::new(AssociationKind::HasMany, target)
    }

    /// Target-side matching attribute
    pub fn on(mut self, attribute: &str) -> Self {
        self.on = Some(attribute.to_string());
        self
    }

    /// Local reference attribute (the foreign key for belongsTo)
    pub fn fk(mut self, attribute: &str) -> Self {
        self.local = Some(attribute.to_string());
        self
    }

    /// Exclude from serialization
    pub fn hidden(mut self) -> Self {
        self.serializable = false;
        self
    }
}

/// Frozen per-type declaration
#[derive(Clone)]
pub struct ModelSchema {
    name: String,
    options: ModelOptions,
    attributes: Vec<(String, Attribute)>,
    associations: Vec<(String, Association)>,
    getters: BTreeMap<String, Getter>,
    setters: BTreeMap<String, Setter>,
    primary: Option<String>,
}

impl ModelSchema {
    /// Storage name (column family)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type options
    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    /// Storage key column name
    pub fn key_alias(&self) -> &str {
        &self.options.key_alias
    }

    /// Primary attribute name, if declared
    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    /// Primary attribute name or an error naming the type
    pub fn require_primary(&self) -> Result<&str> {
        self.primary().ok_or_else(|| Error::MissingPrimary {
            model: self.name.clone(),
        })
    }

    /// Attributes in declaration order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(n, a)| (n.as_str(), a))
    }

    /// Look up one attribute
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a)
    }

    /// True if `name` is a declared attribute
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Associations in declaration order
    pub fn associations(&self) -> impl Iterator<Item = (&str, &Association)> {
        self.associations.iter().map(|(n, a)| (n.as_str(), a))
    }

    /// Look up one association
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a)
    }

    /// Computed getter for `name`
    pub fn getter(&self, name: &str) -> Option<&Getter> {
        self.getters.get(name)
    }

    /// Computed setter for `name`
    pub fn setter(&self, name: &str) -> Option<&Setter> {
        self.setters.get(name)
    }

    /// Names with a computed getter
    pub fn getter_names(&self) -> impl Iterator<Item = &str> {
        self.getters.keys().map(String::as_str)
    }

    /// Attribute whose name, stripped to lowercase alphanumerics, equals `stamp`
    ///
    /// Matches `created_at`, `createdAt` and `CreatedAt` for `"createdat"`.
    pub fn stamp_attribute(&self, stamp: &str) -> Option<&str> {
        self.attributes
            .iter()
            .map(|(n, _)| n.as_str())
            .find(|n| normalize_stamp(n) == stamp)
    }

    fn is_taken(&self, name: &str) -> bool {
        RESERVED_NAMES.contains(&name)
            || self.has_attribute(name)
            || self.association(name).is_some()
            || self.getters.contains_key(name)
            || self.setters.contains_key(name)
    }

    fn duplicate(&self, name: &str) -> Error {
        Error::DuplicateName {
            owner: self.name.clone(),
            name: name.to_string(),
        }
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("attributes", &self.attributes)
            .field("associations", &self.associations)
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .field("primary", &self.primary)
            .finish()
    }
}

fn normalize_stamp(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Assembles a [`ModelSchema`]
///
/// # Example
///
/// ```ignore
/// let mut user = keyspace.model("User");
/// user.property("userId", Attribute::new(AttributeType::Uuid).primary())?
///     .property("email", Attribute::new(AttributeType::Text).not_null())?
///     .associate("pets", Association::has_many("Pet"))?;
/// let users = keyspace.register(user)?;
/// ```
pub struct SchemaBuilder {
    schema: ModelSchema,
}

impl SchemaBuilder {
    /// Builder with explicit options
    pub fn new(name: &str, options: ModelOptions) -> Self {
        Self {
            schema: ModelSchema {
                name: name.to_string(),
                options,
                attributes: Vec::new(),
                associations: Vec::new(),
                getters: BTreeMap::new(),
                setters: BTreeMap::new(),
                primary: None,
            },
        }
    }

    /// Mutable access to the type options
    pub fn options_mut(&mut self) -> &mut ModelOptions {
        &mut self.schema.options
    }

    /// Declare an attribute
    pub fn property(&mut self, name: &str, attribute: Attribute) -> Result<&mut Self> {
        if self.schema.is_taken(name) {
            return Err(self.schema.duplicate(name));
        }
        if attribute.primary {
            if let Some(existing) = &self.schema.primary {
                return Err(Error::precondition(format!(
                    "{} already has primary attribute {}; cannot also make {} primary",
                    self.schema.name, existing, name
                )));
            }
            self.schema.primary = Some(name.to_string());
        }
        self.schema.attributes.push((name.to_string(), attribute));
        Ok(self)
    }

    /// Declare an association
    pub fn associate(&mut self, name: &str, association: Association) -> Result<&mut Self> {
        if self.schema.is_taken(name) {
            return Err(self.schema.duplicate(name));
        }
        self.schema
            .associations
            .push((name.to_string(), association));
        Ok(self)
    }

    /// Declare a belongsTo association with default reference attributes
    pub fn belongs_to(&mut self, name: &str, target: &str) -> Result<&mut Self> {
        self.associate(name, Association::belongs_to(target))
    }

    /// Declare a hasOne association with default reference attributes
    pub fn has_one(&mut self, name: &str, target: &str) -> Result<&mut Self> {
        self.associate(name, Association::has_one(target))
    }

    /// Declare a hasMany association with default reference attributes
    pub fn has_many(&mut self, name: &str, target: &str) -> Result<&mut Self> {
        self.associate(name, Association::has_many(target))
    }

    /// Declare a computed getter.
    ///
    /// A getter may wrap a declared attribute; any other existing name is rejected.
    pub fn getter<F>(&mut self, name: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(&Entity) -> Value + Send + Sync + 'static,
    {
        if self.schema.getters.contains_key(name)
            || (!self.schema.has_attribute(name) && self.schema.is_taken(name))
        {
            return Err(self.schema.duplicate(name));
        }
        self.schema.getters.insert(name.to_string(), Arc::new(f));
        Ok(self)
    }

    /// Declare a computed setter.
    ///
    /// A setter may wrap a declared attribute or pair with a getter of the same name.
    pub fn setter<F>(&mut self, name: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(&mut Entity, Value) + Send + Sync + 'static,
    {
        let pairs_with_getter = self.schema.getters.contains_key(name)
            && !self.schema.setters.contains_key(name)
            && self.schema.association(name).is_none();
        if self.schema.setters.contains_key(name)
            || (!self.schema.has_attribute(name)
                && !pairs_with_getter
                && self.schema.is_taken(name))
        {
            return Err(self.schema.duplicate(name));
        }
        self.schema.setters.insert(name.to_string(), Arc::new(f));
        Ok(self)
    }

    /// Storage name of the type being built
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Freeze the schema
    pub fn build(self) -> ModelSchema {
        self.schema
    }
}
