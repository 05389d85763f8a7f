//! Error types for Casio
//!
//! All failures surface through the [`Error`] enum. We use `thiserror` for
//! automatic `Display` and `Error` trait implementations.
//!
//! # Categories
//!
//! | Category | Variants | Description |
//! |----------|----------|-------------|
//! | Validation | `Validation` | Per-attribute messages, nothing was persisted |
//! | Precondition | `Precondition`, `DuplicateName`, `UnknownType`, `MissingPrimary`, `InvalidWhere` | Caller misuse, raised at the call site |
//! | Coercion | `Coercion` | A stored value does not fit the declared attribute type |
//! | Storage | `Storage` | Reported by the execution gateway |
//! | System | `Config`, `Serialization` | Configuration files and projections |
//!
//! A missing row is not an error: lookups return `Ok(None)`.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Result type alias for Casio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Casio
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // ==================== Validation ====================
    /// One or more attribute validators failed
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    // ==================== Precondition ====================
    /// Operation called in the wrong state or with an unsupported combination
    #[error("precondition failed: {reason}")]
    Precondition { reason: String },

    /// A declaration collides with a name already present on the type
    #[error("{owner}.{name} already exists")]
    DuplicateName { owner: String, name: String },

    /// No registered type carries this storage name
    #[error("unknown type: {name}")]
    UnknownType { name: String },

    /// The operation needs a primary attribute and the schema has none
    #[error("model {model} has no primary attribute")]
    MissingPrimary { model: String },

    /// The where specification has an unusable shape
    #[error("invalid where: {reason}")]
    InvalidWhere { reason: String },

    // ==================== Coercion ====================
    /// A stored value could not be coerced into the attribute's type
    #[error("cannot coerce {attribute}: {reason}")]
    Coercion { attribute: String, reason: String },

    // ==================== Storage ====================
    /// Failure reported by the execution gateway
    #[error("storage error: {reason}")]
    Storage { reason: String },

    // ==================== System ====================
    /// Configuration could not be read or parsed
    #[error("config error: {reason}")]
    Config { reason: String },

    /// Projection or serialization failure
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl Error {
    /// Shorthand for a precondition failure
    pub fn precondition(reason: impl Into<String>) -> Self {
        Error::Precondition {
            reason: reason.into(),
        }
    }

    /// Shorthand for a storage failure
    pub fn storage(reason: impl Into<String>) -> Self {
        Error::Storage {
            reason: reason.into(),
        }
    }

    /// Shorthand for an invalid where specification
    pub fn invalid_where(reason: impl Into<String>) -> Self {
        Error::InvalidWhere {
            reason: reason.into(),
        }
    }

    /// True for failures reported by the store
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage { .. })
    }

    /// The validation messages, if this is a validation failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Error::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization {
            reason: e.to_string(),
        }
    }
}

/// Validation messages grouped by attribute name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors {
    by_attribute: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Empty error set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for an attribute; `:prop` is replaced by its name
    pub fn add(&mut self, attribute: &str, message: &str) {
        self.by_attribute
            .entry(attribute.to_string())
            .or_default()
            .push(message.replace(":prop", attribute));
    }

    /// Messages recorded for one attribute
    pub fn get(&self, attribute: &str) -> Option<&[String]> {
        self.by_attribute.get(attribute).map(Vec::as_slice)
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.by_attribute.is_empty()
    }

    /// Number of attributes with at least one message
    pub fn len(&self) -> usize {
        self.by_attribute.len()
    }

    /// Iterate attribute names with their messages
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.by_attribute
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Drop every message
    pub fn clear(&mut self) {
        self.by_attribute.clear();
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (attribute, messages) in &self.by_attribute {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                first = false;
                write!(f, "{}: {}", attribute, message)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_prop_substitution() {
        let mut errors = ValidationErrors::new();
        errors.add("email", ":prop is null.");
        assert_eq!(errors.get("email").unwrap(), ["email is null."]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_validation_display_joins_messages() {
        let mut errors = ValidationErrors::new();
        errors.add("a", "bad");
        errors.add("b", "worse");
        let err = Error::Validation(errors);
        let msg = err.to_string();
        assert!(msg.contains("a: bad"));
        assert!(msg.contains("b: worse"));
    }

    #[test]
    fn test_error_display_duplicate_name() {
        let err = Error::DuplicateName {
            owner: "User".to_string(),
            name: "email".to_string(),
        };
        assert_eq!(err.to_string(), "User.email already exists");
    }

    #[test]
    fn test_storage_classification() {
        assert!(Error::storage("timeout").is_storage());
        assert!(!Error::precondition("x").is_storage());
    }

    #[test]
    fn test_from_serde_json() {
        let bad: std::result::Result<i32, _> = serde_json::from_str::<i32>("nope");
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
