//! Where-specification resolution
//!
//! Callers describe which rows they want in one of three shapes:
//!
//! | Shape | Predicate |
//! |-------|-----------|
//! | list of identifiers | `KEY IN (:KEY)` |
//! | single identifier | `KEY=:KEY` |
//! | clause + args | the clause, with the primary attribute renamed to the key alias |
//!
//! A clause that carries no comparison or membership operator is a bare
//! identifier and takes the single-identifier path.
//!
//! The rename only touches whole words, so a placeholder such as `:userIds`
//! survives a rewrite of `userId`.

use casio_core::{Args, Error, Predicate, Result, Value};
use regex::Regex;
use std::sync::OnceLock;

/// Which rows an operation addresses
#[derive(Debug, Clone, PartialEq)]
pub enum WhereSpec {
    /// Membership on the storage key
    Ids(Vec<Value>),
    /// Equality on the storage key
    Id(Value),
    /// A caller-written clause with bound arguments
    Clause {
        /// Clause text with `:name` placeholders
        clause: String,
        /// Bound arguments
        args: Args,
    },
}

impl WhereSpec {
    /// Equality on one identifier
    pub fn id(value: impl Into<Value>) -> Self {
        WhereSpec::Id(value.into())
    }

    /// Membership on several identifiers
    pub fn ids<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        WhereSpec::Ids(values.into_iter().map(Into::into).collect())
    }

    /// A clause with bound arguments
    pub fn clause(clause: impl Into<String>, args: Args) -> Self {
        WhereSpec::Clause {
            clause: clause.into(),
            args,
        }
    }

    /// Clause binding a single argument
    pub fn clause_with(clause: impl Into<String>, name: &str, value: impl Into<Value>) -> Self {
        let mut args = Args::new();
        args.insert(name.to_string(), value.into());
        Self::clause(clause, args)
    }
}

impl From<&str> for WhereSpec {
    fn from(id: &str) -> Self {
        WhereSpec::Id(Value::from(id))
    }
}

impl From<String> for WhereSpec {
    fn from(id: String) -> Self {
        WhereSpec::Id(Value::from(id))
    }
}

impl From<Value> for WhereSpec {
    fn from(id: Value) -> Self {
        WhereSpec::Id(id)
    }
}

impl From<Vec<Value>> for WhereSpec {
    fn from(ids: Vec<Value>) -> Self {
        WhereSpec::Ids(ids)
    }
}

/// Array-like parsing: `[ids]`, `[id]`, `[clause]` or `[clause, args]`
impl TryFrom<&[Value]> for WhereSpec {
    type Error = Error;

    fn try_from(parts: &[Value]) -> Result<Self> {
        match parts {
            [] => Err(Error::invalid_where("expected a non-empty array")),
            [Value::Array(ids)] => Ok(WhereSpec::Ids(ids.clone())),
            [single] => Ok(WhereSpec::Id(single.clone())),
            [Value::Array(ids), Value::Null] => Ok(WhereSpec::Ids(ids.clone())),
            [Value::String(clause), Value::Object(args)] => Ok(WhereSpec::Clause {
                clause: clause.clone(),
                args: args.clone(),
            }),
            [id, Value::Null] => Ok(WhereSpec::Id(id.clone())),
            _ => Err(Error::invalid_where(
                "expected [ids], [id] or [clause, args]",
            )),
        }
    }
}

fn operator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)<|>|=|in ?\(").expect("valid regex"))
}

/// True when `clause` contains `<`, `>`, `=` or `IN (`
pub fn has_operator(clause: &str) -> bool {
    operator_pattern().is_match(clause)
}

/// Build the predicate for `spec` against a family keyed by `key_alias`.
///
/// `primary` is the richer attribute name callers may use in clauses.
pub fn resolve(spec: &WhereSpec, key_alias: &str, primary: Option<&str>) -> Result<Predicate> {
    match spec {
        WhereSpec::Ids(ids) => {
            if ids.is_empty() {
                return Err(Error::invalid_where("empty identifier list"));
            }
            Ok(key_membership(key_alias, ids.clone()))
        }
        WhereSpec::Id(Value::Array(ids)) => resolve(&WhereSpec::Ids(ids.clone()), key_alias, primary),
        WhereSpec::Id(id) => {
            if !id.is_present() {
                return Err(Error::invalid_where("missing identifier"));
            }
            Ok(Predicate::equals(key_alias, id.clone()))
        }
        WhereSpec::Clause { clause, args } => {
            let clause = clause.trim();
            if clause.is_empty() {
                return Err(Error::invalid_where("empty clause"));
            }
            if !has_operator(clause) {
                return Ok(Predicate::equals(key_alias, clause));
            }
            match primary {
                Some(primary) if primary != key_alias => {
                    rewrite_primary(clause, args, key_alias, primary)
                }
                _ => Ok(Predicate::new(clause, args.clone())),
            }
        }
    }
}

fn key_membership(key_alias: &str, ids: Vec<Value>) -> Predicate {
    let mut args = Args::new();
    args.insert(key_alias.to_string(), Value::Array(ids));
    Predicate::new(format!("{key_alias} IN (:{key_alias})"), args)
}

/// Replace whole-word occurrences of `primary` with `key_alias` and mirror
/// the bound argument under the alias.
fn rewrite_primary(clause: &str, args: &Args, key_alias: &str, primary: &str) -> Result<Predicate> {
    let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(primary)))
        .map_err(|e| Error::invalid_where(format!("bad primary attribute name: {e}")))?;
    let rewritten = pattern.replace_all(clause, key_alias).into_owned();

    let mut args = args.clone();
    if let Some(value) = args.get(primary).cloned() {
        args.insert(key_alias.to_string(), value);
    }
    Ok(Predicate::new(rewritten, args))
}
