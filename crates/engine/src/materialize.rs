//! Row materialization
//!
//! Turns a raw [`Row`] into an attribute map ready to be instantiated as an
//! entity or a caller-chosen projection:
//!
//! 1. Tombstone check. Whole-row deletes leave a key-only marker behind, so
//!    a row that comes back with a single key column when several columns
//!    were requested is treated as absent.
//! 2. Attribute map from the columns, with the row key injected under the
//!    primary attribute and write timestamps recorded per column.
//! 3. Type coercion against the schema.
//!
//! A row whose only real column is the primary attribute is
//! indistinguishable from a tombstone; such rows are reported absent.

use crate::schema::{AttributeType, ModelSchema};
use casio_core::{Error, Result, Row, Statement, Value};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::debug;

/// One present row, coerced and keyed by attribute name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaterializedRow {
    /// Row key as stored
    pub key: Value,
    /// Attribute values including the primary
    pub attributes: BTreeMap<String, Value>,
    /// Write timestamp per column name
    pub timestamps: BTreeMap<String, i64>,
}

impl MaterializedRow {
    /// Deserialize the attributes into any serde type
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v.clone())))
            .collect();
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }

    /// Attribute value, or null
    pub fn get(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&Value::Null)
    }
}

/// Alternate shape a query result can be built as.
///
/// Projections skip entity bookkeeping: no shadow, no dirty tracking, no
/// association loading.
pub trait Projection: Sized {
    /// Build from one materialized row
    fn from_row(row: MaterializedRow) -> Result<Self>;
}

impl Projection for MaterializedRow {
    fn from_row(row: MaterializedRow) -> Result<Self> {
        Ok(row)
    }
}

impl Projection for serde_json::Value {
    fn from_row(row: MaterializedRow) -> Result<Self> {
        row.deserialize()
    }
}

/// True when `row` is absent: no columns, or a lone key column under a
/// multi-column projection.
///
/// A column range counts as multi-column, so a range read that comes back
/// with only the key column is absent as well.
pub fn is_tombstone(row: &Row, statement: &Statement, primary: Option<&str>) -> bool {
    if row.column_count() == 0 {
        return true;
    }
    let wants_many = statement.selects_all() || statement.columns().len() > 1;
    if !wants_many || row.column_count() != 1 {
        return false;
    }
    let only = &row.columns[0].name;
    only == statement.key_column() || primary.is_some_and(|p| p == only)
}

/// Materialize one row, or `None` for a tombstone
pub fn materialize(
    schema: &ModelSchema,
    row: Row,
    statement: &Statement,
) -> Result<Option<MaterializedRow>> {
    if is_tombstone(&row, statement, schema.primary()) {
        debug!(
            target: "casio::materialize",
            family = schema.name(),
            key = %row.key.to_key_string(),
            "Dropping tombstone row"
        );
        return Ok(None);
    }

    let key_alias = schema.key_alias();
    let mut attributes = BTreeMap::new();
    let mut timestamps = BTreeMap::new();
    for column in row.columns {
        timestamps.insert(column.name.clone(), column.timestamp);
        if column.name == key_alias {
            continue;
        }
        attributes.insert(column.name, column.value);
    }
    coerce(schema, &mut attributes)?;
    if let Some(primary) = schema.primary() {
        attributes.insert(primary.to_string(), coerce_key(schema, primary, &row.key)?);
    }
    Ok(Some(MaterializedRow {
        key: row.key,
        attributes,
        timestamps,
    }))
}

/// Materialize every present row, dropping tombstones
pub fn materialize_all(
    schema: &ModelSchema,
    rows: Vec<Row>,
    statement: &Statement,
) -> Result<Vec<MaterializedRow>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(m) = materialize(schema, row, statement)? {
            out.push(m);
        }
    }
    Ok(out)
}

// =============================================================================
// Coercion
// =============================================================================

/// Coerce every schema attribute present in `attributes` to its declared type
pub fn coerce(schema: &ModelSchema, attributes: &mut BTreeMap<String, Value>) -> Result<()> {
    for (name, attribute) in schema.attributes() {
        if let Some(value) = attributes.get_mut(name) {
            if value.is_null() {
                continue;
            }
            let raw = std::mem::take(value);
            *value = coerce_value(name, attribute.ty, raw)?;
        }
    }
    Ok(())
}

/// Coerce the row key to the primary's type. The conversion must be lossless:
/// a key that only partly parses would name a different row.
fn coerce_key(schema: &ModelSchema, primary: &str, key: &Value) -> Result<Value> {
    let Some(attribute) = schema.attribute(primary) else {
        return Ok(key.clone());
    };
    let coerced = coerce_value(primary, attribute.ty, key.clone())?;
    let raw = key.to_key_string();
    if coerced.to_key_string() != raw {
        return Err(Error::Coercion {
            attribute: primary.to_string(),
            reason: format!("row key '{raw}' does not fit {:?}", attribute.ty),
        });
    }
    Ok(coerced)
}

/// Coerce one stored value to `ty`
pub fn coerce_value(attribute: &str, ty: AttributeType, value: Value) -> Result<Value> {
    let err = |reason: String| Error::Coercion {
        attribute: attribute.to_string(),
        reason,
    };
    match ty {
        AttributeType::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Bytes(bytes) => Ok(Value::Bool(bytes.first().is_some_and(|b| *b != 0))),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Int(i) => Err(err(format!("integer {i} is not 0 or 1"))),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                other => Err(err(format!("string '{other}' is not 'true' or 'false'"))),
            },
            other => Err(err(format!("cannot read {} as a boolean", other.type_name()))),
        },
        AttributeType::Int => integer(value).map(|i| Value::Int(i64::from(i as i32))).map_err(err),
        AttributeType::BigInt | AttributeType::Counter => integer(value).map(Value::Int).map_err(err),
        AttributeType::Float => match value {
            Value::Float(f) => Ok(Value::Float(f)),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| err(format!("'{s}': {e}"))),
            other => Err(err(format!("cannot read {} as a float", other.type_name()))),
        },
        AttributeType::Date => match value {
            Value::Int(ms) => Ok(Value::Int(ms)),
            Value::Float(f) => Ok(Value::Int(f as i64)),
            Value::String(s) => parse_date(&s).map(Value::Int).map_err(err),
            other => Err(err(format!("cannot read {} as a date", other.type_name()))),
        },
        AttributeType::Text | AttributeType::Uuid => match value {
            Value::Bytes(bytes) => Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned())),
            other => Ok(other),
        },
        AttributeType::Bytes | AttributeType::Object => Ok(value),
    }
}

/// Leading-integer parse: optional sign then digits, anything after ignored
fn integer(value: Value) -> std::result::Result<i64, String> {
    match value {
        Value::Int(i) => Ok(i),
        Value::Float(f) => Ok(f.trunc() as i64),
        Value::Bool(b) => Ok(i64::from(b)),
        Value::String(s) => parse_leading_int(&s),
        Value::Bytes(b) => parse_leading_int(&String::from_utf8_lossy(&b)),
        other => Err(format!("cannot read {} as an integer", other.type_name())),
    }
}

fn parse_leading_int(s: &str) -> std::result::Result<i64, String> {
    let trimmed = s.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['-', '+']));
    let digits = trimmed[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(trimmed.len(), |end| end + sign_len);
    trimmed[..digits]
        .parse::<i64>()
        .map_err(|_| format!("'{s}' is not an integer"))
}

/// Epoch millis from digits or an RFC 3339 timestamp
fn parse_date(s: &str) -> std::result::Result<i64, String> {
    if let Ok(ms) = s.trim().parse::<i64>() {
        return Ok(ms);
    }
    chrono::DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| format!("'{s}' is not a date: {e}"))
}
