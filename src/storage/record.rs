use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::storage::schema::CollectionName;
use crate::types::{Result, StoreError};

/// A stored record: an opaque mapping from field name to JSON value.
///
/// The store only looks at the primary key field and at indexed fields; every
/// other field is carried through unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `field`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets `field`, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Removes `field`, returning its value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Borrows the underlying field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the record, returning the field map.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Extracts the string primary key required by `collection`.
    pub fn primary_key(&self, collection: CollectionName) -> Result<&str> {
        let field = collection.schema().primary_key;
        match self.0.get(field) {
            Some(Value::String(key)) => Ok(key),
            Some(other) => Err(StoreError::InvalidRecord {
                collection: collection.as_str(),
                reason: format!("primary key '{field}' must be a string, found {}", kind(other)),
            }),
            None => Err(StoreError::InvalidRecord {
                collection: collection.as_str(),
                reason: format!("missing primary key '{field}'"),
            }),
        }
    }

    /// Index key for `field`, if the record holds an indexable value there.
    pub(crate) fn index_key(&self, field: &str) -> Option<IndexKey> {
        self.0.get(field).and_then(IndexKey::from_value)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for Record {
    type Error = Value;

    /// Accepts JSON objects; any other value is handed back unchanged.
    fn try_from(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(other),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Comparable form of an indexed field value.
///
/// Only numbers and strings are indexable. Numbers sort before strings and
/// compare by value, so `1` and `1.0` land in the same bucket. Integers keep
/// their exact value across the whole `i64` and `u64` range.
#[derive(Clone, Debug)]
pub enum IndexKey {
    /// Integral numeric value.
    Integer(i128),
    /// Non-integral numeric value.
    Float(f64),
    /// Text field value.
    Text(String),
}

impl IndexKey {
    /// Converts a JSON value, returning `None` for non-indexable types.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(IndexKey::Text(text.clone())),
            Value::Number(number) => {
                if let Some(n) = number.as_i64() {
                    Some(IndexKey::Integer(n.into()))
                } else if let Some(n) = number.as_u64() {
                    Some(IndexKey::Integer(n.into()))
                } else {
                    number.as_f64().map(IndexKey::from_float)
                }
            }
            _ => None,
        }
    }

    fn from_float(value: f64) -> Self {
        const INTEGRAL_LIMIT: f64 = i128::MAX as f64;
        if value.fract() == 0.0 && value.abs() < INTEGRAL_LIMIT {
            IndexKey::Integer(value as i128)
        } else {
            IndexKey::Float(value)
        }
    }

    fn rank(&self) -> u8 {
        match self {
            IndexKey::Integer(_) | IndexKey::Float(_) => 0,
            IndexKey::Text(_) => 1,
        }
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // An integer never equals a float key: integral floats are stored as
        // integers.
        match (self, other) {
            (IndexKey::Integer(a), IndexKey::Integer(b)) => a.cmp(b),
            (IndexKey::Float(a), IndexKey::Float(b)) => a.total_cmp(b),
            (IndexKey::Integer(a), IndexKey::Float(b)) => {
                (*a as f64).total_cmp(b).then(Ordering::Less)
            }
            (IndexKey::Float(a), IndexKey::Integer(b)) => {
                a.total_cmp(&(*b as f64)).then(Ordering::Greater)
            }
            (IndexKey::Text(a), IndexKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}
