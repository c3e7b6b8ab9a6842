//! Canonical result unit.
//!
//! A [`Record`] is a heterogeneous key-value mapping, the one shape every
//! backend payload is normalized into. Values keep the full JSON variant
//! range; numbers stay at arbitrary precision so large integer identifiers
//! are never coerced through floating point.
//!
//! An error Record is a normal Record carrying the fixed fields `error`,
//! `service` and `kind`. Consumers branch on the `kind` tag rather than on
//! container type: a result batch may interleave success and error Records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorKind;

/// Field holding the human-readable message of an error Record.
pub const ERROR_FIELD: &str = "error";
/// Field holding the source-service name of an error Record.
pub const SERVICE_FIELD: &str = "service";
/// Field holding the error-kind tag of an error Record.
pub const KIND_FIELD: &str = "kind";

/// Canonical heterogeneous key-value Record produced by adapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build an error Record for the given service and failure kind.
    pub fn error(service: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(ERROR_FIELD.into(), Value::String(message.into()));
        fields.insert(SERVICE_FIELD.into(), Value::String(service.into()));
        fields.insert(KIND_FIELD.into(), Value::String(kind.as_str().into()));
        Self(fields)
    }

    /// True when this Record carries the error-kind tag.
    pub fn is_error(&self) -> bool {
        self.0.contains_key(KIND_FIELD) && self.0.contains_key(ERROR_FIELD)
    }

    /// The error-kind tag, when present.
    pub fn error_kind(&self) -> Option<&str> {
        if self.is_error() {
            self.0.get(KIND_FIELD).and_then(Value::as_str)
        } else {
            None
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Collect every value stored under a key whose name contains `needle`,
    /// at any nesting depth. Backends are inconsistent about where they bury
    /// identifier fields, so lookups match by key substring instead of path.
    pub fn values_by_key_substring(&self, needle: &str) -> Vec<&Value> {
        let mut found = Vec::new();
        for (key, value) in &self.0 {
            scan_value(key, value, needle, &mut found);
        }
        found
    }
}

fn scan_value<'a>(key: &str, value: &'a Value, needle: &str, found: &mut Vec<&'a Value>) {
    if key.contains(needle) {
        found.push(value);
    }
    match value {
        Value::Object(fields) => {
            for (nested_key, nested) in fields {
                scan_value(nested_key, nested, needle, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                // array elements keep their parent key out of the match
                scan_value("", item, needle, found);
            }
        }
        _ => {}
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
