//! Schemaless record documents and the field coercion rules shared by
//! training and inference.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category substituted for missing categorical values.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Read access to the named fields of one row.
///
/// Implemented by raw inference payloads as well as the typed training rows,
/// so the feature encoder applies exactly the same coercion in both modes.
pub trait FieldSource {
    /// Numeric value of `field`, or `None` when missing or non-numeric.
    fn numeric(&self, field: &str) -> Option<f64>;

    /// Categorical value of `field`, or `None` when missing.
    fn category(&self, field: &str) -> Option<String>;
}

/// Coerce a JSON value to a finite number.
///
/// Numeric strings are accepted (`"7"`, `" 4.5 "`); anything else that is not
/// a number becomes missing.
#[must_use]
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Coerce a JSON value to its categorical string form.
#[must_use]
pub fn coerce_category(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// A schemaless key/value document, as supplied by the storage or serving
/// collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, which must be an object.
    ///
    /// # Errors
    /// Returns the offending JSON type name if `value` is not an object.
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err("null".to_string()),
            Value::Bool(_) => Err("boolean".to_string()),
            Value::Number(_) => Err("number".to_string()),
            Value::String(_) => Err("string".to_string()),
            Value::Array(_) => Err("array".to_string()),
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required keys that are absent or null in this record, in the given order.
    #[must_use]
    pub fn missing_fields<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|field| self.get(field).map_or(true, Value::is_null))
            .collect()
    }

    /// Union of two records; keys in `other` win.
    #[must_use]
    pub fn merged(&self, other: &RawRecord) -> RawRecord {
        let mut map = self.0.clone();
        for (k, v) in &other.0 {
            map.insert(k.clone(), v.clone());
        }
        Self(map)
    }

    /// Copy of this record without the given keys.
    #[must_use]
    pub fn without(&self, keys: &[&str]) -> RawRecord {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !keys.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Non-empty string form of a field (numbers are stringified).
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(coerce_category)
            .filter(|s| !s.trim().is_empty())
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FieldSource for RawRecord {
    fn numeric(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(coerce_numeric)
    }

    fn category(&self, field: &str) -> Option<String> {
        self.get(field).and_then(coerce_category)
    }
}
