//! Generator options
//!
//! [`Options`] wraps the free-form option table of a property. Accessors are
//! lenient about representation (`"4"` and `4` are both an integer) because the
//! table usually comes from hand-written TOML.

use super::value::Value;
use serde::{Deserialize, Serialize};

/// Keep `null` originals untouched
pub const PRESERVE_NULL: &str = "preserve_null";
/// Allow the generator output to be replaced by `null`
pub const NULLABLE: &str = "nullable";
/// Percentage (0-100) of records that receive `null` when nullable
pub const NULL_PROBABILITY: &str = "null_probability";
/// Anonymize even when the owning record is entity-excluded
pub const BYPASS_ENTITY_EXCLUSION: &str = "bypass_entity_exclusion";

/// Option table passed to generators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(serde_json::Map<String, serde_json::Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Option as a record value
    pub fn value(&self, key: &str) -> Option<Value> {
        self.0.get(key).map(Value::from)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::Number(n) => n.as_i64().map(|i| i != 0),
            serde_json::Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        self.bool(key).unwrap_or(false)
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn usize(&self, key: &str) -> Option<usize> {
        self.i64(key).and_then(|i| usize::try_from(i).ok())
    }

    /// First character of a string option
    pub fn char(&self, key: &str) -> Option<char> {
        self.str(key).and_then(|s| s.chars().next())
    }

    /// String list; a single string is a one-element list
    pub fn strings(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key)? {
            serde_json::Value::Array(items) => Some(
                items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            serde_json::Value::String(s) => Some(vec![s.clone()]),
            _ => None,
        }
    }

    /// Value list for option arrays
    pub fn values(&self, key: &str) -> Option<Vec<Value>> {
        match self.0.get(key)? {
            serde_json::Value::Array(items) => Some(items.iter().map(Value::from).collect()),
            _ => None,
        }
    }

    /// Table option (e.g. a value map)
    pub fn table(&self, key: &str) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.0.get(key).and_then(|v| v.as_object())
    }

    pub fn preserve_null(&self) -> bool {
        self.flag(PRESERVE_NULL)
    }

    pub fn bypass_entity_exclusion(&self) -> bool {
        self.flag(BYPASS_ENTITY_EXCLUSION)
    }

    /// Effective null probability, if null substitution is enabled
    ///
    /// `nullable = false` disables it; otherwise `null_probability` applies and
    /// defaults to 0 when only `nullable = true` is given.
    pub fn null_probability(&self) -> Option<u8> {
        if self.bool(NULLABLE) == Some(false) {
            return None;
        }
        if !self.contains(NULLABLE) && !self.contains(NULL_PROBABILITY) {
            return None;
        }
        let p = self.i64(NULL_PROBABILITY).unwrap_or(0).clamp(0, 100);
        Some(p as u8)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Options {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}
