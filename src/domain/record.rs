//! Records produced by a record store
//!
//! A [`Record`] is one row: an opaque [`RecordKey`] plus column values. Records
//! are ephemeral; the pipeline reads them, the batch processor discards them once
//! the page is committed or reported.

use super::value::Value;
use std::collections::BTreeMap;
use std::fmt;

static NULL_VALUE: Value = Value::Null;

/// Column-keyed values of one row
pub type Fields = BTreeMap<String, Value>;

/// Opaque row identity, one value per primary key column
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordKey(Vec<Value>);

impl RecordKey {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl From<i64> for RecordKey {
    fn from(id: i64) -> Self {
        Self(vec![Value::Int(id)])
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// One row of an entity
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    key: RecordKey,
    fields: Fields,
}

impl Record {
    pub fn new(key: RecordKey, fields: Fields) -> Self {
        Self { key, fields }
    }

    /// Build a record keyed by the given primary key columns
    pub fn keyed_by(primary_key: &[String], fields: Fields) -> Self {
        let key = RecordKey::new(
            primary_key
                .iter()
                .map(|column| fields.get(column).cloned().unwrap_or_default())
                .collect(),
        );
        Self { key, fields }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Column value, treating a missing column as null
    pub fn value(&self, column: &str) -> &Value {
        self.fields.get(column).unwrap_or(&NULL_VALUE)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.fields.insert(column.into(), value);
    }

    /// Apply an update set in place
    pub fn apply(&mut self, updates: &Fields) {
        for (column, value) in updates {
            self.fields.insert(column.clone(), value.clone());
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Build a record from `(column, value)` pairs keyed by `id`
///
/// ```
/// use shroud::record;
///
/// let r = record! { "id" => 1, "email" => "a@example.com" };
/// assert_eq!(r.value("email").as_str(), Some("a@example.com"));
/// ```
#[macro_export]
macro_rules! record {
    ($($column:expr => $value:expr),* $(,)?) => {{
        let mut fields = $crate::domain::record::Fields::new();
        $(fields.insert($column.to_string(), $crate::domain::value::Value::from($value));)*
        $crate::domain::record::Record::keyed_by(&["id".to_string()], fields)
    }};
}
