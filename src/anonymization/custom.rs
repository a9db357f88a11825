//! Custom anonymizer plug-ins
//!
//! An entity with `custom_anonymizer = "<name>"` hands every record to the
//! anonymizer registered under that name instead of running its property
//! specs. The returned field set is written verbatim.

use crate::domain::{Fields, Record, Result, ShroudError};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Whole-record anonymizer
///
/// # Examples
///
/// ```
/// use shroud::anonymization::custom::CustomAnonymizer;
/// use shroud::domain::{Fields, Record, Value};
///
/// struct DropNotes;
///
/// impl CustomAnonymizer for DropNotes {
///     fn anonymize(&self, record: &Record) -> anyhow::Result<Fields> {
///         let mut fields = Fields::new();
///         if !record.value("notes").is_null() {
///             fields.insert("notes".to_string(), Value::Null);
///         }
///         Ok(fields)
///     }
/// }
/// ```
pub trait CustomAnonymizer: Send + Sync {
    /// Updated fields for one record; an empty set means "leave unchanged"
    fn anonymize(&self, record: &Record) -> anyhow::Result<Fields>;

    /// Whether [`anonymize_batch`](Self::anonymize_batch) should be used for whole pages
    fn supports_batch(&self) -> bool {
        false
    }

    /// Updated fields keyed by index into `records`
    ///
    /// Indices absent from the result are left unchanged.
    fn anonymize_batch(&self, records: &[Record]) -> anyhow::Result<HashMap<usize, Fields>> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| Ok((index, self.anonymize(record)?)))
            .collect()
    }
}

/// Named custom anonymizers
#[derive(Clone, Default)]
pub struct AnonymizerRegistry {
    anonymizers: HashMap<String, Arc<dyn CustomAnonymizer>>,
}

impl AnonymizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, anonymizer: Arc<dyn CustomAnonymizer>) {
        self.anonymizers.insert(name.to_string(), anonymizer);
    }

    /// Look up an anonymizer referenced by an entity
    ///
    /// # Errors
    ///
    /// Returns [`ShroudError::Configuration`] when nothing is registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn CustomAnonymizer>> {
        self.anonymizers.get(name).cloned().ok_or_else(|| {
            ShroudError::Configuration(format!("custom anonymizer '{name}' is not registered"))
        })
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.anonymizers.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for AnonymizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnonymizerRegistry")
            .field("anonymizers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;
    use crate::record;

    struct Upper;

    impl CustomAnonymizer for Upper {
        fn anonymize(&self, record: &Record) -> anyhow::Result<Fields> {
            let mut fields = Fields::new();
            if let Some(name) = record.value("name").as_str() {
                fields.insert("name".to_string(), Value::from(name.to_uppercase()));
            }
            Ok(fields)
        }
    }

    #[test]
    fn test_default_batch_delegates_per_record() {
        let records = vec![
            record! { "id" => 1, "name" => "ada" },
            record! { "id" => 2 },
        ];
        let result = Upper.anonymize_batch(&records).unwrap();
        assert_eq!(result[&0]["name"], Value::from("ADA"));
        assert!(result[&1].is_empty());
    }

    #[test]
    fn test_resolve_unknown_is_configuration_error() {
        let mut registry = AnonymizerRegistry::new();
        registry.register("upper", Arc::new(Upper));
        assert!(registry.resolve("upper").is_ok());
        assert!(matches!(
            registry.resolve("lower").err(),
            Some(ShroudError::Configuration(_))
        ));
    }
}
