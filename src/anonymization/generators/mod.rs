//! Generator registry
//!
//! Maps a [`GeneratorType`] key to a value generator. Built-in families live in
//! the submodules and register themselves in [`GeneratorRegistry::with_builtins`];
//! integrators add their own generators under new type keys or as named
//! services referenced by `generator = "service"` properties.
//!
//! # Examples
//!
//! ```
//! use shroud::anonymization::generators::{Generator, GeneratorContext, GeneratorRegistry};
//! use shroud::domain::{GeneratorType, Value};
//! use std::sync::Arc;
//!
//! struct LoyaltyCode;
//!
//! impl Generator for LoyaltyCode {
//!     fn generate(&self, _ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
//!         Ok(Value::from("LOYAL-0000"))
//!     }
//! }
//!
//! let mut registry = GeneratorRegistry::with_builtins();
//! registry.register_service("loyalty", Arc::new(LoyaltyCode));
//! assert!(registry.create(&GeneratorType::Service, Some("loyalty")).is_ok());
//! assert!(registry.create(&GeneratorType::Service, Some("missing")).is_err());
//! ```

pub mod derived;
pub mod financial;
pub mod identity;
pub mod numeric;
pub mod technical;
pub mod text;

use crate::domain::{
    Fields, GeneratorType, Options, Record, Result, ShroudError, Value,
};
use rand::rngs::StdRng;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Everything a generator may look at while producing one value
pub struct GeneratorContext<'a> {
    /// Property name being generated
    pub property: &'a str,
    /// Options configured on the property
    pub options: &'a Options,
    /// Value of the field before anonymization
    pub original_value: &'a Value,
    /// Full record as read from the store
    pub record: &'a Record,
    /// Values produced earlier for this record, in weight order
    pub generated: &'a Fields,
    pub rng: &'a mut StdRng,
}

impl GeneratorContext<'_> {
    /// Value of another field, preferring what was generated for it this record
    pub fn field_value(&self, field: &str) -> &Value {
        self.generated
            .get(field)
            .unwrap_or_else(|| self.record.value(field))
    }

    /// Property options plus the injected `original_value` and `record` keys
    ///
    /// Services that only understand a flat option table read from this.
    pub fn merged_options(&self) -> Options {
        let mut merged = self.options.clone();
        merged.insert("original_value", self.original_value.to_json());
        merged.insert("record", self.record.to_json());
        merged
    }
}

/// Value generator
///
/// Implementations must be thread-safe; one instance serves every record of
/// every entity that references it. All randomness must come from
/// [`GeneratorContext::rng`] so seeded runs stay reproducible.
pub trait Generator: Send + Sync {
    /// Produce the replacement value for one field of one record
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value>;

    /// Check options once, before any record is processed
    fn validate(&self, _options: &Options) -> anyhow::Result<()> {
        Ok(())
    }

    /// Write the generated value even when it equals the original
    fn forces_write(&self) -> bool {
        false
    }

    /// Whether `preserve_null` applies to this record
    fn honors_preserve_null(&self, _options: &Options, _record: &Record) -> bool {
        true
    }
}

/// Type key → generator mapping, plus named service generators
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Arc<dyn Generator>>,
    services: HashMap<String, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in generator
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        identity::register(&mut registry);
        numeric::register(&mut registry);
        text::register(&mut registry);
        technical::register(&mut registry);
        financial::register(&mut registry);
        derived::register(&mut registry);
        registry
    }

    /// Register a generator under a type key, replacing any previous one
    pub fn register(&mut self, generator_type: impl Into<GeneratorType>, generator: Arc<dyn Generator>) {
        let key = generator_type.into().as_str().to_string();
        self.generators.insert(key, generator);
    }

    /// Register a named generator for `generator = "service"` properties
    pub fn register_service(&mut self, name: &str, generator: Arc<dyn Generator>) {
        self.services.insert(name.to_string(), generator);
    }

    /// Resolve the generator of a property
    ///
    /// # Errors
    ///
    /// Returns [`ShroudError::Configuration`] for an unknown type key, a
    /// `service` type without reference, or an unregistered service.
    pub fn create(
        &self,
        generator_type: &GeneratorType,
        service_ref: Option<&str>,
    ) -> Result<Arc<dyn Generator>> {
        if *generator_type == GeneratorType::Service {
            let name = service_ref.ok_or_else(|| {
                ShroudError::Configuration(
                    "generator 'service' requires a service reference".to_string(),
                )
            })?;
            return self.services.get(name).cloned().ok_or_else(|| {
                ShroudError::Configuration(format!("service generator '{name}' is not registered"))
            });
        }

        self.generators
            .get(generator_type.as_str())
            .cloned()
            .ok_or_else(|| {
                ShroudError::Configuration(format!(
                    "unknown generator type '{generator_type}'"
                ))
            })
    }

    pub fn contains(&self, generator_type: &GeneratorType) -> bool {
        self.generators.contains_key(generator_type.as_str())
    }

    /// Registered type keys, sorted
    pub fn keys(&self) -> BTreeSet<&str> {
        self.generators.keys().map(String::as_str).collect()
    }

    /// Registered service names, sorted
    pub fn services(&self) -> BTreeSet<&str> {
        self.services.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("generators", &self.keys())
            .field("services", &self.services())
            .finish()
    }
}

/// Text view of the original value, `None` for null
pub(crate) fn original_text(ctx: &GeneratorContext<'_>) -> Option<String> {
    ctx.original_value.to_text()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_cover_every_builtin_type() {
        let registry = GeneratorRegistry::with_builtins();
        for generator_type in GeneratorType::BUILTIN {
            if *generator_type == GeneratorType::Service {
                continue;
            }
            assert!(
                registry.contains(generator_type),
                "missing built-in generator '{generator_type}'"
            );
        }
    }

    #[test]
    fn test_unknown_type_is_configuration_error() {
        let registry = GeneratorRegistry::with_builtins();
        let err = registry
            .create(&GeneratorType::from("does_not_exist"), None)
            .err()
            .unwrap();
        assert!(matches!(err, ShroudError::Configuration(_)));
    }

    #[test]
    fn test_custom_type_key() {
        struct Fixed;
        impl Generator for Fixed {
            fn generate(&self, _ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
                Ok(Value::from("fixed"))
            }
        }

        let mut registry = GeneratorRegistry::new();
        registry.register("loyalty_code", Arc::new(Fixed));
        let generator = registry
            .create(&GeneratorType::from("loyalty_code"), None)
            .unwrap();
        let value = testing::run(generator.as_ref(), &Options::new(), Value::Null);
        assert_eq!(value, Value::from("fixed"));
    }

    #[test]
    fn test_merged_options_inject_context() {
        use rand::SeedableRng;

        let record = crate::record! { "id" => 4, "email" => "a@example.com" };
        let options = Options::new().with("min", 1);
        let original = Value::from("a@example.com");
        let generated = Fields::new();
        let mut rng = StdRng::seed_from_u64(1);
        let ctx = GeneratorContext {
            property: "email",
            options: &options,
            original_value: &original,
            record: &record,
            generated: &generated,
            rng: &mut rng,
        };
        let merged = ctx.merged_options();
        assert_eq!(merged.str("original_value"), Some("a@example.com"));
        assert_eq!(merged.table("record").and_then(|r| r.get("id")), Some(&serde_json::json!(4)));
        assert_eq!(merged.i64("min"), Some(1));
    }
}
