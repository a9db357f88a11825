//! Anonymization engine
//!
//! This module turns declarative entity specs into per-record update sets.
//!
//! # Architecture
//!
//! - **Matching**: OR-of-AND rule sets deciding which records and fields are in scope
//! - **Generation**: Registry of built-in and pluggable value generators
//! - **Pipeline**: Weight-ordered application of properties to one record
//! - **Extension points**: Custom anonymizers and lifecycle hooks
//!
//! # Usage
//!
//! ```rust
//! use shroud::anonymization::{AnonymizerRegistry, GeneratorRegistry, PreparedEntity, PropertyPipeline};
//! use shroud::domain::{EntitySpec, PropertySpec};
//! use shroud::record;
//! use rand::SeedableRng;
//!
//! let spec = EntitySpec::new("cards").property(
//!     PropertySpec::new("number", "masking")
//!         .option("preserve_start", 4)
//!         .option("preserve_end", 4),
//! );
//! let entity = PreparedEntity::prepare(
//!     &spec,
//!     &GeneratorRegistry::with_builtins(),
//!     &AnonymizerRegistry::new(),
//! )?;
//!
//! let record = record! { "id" => 1, "number" => "4532015112830366" };
//! let mut rng = rand::rngs::StdRng::seed_from_u64(1);
//! let outcome = PropertyPipeline::default().apply(&entity, &record, &mut rng)?;
//! assert_eq!(outcome.updates["number"].as_str(), Some("4532********0366"));
//! # Ok::<(), shroud::domain::ShroudError>(())
//! ```

pub mod custom;
pub mod generators;
pub mod hooks;
pub mod matcher;
pub mod pipeline;

// Re-export main types
pub use custom::{AnonymizerRegistry, CustomAnonymizer};
pub use generators::{Generator, GeneratorContext, GeneratorRegistry};
pub use hooks::{Hooks, LifecycleListener, PropertyDecision, PropertyEvent};
pub use matcher::{matches, Matcher, RuleFilter};
pub use pipeline::{FieldError, PipelineOutcome, PreparedEntity, PropertyPipeline};
