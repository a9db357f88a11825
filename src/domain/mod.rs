//! Domain models and types for Shroud.
//!
//! This module contains the value model shared by every layer:
//!
//! - **Values and records** ([`Value`], [`Record`], [`RecordKey`])
//! - **Declarative specs** ([`EntitySpec`], [`PropertySpec`], [`RuleSet`])
//! - **Error types** ([`ShroudError`], [`StoreError`])
//! - **Result type alias** ([`Result`])
//!
//! # Building specs in code
//!
//! ```rust
//! use shroud::domain::{EntitySpec, PropertySpec, RuleConfig};
//!
//! let users = EntitySpec::new("users")
//!     .exclude(RuleConfig::new().field("id", "<=5"))
//!     .property(PropertySpec::new("email", "email").weight(1));
//!
//! assert!(users.validate().is_ok());
//! ```

pub mod errors;
pub mod options;
pub mod record;
pub mod result;
pub mod spec;
pub mod value;

pub use errors::{ShroudError, StoreError};
pub use options::Options;
pub use record::{Fields, Record, RecordKey};
pub use result::Result;
pub use spec::{EntitySpec, GeneratorType, PatternExpr, PropertySpec, RuleConfig, RuleSet};
pub use value::Value;
