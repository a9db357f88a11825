//! Declarative anonymization specs
//!
//! An [`EntitySpec`] describes one anonymizable record source and its
//! [`PropertySpec`]s. Specs are plain values loaded once at startup (usually
//! from the `[[entities]]` tables of the configuration file).

use super::options::Options;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One field's pattern: a single string (split on `|`) or a list of alternatives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPattern", into = "RawPattern")]
pub enum PatternExpr {
    /// `"archived|deleted"`
    Single(String),
    /// `["archived", "deleted"]`, elements taken verbatim
    Any(Vec<String>),
}

impl PatternExpr {
    /// Alternatives evaluated with OR
    pub fn alternatives(&self) -> Vec<&str> {
        match self {
            PatternExpr::Single(s) => s.split('|').collect(),
            PatternExpr::Any(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for PatternExpr {
    fn from(s: &str) -> Self {
        PatternExpr::Single(s.to_string())
    }
}

impl From<Vec<&str>> for PatternExpr {
    fn from(items: Vec<&str>) -> Self {
        PatternExpr::Any(items.into_iter().map(str::to_string).collect())
    }
}

/// Accepts scalars of any TOML/JSON type so `id = 5` works as well as `id = "5"`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawPattern {
    List(Vec<RawScalar>),
    Scalar(RawScalar),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl RawScalar {
    fn into_string(self) -> String {
        match self {
            RawScalar::Text(s) => s,
            RawScalar::Int(i) => i.to_string(),
            RawScalar::Float(f) => f.to_string(),
            RawScalar::Bool(b) => b.to_string(),
        }
    }
}

impl From<RawPattern> for PatternExpr {
    fn from(raw: RawPattern) -> Self {
        match raw {
            RawPattern::Scalar(s) => PatternExpr::Single(s.into_string()),
            RawPattern::List(items) => {
                PatternExpr::Any(items.into_iter().map(RawScalar::into_string).collect())
            }
        }
    }
}

impl From<PatternExpr> for RawPattern {
    fn from(expr: PatternExpr) -> Self {
        match expr {
            PatternExpr::Single(s) => RawPattern::Scalar(RawScalar::Text(s)),
            PatternExpr::Any(items) => {
                RawPattern::List(items.into_iter().map(RawScalar::Text).collect())
            }
        }
    }
}

/// Field → pattern conditions, combined with AND
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleConfig(BTreeMap<String, PatternExpr>);

impl RuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style condition
    pub fn field(mut self, name: &str, pattern: impl Into<PatternExpr>) -> Self {
        self.0.insert(name.to_string(), pattern.into());
        self
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&String, &PatternExpr)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Rule configs combined with OR; empty means "no rule"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet(Vec<RuleConfig>);

impl RuleSet {
    pub fn new(configs: Vec<RuleConfig>) -> Self {
        Self(configs)
    }

    pub fn configs(&self) -> &[RuleConfig] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<RuleConfig> for RuleSet {
    fn from(config: RuleConfig) -> Self {
        Self(vec![config])
    }
}

/// Generator type key
///
/// Built-in generators have typed variants; anything else is looked up by name
/// in the registry's custom generators. Every variant normalizes to one string
/// key, so `GeneratorType::Email` and `"email"` are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GeneratorType {
    Name,
    FirstName,
    Surname,
    Username,
    Email,
    Phone,
    Address,
    Company,
    Url,
    Country,
    Language,
    Age,
    Number,
    Date,
    Json,
    Text,
    Html,
    Uuid,
    IpAddress,
    MacAddress,
    Color,
    Coordinate,
    Hash,
    HashPreserve,
    Iban,
    CreditCard,
    Masking,
    PatternBased,
    NameFallback,
    Copy,
    Shuffle,
    Enum,
    Map,
    Constant,
    Null,
    Service,
    Custom(String),
}

impl GeneratorType {
    /// Every built-in variant
    pub const BUILTIN: &'static [GeneratorType] = &[
        GeneratorType::Name,
        GeneratorType::FirstName,
        GeneratorType::Surname,
        GeneratorType::Username,
        GeneratorType::Email,
        GeneratorType::Phone,
        GeneratorType::Address,
        GeneratorType::Company,
        GeneratorType::Url,
        GeneratorType::Country,
        GeneratorType::Language,
        GeneratorType::Age,
        GeneratorType::Number,
        GeneratorType::Date,
        GeneratorType::Json,
        GeneratorType::Text,
        GeneratorType::Html,
        GeneratorType::Uuid,
        GeneratorType::IpAddress,
        GeneratorType::MacAddress,
        GeneratorType::Color,
        GeneratorType::Coordinate,
        GeneratorType::Hash,
        GeneratorType::HashPreserve,
        GeneratorType::Iban,
        GeneratorType::CreditCard,
        GeneratorType::Masking,
        GeneratorType::PatternBased,
        GeneratorType::NameFallback,
        GeneratorType::Copy,
        GeneratorType::Shuffle,
        GeneratorType::Enum,
        GeneratorType::Map,
        GeneratorType::Constant,
        GeneratorType::Null,
        GeneratorType::Service,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            GeneratorType::Name => "name",
            GeneratorType::FirstName => "first_name",
            GeneratorType::Surname => "surname",
            GeneratorType::Username => "username",
            GeneratorType::Email => "email",
            GeneratorType::Phone => "phone",
            GeneratorType::Address => "address",
            GeneratorType::Company => "company",
            GeneratorType::Url => "url",
            GeneratorType::Country => "country",
            GeneratorType::Language => "language",
            GeneratorType::Age => "age",
            GeneratorType::Number => "numeric",
            GeneratorType::Date => "date",
            GeneratorType::Json => "json",
            GeneratorType::Text => "text",
            GeneratorType::Html => "html",
            GeneratorType::Uuid => "uuid",
            GeneratorType::IpAddress => "ip_address",
            GeneratorType::MacAddress => "mac_address",
            GeneratorType::Color => "color",
            GeneratorType::Coordinate => "coordinate",
            GeneratorType::Hash => "hash",
            GeneratorType::HashPreserve => "hash_preserve",
            GeneratorType::Iban => "iban",
            GeneratorType::CreditCard => "credit_card",
            GeneratorType::Masking => "masking",
            GeneratorType::PatternBased => "pattern_based",
            GeneratorType::NameFallback => "name_fallback",
            GeneratorType::Copy => "copy",
            GeneratorType::Shuffle => "shuffle",
            GeneratorType::Enum => "enum",
            GeneratorType::Map => "map",
            GeneratorType::Constant => "constant",
            GeneratorType::Null => "null",
            GeneratorType::Service => "service",
            GeneratorType::Custom(name) => name.as_str(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, GeneratorType::Custom(_))
    }
}

impl From<&str> for GeneratorType {
    fn from(key: &str) -> Self {
        let normalized = key.trim().to_ascii_lowercase().replace('-', "_");
        let alias = match normalized.as_str() {
            "last_name" | "lastname" => "surname",
            "firstname" => "first_name",
            "number" => "numeric",
            "ip" => "ip_address",
            "mac" => "mac_address",
            "creditcard" => "credit_card",
            "mask" => "masking",
            "pattern" => "pattern_based",
            "constant_value" => "constant",
            other => other,
        };
        GeneratorType::BUILTIN
            .iter()
            .find(|t| t.as_str() == alias)
            .cloned()
            .unwrap_or_else(|| GeneratorType::Custom(key.trim().to_string()))
    }
}

impl From<String> for GeneratorType {
    fn from(key: String) -> Self {
        GeneratorType::from(key.as_str())
    }
}

impl From<GeneratorType> for String {
    fn from(t: GeneratorType) -> Self {
        t.as_str().to_string()
    }
}

impl FromStr for GeneratorType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(GeneratorType::from(s))
    }
}

impl fmt::Display for GeneratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One field's anonymization rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    /// Column name
    pub name: String,

    /// Registry key of the generator
    #[serde(rename = "generator", alias = "type")]
    pub generator_type: GeneratorType,

    /// Processing order; unweighted properties run last
    #[serde(default)]
    pub weight: Option<i64>,

    #[serde(default, rename = "include", alias = "include_patterns")]
    pub include_patterns: RuleSet,

    #[serde(default, rename = "exclude", alias = "exclude_patterns")]
    pub exclude_patterns: RuleSet,

    /// Named custom generator, required for `service`
    #[serde(default, rename = "service", alias = "service_ref")]
    pub service_ref: Option<String>,

    #[serde(default)]
    pub options: Options,
}

impl PropertySpec {
    pub fn new(name: &str, generator_type: impl Into<GeneratorType>) -> Self {
        Self {
            name: name.to_string(),
            generator_type: generator_type.into(),
            weight: None,
            include_patterns: RuleSet::default(),
            exclude_patterns: RuleSet::default(),
            service_ref: None,
            options: Options::default(),
        }
    }

    pub fn weight(mut self, weight: i64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key, value);
        self
    }

    pub fn include(mut self, rules: impl Into<RuleSet>) -> Self {
        self.include_patterns = rules.into();
        self
    }

    pub fn exclude(mut self, rules: impl Into<RuleSet>) -> Self {
        self.exclude_patterns = rules.into();
        self
    }

    pub fn service(mut self, service_ref: &str) -> Self {
        self.service_ref = Some(service_ref.to_string());
        self
    }

    /// Structural checks that need no registry
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("property name cannot be empty".to_string());
        }
        if let Some(p) = self.options.i64(super::options::NULL_PROBABILITY) {
            if !(0..=100).contains(&p) {
                return Err(format!(
                    "property '{}': null_probability must be between 0 and 100, got {p}",
                    self.name
                ));
            }
        }
        if self.generator_type == GeneratorType::Service
            && self.service_ref.as_deref().map_or(true, |s| s.trim().is_empty())
        {
            return Err(format!(
                "property '{}': generator 'service' requires a service reference",
                self.name
            ));
        }
        Ok(())
    }
}

/// One anonymizable record source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    /// Entity identifier used in reports and ordering tie-breaks
    pub name: String,

    /// Backing table; defaults to `name`
    #[serde(default)]
    pub table: Option<String>,

    /// Key columns identifying a row
    #[serde(default = "default_primary_key")]
    pub primary_key: Vec<String>,

    /// Connection this entity lives on; `None` means every connection
    #[serde(default, rename = "connection", alias = "connection_id")]
    pub connection_id: Option<String>,

    #[serde(default, rename = "include", alias = "include_patterns")]
    pub include_patterns: RuleSet,

    #[serde(default, rename = "exclude", alias = "exclude_patterns")]
    pub exclude_patterns: RuleSet,

    /// Named custom anonymizer that handles whole records
    #[serde(default)]
    pub custom_anonymizer: Option<String>,

    #[serde(default)]
    pub truncate: bool,

    #[serde(default)]
    pub truncate_order: Option<i64>,

    /// Discriminator value restricting truncation and processing
    #[serde(default)]
    pub discriminator: Option<String>,

    #[serde(default = "default_discriminator_column")]
    pub discriminator_column: String,

    /// Column flagging rows that were already anonymized
    #[serde(default)]
    pub marker_field: Option<String>,

    #[serde(default)]
    pub properties: Vec<PropertySpec>,
}

fn default_primary_key() -> Vec<String> {
    vec!["id".to_string()]
}

fn default_discriminator_column() -> String {
    "dtype".to_string()
}

impl EntitySpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            primary_key: default_primary_key(),
            connection_id: None,
            include_patterns: RuleSet::default(),
            exclude_patterns: RuleSet::default(),
            custom_anonymizer: None,
            truncate: false,
            truncate_order: None,
            discriminator: None,
            discriminator_column: default_discriminator_column(),
            marker_field: None,
            properties: Vec::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    /// Whether this entity runs on `connection`
    pub fn applies_to(&self, connection: &str) -> bool {
        self.connection_id
            .as_deref()
            .map_or(true, |id| id == connection)
    }

    pub fn property(mut self, property: PropertySpec) -> Self {
        self.properties.push(property);
        self
    }

    pub fn include(mut self, rules: impl Into<RuleSet>) -> Self {
        self.include_patterns = rules.into();
        self
    }

    pub fn exclude(mut self, rules: impl Into<RuleSet>) -> Self {
        self.exclude_patterns = rules.into();
        self
    }

    pub fn connection(mut self, connection: &str) -> Self {
        self.connection_id = Some(connection.to_string());
        self
    }

    pub fn truncated(mut self, order: Option<i64>) -> Self {
        self.truncate = true;
        self.truncate_order = order;
        self
    }

    pub fn discriminated(mut self, column: &str, value: &str) -> Self {
        self.discriminator_column = column.to_string();
        self.discriminator = Some(value.to_string());
        self
    }

    pub fn anonymizer(mut self, name: &str) -> Self {
        self.custom_anonymizer = Some(name.to_string());
        self
    }

    pub fn marker(mut self, column: &str) -> Self {
        self.marker_field = Some(column.to_string());
        self
    }

    /// Structural checks that need no registry
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("entity name cannot be empty".to_string());
        }
        if self.primary_key.is_empty() {
            return Err(format!("entity '{}': primary_key cannot be empty", self.name));
        }
        let mut seen = std::collections::HashSet::new();
        for property in &self.properties {
            property
                .validate()
                .map_err(|e| format!("entity '{}': {e}", self.name))?;
            if !seen.insert(property.name.as_str()) {
                return Err(format!(
                    "entity '{}': property '{}' is declared twice",
                    self.name, property.name
                ));
            }
            // Paging relies on key and discriminator columns staying fixed
            if self.primary_key.contains(&property.name) {
                return Err(format!(
                    "entity '{}': property '{}' is a primary key column",
                    self.name, property.name
                ));
            }
            if self.discriminator.is_some() && property.name == self.discriminator_column {
                return Err(format!(
                    "entity '{}': property '{}' is the discriminator column",
                    self.name, property.name
                ));
            }
        }
        Ok(())
    }
}
