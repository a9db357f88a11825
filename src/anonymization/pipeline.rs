//! Property pipeline
//!
//! Turns one record into its minimal update set. Entities are prepared once
//! ([`PreparedEntity::prepare`]): rule sets are compiled, generators resolved
//! and validated, properties sorted by weight. Any configuration problem
//! surfaces there, before a single record is read.
//!
//! # Per-record flow
//!
//! 1. A custom anonymizer, when configured, takes the whole record.
//! 2. Otherwise properties run in weight order (unweighted last, ties by name).
//! 3. Each property is skipped when the record is entity-excluded (unless it
//!    bypasses entity exclusion) or when its own rules exclude it.
//! 4. `preserve_null` keeps null originals; `nullable` may replace the value
//!    with null; otherwise the generator runs.
//! 5. `before_property` hooks may override the value or skip the field.
//! 6. Only values that differ from the original (or come from a generator that
//!    forces writes) end up in the update set.

use super::custom::{AnonymizerRegistry, CustomAnonymizer};
use super::generators::{Generator, GeneratorContext, GeneratorRegistry};
use super::hooks::{Hooks, PropertyDecision};
use super::matcher::RuleFilter;
use crate::domain::{EntitySpec, Fields, PropertySpec, Record, Result, ShroudError, Value};
use rand::rngs::StdRng;
use rand::Rng;
use std::cmp::Ordering;
use std::sync::Arc;

/// Property with its resolved generator and compiled rules
pub struct PreparedProperty {
    spec: PropertySpec,
    generator: Arc<dyn Generator>,
    filter: RuleFilter,
}

impl PreparedProperty {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &PropertySpec {
        &self.spec
    }
}

/// Entity ready to be applied to records
pub struct PreparedEntity {
    spec: EntitySpec,
    filter: RuleFilter,
    properties: Vec<PreparedProperty>,
    anonymizer: Option<Arc<dyn CustomAnonymizer>>,
}

impl PreparedEntity {
    /// Validate and resolve an entity spec
    ///
    /// # Errors
    ///
    /// Returns [`ShroudError::Configuration`] for structural problems, malformed
    /// rule sets, unknown generator types, unregistered services or anonymizers,
    /// and generator options rejected by the generator itself.
    pub fn prepare(
        spec: &EntitySpec,
        generators: &GeneratorRegistry,
        anonymizers: &AnonymizerRegistry,
    ) -> Result<Self> {
        spec.validate().map_err(ShroudError::Configuration)?;
        let in_entity = |e: ShroudError| match e {
            ShroudError::Configuration(msg) => {
                ShroudError::Configuration(format!("entity '{}': {msg}", spec.name))
            }
            other => other,
        };

        let filter =
            RuleFilter::compile(&spec.include_patterns, &spec.exclude_patterns).map_err(in_entity)?;

        let anonymizer = spec
            .custom_anonymizer
            .as_deref()
            .map(|name| anonymizers.resolve(name))
            .transpose()
            .map_err(in_entity)?;

        let mut properties = Vec::with_capacity(spec.properties.len());
        for property in &spec.properties {
            let in_property = |e: ShroudError| match e {
                ShroudError::Configuration(msg) => ShroudError::Configuration(format!(
                    "entity '{}' property '{}': {msg}",
                    spec.name, property.name
                )),
                other => other,
            };
            let generator = generators
                .create(&property.generator_type, property.service_ref.as_deref())
                .map_err(in_property)?;
            generator.validate(&property.options).map_err(|e| {
                in_property(ShroudError::Configuration(format!("{e:#}")))
            })?;
            let filter = RuleFilter::compile(&property.include_patterns, &property.exclude_patterns)
                .map_err(in_property)?;
            properties.push(PreparedProperty {
                spec: property.clone(),
                generator,
                filter,
            });
        }
        properties.sort_by(|a, b| weight_order(&a.spec, &b.spec));

        Ok(Self {
            spec: spec.clone(),
            filter,
            properties,
            anonymizer,
        })
    }

    pub fn spec(&self) -> &EntitySpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Properties in processing order
    pub fn properties(&self) -> &[PreparedProperty] {
        &self.properties
    }

    pub fn has_custom_anonymizer(&self) -> bool {
        self.anonymizer.is_some()
    }

    /// Whether the record is excluded or not included at entity level
    pub fn is_excluded(&self, record: &Record) -> bool {
        !self.filter.is_included(record)
    }

    fn is_marked(&self, record: &Record) -> bool {
        self.spec
            .marker_field
            .as_deref()
            .map_or(false, |marker| record.value(marker).is_truthy())
    }
}

/// Weighted first by ascending weight, then unweighted; ties by name
fn weight_order(a: &PropertySpec, b: &PropertySpec) -> Ordering {
    let by_weight = match (a.weight, b.weight) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_weight.then_with(|| a.name.cmp(&b.name))
}

/// Error attached to one record's result
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    /// `None` when the custom anonymizer failed for the whole record
    pub property: Option<String>,
    pub message: String,
}

/// Result of applying an entity to one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutcome {
    /// Fields to write; empty means no write
    pub updates: Fields,
    /// Properties whose value changed, in processing order
    pub applied: Vec<String>,
    pub errors: Vec<FieldError>,
}

impl PipelineOutcome {
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Applies prepared entities to records
#[derive(Debug, Clone, Default)]
pub struct PropertyPipeline {
    hooks: Hooks,
    fail_fast: bool,
}

impl PropertyPipeline {
    pub fn new(hooks: Hooks, fail_fast: bool) -> Self {
        Self { hooks, fail_fast }
    }

    /// Compute the update set of one record
    ///
    /// # Errors
    ///
    /// Only with `fail_fast`: the first generator or custom anonymizer failure
    /// is returned instead of being recorded in the outcome.
    pub fn apply(
        &self,
        entity: &PreparedEntity,
        record: &Record,
        rng: &mut StdRng,
    ) -> Result<PipelineOutcome> {
        if entity.is_marked(record) {
            return Ok(PipelineOutcome::default());
        }

        let mut outcome = match &entity.anonymizer {
            Some(anonymizer) => self.custom(entity, anonymizer.as_ref(), record)?,
            None => self.properties(entity, record, rng)?,
        };
        mark(entity, &mut outcome);
        Ok(outcome)
    }

    /// Compute the update sets of a page of records, in input order
    ///
    /// Batch-capable custom anonymizers receive the page in one call.
    pub fn apply_batch(
        &self,
        entity: &PreparedEntity,
        records: &[Record],
        rng: &mut StdRng,
    ) -> Result<Vec<PipelineOutcome>> {
        let anonymizer = match &entity.anonymizer {
            Some(anonymizer) if anonymizer.supports_batch() => anonymizer,
            _ => {
                return records
                    .iter()
                    .map(|record| self.apply(entity, record, rng))
                    .collect();
            }
        };

        let mut outcomes = vec![PipelineOutcome::default(); records.len()];
        let (indices, pending): (Vec<usize>, Vec<Record>) = records
            .iter()
            .enumerate()
            .filter(|(_, record)| !entity.is_marked(record))
            .map(|(index, record)| (index, record.clone()))
            .unzip();

        match anonymizer.anonymize_batch(&pending) {
            Ok(mut results) => {
                for (position, index) in indices.into_iter().enumerate() {
                    if let Some(updates) = results.remove(&position) {
                        let outcome = &mut outcomes[index];
                        outcome.applied = updates.keys().cloned().collect();
                        outcome.updates = updates;
                        mark(entity, outcome);
                    }
                }
            }
            Err(e) => {
                let message = format!("{e:#}");
                if self.fail_fast {
                    return Err(ShroudError::CustomService(format!(
                        "entity '{}': {message}",
                        entity.name()
                    )));
                }
                for index in indices {
                    outcomes[index].errors.push(FieldError {
                        property: None,
                        message: message.clone(),
                    });
                }
            }
        }
        Ok(outcomes)
    }

    fn custom(
        &self,
        entity: &PreparedEntity,
        anonymizer: &dyn CustomAnonymizer,
        record: &Record,
    ) -> Result<PipelineOutcome> {
        match anonymizer.anonymize(record) {
            Ok(updates) => Ok(PipelineOutcome {
                applied: updates.keys().cloned().collect(),
                updates,
                errors: Vec::new(),
            }),
            Err(e) if self.fail_fast => Err(ShroudError::CustomService(format!(
                "entity '{}' record {}: {e:#}",
                entity.name(),
                record.key()
            ))),
            Err(e) => Ok(PipelineOutcome {
                errors: vec![FieldError {
                    property: None,
                    message: format!("{e:#}"),
                }],
                ..PipelineOutcome::default()
            }),
        }
    }

    fn properties(
        &self,
        entity: &PreparedEntity,
        record: &Record,
        rng: &mut StdRng,
    ) -> Result<PipelineOutcome> {
        let mut outcome = PipelineOutcome::default();
        let mut generated = Fields::new();
        let entity_excluded = entity.is_excluded(record);

        for property in &entity.properties {
            let options = &property.spec.options;
            if entity_excluded && !options.bypass_entity_exclusion() {
                continue;
            }
            if !property.filter.is_included(record) {
                continue;
            }

            let name = property.name();
            let original = record.value(name);
            if original.is_null()
                && options.preserve_null()
                && property.generator.honors_preserve_null(options, record)
            {
                continue;
            }

            let nulled = match options.null_probability() {
                Some(p) if p > 0 => rng.gen_range(0..100u8) < p,
                _ => false,
            };

            let computed = if nulled {
                Value::Null
            } else {
                let mut ctx = GeneratorContext {
                    property: name,
                    options,
                    original_value: original,
                    record,
                    generated: &generated,
                    rng: &mut *rng,
                };
                match property.generator.generate(&mut ctx) {
                    Ok(value) => value,
                    Err(e) if self.fail_fast => {
                        return Err(ShroudError::Generator(format!(
                            "entity '{}' record {} property '{name}': {e:#}",
                            entity.name(),
                            record.key()
                        )));
                    }
                    Err(e) => {
                        outcome.errors.push(FieldError {
                            property: Some(name.to_string()),
                            message: format!("{e:#}"),
                        });
                        continue;
                    }
                }
            };

            let computed = if self.hooks.is_empty() {
                computed
            } else {
                match self.hooks.before_property(
                    entity.name(),
                    record,
                    name,
                    original,
                    computed.clone(),
                ) {
                    PropertyDecision::Keep => computed,
                    PropertyDecision::Override(value) => value,
                    PropertyDecision::Skip => continue,
                }
            };

            let forced = !nulled && property.generator.forces_write();
            if computed != *original || forced {
                outcome.updates.insert(name.to_string(), computed.clone());
                outcome.applied.push(name.to_string());
            }
            generated.insert(name.to_string(), computed);
        }
        Ok(outcome)
    }
}

/// Set the marker column on records that are about to be written
fn mark(entity: &PreparedEntity, outcome: &mut PipelineOutcome) {
    if let Some(marker) = entity.spec.marker_field.as_deref() {
        if !outcome.updates.is_empty() {
            outcome.updates.insert(marker.to_string(), Value::Bool(true));
        }
    }
}
