//! Relational and derived generators
//!
//! These generators compute their value from the original value or from other
//! fields of the same record instead of faking one from scratch.

use super::technical::hex_digest;
use super::{original_text, Generator, GeneratorContext, GeneratorRegistry};
use crate::domain::{GeneratorType, Options, Record, Value};
use anyhow::{anyhow, bail, Context};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::Fake;
use rand::seq::SliceRandom;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub fn register(registry: &mut GeneratorRegistry) {
    registry.register(GeneratorType::PatternBased, Arc::new(PatternBasedGenerator::default()));
    registry.register(GeneratorType::NameFallback, Arc::new(NameFallbackGenerator));
    registry.register(GeneratorType::Copy, Arc::new(CopyGenerator));
    registry.register(GeneratorType::Shuffle, Arc::new(ShuffleGenerator));
    registry.register(GeneratorType::Enum, Arc::new(EnumGenerator));
    registry.register(GeneratorType::Map, Arc::new(MapGenerator));
    registry.register(GeneratorType::Constant, Arc::new(ConstantGenerator));
    registry.register(GeneratorType::Null, Arc::new(NullGenerator));
}

fn required_str<'a>(options: &'a Options, key: &str) -> anyhow::Result<&'a str> {
    options
        .str(key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow!("option '{key}' is required"))
}

/// Regex extraction from another field of the record
///
/// Options: `pattern` (required), `source_field` (defaults to the property
/// itself) and `replacement`. With a replacement every match in the source is
/// substituted (`$1` style references allowed); without one the first capture
/// group (or the whole match) is extracted. When nothing matches the original
/// value is kept.
#[derive(Default)]
struct PatternBasedGenerator {
    compiled: Mutex<HashMap<String, Regex>>,
}

impl PatternBasedGenerator {
    fn regex(&self, pattern: &str) -> anyhow::Result<Regex> {
        let mut cache = self
            .compiled
            .lock()
            .map_err(|_| anyhow!("pattern cache lock poisoned"))?;
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern).with_context(|| format!("invalid pattern '{pattern}'"))?;
        cache.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

impl Generator for PatternBasedGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let regex = self.regex(required_str(ctx.options, "pattern")?)?;
        let source_field = ctx.options.str("source_field").unwrap_or(ctx.property);
        let Some(source) = ctx.field_value(source_field).to_text() else {
            return Ok(ctx.original_value.clone());
        };

        if let Some(replacement) = ctx.options.str("replacement") {
            if !regex.is_match(&source) {
                return Ok(ctx.original_value.clone());
            }
            return Ok(Value::Text(regex.replace_all(&source, replacement).into_owned()));
        }

        let extracted = regex
            .captures(&source)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| m.as_str().to_string());
        Ok(extracted.map(Value::Text).unwrap_or_else(|| ctx.original_value.clone()))
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        self.regex(required_str(options, "pattern")?).map(|_| ())
    }
}

/// Fake name that is still produced for a null field when `fallback_field`
/// holds a value
///
/// `kind` selects `name` (default), `first_name` or `surname`.
struct NameFallbackGenerator;

impl Generator for NameFallbackGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let name: String = match ctx.options.str("kind").unwrap_or("name") {
            "first_name" => FirstName().fake_with_rng(ctx.rng),
            "surname" | "last_name" => LastName().fake_with_rng(ctx.rng),
            _ => Name().fake_with_rng(ctx.rng),
        };
        Ok(Value::Text(name))
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        required_str(options, "fallback_field")?;
        match options.str("kind").unwrap_or("name") {
            "name" | "first_name" | "surname" | "last_name" => Ok(()),
            other => bail!("name kind must be 'name', 'first_name' or 'surname', got '{other}'"),
        }
    }

    fn honors_preserve_null(&self, options: &Options, record: &Record) -> bool {
        options
            .str("fallback_field")
            .map_or(true, |field| record.value(field).is_null())
    }
}

/// Value of `source_field`, as generated earlier in this record or as read
struct CopyGenerator;

impl Generator for CopyGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let source = required_str(ctx.options, "source_field")?;
        Ok(ctx.field_value(source).clone())
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        required_str(options, "source_field").map(|_| ())
    }
}

/// Random pick from `values`, or a character permutation of the original
struct ShuffleGenerator;

impl Generator for ShuffleGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        if let Some(values) = ctx.options.values("values") {
            return values
                .choose(ctx.rng)
                .cloned()
                .ok_or_else(|| anyhow!("option 'values' must not be empty"));
        }
        let Some(original) = original_text(ctx) else {
            return Ok(Value::Null);
        };
        let mut chars: Vec<char> = original.chars().collect();
        chars.shuffle(ctx.rng);
        Ok(Value::Text(chars.into_iter().collect()))
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        match options.values("values") {
            Some(values) if values.is_empty() => bail!("option 'values' must not be empty"),
            _ => Ok(()),
        }
    }
}

/// Deterministic bucket of `values` chosen by hashing the original value
///
/// Null originals fall into the `default` bucket (null when unset).
struct EnumGenerator;

impl Generator for EnumGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let values = ctx
            .options
            .values("values")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("option 'values' must be a non-empty list"))?;
        let Some(original) = original_text(ctx) else {
            return Ok(ctx.options.value("default").unwrap_or(Value::Null));
        };
        let digest = hex_digest(original.as_bytes());
        let bucket = u64::from_str_radix(&digest[..16], 16)? % values.len() as u64;
        Ok(values[bucket as usize].clone())
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        match options.values("values") {
            Some(values) if !values.is_empty() => Ok(()),
            _ => bail!("option 'values' must be a non-empty list"),
        }
    }
}

/// Lookup of the original value in the `map` table
///
/// Unmapped values take `default` when set and are kept otherwise.
struct MapGenerator;

impl Generator for MapGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let table = ctx
            .options
            .table("map")
            .ok_or_else(|| anyhow!("option 'map' must be a table"))?;
        let mapped = original_text(ctx).and_then(|key| table.get(&key));
        Ok(match mapped {
            Some(value) => Value::from(value),
            None => ctx
                .options
                .value("default")
                .unwrap_or_else(|| ctx.original_value.clone()),
        })
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        options
            .table("map")
            .map(|_| ())
            .ok_or_else(|| anyhow!("option 'map' must be a table"))
    }
}

/// Fixed `value`
struct ConstantGenerator;

impl Generator for ConstantGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        ctx.options
            .value("value")
            .ok_or_else(|| anyhow!("option 'value' is required"))
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        if options.contains("value") {
            Ok(())
        } else {
            bail!("option 'value' is required")
        }
    }
}

/// Always null, written even when the field already is
struct NullGenerator;

impl Generator for NullGenerator {
    fn generate(&self, _ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }

    fn forces_write(&self) -> bool {
        true
    }
}
