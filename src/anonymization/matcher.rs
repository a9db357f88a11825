//! Rule set evaluation
//!
//! A [`RuleSet`] is compiled once into a [`Matcher`] and then evaluated against
//! every record of an entity. Compilation is where malformed patterns surface,
//! so a bad rule aborts the run before any store access.
//!
//! # Pattern language
//!
//! Each alternative of a field pattern is one of:
//!
//! - a comparison: `<=100`, `>=2024-01-01`, `<5`, `>5`, `=42`, `!=archived`, `<>archived`
//!   (numeric when both sides parse as numbers, lexicographic otherwise)
//! - a `LIKE`-style wildcard: `%@visitor.com`, `admin%`, `%test%`
//! - a null test: `NULL`, `IS NULL`, `IS NOT NULL`
//! - anything else is an equality test
//!
//! A `null` column value never satisfies a comparison, wildcard or equality.

use crate::domain::{Record, Result, RuleSet, ShroudError, Value};
use std::cmp::Ordering;

/// Compiled rule set
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    configs: Vec<CompiledConfig>,
}

#[derive(Debug, Clone)]
struct CompiledConfig {
    fields: Vec<(String, Vec<Alternative>)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
enum Alternative {
    IsNull,
    IsNotNull,
    Compare(Operator, String),
    Like(LikePattern),
}

#[derive(Debug, Clone, PartialEq)]
struct LikePattern {
    segments: Vec<String>,
}

impl Matcher {
    /// Compile a rule set
    ///
    /// # Errors
    ///
    /// Returns [`ShroudError::Configuration`] for an empty alternative (`"a||b"`),
    /// an operator without operand (`"<="`) or an empty pattern list.
    pub fn compile(rules: &RuleSet) -> Result<Self> {
        let mut configs = Vec::with_capacity(rules.configs().len());
        for config in rules.configs() {
            let mut fields = Vec::new();
            for (field, pattern) in config.conditions() {
                let raw = pattern.alternatives();
                if raw.is_empty() {
                    return Err(ShroudError::Configuration(format!(
                        "pattern for field '{field}' has no alternatives"
                    )));
                }
                let alternatives = raw
                    .into_iter()
                    .map(|alt| parse_alternative(field, alt))
                    .collect::<Result<Vec<_>>>()?;
                fields.push((field.clone(), alternatives));
            }
            configs.push(CompiledConfig { fields });
        }
        Ok(Self { configs })
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// OR across configs, AND across fields, OR across alternatives
    ///
    /// An empty matcher matches every record.
    pub fn matches(&self, record: &Record) -> bool {
        if self.configs.is_empty() {
            return true;
        }
        self.configs.iter().any(|config| {
            config.fields.iter().all(|(field, alternatives)| {
                let value = record.value(field);
                alternatives.iter().any(|alt| alt.matches(value))
            })
        })
    }
}

/// One-shot evaluation of an uncompiled rule set
pub fn matches(rules: &RuleSet, record: &Record) -> Result<bool> {
    Ok(Matcher::compile(rules)?.matches(record))
}

/// Include/exclude pair of an entity or property
///
/// Exclusion is evaluated first and always wins over inclusion. An empty
/// exclude set excludes nothing; an empty include set includes everything.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    include: Matcher,
    exclude: Matcher,
}

impl RuleFilter {
    pub fn compile(include: &RuleSet, exclude: &RuleSet) -> Result<Self> {
        Ok(Self {
            include: Matcher::compile(include)?,
            exclude: Matcher::compile(exclude)?,
        })
    }

    pub fn is_excluded(&self, record: &Record) -> bool {
        !self.exclude.is_empty() && self.exclude.matches(record)
    }

    pub fn is_included(&self, record: &Record) -> bool {
        !self.is_excluded(record) && self.include.matches(record)
    }
}

fn parse_alternative(field: &str, raw: &str) -> Result<Alternative> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ShroudError::Configuration(format!(
            "empty alternative in pattern for field '{field}'"
        )));
    }

    let upper = trimmed.to_ascii_uppercase();
    if upper == "NULL" || upper == "IS NULL" {
        return Ok(Alternative::IsNull);
    }
    if upper == "IS NOT NULL" {
        return Ok(Alternative::IsNotNull);
    }

    // Two-character operators first so "<=" is not read as "<" + "=..."
    const OPERATORS: [(&str, Operator); 7] = [
        ("<=", Operator::Le),
        (">=", Operator::Ge),
        ("!=", Operator::Ne),
        ("<>", Operator::Ne),
        ("<", Operator::Lt),
        (">", Operator::Gt),
        ("=", Operator::Eq),
    ];
    for (prefix, op) in OPERATORS {
        if let Some(operand) = trimmed.strip_prefix(prefix) {
            let operand = operand.trim();
            if operand.is_empty() {
                return Err(ShroudError::Configuration(format!(
                    "operator '{prefix}' without operand in pattern for field '{field}'"
                )));
            }
            return Ok(Alternative::Compare(op, operand.to_string()));
        }
    }

    if trimmed.contains('%') {
        return Ok(Alternative::Like(LikePattern {
            segments: trimmed.split('%').map(str::to_string).collect(),
        }));
    }

    Ok(Alternative::Compare(Operator::Eq, trimmed.to_string()))
}

impl Alternative {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Alternative::IsNull => value.is_null(),
            Alternative::IsNotNull => !value.is_null(),
            _ if value.is_null() => false,
            Alternative::Compare(op, operand) => match compare(value, operand) {
                Some(ordering) => op.accepts(ordering),
                None => false,
            },
            Alternative::Like(pattern) => value
                .to_text()
                .map(|text| pattern.matches(&text))
                .unwrap_or(false),
        }
    }
}

impl Operator {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
        }
    }
}

/// Order `value` against `operand`, numerically when both sides are numbers
///
/// Integers compare exactly; floats are only used when either side is fractional.
fn compare(value: &Value, operand: &str) -> Option<Ordering> {
    if let (Some(left), Ok(right)) = (integer_view(value), operand.trim().parse::<i64>()) {
        return Some(left.cmp(&right));
    }
    if let (Some(left), Ok(right)) = (numeric_view(value), operand.parse::<f64>()) {
        return left.partial_cmp(&right);
    }
    if let Value::Bool(b) = value {
        let parsed = match operand.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        };
        if let Some(expected) = parsed {
            return Some(b.cmp(&expected));
        }
    }
    value.to_text().map(|text| text.as_str().cmp(operand))
}

fn integer_view(value: &Value) -> Option<i64> {
    match value {
        Value::Int(_) | Value::Text(_) => value.as_i64(),
        _ => None,
    }
}

fn numeric_view(value: &Value) -> Option<f64> {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Text(_) => value.as_f64(),
        _ => None,
    }
}

impl LikePattern {
    fn matches(&self, text: &str) -> bool {
        let last = self.segments.len() - 1;
        let mut pos = 0;
        for (i, segment) in self.segments.iter().enumerate() {
            if segment.is_empty() {
                continue;
            }
            let rest = &text[pos..];
            if i == 0 {
                if !rest.starts_with(segment.as_str()) {
                    return false;
                }
                pos += segment.len();
            } else if i == last {
                return rest.ends_with(segment.as_str());
            } else {
                match rest.find(segment.as_str()) {
                    Some(idx) => pos += idx + segment.len(),
                    None => return false,
                }
            }
        }
        true
    }
}
