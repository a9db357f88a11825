//! Numeric and date fakers

use super::{Generator, GeneratorContext, GeneratorRegistry};
use crate::domain::{GeneratorType, Options, Value};
use anyhow::{anyhow, bail};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt::Write;
use rand::Rng;
use std::sync::Arc;

pub fn register(registry: &mut GeneratorRegistry) {
    registry.register(GeneratorType::Age, Arc::new(NumberGenerator::new(18, 90)));
    registry.register(GeneratorType::Number, Arc::new(NumberGenerator::new(0, 1000)));
    registry.register(GeneratorType::Date, Arc::new(DateGenerator));
}

/// Integer in `[min, max]`, or a float when `decimals` is set
struct NumberGenerator {
    default_min: i64,
    default_max: i64,
}

impl NumberGenerator {
    fn new(default_min: i64, default_max: i64) -> Self {
        Self {
            default_min,
            default_max,
        }
    }

    fn bounds(&self, options: &Options) -> anyhow::Result<(i64, i64)> {
        let min = options.i64("min").unwrap_or(self.default_min);
        let max = options.i64("max").unwrap_or(self.default_max);
        if min > max {
            bail!("min ({min}) must be <= max ({max})");
        }
        Ok((min, max))
    }
}

impl Generator for NumberGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let (min, max) = self.bounds(ctx.options)?;
        match ctx.options.usize("decimals") {
            Some(decimals) if decimals > 0 => {
                let raw = ctx.rng.gen_range(min as f64..=max as f64);
                let factor = 10f64.powi(decimals.min(10) as i32);
                Ok(Value::Float((raw * factor).round() / factor))
            }
            _ => Ok(Value::Int(ctx.rng.gen_range(min..=max))),
        }
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        self.bounds(options).map(|_| ())
    }
}

/// Random date in the past or future
///
/// Options: `type` (`past` | `future`, default `past`), `min_date`, `max_date`
/// (`YYYY-MM-DD`) and `format` (chrono format string; output becomes text).
/// Without `format`, a timestamp original yields a timestamp.
struct DateGenerator;

const DEFAULT_PAST_YEARS: i64 = 30;
const DEFAULT_FUTURE_YEARS: i64 = 10;

impl DateGenerator {
    fn range(options: &Options) -> anyhow::Result<(NaiveDate, NaiveDate)> {
        let today = Utc::now().date_naive();
        let future = match options.str("type").unwrap_or("past") {
            "past" => false,
            "future" => true,
            other => bail!("date type must be 'past' or 'future', got '{other}'"),
        };

        let parse = |key: &str| -> anyhow::Result<Option<NaiveDate>> {
            options
                .str(key)
                .map(|raw| {
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .map_err(|e| anyhow!("{key} '{raw}' is not a YYYY-MM-DD date: {e}"))
                })
                .transpose()
        };

        let (default_min, default_max) = if future {
            (today, today + Duration::days(365 * DEFAULT_FUTURE_YEARS))
        } else {
            (today - Duration::days(365 * DEFAULT_PAST_YEARS), today)
        };
        let min = parse("min_date")?.unwrap_or(default_min);
        let max = parse("max_date")?.unwrap_or(default_max);
        if min > max {
            bail!("min_date ({min}) must not be after max_date ({max})");
        }
        Ok((min, max))
    }
}

impl Generator for DateGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let (min, max) = Self::range(ctx.options)?;
        let span = (max - min).num_days();
        let date = min + Duration::days(ctx.rng.gen_range(0..=span));

        if let Some(format) = ctx.options.str("format") {
            let seconds = ctx.rng.gen_range(0..86_400);
            let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
                .unwrap_or_default();
            return format_date(date.and_time(time), format).map(Value::Text);
        }

        match ctx.original_value {
            Value::DateTime(_) => {
                let seconds = ctx.rng.gen_range(0..86_400);
                let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
                    .unwrap_or_default();
                Ok(Value::DateTime(date.and_time(time)))
            }
            _ => Ok(Value::Date(date)),
        }
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        Self::range(options)?;
        if let Some(format) = options.str("format") {
            format_date(NaiveDateTime::default(), format)?;
        }
        Ok(())
    }
}

/// Format through `write!` so an invalid format string surfaces as an error
fn format_date(value: NaiveDateTime, format: &str) -> anyhow::Result<String> {
    let mut out = String::new();
    write!(out, "{}", value.format(format))
        .map_err(|_| anyhow!("invalid date format '{format}'"))?;
    Ok(out)
}
