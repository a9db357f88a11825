//! Financial fakers and masking

use super::{original_text, Generator, GeneratorContext, GeneratorRegistry};
use crate::domain::{GeneratorType, Options, Value};
use anyhow::{anyhow, bail};
use rand::Rng;
use std::sync::Arc;

pub fn register(registry: &mut GeneratorRegistry) {
    registry.register(GeneratorType::Iban, Arc::new(IbanGenerator));
    registry.register(GeneratorType::CreditCard, Arc::new(CreditCardGenerator));
    registry.register(GeneratorType::Masking, Arc::new(MaskingGenerator));
}

/// BBAN layout per country: `A` is an uppercase letter, `9` a digit
const IBAN_LAYOUTS: &[(&str, &str)] = &[
    ("AT", "9999999999999999"),
    ("BE", "999999999999"),
    ("CH", "99999999999999999"),
    ("DE", "999999999999999999"),
    ("ES", "99999999999999999999"),
    ("FR", "99999999999999999999999"),
    ("GB", "AAAA99999999999999"),
    ("IT", "A9999999999999999999999"),
    ("NL", "AAAA9999999999"),
    ("PL", "999999999999999999999999"),
];

/// Syntactically valid IBAN for `country` (default `DE`)
struct IbanGenerator;

impl IbanGenerator {
    fn layout(options: &Options) -> anyhow::Result<(String, &'static str)> {
        let country = options
            .str("country")
            .unwrap_or("DE")
            .to_ascii_uppercase();
        let layout = IBAN_LAYOUTS
            .iter()
            .find(|(code, _)| *code == country)
            .map(|(_, layout)| *layout)
            .ok_or_else(|| anyhow!("unsupported IBAN country '{country}'"))?;
        Ok((country, layout))
    }
}

impl Generator for IbanGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let (country, layout) = Self::layout(ctx.options)?;
        let bban: String = layout
            .chars()
            .map(|slot| match slot {
                'A' => char::from(b'A' + ctx.rng.gen_range(0..26)),
                _ => char::from(b'0' + ctx.rng.gen_range(0..10)),
            })
            .collect();
        let check = iban_check_digits(&country, &bban);
        Ok(Value::Text(format!("{country}{check:02}{bban}")))
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        Self::layout(options).map(|_| ())
    }
}

/// ISO 7064 mod 97-10 check digits
fn iban_check_digits(country: &str, bban: &str) -> u32 {
    let rearranged = format!("{bban}{country}00");
    let remainder = rearranged.chars().fold(0u32, |acc, c| {
        let value = c.to_digit(36).unwrap_or(0);
        if value >= 10 {
            (acc * 100 + value) % 97
        } else {
            (acc * 10 + value) % 97
        }
    });
    98 - remainder
}

/// Luhn-valid card number for `brand` (`visa` default, `mastercard`, `amex`)
struct CreditCardGenerator;

impl CreditCardGenerator {
    fn layout(options: &Options) -> anyhow::Result<(&'static [&'static str], usize)> {
        match options.str("brand").unwrap_or("visa").to_ascii_lowercase().as_str() {
            "visa" => Ok((&["4"], 16)),
            "mastercard" => Ok((&["51", "52", "53", "54", "55"], 16)),
            "amex" => Ok((&["34", "37"], 15)),
            other => bail!("unsupported card brand '{other}'"),
        }
    }
}

impl Generator for CreditCardGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let (prefixes, length) = Self::layout(ctx.options)?;
        let prefix = prefixes[ctx.rng.gen_range(0..prefixes.len())];
        let mut digits: Vec<u32> = prefix.chars().filter_map(|c| c.to_digit(10)).collect();
        while digits.len() < length - 1 {
            digits.push(ctx.rng.gen_range(0..10));
        }
        digits.push(luhn_check_digit(&digits));
        Ok(Value::Text(
            digits
                .iter()
                .filter_map(|d| char::from_digit(*d, 10))
                .collect(),
        ))
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        Self::layout(options).map(|_| ())
    }
}

fn luhn_check_digit(payload: &[u32]) -> u32 {
    let sum: u32 = payload
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    (10 - sum % 10) % 10
}

/// Mask the original value, keeping `preserve_start` leading and
/// `preserve_end` trailing characters
///
/// Values too short to keep both ends are masked entirely. Null stays null.
struct MaskingGenerator;

impl Generator for MaskingGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let Some(original) = original_text(ctx) else {
            return Ok(Value::Null);
        };
        let start = ctx.options.usize("preserve_start").unwrap_or(0);
        let end = ctx.options.usize("preserve_end").unwrap_or(0);
        let mask = ctx.options.char("mask_char").unwrap_or('*');
        Ok(Value::Text(mask_text(&original, start, end, mask)))
    }
}

pub(crate) fn mask_text(original: &str, start: usize, end: usize, mask: char) -> String {
    let chars: Vec<char> = original.chars().collect();
    if chars.len() <= start + end {
        return std::iter::repeat(mask).take(chars.len()).collect();
    }
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if i < start || i >= chars.len() - end {
                c
            } else {
                mask
            }
        })
        .collect()
}
