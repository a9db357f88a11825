//! Technical fakers: identifiers, network addresses, colors, coordinates, hashes

use super::{original_text, Generator, GeneratorContext, GeneratorRegistry};
use crate::domain::{GeneratorType, Options, Value};
use anyhow::bail;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

pub fn register(registry: &mut GeneratorRegistry) {
    registry.register(GeneratorType::Uuid, Arc::new(UuidGenerator));
    registry.register(GeneratorType::IpAddress, Arc::new(IpAddressGenerator));
    registry.register(GeneratorType::MacAddress, Arc::new(MacAddressGenerator));
    registry.register(GeneratorType::Color, Arc::new(ColorGenerator));
    registry.register(GeneratorType::Coordinate, Arc::new(CoordinateGenerator));
    registry.register(GeneratorType::Hash, Arc::new(HashGenerator));
    registry.register(GeneratorType::HashPreserve, Arc::new(HashPreserveGenerator));
}

struct UuidGenerator;

impl Generator for UuidGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let bytes: [u8; 16] = ctx.rng.gen();
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        Ok(Value::Text(uuid.to_string()))
    }
}

/// IPv4 by default, IPv6 with `version = 6`
struct IpAddressGenerator;

impl Generator for IpAddressGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let address = match ctx.options.i64("version").unwrap_or(4) {
            4 => Ipv4Addr::from(ctx.rng.gen::<u32>()).to_string(),
            6 => Ipv6Addr::from(ctx.rng.gen::<u128>()).to_string(),
            other => bail!("ip version must be 4 or 6, got {other}"),
        };
        Ok(Value::Text(address))
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        match options.i64("version").unwrap_or(4) {
            4 | 6 => Ok(()),
            other => bail!("ip version must be 4 or 6, got {other}"),
        }
    }
}

struct MacAddressGenerator;

impl Generator for MacAddressGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let mut bytes: [u8; 6] = ctx.rng.gen();
        // Locally administered, unicast
        bytes[0] = (bytes[0] | 0b10) & !0b1;
        let mac = bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":");
        Ok(Value::Text(mac))
    }
}

/// `#rrggbb`, or `rgb(r, g, b)` with `format = "rgb"`
struct ColorGenerator;

impl Generator for ColorGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let [r, g, b]: [u8; 3] = ctx.rng.gen();
        let color = match ctx.options.str("format").unwrap_or("hex") {
            "rgb" => format!("rgb({r}, {g}, {b})"),
            _ => format!("#{r:02x}{g:02x}{b:02x}"),
        };
        Ok(Value::Text(color))
    }
}

/// `lat,lng` text, or a single float with `axis = "latitude" | "longitude"`
struct CoordinateGenerator;

impl Generator for CoordinateGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let round = |x: f64| (x * 1_000_000.0).round() / 1_000_000.0;
        let latitude = round(ctx.rng.gen_range(-90.0..=90.0));
        let longitude = round(ctx.rng.gen_range(-180.0..=180.0));
        match ctx.options.str("axis") {
            Some("latitude" | "lat") => Ok(Value::Float(latitude)),
            Some("longitude" | "lng" | "lon") => Ok(Value::Float(longitude)),
            Some(other) => bail!("coordinate axis must be 'latitude' or 'longitude', got '{other}'"),
            None => Ok(Value::Text(format!("{latitude},{longitude}"))),
        }
    }
}

/// SHA-256 hex digest of random bytes
struct HashGenerator;

impl Generator for HashGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let seed: [u8; 32] = ctx.rng.gen();
        Ok(Value::Text(truncate(hex_digest(&seed), ctx.options)))
    }
}

/// Deterministic SHA-256 of the original value
///
/// Equal inputs map to equal outputs across records and runs, which keeps
/// join keys joinable. `salt` is prepended to the input; null stays null.
struct HashPreserveGenerator;

impl Generator for HashPreserveGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let Some(original) = original_text(ctx) else {
            return Ok(Value::Null);
        };
        let salt = ctx.options.str("salt").unwrap_or_default();
        let digest = hex_digest(format!("{salt}{original}").as_bytes());
        Ok(Value::Text(truncate(digest, ctx.options)))
    }
}

pub(crate) fn hex_digest(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    format!("{:x}", hasher.finalize())
}

fn truncate(mut digest: String, options: &Options) -> String {
    if let Some(length) = options.usize("length") {
        digest.truncate(length);
    }
    digest
}
