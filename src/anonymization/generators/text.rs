//! Structured fakers: JSON documents, free text and HTML fragments

use super::{Generator, GeneratorContext, GeneratorRegistry};
use crate::domain::{GeneratorType, Options, Value};
use anyhow::bail;
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::{Paragraph, Sentence, Word};
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::Rng;
use std::sync::Arc;

pub fn register(registry: &mut GeneratorRegistry) {
    registry.register(GeneratorType::Json, Arc::new(JsonGenerator));
    registry.register(GeneratorType::Text, Arc::new(TextGenerator));
    registry.register(GeneratorType::Html, Arc::new(HtmlGenerator));
}

/// Flat JSON object of lorem values
///
/// `keys` fixes the object keys; otherwise 2 to 5 random words are used.
struct JsonGenerator;

impl Generator for JsonGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let keys = match ctx.options.strings("keys") {
            Some(keys) => keys,
            None => {
                let count = ctx.rng.gen_range(2..=5);
                (0..count)
                    .map(|_| Word().fake_with_rng::<String, _>(ctx.rng))
                    .collect()
            }
        };

        let mut object = serde_json::Map::new();
        for key in keys {
            let value: String = Sentence(1..4).fake_with_rng(ctx.rng);
            object.insert(key, serde_json::Value::String(value));
        }
        Ok(Value::Text(serde_json::to_string(&serde_json::Value::Object(
            object,
        ))?))
    }
}

/// Lorem sentences, cut to `max_length` characters when set
struct TextGenerator;

impl Generator for TextGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let sentences = ctx.options.usize("sentences").unwrap_or(3).max(1);
        let text: String = Paragraph(sentences..sentences + 1).fake_with_rng(ctx.rng);
        let text = match ctx.options.usize("max_length") {
            Some(max) => text.chars().take(max).collect::<String>().trim_end().to_string(),
            None => text,
        };
        Ok(Value::Text(text))
    }
}

/// HTML fragment in `paragraph` (default) or `signature` mode
struct HtmlGenerator;

impl HtmlGenerator {
    fn mode(options: &Options) -> anyhow::Result<&str> {
        match options.str("mode").unwrap_or("paragraph") {
            mode @ ("paragraph" | "signature") => Ok(mode),
            other => bail!("html mode must be 'paragraph' or 'signature', got '{other}'"),
        }
    }
}

impl Generator for HtmlGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let html = match Self::mode(ctx.options)? {
            "signature" => {
                let name: String = Name().fake_with_rng(ctx.rng);
                let company: String = CompanyName().fake_with_rng(ctx.rng);
                let email: String = SafeEmail().fake_with_rng(ctx.rng);
                let phone: String = PhoneNumber().fake_with_rng(ctx.rng);
                format!(
                    "<p><strong>{name}</strong><br>{company}<br>\
                     <a href=\"mailto:{email}\">{email}</a><br>{phone}</p>"
                )
            }
            _ => {
                let count = ctx.options.usize("paragraphs").unwrap_or(2).max(1);
                (0..count)
                    .map(|_| {
                        let paragraph: String = Paragraph(2..5).fake_with_rng(ctx.rng);
                        format!("<p>{paragraph}</p>")
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };
        Ok(Value::Text(html))
    }

    fn validate(&self, options: &Options) -> anyhow::Result<()> {
        Self::mode(options).map(|_| ())
    }
}
