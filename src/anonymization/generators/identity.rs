//! Identity fakers: names, contact details, locations

use super::{Generator, GeneratorContext, GeneratorRegistry};
use crate::domain::{GeneratorType, Value};
use fake::faker::address::en::{BuildingNumber, CityName, CountryName, StreetName, ZipCode};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{DomainSuffix, SafeEmail, Username};
use fake::faker::lorem::en::Word;
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

const LANGUAGES: &[&str] = &[
    "English", "German", "French", "Spanish", "Italian", "Portuguese", "Dutch", "Polish",
    "Swedish", "Czech", "Japanese", "Korean", "Chinese", "Arabic", "Turkish", "Greek",
];

pub fn register(registry: &mut GeneratorRegistry) {
    registry.register(GeneratorType::Name, Arc::new(NameGenerator));
    registry.register(GeneratorType::FirstName, Arc::new(FirstNameGenerator));
    registry.register(GeneratorType::Surname, Arc::new(SurnameGenerator));
    registry.register(GeneratorType::Username, Arc::new(UsernameGenerator));
    registry.register(GeneratorType::Email, Arc::new(EmailGenerator));
    registry.register(GeneratorType::Phone, Arc::new(PhoneGenerator));
    registry.register(GeneratorType::Address, Arc::new(AddressGenerator));
    registry.register(GeneratorType::Company, Arc::new(CompanyGenerator));
    registry.register(GeneratorType::Url, Arc::new(UrlGenerator));
    registry.register(GeneratorType::Country, Arc::new(CountryGenerator));
    registry.register(GeneratorType::Language, Arc::new(LanguageGenerator));
}

struct NameGenerator;

impl Generator for NameGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let name: String = Name().fake_with_rng(ctx.rng);
        Ok(Value::Text(name))
    }
}

struct FirstNameGenerator;

impl Generator for FirstNameGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let name: String = FirstName().fake_with_rng(ctx.rng);
        Ok(Value::Text(name))
    }
}

struct SurnameGenerator;

impl Generator for SurnameGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let name: String = LastName().fake_with_rng(ctx.rng);
        Ok(Value::Text(name))
    }
}

struct UsernameGenerator;

impl Generator for UsernameGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let username: String = Username().fake_with_rng(ctx.rng);
        Ok(Value::Text(username))
    }
}

/// Safe email, optionally on a fixed `domain`
///
/// A numeric suffix keeps addresses unique enough for columns with a unique
/// index.
struct EmailGenerator;

impl Generator for EmailGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let email: String = SafeEmail().fake_with_rng(ctx.rng);
        let (local, domain) = email.split_once('@').unwrap_or((email.as_str(), "example.com"));
        let domain = ctx.options.str("domain").unwrap_or(domain);
        let suffix: u32 = ctx.rng.gen_range(0..10_000);
        Ok(Value::Text(format!(
            "{}{suffix}@{domain}",
            local.to_ascii_lowercase()
        )))
    }
}

struct PhoneGenerator;

impl Generator for PhoneGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let phone: String = PhoneNumber().fake_with_rng(ctx.rng);
        Ok(Value::Text(phone))
    }
}

struct AddressGenerator;

impl Generator for AddressGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let number: String = BuildingNumber().fake_with_rng(ctx.rng);
        let street: String = StreetName().fake_with_rng(ctx.rng);
        let zip: String = ZipCode().fake_with_rng(ctx.rng);
        let city: String = CityName().fake_with_rng(ctx.rng);
        Ok(Value::Text(format!("{number} {street}, {zip} {city}")))
    }
}

struct CompanyGenerator;

impl Generator for CompanyGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let company: String = CompanyName().fake_with_rng(ctx.rng);
        Ok(Value::Text(company))
    }
}

struct UrlGenerator;

impl Generator for UrlGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let host: String = Word().fake_with_rng(ctx.rng);
        let suffix: String = DomainSuffix().fake_with_rng(ctx.rng);
        let path: String = Word().fake_with_rng(ctx.rng);
        let scheme = ctx.options.str("scheme").unwrap_or("https");
        let url = url::Url::parse(&format!("{scheme}://www.{host}.{suffix}/{path}"))?;
        Ok(Value::Text(url.to_string()))
    }
}

struct CountryGenerator;

impl Generator for CountryGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let country: String = CountryName().fake_with_rng(ctx.rng);
        Ok(Value::Text(country))
    }
}

struct LanguageGenerator;

impl Generator for LanguageGenerator {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let language = LANGUAGES.choose(ctx.rng).copied().unwrap_or("English");
        Ok(Value::from(language))
    }
}
