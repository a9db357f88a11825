//! Validate config command implementation
//!
//! Loads the configuration and resolves every entity against the built-in
//! generators, without opening any connection.

use crate::adapters::postgresql::client::redact;
use crate::anonymization::{AnonymizerRegistry, GeneratorRegistry, PreparedEntity};
use crate::config::{load_config, ShroudConfig};
use clap::Args;
use secrecy::ExposeSecret;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        if let Err(e) = resolve_entities(&config) {
            println!("❌ Entity configuration is invalid");
            println!("   Error: {e}");
            return Ok(2);
        }

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Environment: {}", config.environment);
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Batch Size: {}", config.run.batch_size);
        println!("  Commit Failure Policy: {}", config.run.on_commit_failure);
        for (id, connection) in &config.connections {
            println!(
                "  Connection '{id}': {} (pool {})",
                redact(connection.connection_string.expose_secret().as_ref()),
                connection.max_connections
            );
        }
        for entity in &config.entities {
            println!(
                "  Entity '{}': table {}, {} properties{}",
                entity.name,
                entity.table_name(),
                entity.properties.len(),
                if entity.truncate { ", truncated" } else { "" }
            );
        }
        println!();
        Ok(0)
    }
}

/// Resolve generator types and options of every entity
fn resolve_entities(config: &ShroudConfig) -> crate::domain::Result<()> {
    let generators = GeneratorRegistry::with_builtins();
    let anonymizers = AnonymizerRegistry::new();
    for entity in &config.entities {
        PreparedEntity::prepare(entity, &generators, &anonymizers)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const BASE: &str = "[connections.default]\nconnection_string = \"postgresql://u:p@localhost/app\"\n";

    #[test]
    fn test_resolve_builtin_generators() {
        let config = parse_config(&format!(
            "{BASE}\n[[entities]]\nname = \"users\"\n\n[[entities.properties]]\nname = \"email\"\ngenerator = \"email\"\n"
        ))
        .unwrap();
        assert!(resolve_entities(&config).is_ok());
    }

    #[test]
    fn test_resolve_unknown_generator() {
        let config = parse_config(&format!(
            "{BASE}\n[[entities]]\nname = \"users\"\n\n[[entities.properties]]\nname = \"code\"\ngenerator = \"loyalty_code\"\n"
        ))
        .unwrap();
        assert!(resolve_entities(&config).is_err());
    }
}
