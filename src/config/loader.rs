//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::ShroudConfig;
use super::secret::secret_string;
use crate::domain::errors::ShroudError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into ShroudConfig
/// 4. Applies environment variable overrides (SHROUD_* prefix)
/// 5. Validates the configuration
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Errors
///
/// Returns [`ShroudError::Configuration`] if the file cannot be read, a
/// referenced variable is unset, the TOML is malformed, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use shroud::config::load_config;
///
/// let config = load_config("shroud.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ShroudConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ShroudError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ShroudError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration text, applying the same steps as [`load_config`]
///
/// # Errors
///
/// See [`load_config`].
pub fn parse_config(contents: &str) -> Result<ShroudConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: ShroudConfig = toml::from_str(&contents)
        .map_err(|e| ShroudError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ShroudError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left alone so documented placeholders need not be set.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ShroudError::Configuration(e.to_string()))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let processed = re.replace_all(line, |cap: &regex::Captures<'_>| {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    String::new()
                }
            }
        });
        lines.push(processed.into_owned());
    }

    if !missing_vars.is_empty() {
        return Err(ShroudError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    let mut result = lines.join("\n");
    if input.ends_with('\n') {
        result.push('\n');
    }
    Ok(result)
}

/// Environment variable suffix for a connection id: `crm-eu` → `CRM_EU`
fn env_key(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ShroudError::Configuration(format!("{name}: invalid value '{value}': {e}")))
}

/// Applies environment variable overrides using SHROUD_* prefix
///
/// Environment variables follow the pattern: SHROUD_<SECTION>_<KEY>, for
/// example SHROUD_RUN_BATCH_SIZE. Connections are addressed by id:
/// SHROUD_CONNECTIONS_<ID>_CONNECTION_STRING.
///
/// # Errors
///
/// Returns an error when an override cannot be parsed
fn apply_env_overrides(config: &mut ShroudConfig) -> Result<()> {
    fn var(name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    // Application overrides
    if let Some(val) = var("SHROUD_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = var("SHROUD_APPLICATION_DRY_RUN") {
        config.application.dry_run = parse_override("SHROUD_APPLICATION_DRY_RUN", &val)?;
    }
    if let Some(val) = var("SHROUD_ENVIRONMENT") {
        config.environment = val.parse().map_err(ShroudError::Configuration)?;
    }

    // Run overrides
    if let Some(val) = var("SHROUD_RUN_BATCH_SIZE") {
        config.run.batch_size = parse_override("SHROUD_RUN_BATCH_SIZE", &val)?;
    }
    if let Some(val) = var("SHROUD_RUN_CONNECTIONS") {
        config.run.connections = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(val) = var("SHROUD_RUN_FAIL_FAST") {
        config.run.fail_fast = parse_override("SHROUD_RUN_FAIL_FAST", &val)?;
    }
    if let Some(val) = var("SHROUD_RUN_ON_COMMIT_FAILURE") {
        config.run.on_commit_failure = parse_override("SHROUD_RUN_ON_COMMIT_FAILURE", &val)?;
    }
    if let Some(val) = var("SHROUD_RUN_SEED") {
        config.run.seed = Some(parse_override("SHROUD_RUN_SEED", &val)?);
    }

    // Connection overrides
    for (id, connection) in config.connections.iter_mut() {
        let prefix = format!("SHROUD_CONNECTIONS_{}", env_key(id));
        if let Some(val) = var(&format!("{prefix}_CONNECTION_STRING")) {
            connection.connection_string = secret_string(val);
        }
        let name = format!("{prefix}_MAX_CONNECTIONS");
        if let Some(val) = var(&name) {
            connection.max_connections = parse_override(&name, &val)?;
        }
    }

    // Logging overrides
    if let Some(val) = var("SHROUD_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_override("SHROUD_LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Some(val) = var("SHROUD_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Some(val) = var("SHROUD_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}
