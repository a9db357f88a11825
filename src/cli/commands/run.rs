//! Run command implementation
//!
//! This module implements the `run` command, which anonymizes every
//! configured entity against its PostgreSQL connections.

use crate::adapters::postgresql::{PostgreSQLClient, PostgresStore};
use crate::adapters::RecordStore;
use crate::config::{load_config, Environment, ShroudConfig};
use crate::core::batch::CommitFailurePolicy;
use crate::core::{Orchestrator, Report};
use crate::domain::ShroudError;
use clap::{Args, ValueEnum};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::watch;

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// The full report as JSON
    Json,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Compute updates without writing or truncating anything
    #[arg(long)]
    pub dry_run: bool,

    /// Override records per page
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Only process these connections (comma-separated)
    #[arg(long = "connection", value_delimiter = ',')]
    pub connections: Vec<String>,

    /// Seed the generators for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Abort on the first generator or custom anonymizer failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Override the commit failure policy (abort_entity, continue, abort_run)
    #[arg(long, value_name = "POLICY")]
    pub on_commit_failure: Option<CommitFailurePolicy>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Allow running against a production environment
    #[arg(long)]
    pub allow_production: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Starting run command");

        let mut config = match load_config(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("{e}");
                return Ok(2); // Configuration error exit code
            }
        };

        self.apply_overrides(&mut config);

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        if config.environment == Environment::Production && !self.allow_production {
            tracing::error!("Refusing to run against a production environment");
            eprintln!("❌ environment is 'production'; pass --allow-production to anonymize it");
            return Ok(2);
        }

        let options = config.run_options();

        if options.dry_run {
            tracing::info!("Dry run mode enabled - no data will be written");
            eprintln!("🔍 DRY RUN MODE - No data will be written or deleted");
        }

        if !self.yes && !options.dry_run && !confirm(&config)? {
            println!("Run cancelled.");
            return Ok(0);
        }

        let mut orchestrator = Orchestrator::new().with_shutdown(shutdown_signal);
        for (id, pg_config) in &config.connections {
            let client = match PostgreSQLClient::new(pg_config.clone()) {
                Ok(client) => client,
                Err(e) => {
                    tracing::error!(connection = %id, error = %e, "Invalid connection");
                    eprintln!("Connection '{id}': {e}");
                    return Ok(2);
                }
            };
            let store = PostgresStore::new(id, client);

            let selected = options.connections.is_empty() || options.connections.contains(id);
            if selected {
                if let Err(e) = store.test_connection().await {
                    tracing::error!(connection = %id, error = %e, "Connection test failed");
                    eprintln!("Failed to connect to '{id}': {e}");
                    return Ok(4); // Connection error exit code
                }
            }
            orchestrator = orchestrator.with_store(id, Arc::new(store));
        }

        let report = match orchestrator.run_all(&config.entities, &options).await {
            Ok(report) => report,
            Err(ShroudError::Configuration(message)) => {
                tracing::error!(error = %message, "Invalid entity configuration");
                eprintln!("Configuration error: {message}");
                return Ok(2);
            }
            Err(e) => {
                tracing::error!(error = %e, "Run aborted");
                eprintln!("Run aborted: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => print!("{}", render_summary(&report)),
        }

        Ok(exit_code(&report))
    }

    fn apply_overrides(&self, config: &mut ShroudConfig) {
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }
        if let Some(batch_size) = self.batch_size {
            tracing::info!(batch_size, "Overriding batch size from CLI");
            config.run.batch_size = batch_size;
        }
        if !self.connections.is_empty() {
            tracing::info!(connections = ?self.connections, "Overriding connections from CLI");
            config.run.connections = self.connections.clone();
        }
        if let Some(seed) = self.seed {
            config.run.seed = Some(seed);
        }
        if self.fail_fast {
            config.run.fail_fast = true;
        }
        if let Some(policy) = self.on_commit_failure {
            tracing::info!(policy = %policy, "Overriding commit failure policy from CLI");
            config.run.on_commit_failure = policy;
        }
    }
}

fn confirm(config: &ShroudConfig) -> anyhow::Result<bool> {
    use std::io::{self, Write};

    println!("Run Configuration:");
    println!("  Environment: {}", config.environment);
    println!(
        "  Connections: {}",
        if config.run.connections.is_empty() {
            "All".to_string()
        } else {
            config.run.connections.join(", ")
        }
    );
    println!("  Entities: {}", config.entities.len());
    println!("  Batch size: {}", config.run.batch_size);
    println!();
    print!("Records will be overwritten in place. Proceed? [y/N]: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Process exit code for a finished run
pub fn exit_code(report: &Report) -> i32 {
    if report.was_cancelled() {
        130 // SIGINT exit code (standard Unix convention)
    } else if report.is_successful() {
        0
    } else {
        1 // Completed with recoverable errors
    }
}

/// Human-readable report
pub fn render_summary(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "📊 Anonymization Summary{}:",
        if report.dry_run { " (dry run)" } else { "" }
    );
    let _ = writeln!(out, "  Processed: {}", report.totals.processed);
    let _ = writeln!(out, "  Updated: {}", report.totals.updated);
    let _ = writeln!(out, "  Errored: {}", report.totals.errored);
    if let Some(truncated) = report.totals.truncated {
        let _ = writeln!(out, "  Truncated rows: {truncated}");
    }
    let _ = writeln!(out, "  Duration: {:.2}s", report.duration_ms as f64 / 1000.0);
    let _ = writeln!(out);

    for (key, stats) in &report.entities {
        let _ = writeln!(
            out,
            "  {key} [{:?}]: processed {}, updated {}, errored {}",
            stats.status, stats.processed, stats.updated, stats.errored
        );
        for (property, count) in &stats.per_property {
            let _ = writeln!(out, "    {property}: {count}");
        }
        for error in stats.errors.iter().take(10) {
            let _ = writeln!(out, "    ⚠️  {:?}: {}", error.kind, error.message);
        }
        if stats.errors.len() > 10 {
            let _ = writeln!(out, "    ... and {} more errors", stats.errors.len() - 10);
        }
    }

    let _ = writeln!(out);
    if report.was_cancelled() {
        let _ = writeln!(out, "⚠️  Run interrupted between pages. Committed pages stay anonymized.");
    } else if report.is_successful() {
        let _ = writeln!(out, "✅ Anonymization completed successfully!");
    } else {
        let _ = writeln!(out, "⚠️  Anonymization completed with errors");
    }
    out
}
