//! Run orchestration
//!
//! The orchestrator resolves which entities run on which connection, prepares
//! them all up front (so configuration errors abort before any store access),
//! then processes each connection: truncation first, then every entity in the
//! order given. Connections run concurrently; entities sharing a connection
//! run one after another.

use super::batch::{BatchConfig, BatchProcessor, CommitFailurePolicy, DEFAULT_BATCH_SIZE};
use super::report::{EntityStats, EntityStatus, ErrorKind, Report, RunError};
use super::truncation::TruncationManager;
use crate::adapters::store::RecordStore;
use crate::anonymization::custom::{AnonymizerRegistry, CustomAnonymizer};
use crate::anonymization::generators::{Generator, GeneratorRegistry};
use crate::anonymization::hooks::{Hooks, LifecycleListener};
use crate::anonymization::pipeline::{PreparedEntity, PropertyPipeline};
use crate::domain::{EntitySpec, GeneratorType, Result, ShroudError};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Options of one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Compute updates without writing or truncating
    pub dry_run: bool,
    /// Records per page
    pub batch_size: usize,
    /// Connections to process; empty means all
    pub connections: Vec<String>,
    /// Abort the run on the first generator or custom anonymizer failure
    pub fail_fast: bool,
    pub on_commit_failure: CommitFailurePolicy,
    /// Seed for reproducible generator output
    pub seed: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: DEFAULT_BATCH_SIZE,
            connections: Vec::new(),
            fail_fast: false,
            on_commit_failure: CommitFailurePolicy::default(),
            seed: None,
        }
    }
}

impl RunOptions {
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ShroudError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn batch_config(&self) -> BatchConfig {
        BatchConfig::new(self.batch_size, self.dry_run)
            .with_commit_failure_policy(self.on_commit_failure)
    }
}

/// What one connection produced
#[derive(Default)]
struct ConnectionRun {
    truncated: Vec<(String, u64)>,
    entities: Vec<(String, EntityStats)>,
}

/// Entry point of an anonymization run
///
/// Registries, hooks and stores are handed in explicitly; nothing is looked up
/// globally.
pub struct Orchestrator {
    generators: GeneratorRegistry,
    anonymizers: AnonymizerRegistry,
    hooks: Hooks,
    stores: BTreeMap<String, Arc<dyn RecordStore>>,
    shutdown: watch::Receiver<bool>,
}

impl Orchestrator {
    /// Orchestrator with the built-in generators and no stores
    pub fn new() -> Self {
        // The sender is dropped at once; the receiver keeps reporting `false`.
        let (_, shutdown) = watch::channel(false);
        Self {
            generators: GeneratorRegistry::with_builtins(),
            anonymizers: AnonymizerRegistry::new(),
            hooks: Hooks::new(),
            stores: BTreeMap::new(),
            shutdown,
        }
    }

    /// Register the store behind a connection id
    pub fn with_store(mut self, connection: &str, store: Arc<dyn RecordStore>) -> Self {
        self.stores.insert(connection.to_string(), store);
        self
    }

    pub fn with_generators(mut self, generators: GeneratorRegistry) -> Self {
        self.generators = generators;
        self
    }

    /// Add a generator under its own type key
    pub fn with_generator(mut self, generator_type: &str, generator: Arc<dyn Generator>) -> Self {
        self.generators
            .register(GeneratorType::from(generator_type), generator);
        self
    }

    /// Add a named generator for `generator = "service"` properties
    pub fn with_service(mut self, name: &str, generator: Arc<dyn Generator>) -> Self {
        self.generators.register_service(name, generator);
        self
    }

    pub fn with_anonymizer(mut self, name: &str, anonymizer: Arc<dyn CustomAnonymizer>) -> Self {
        self.anonymizers.register(name, anonymizer);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.hooks.register(listener);
        self
    }

    /// Stop between pages once the channel carries `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn connections(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// Check every connection's store
    ///
    /// # Errors
    ///
    /// Returns the first connection failure.
    pub async fn test_connections(&self) -> Result<()> {
        for (connection, store) in &self.stores {
            tracing::debug!(connection = %connection, "Testing connection");
            store.test_connection().await?;
        }
        Ok(())
    }

    /// Resolve and validate the entities of every selected connection
    ///
    /// # Errors
    ///
    /// Returns [`ShroudError::Configuration`] for unknown connections,
    /// duplicate entity names on one connection, or any entity that fails to
    /// prepare.
    pub fn prepare(
        &self,
        specs: &[EntitySpec],
        options: &RunOptions,
    ) -> Result<BTreeMap<String, Vec<PreparedEntity>>> {
        options.validate()?;

        for requested in &options.connections {
            if !self.stores.contains_key(requested) {
                return Err(ShroudError::Configuration(format!(
                    "unknown connection '{requested}'"
                )));
            }
        }
        for spec in specs {
            if let Some(connection) = spec.connection_id.as_deref() {
                if !self.stores.contains_key(connection) {
                    return Err(ShroudError::Configuration(format!(
                        "entity '{}': unknown connection '{connection}'",
                        spec.name
                    )));
                }
            }
        }

        let mut plan = BTreeMap::new();
        for connection in self.stores.keys() {
            if !options.connections.is_empty() && !options.connections.contains(connection) {
                continue;
            }
            let mut seen = HashSet::new();
            let mut prepared = Vec::new();
            for spec in specs.iter().filter(|s| s.applies_to(connection)) {
                if !seen.insert(spec.name.as_str()) {
                    return Err(ShroudError::Configuration(format!(
                        "entity '{}' is declared twice for connection '{connection}'",
                        spec.name
                    )));
                }
                prepared.push(PreparedEntity::prepare(
                    spec,
                    &self.generators,
                    &self.anonymizers,
                )?);
            }
            plan.insert(connection.clone(), prepared);
        }
        Ok(plan)
    }

    /// Run every entity against its connections
    ///
    /// # Errors
    ///
    /// Configuration errors (before any store access) and fail-fast
    /// escalations. Everything else is recorded in the returned [`Report`].
    pub async fn run_all(&self, specs: &[EntitySpec], options: &RunOptions) -> Result<Report> {
        let start_time = Instant::now();
        let plan = self.prepare(specs, options)?;

        let selected: Vec<EntitySpec> = plan
            .values()
            .flat_map(|entities| entities.iter().map(|e| e.spec().clone()))
            .collect();
        tracing::info!(
            connections = plan.len(),
            entities = selected.len(),
            dry_run = options.dry_run,
            batch_size = options.batch_size,
            "Starting anonymization run"
        );
        self.hooks.before_run(&selected);

        let halt_flag = AtomicBool::new(false);
        let halt = &halt_flag;
        let runs = plan.iter().enumerate().filter_map(|(index, (connection, entities))| {
            let store = self.stores.get(connection)?;
            let rng = match options.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
                None => StdRng::from_entropy(),
            };
            Some(async move {
                let run = self
                    .run_connection(connection, store.as_ref(), entities, options, rng, halt)
                    .await;
                (connection.as_str(), run)
            })
        });
        let results = join_all(runs).await;

        let mut report = Report::new(options.dry_run);
        for (connection, run) in results {
            let run = run?;
            for (entity, rows) in run.truncated {
                report.record_truncation(connection, &entity, rows);
            }
            for (entity, stats) in run.entities {
                report.add_entity(connection, &entity, stats);
            }
        }

        let report = report.with_duration(start_time.elapsed());
        self.hooks.after_run(&report);
        report.log_summary();
        Ok(report)
    }

    async fn run_connection(
        &self,
        connection: &str,
        store: &dyn RecordStore,
        entities: &[PreparedEntity],
        options: &RunOptions,
        mut rng: StdRng,
        halt: &AtomicBool,
    ) -> Result<ConnectionRun> {
        let mut run = ConnectionRun::default();
        tracing::info!(
            connection = %connection,
            store = %store.name(),
            entities = entities.len(),
            "Processing connection"
        );

        let truncation = TruncationManager::new(options.dry_run);
        for spec in TruncationManager::plan(entities.iter().map(PreparedEntity::spec)) {
            match truncation.execute(store, spec).await {
                Ok(Some(rows)) => run.truncated.push((spec.name.clone(), rows)),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        connection = %connection,
                        entity = %spec.name,
                        error = %e,
                        "Truncation failed, skipping connection"
                    );
                    let reason = format!("truncation of '{}' failed: {e}", spec.name);
                    for entity in entities {
                        let stats =
                            EntityStats::skipped(RunError::new(ErrorKind::Truncation, reason.clone()));
                        run.entities.push((entity.name().to_string(), stats));
                    }
                    return Ok(run);
                }
            }
        }

        let processor = BatchProcessor::new(
            options.batch_config(),
            PropertyPipeline::new(self.hooks.clone(), options.fail_fast),
        );
        for entity in entities {
            if halt.load(Ordering::SeqCst) {
                tracing::warn!(
                    connection = %connection,
                    entity = %entity.name(),
                    "Skipping entity, run aborted after a store failure"
                );
                let stats = EntityStats::skipped(RunError::new(
                    ErrorKind::Store,
                    "run aborted after a store failure",
                ));
                run.entities.push((entity.name().to_string(), stats));
                continue;
            }

            self.hooks.before_entity(connection, entity.spec());
            let stats = processor
                .run(store, entity, &mut rng, &self.shutdown)
                .await?;
            self.hooks.after_entity(connection, entity.spec(), &stats);

            if stats.status == EntityStatus::Failed
                && options.on_commit_failure == CommitFailurePolicy::AbortRun
            {
                halt.store(true, Ordering::SeqCst);
            }
            run.entities.push((entity.name().to_string(), stats));
        }
        Ok(run)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::{PropertySpec, RuleConfig, Value};
    use crate::record;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new("memory").with_table(
            "users",
            (1..=4).map(|id| record! { "id" => id, "name" => format!("User {id}") }),
        ))
    }

    fn users() -> EntitySpec {
        EntitySpec::new("users").property(PropertySpec::new("name", "constant").option("value", "Anon"))
    }

    #[tokio::test]
    async fn test_unknown_generator_aborts_before_store_access() {
        let store = store();
        let orchestrator = Orchestrator::new().with_store("default", store.clone());
        let spec = EntitySpec::new("users").property(PropertySpec::new("name", "no_such_faker"));

        let result = orchestrator.run_all(&[spec], &RunOptions::default()).await;
        assert!(matches!(result, Err(ShroudError::Configuration(_))));
        assert_eq!(store.apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_connection_is_rejected() {
        let orchestrator = Orchestrator::new().with_store("default", store());
        let options = RunOptions {
            connections: vec!["crm".to_string()],
            ..RunOptions::default()
        };
        let result = orchestrator.run_all(&[users()], &options).await;
        assert!(matches!(result, Err(ShroudError::Configuration(_))));

        let spec = users().connection("crm");
        let result = orchestrator.run_all(&[spec], &RunOptions::default()).await;
        assert!(matches!(result, Err(ShroudError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_a_config_error() {
        let orchestrator = Orchestrator::new().with_store("default", store());
        let result = orchestrator
            .run_all(&[users()], &RunOptions::default().batch_size(0))
            .await;
        assert!(matches!(result, Err(ShroudError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_connection_filter() {
        let main = store();
        let replica = store();
        let orchestrator = Orchestrator::new()
            .with_store("main", main.clone())
            .with_store("replica", replica.clone());
        let options = RunOptions {
            connections: vec!["replica".to_string()],
            ..RunOptions::default()
        };

        let report = orchestrator.run_all(&[users()], &options).await.unwrap();
        assert!(report.entity("main", "users").is_none());
        assert_eq!(report.entity("replica", "users").unwrap().updated, 4);
        assert_eq!(main.rows("users")[0]["name"], Value::from("User 1"));
        assert_eq!(replica.rows("users")[0]["name"], Value::from("Anon"));
    }

    #[tokio::test]
    async fn test_abort_run_skips_remaining_entities() {
        let store = Arc::new(
            MemoryStore::new("memory")
                .with_table("users", vec![record! { "id" => 1, "name" => "a" }])
                .with_table("orders", vec![record! { "id" => 1, "name" => "b" }]),
        );
        store.fail_commit("users", 1);
        let orchestrator = Orchestrator::new().with_store("default", store.clone());
        let orders = EntitySpec::new("orders")
            .property(PropertySpec::new("name", "constant").option("value", "x"));
        let options = RunOptions {
            on_commit_failure: CommitFailurePolicy::AbortRun,
            ..RunOptions::default()
        };

        let report = orchestrator.run_all(&[users(), orders], &options).await.unwrap();
        assert_eq!(report.entity("default", "users").unwrap().status, EntityStatus::Failed);
        assert_eq!(report.entity("default", "orders").unwrap().status, EntityStatus::Skipped);
        assert!(!report.is_successful());
    }

    #[tokio::test]
    async fn test_exclusion_rules_reach_the_batch() {
        let store = store();
        let orchestrator = Orchestrator::new().with_store("default", store.clone());
        let spec = users().exclude(RuleConfig::new().field("id", ">2"));

        let report = orchestrator.run_all(&[spec], &RunOptions::default()).await.unwrap();
        let stats = report.entity("default", "users").unwrap();
        assert_eq!(stats.processed, 4);
        assert_eq!(stats.updated, 2);
        assert_eq!(store.rows("users")[3]["name"], Value::from("User 4"));
    }
}
