//! Batch processing of one entity
//!
//! The processor streams an entity's records from its store page by page,
//! runs the property pipeline on every record and commits each page of updates
//! as one unit. Per entity it moves through
//! `Idle -> Streaming -> (Applying -> Committing)* -> Done`, or `Failed` when a
//! store operation stops it.

use crate::adapters::store::{RecordStore, RecordUpdate};
use crate::anonymization::pipeline::{PipelineOutcome, PreparedEntity, PropertyPipeline};
use crate::core::report::{EntityStats, EntityStatus, ErrorKind, RunError};
use crate::domain::{Record, Result};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::watch;

/// Default number of records per page
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// What to do when a page fails to commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitFailurePolicy {
    /// Stop the current entity, continue with the next one
    #[default]
    AbortEntity,
    /// Record the failure and move on to the next page
    Continue,
    /// Stop the current entity and skip every entity not yet started
    AbortRun,
}

impl FromStr for CommitFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "abort_entity" => Ok(Self::AbortEntity),
            "continue" => Ok(Self::Continue),
            "abort_run" => Ok(Self::AbortRun),
            other => Err(format!(
                "Invalid commit failure policy '{other}'. Must be one of: abort_entity, continue, abort_run"
            )),
        }
    }
}

impl fmt::Display for CommitFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AbortEntity => "abort_entity",
            Self::Continue => "continue",
            Self::AbortRun => "abort_run",
        };
        f.write_str(s)
    }
}

/// Configuration for batch processing
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Records per page (at least 1)
    pub batch_size: usize,
    /// Compute and count updates without writing them
    pub dry_run: bool,
    pub on_commit_failure: CommitFailurePolicy,
}

impl BatchConfig {
    pub fn new(batch_size: usize, dry_run: bool) -> Self {
        Self {
            batch_size: batch_size.max(1),
            dry_run,
            on_commit_failure: CommitFailurePolicy::default(),
        }
    }

    pub fn with_commit_failure_policy(mut self, policy: CommitFailurePolicy) -> Self {
        self.on_commit_failure = policy;
        self
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, false)
    }
}

/// Processing state of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Streaming,
    Applying,
    Committing,
    Done,
    Failed,
}

/// Tracks and logs state transitions of one entity run
struct StateTracker<'a> {
    entity: &'a str,
    state: BatchState,
}

impl<'a> StateTracker<'a> {
    fn new(entity: &'a str) -> Self {
        Self {
            entity,
            state: BatchState::Idle,
        }
    }

    fn enter(&mut self, next: BatchState) {
        tracing::trace!(entity = %self.entity, from = ?self.state, to = ?next, "Batch state transition");
        self.state = next;
    }
}

/// Counters of one page, folded into the entity stats once the page is settled
#[derive(Default)]
struct PageTally {
    updates: Vec<RecordUpdate>,
    stats: EntityStats,
}

impl PageTally {
    fn collect(records: &[Record], outcomes: Vec<PipelineOutcome>) -> Self {
        let mut tally = Self::default();
        for (record, mut outcome) in records.iter().zip(outcomes) {
            tally.stats.processed += 1;
            if !outcome.errors.is_empty() {
                tally.stats.errored += 1;
                for error in std::mem::take(&mut outcome.errors) {
                    let (kind, property) = match error.property {
                        Some(property) => (ErrorKind::Generator, Some(property)),
                        None => (ErrorKind::CustomService, None),
                    };
                    let mut run_error =
                        RunError::new(kind, error.message).with_record(record.key().to_string());
                    if let Some(property) = property {
                        run_error = run_error.with_property(property);
                    }
                    tally.stats.add_error(run_error);
                }
            }
            if !outcome.is_noop() {
                tally.stats.updated += 1;
                tally.stats.add_properties(&outcome.applied);
                tally.updates.push(RecordUpdate {
                    key: record.key().clone(),
                    fields: outcome.updates,
                });
            }
        }
        tally
    }

    /// Fold the whole page into `stats`
    fn settle(self, stats: &mut EntityStats) {
        stats.merge(&self.stats);
        stats.errors.extend(self.stats.errors);
    }

    /// Fold a page whose writes were rolled back: nothing counts as updated
    fn settle_rolled_back(self, stats: &mut EntityStats) {
        stats.processed += self.stats.processed;
        stats.errored += self.stats.errored;
        stats.errors.extend(self.stats.errors);
    }
}

/// Batch processor for one entity at a time
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    config: BatchConfig,
    pipeline: PropertyPipeline,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig, pipeline: PropertyPipeline) -> Self {
        Self { config, pipeline }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process every record of an entity
    ///
    /// Store failures end the entity with `Failed` status (or, with
    /// [`CommitFailurePolicy::Continue`], are recorded per page); the shutdown
    /// signal is checked before each page and ends it with `Cancelled`.
    ///
    /// # Errors
    ///
    /// Only fail-fast escalations of generator or custom anonymizer failures.
    pub async fn run(
        &self,
        store: &dyn RecordStore,
        entity: &PreparedEntity,
        rng: &mut StdRng,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<EntityStats> {
        let spec = entity.spec();
        let mut stats = EntityStats::new();
        let mut tracker = StateTracker::new(entity.name());
        let mut token = None;
        let mut page_number = 0usize;

        tracing::info!(
            entity = %entity.name(),
            store = %store.name(),
            table = %spec.table_name(),
            dry_run = self.config.dry_run,
            batch_size = self.config.batch_size,
            "Processing entity"
        );

        loop {
            let cancelled = *shutdown.borrow();
            if cancelled {
                tracing::warn!(
                    entity = %entity.name(),
                    pages = page_number,
                    "Shutdown requested, stopping entity between pages"
                );
                stats.status = EntityStatus::Cancelled;
                return Ok(stats);
            }

            tracker.enter(BatchState::Streaming);
            let page = match store
                .list_eligible(spec, token.as_ref(), self.config.batch_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    tracker.enter(BatchState::Failed);
                    tracing::error!(entity = %entity.name(), error = %e, "Failed to fetch page");
                    stats.status = EntityStatus::Failed;
                    stats.add_error(RunError::new(ErrorKind::Store, e.to_string()));
                    return Ok(stats);
                }
            };
            page_number += 1;

            tracker.enter(BatchState::Applying);
            let outcomes = self.pipeline.apply_batch(entity, &page.records, rng)?;
            let tally = PageTally::collect(&page.records, outcomes);

            tracing::debug!(
                entity = %entity.name(),
                page = page_number,
                records = page.records.len(),
                updates = tally.updates.len(),
                "Page computed"
            );

            if self.config.dry_run || tally.updates.is_empty() {
                if self.config.dry_run && !tally.updates.is_empty() {
                    tracing::debug!(
                        entity = %entity.name(),
                        page = page_number,
                        updates = tally.updates.len(),
                        "DRY RUN: Skipping page commit"
                    );
                }
                tally.settle(&mut stats);
            } else {
                tracker.enter(BatchState::Committing);
                match store.apply_updates(spec, &tally.updates).await {
                    Ok(()) => tally.settle(&mut stats),
                    Err(e) => {
                        tracing::warn!(
                            entity = %entity.name(),
                            page = page_number,
                            error = %e,
                            policy = %self.config.on_commit_failure,
                            "Page commit failed, page rolled back"
                        );
                        tally.settle_rolled_back(&mut stats);
                        stats.add_error(RunError::new(
                            ErrorKind::Store,
                            format!("page {page_number}: {e}"),
                        ));
                        if self.config.on_commit_failure != CommitFailurePolicy::Continue {
                            tracker.enter(BatchState::Failed);
                            stats.status = EntityStatus::Failed;
                            return Ok(stats);
                        }
                    }
                }
            }

            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tracker.enter(BatchState::Done);
        tracing::info!(
            entity = %entity.name(),
            processed = stats.processed,
            updated = stats.updated,
            errored = stats.errored,
            "Entity processed"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::anonymization::custom::AnonymizerRegistry;
    use crate::anonymization::generators::{Generator, GeneratorContext, GeneratorRegistry};
    use crate::domain::{EntitySpec, PropertySpec, RuleConfig, Value};
    use crate::record;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn users(count: i64) -> MemoryStore {
        MemoryStore::new("memory").with_table(
            "users",
            (1..=count).map(|id| record! { "id" => id, "email" => format!("user{id}@corp.com") }),
        )
    }

    fn entity(spec: EntitySpec) -> PreparedEntity {
        PreparedEntity::prepare(
            &spec,
            &GeneratorRegistry::with_builtins(),
            &AnonymizerRegistry::new(),
        )
        .unwrap()
    }

    fn email_entity() -> PreparedEntity {
        entity(
            EntitySpec::new("users")
                .exclude(RuleConfig::new().field("id", "<=5"))
                .property(PropertySpec::new("email", "email").weight(1)),
        )
    }

    fn processor(config: BatchConfig) -> BatchProcessor {
        BatchProcessor::new(config, PropertyPipeline::default())
    }

    async fn run(processor: &BatchProcessor, store: &MemoryStore, entity: &PreparedEntity) -> EntityStats {
        let (_tx, rx) = watch::channel(false);
        let mut rng = StdRng::seed_from_u64(1);
        processor.run(store, entity, &mut rng, &rx).await.unwrap()
    }

    #[tokio::test]
    async fn test_counts_across_pages() {
        let store = users(10);
        let stats = run(&processor(BatchConfig::new(3, false)), &store, &email_entity()).await;

        assert_eq!(stats.processed, 10);
        assert_eq!(stats.updated, 5);
        assert_eq!(stats.per_property["email"], 5);
        assert_eq!(stats.status, EntityStatus::Completed);
        // ids 6..=10 fall in pages 2, 3 and 4
        assert_eq!(store.apply_calls(), 3);

        let rows = store.rows("users");
        assert_eq!(rows[0]["email"], Value::from("user1@corp.com"));
        assert_ne!(rows[9]["email"], Value::from("user10@corp.com"));
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let store = users(10);
        let stats = run(&processor(BatchConfig::new(10, true)), &store, &email_entity()).await;

        assert_eq!(stats.updated, 5);
        assert_eq!(store.apply_calls(), 0);
        assert_eq!(store.rows("users")[9]["email"], Value::from("user10@corp.com"));
    }

    #[tokio::test]
    async fn test_commit_failure_aborts_entity_by_default() {
        let store = users(10);
        store.fail_commit("users", 1);
        let stats = run(&processor(BatchConfig::new(4, false)), &store, &email_entity()).await;

        // page 1 (ids 1-4) has nothing to write; page 2 (ids 5-8) fails
        assert_eq!(stats.status, EntityStatus::Failed);
        assert_eq!(stats.processed, 8);
        assert_eq!(stats.updated, 0);
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].kind, ErrorKind::Store);
        assert_eq!(store.rows("users")[5]["email"], Value::from("user6@corp.com"));
    }

    #[tokio::test]
    async fn test_commit_failure_continue_policy() {
        let store = users(10);
        store.fail_commit("users", 1);
        let config = BatchConfig::new(4, false).with_commit_failure_policy(CommitFailurePolicy::Continue);
        let stats = run(&processor(config), &store, &email_entity()).await;

        assert_eq!(stats.status, EntityStatus::Completed);
        assert_eq!(stats.processed, 10);
        // ids 9 and 10 from the last page
        assert_eq!(stats.updated, 2);
        assert_eq!(stats.errors.len(), 1);
        assert!(!stats.is_successful());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let store = users(3);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let stats = processor(BatchConfig::default())
            .run(&store, &email_entity(), &mut rng, &rx)
            .await
            .unwrap();

        assert_eq!(stats.status, EntityStatus::Cancelled);
        assert_eq!(stats.processed, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_marks_entity_failed() {
        let store = users(3);
        store.fail_fetch("users");
        let stats = run(&processor(BatchConfig::default()), &store, &email_entity()).await;

        assert_eq!(stats.status, EntityStatus::Failed);
        assert_eq!(stats.errors[0].kind, ErrorKind::Store);
    }

    struct Unavailable;

    impl Generator for Unavailable {
        fn generate(&self, _ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
            anyhow::bail!("lookup service unavailable")
        }
    }

    #[tokio::test]
    async fn test_generator_errors_are_counted_per_record() {
        let store = users(2);
        let mut generators = GeneratorRegistry::with_builtins();
        generators.register_service("lookup", Arc::new(Unavailable));
        let spec = EntitySpec::new("users")
            .property(PropertySpec::new("email", "service").service("lookup"))
            .property(PropertySpec::new("name", "constant").option("value", "Jane"));
        let entity =
            PreparedEntity::prepare(&spec, &generators, &AnonymizerRegistry::new()).unwrap();

        let stats = run(&processor(BatchConfig::default()), &store, &entity).await;

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.errored, 2);
        assert_eq!(stats.updated, 2);
        assert_eq!(stats.per_property.get("email"), None);
        assert_eq!(stats.errors[0].kind, ErrorKind::Generator);
        assert_eq!(stats.errors[0].property.as_deref(), Some("email"));
        assert_eq!(stats.errors[0].record.as_deref(), Some("1"));
        assert_eq!(store.rows("users")[0]["email"], Value::from("user1@corp.com"));
        assert_eq!(store.rows("users")[0]["name"], Value::from("Jane"));
    }

    #[test]
    fn test_commit_failure_policy_parsing() {
        assert_eq!("abort-run".parse::<CommitFailurePolicy>().unwrap(), CommitFailurePolicy::AbortRun);
        assert_eq!("continue".parse::<CommitFailurePolicy>().unwrap(), CommitFailurePolicy::Continue);
        assert!("retry".parse::<CommitFailurePolicy>().is_err());
        assert_eq!(CommitFailurePolicy::default().to_string(), "abort_entity");
    }

    #[test]
    fn test_batch_size_floor() {
        assert_eq!(BatchConfig::new(0, false).batch_size, 1);
    }
}
