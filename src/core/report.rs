//! Run statistics and reporting
//!
//! This module defines the structures that track what a run did, per entity
//! and in total. Recoverable errors end up here instead of being returned to
//! the caller, so operators can tell "nothing matched" from "something failed".

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Final state of one entity run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// Every page was processed
    Completed,
    /// Processing stopped on a store error or fail-fast escalation
    Failed,
    /// A shutdown signal stopped processing between pages
    Cancelled,
    /// Not started because earlier work on the connection failed
    Skipped,
}

/// Kind of a recorded error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Generator,
    CustomService,
    Store,
    Truncation,
}

/// Error recorded during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunError {
    pub kind: ErrorKind,

    pub message: String,

    /// Record key, for record-scoped errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,

    /// Property name, for field-scoped errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

impl RunError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            record: None,
            property: None,
        }
    }

    pub fn with_record(mut self, record: impl Into<String>) -> Self {
        self.record = Some(record.into());
        self
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }
}

/// Counters of one entity run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityStats {
    /// Records scanned, excluded ones included
    pub processed: usize,

    /// Records with a non-empty update set (committed, or computed in dry-run)
    pub updated: usize,

    /// Records with at least one field or custom anonymizer error
    pub errored: usize,

    /// Records changed per property
    pub per_property: BTreeMap<String, usize>,

    /// Rows deleted by truncation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<u64>,

    pub status: EntityStatus,

    pub errors: Vec<RunError>,
}

impl EntityStats {
    /// Create empty stats for a run that has not failed
    pub fn new() -> Self {
        Self {
            processed: 0,
            updated: 0,
            errored: 0,
            per_property: BTreeMap::new(),
            truncated: None,
            status: EntityStatus::Completed,
            errors: Vec::new(),
        }
    }

    /// Stats of an entity that never ran
    pub fn skipped(reason: RunError) -> Self {
        let mut stats = Self::new();
        stats.status = EntityStatus::Skipped;
        stats.errors.push(reason);
        stats
    }

    /// Count one changed record for each applied property
    pub fn add_properties<'a>(&mut self, properties: impl IntoIterator<Item = &'a String>) {
        for property in properties {
            *self.per_property.entry(property.clone()).or_insert(0) += 1;
        }
    }

    pub fn add_error(&mut self, error: RunError) {
        self.errors.push(error);
    }

    /// Fold another stats block into this one (counters only)
    pub fn merge(&mut self, other: &EntityStats) {
        self.processed += other.processed;
        self.updated += other.updated;
        self.errored += other.errored;
        for (property, count) in &other.per_property {
            *self.per_property.entry(property.clone()).or_insert(0) += count;
        }
        if let Some(rows) = other.truncated {
            self.truncated = Some(self.truncated.unwrap_or(0) + rows);
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == EntityStatus::Completed && self.errors.is_empty()
    }
}

impl Default for EntityStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub dry_run: bool,

    /// Per-entity stats keyed by `connection/entity`
    pub entities: BTreeMap<String, EntityStats>,

    /// Sum of every entity's counters
    pub totals: EntityStats,

    /// Wall-clock duration of the run
    pub duration_ms: u64,
}

impl Report {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            entities: BTreeMap::new(),
            totals: EntityStats::new(),
            duration_ms: 0,
        }
    }

    /// Report key of an entity on a connection
    pub fn key(connection: &str, entity: &str) -> String {
        format!("{connection}/{entity}")
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Record the rows deleted for an entity
    pub fn record_truncation(&mut self, connection: &str, entity: &str, rows: u64) {
        let stats = self
            .entities
            .entry(Self::key(connection, entity))
            .or_default();
        stats.truncated = Some(rows);
        self.totals.truncated = Some(self.totals.truncated.unwrap_or(0) + rows);
    }

    /// Add an entity's stats, keeping any truncation already recorded for it
    pub fn add_entity(&mut self, connection: &str, entity: &str, mut stats: EntityStats) {
        let key = Self::key(connection, entity);
        let previous = self.entities.remove(&key);
        if let Some(previous) = previous {
            stats.truncated = stats.truncated.or(previous.truncated);
            let mut errors = previous.errors;
            errors.append(&mut stats.errors);
            stats.errors = errors;
            if previous.status != EntityStatus::Completed && stats.status == EntityStatus::Completed {
                stats.status = previous.status;
            }
        }

        self.totals.processed += stats.processed;
        self.totals.updated += stats.updated;
        self.totals.errored += stats.errored;
        for (property, count) in &stats.per_property {
            *self.totals.per_property.entry(property.clone()).or_insert(0) += count;
        }
        if !stats.is_successful() {
            self.totals.status = EntityStatus::Failed;
        }
        self.entities.insert(key, stats);
    }

    pub fn entity(&self, connection: &str, entity: &str) -> Option<&EntityStats> {
        self.entities.get(&Self::key(connection, entity))
    }

    /// Number of recorded errors across all entities
    pub fn error_count(&self) -> usize {
        self.entities.values().map(|s| s.errors.len()).sum()
    }

    pub fn is_successful(&self) -> bool {
        self.entities.values().all(EntityStats::is_successful)
    }

    pub fn was_cancelled(&self) -> bool {
        self.entities
            .values()
            .any(|s| s.status == EntityStatus::Cancelled)
    }

    /// Log the report
    pub fn log_summary(&self) {
        tracing::info!(
            dry_run = self.dry_run,
            entities = self.entities.len(),
            processed = self.totals.processed,
            updated = self.totals.updated,
            errored = self.totals.errored,
            duration_ms = self.duration_ms,
            "Anonymization completed"
        );

        for (key, stats) in &self.entities {
            tracing::info!(
                entity = %key,
                status = ?stats.status,
                processed = stats.processed,
                updated = stats.updated,
                errored = stats.errored,
                truncated = ?stats.truncated,
                "Entity summary"
            );
        }

        if self.error_count() > 0 {
            tracing::warn!(
                error_count = self.error_count(),
                "Anonymization completed with errors"
            );
            for (key, stats) in &self.entities {
                for error in &stats.errors {
                    tracing::warn!(
                        entity = %key,
                        kind = ?error.kind,
                        record = ?error.record,
                        property = ?error.property,
                        message = %error.message,
                        "Anonymization error"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(processed: usize, updated: usize, email: usize) -> EntityStats {
        let mut stats = EntityStats::new();
        stats.processed = processed;
        stats.updated = updated;
        for _ in 0..email {
            stats.add_properties([&"email".to_string()]);
        }
        stats
    }

    #[test]
    fn test_report_totals() {
        let mut report = Report::new(false);
        report.add_entity("default", "users", stats(10, 5, 5));
        report.add_entity("default", "orders", stats(4, 1, 0));

        assert_eq!(report.totals.processed, 14);
        assert_eq!(report.totals.updated, 6);
        assert_eq!(report.totals.per_property["email"], 5);
        assert!(report.is_successful());
        assert_eq!(report.entity("default", "users").unwrap().updated, 5);
    }

    #[test]
    fn test_truncation_is_kept_when_entity_added() {
        let mut report = Report::new(true);
        report.record_truncation("default", "sessions", 42);
        report.add_entity("default", "sessions", stats(0, 0, 0));

        let sessions = report.entity("default", "sessions").unwrap();
        assert_eq!(sessions.truncated, Some(42));
        assert_eq!(report.totals.truncated, Some(42));
    }

    #[test]
    fn test_failed_entity_marks_report() {
        let mut report = Report::new(false);
        let mut failed = stats(3, 0, 0);
        failed.status = EntityStatus::Failed;
        failed.add_error(RunError::new(ErrorKind::Store, "commit failed"));
        report.add_entity("crm", "contacts", failed);

        assert!(!report.is_successful());
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.totals.status, EntityStatus::Failed);
    }

    #[test]
    fn test_report_serializes() {
        let mut report = Report::new(true).with_duration(Duration::from_millis(1500));
        report.add_entity("default", "users", stats(2, 1, 1));
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["dry_run"], serde_json::json!(true));
        assert_eq!(json["duration_ms"], serde_json::json!(1500));
        assert_eq!(json["entities"]["default/users"]["status"], "completed");
        assert_eq!(json["entities"]["default/users"]["per_property"]["email"], 1);
    }

    #[test]
    fn test_stats_merge() {
        let mut total = stats(1, 1, 1);
        total.merge(&stats(2, 0, 0));
        assert_eq!(total.processed, 3);
        assert_eq!(total.per_property["email"], 1);
    }
}
