//! In-memory record store
//!
//! Tables are vectors of rows held behind a mutex. Pages are offsets into the
//! (discriminator-filtered) table; updates are applied to a copy of the table
//! that replaces the original only when every row was found, which gives the
//! same all-or-nothing page semantics as a database transaction.
//!
//! Failure injection (`fail_commit`, `fail_fetch`, `fail_truncate`) lets tests
//! exercise the error paths of the batch processor.

use super::store::{Page, PageToken, RecordStore, RecordUpdate};
use crate::domain::{EntitySpec, Fields, Record, RecordKey, Result, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Failures {
    /// Table → 1-based `apply_updates` call numbers that fail
    commits: HashMap<String, BTreeSet<usize>>,
    fetches: HashSet<String>,
    truncates: HashSet<String>,
}

/// Record store backed by process memory
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    tables: Mutex<HashMap<String, Vec<Fields>>>,
    failures: Mutex<Failures>,
    commit_counts: Mutex<HashMap<String, usize>>,
    apply_calls: AtomicUsize,
    truncations: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tables: Mutex::new(HashMap::new()),
            failures: Mutex::new(Failures::default()),
            commit_counts: Mutex::new(HashMap::new()),
            apply_calls: AtomicUsize::new(0),
            truncations: Mutex::new(Vec::new()),
        }
    }

    /// Builder-style table seeding
    pub fn with_table(self, table: &str, rows: impl IntoIterator<Item = Record>) -> Self {
        for row in rows {
            self.insert(table, row);
        }
        self
    }

    /// Append a row to a table, creating the table when missing
    pub fn insert(&self, table: &str, row: Record) {
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .push(row.fields().clone());
    }

    /// Snapshot of a table's rows in insertion order
    pub fn rows(&self, table: &str) -> Vec<Fields> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    /// Number of `apply_updates` calls across all tables, failed ones included
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Truncated tables in call order, as `table` or `table[discriminator]`
    pub fn truncations(&self) -> Vec<String> {
        lock(&self.truncations).clone()
    }

    /// Make the `call`-th (1-based) `apply_updates` on `table` fail
    pub fn fail_commit(&self, table: &str, call: usize) {
        lock(&self.failures)
            .commits
            .entry(table.to_string())
            .or_default()
            .insert(call);
    }

    pub fn fail_fetch(&self, table: &str) {
        lock(&self.failures).fetches.insert(table.to_string());
    }

    pub fn fail_truncate(&self, table: &str) {
        lock(&self.failures).truncates.insert(table.to_string());
    }
}

/// Poisoning only happens after a panic in another holder; the data is still usable
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn in_scope(spec: &EntitySpec, row: &Fields) -> bool {
    match spec.discriminator.as_deref() {
        Some(discriminator) => row
            .get(&spec.discriminator_column)
            .and_then(|v| v.to_text())
            .map_or(false, |v| v == discriminator),
        None => true,
    }
}

fn key_of(spec: &EntitySpec, row: &Fields) -> RecordKey {
    RecordKey::new(
        spec.primary_key
            .iter()
            .map(|column| row.get(column).cloned().unwrap_or_default())
            .collect(),
    )
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn list_eligible(
        &self,
        spec: &EntitySpec,
        token: Option<&PageToken>,
        limit: usize,
    ) -> Result<Page> {
        let table = spec.table_name();
        if lock(&self.failures).fetches.contains(table) {
            return Err(StoreError::FetchFailed {
                table: table.to_string(),
                message: "injected fetch failure".to_string(),
            }
            .into());
        }

        let offset = match token {
            Some(token) => token
                .as_str()
                .parse::<usize>()
                .map_err(|_| StoreError::InvalidPageToken(token.as_str().to_string()))?,
            None => 0,
        };

        let tables = lock(&self.tables);
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let eligible: Vec<&Fields> = rows.iter().filter(|row| in_scope(spec, row)).collect();

        let records: Vec<Record> = eligible
            .iter()
            .skip(offset)
            .take(limit)
            .map(|row| Record::keyed_by(&spec.primary_key, (*row).clone()))
            .collect();
        let consumed = offset + records.len();
        let next = (consumed < eligible.len()).then(|| PageToken::new(consumed.to_string()));

        Ok(Page { records, next })
    }

    async fn apply_updates(&self, spec: &EntitySpec, updates: &[RecordUpdate]) -> Result<()> {
        let table = spec.table_name();
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let call = {
            let mut counts = lock(&self.commit_counts);
            let count = counts.entry(table.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let commit_failed = |message: String| StoreError::CommitFailed {
            table: table.to_string(),
            message,
        };

        if lock(&self.failures)
            .commits
            .get(table)
            .map_or(false, |calls| calls.contains(&call))
        {
            return Err(commit_failed("injected commit failure".to_string()).into());
        }

        let mut tables = lock(&self.tables);
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let mut staged = rows.clone();
        for update in updates {
            let row = staged
                .iter_mut()
                .find(|row| in_scope(spec, row) && key_of(spec, row) == update.key)
                .ok_or_else(|| commit_failed(format!("no row with key {}", update.key)))?;
            for (column, value) in &update.fields {
                row.insert(column.clone(), value.clone());
            }
        }
        *rows = staged;
        Ok(())
    }

    async fn truncate(&self, spec: &EntitySpec) -> Result<u64> {
        let table = spec.table_name();
        if lock(&self.failures).truncates.contains(table) {
            return Err(StoreError::TruncateFailed {
                table: table.to_string(),
                message: "injected truncate failure".to_string(),
            }
            .into());
        }

        let mut tables = lock(&self.tables);
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let before = rows.len();
        rows.retain(|row| spec.discriminator.is_some() && !in_scope(spec, row));
        let deleted = (before - rows.len()) as u64;

        let label = match spec.discriminator.as_deref() {
            Some(discriminator) => format!("{table}[{discriminator}]"),
            None => table.to_string(),
        };
        lock(&self.truncations).push(label);
        Ok(deleted)
    }
}
