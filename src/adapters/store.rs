//! Record store abstraction
//!
//! This module defines the trait record stores must implement to be
//! anonymized by Shroud. The core only manipulates column-keyed records and
//! opaque keys; table names, paging and transactions belong to the store.

use crate::domain::{EntitySpec, Fields, Record, RecordKey, Result};
use async_trait::async_trait;

/// Opaque continuation token returned with a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of eligible records
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,

    /// Token of the next page, `None` on the last page
    pub next: Option<PageToken>,
}

/// Fields to write for one record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub key: RecordKey,
    pub fields: Fields,
}

/// Paged, transactional record source
///
/// Implementations must return every row of the entity's table (restricted to
/// its discriminator when set) exactly once across pages, and must write one
/// `apply_updates` call atomically.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store name used in logs
    fn name(&self) -> &str;

    /// Check that the store is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// Read the page after `token` (the first page when `None`)
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FetchFailed`](crate::domain::StoreError::FetchFailed)
    /// when the read fails and `InvalidPageToken` for tokens it did not issue.
    async fn list_eligible(
        &self,
        spec: &EntitySpec,
        token: Option<&PageToken>,
        limit: usize,
    ) -> Result<Page>;

    /// Write one page of updates as a single transaction
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CommitFailed`](crate::domain::StoreError::CommitFailed)
    /// after rolling the whole page back.
    async fn apply_updates(&self, spec: &EntitySpec, updates: &[RecordUpdate]) -> Result<()>;

    /// Delete the entity's rows (only its discriminator's rows when set)
    ///
    /// Returns the number of deleted rows.
    async fn truncate(&self, spec: &EntitySpec) -> Result<u64>;
}
