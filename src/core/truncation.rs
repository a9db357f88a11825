//! Truncation manager
//!
//! Entities flagged `truncate` are emptied before any record of their
//! connection is anonymized, in ascending `truncate_order` (entities without
//! an order last, ties by entity name).

use crate::adapters::store::RecordStore;
use crate::domain::{EntitySpec, Result};
use std::cmp::Ordering;

/// Plans and executes pre-run deletes
#[derive(Debug, Clone, Copy)]
pub struct TruncationManager {
    dry_run: bool,
}

impl TruncationManager {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Entities to truncate, in execution order
    pub fn plan<'a>(specs: impl IntoIterator<Item = &'a EntitySpec>) -> Vec<&'a EntitySpec> {
        let mut planned: Vec<&EntitySpec> = specs.into_iter().filter(|s| s.truncate).collect();
        planned.sort_by(|a, b| truncation_order(a, b));
        planned
    }

    /// Delete the entity's rows, or only log in dry-run mode
    ///
    /// Returns the number of deleted rows, `None` in dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns the store's error when the delete fails.
    pub async fn execute(&self, store: &dyn RecordStore, spec: &EntitySpec) -> Result<Option<u64>> {
        if self.dry_run {
            tracing::info!(
                entity = %spec.name,
                table = %spec.table_name(),
                discriminator = ?spec.discriminator,
                "DRY RUN: Would truncate"
            );
            return Ok(None);
        }

        let rows = store.truncate(spec).await?;
        tracing::info!(
            entity = %spec.name,
            table = %spec.table_name(),
            discriminator = ?spec.discriminator,
            rows,
            "Truncated"
        );
        Ok(Some(rows))
    }
}

fn truncation_order(a: &EntitySpec, b: &EntitySpec) -> Ordering {
    let by_order = match (a.truncate_order, b.truncate_order) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_order.then_with(|| a.name.cmp(&b.name))
}
