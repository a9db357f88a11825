//! Core execution engine for Shroud.
//!
//! # Modules
//!
//! - [`batch`] - Paged processing and commit of one entity
//! - [`truncation`] - Pre-run deletes, in truncation order
//! - [`orchestrator`] - Connection resolution, sequencing and aggregation
//! - [`report`] - Per-entity and total statistics
//!
//! # Run Workflow
//!
//! 1. **Prepare**: Validate every entity, compile rules, resolve generators
//! 2. **Truncate**: Empty the flagged entities of each connection
//! 3. **Stream**: Read each entity page by page
//! 4. **Apply**: Compute the minimal update set of every record
//! 5. **Commit**: Write each page in one transaction (skipped in dry-run)
//! 6. **Report**: Aggregate statistics and errors
//!
//! # Example
//!
//! ```rust
//! use shroud::adapters::memory::MemoryStore;
//! use shroud::core::{Orchestrator, RunOptions};
//! use shroud::domain::{EntitySpec, PropertySpec, RuleConfig};
//! use shroud::record;
//! use std::sync::Arc;
//!
//! # async fn example() -> shroud::domain::Result<()> {
//! let store = Arc::new(MemoryStore::new("memory").with_table(
//!     "users",
//!     (1..=10).map(|id| record! { "id" => id, "email" => format!("user{id}@corp.com") }),
//! ));
//!
//! let users = EntitySpec::new("users")
//!     .exclude(RuleConfig::new().field("id", "<=5"))
//!     .property(PropertySpec::new("email", "email").weight(1));
//!
//! let report = Orchestrator::new()
//!     .with_store("default", store)
//!     .run_all(&[users], &RunOptions::default())
//!     .await?;
//!
//! assert_eq!(report.totals.processed, 10);
//! assert_eq!(report.totals.updated, 5);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod orchestrator;
pub mod report;
pub mod truncation;

pub use batch::{BatchConfig, BatchProcessor, CommitFailurePolicy};
pub use orchestrator::{Orchestrator, RunOptions};
pub use report::{EntityStats, EntityStatus, ErrorKind, Report, RunError};
pub use truncation::TruncationManager;
