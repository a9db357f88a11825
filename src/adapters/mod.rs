//! Record store integrations for Shroud.
//!
//! - [`store`] - The [`RecordStore`](store::RecordStore) trait the engine consumes
//! - [`memory`] - In-process tables, for tests and embedding
//! - [`postgresql`] - PostgreSQL implementation
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern**: the engine manipulates column-keyed
//! records and opaque keys only, so any backend that can page through a table
//! and write one page atomically can be anonymized.

pub mod memory;
pub mod postgresql;
pub mod store;

pub use memory::MemoryStore;
pub use postgresql::PostgresStore;
pub use store::{Page, PageToken, RecordStore, RecordUpdate};
