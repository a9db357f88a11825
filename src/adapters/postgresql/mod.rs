//! PostgreSQL record store
//!
//! This module provides the pooled client, value conversion and the
//! [`RecordStore`](crate::adapters::store::RecordStore) implementation for PostgreSQL.

pub mod client;
pub mod store;
pub mod value;

pub use client::PostgreSQLClient;
pub use store::PostgresStore;
