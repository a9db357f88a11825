// Shroud - Rule-driven database anonymization
// Copyright (c) 2025 Shroud Contributors
// Licensed under the MIT License

//! # Shroud - Rule-driven database anonymization
//!
//! Shroud overwrites personal data in existing database rows with realistic
//! synthetic values, driven by declarative entity and property specs.
//!
//! ## Overview
//!
//! - **Matching** records and fields with an OR-of-AND pattern language
//! - **Generating** replacement values from a registry of pluggable generators
//! - **Streaming** records page by page and committing each page atomically
//! - **Truncating** tables that should be emptied rather than anonymized
//!
//! ## Architecture
//!
//! Shroud follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Batch processing, truncation, orchestration and reporting
//! - [`anonymization`] - Matcher, generators, property pipeline and plug-in seams
//! - [`adapters`] - Record stores (in-memory, PostgreSQL)
//! - [`domain`] - Core value model, specs and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust
//! use shroud::adapters::MemoryStore;
//! use shroud::core::{Orchestrator, RunOptions};
//! use shroud::domain::{EntitySpec, PropertySpec};
//! use shroud::record;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> shroud::domain::Result<()> {
//! let store = Arc::new(MemoryStore::new("default").with_table(
//!     "users",
//!     vec![record! { "id" => 1, "email" => "jane@corp.example" }],
//! ));
//! let users = EntitySpec::new("users").property(PropertySpec::new("email", "email"));
//!
//! let report = Orchestrator::new()
//!     .with_store("default", store.clone())
//!     .run_all(&[users], &RunOptions::default().seed(7))
//!     .await?;
//!
//! assert_eq!(report.totals.updated, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Configuration problems are returned as [`domain::ShroudError`] before any
//! store is touched. Generator, custom anonymizer and store failures during a
//! run are recorded in the [`core::Report`] instead.

pub mod adapters;
pub mod anonymization;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;

pub use domain::{Result, ShroudError};
