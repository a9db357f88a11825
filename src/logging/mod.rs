//! Logging and observability
//!
//! Console logs go to stderr so `run --format json` can print the report
//! on stdout. An optional JSON log file is written through a non-blocking
//! rolling appender.
//!
//! # Example
//!
//! ```no_run
//! use shroud::config::LoggingConfig;
//! use shroud::logging::init_logging;
//!
//! let _guard = init_logging("info", &LoggingConfig::default()).expect("Failed to initialize logging");
//! tracing::info!(entity = "users", "Anonymizing");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};
