//! Domain error types
//!
//! This module defines the error hierarchy for Shroud. Configuration errors are
//! detected before any store is touched and abort the run; the remaining kinds are
//! scoped to a field, record or page and are normally accumulated into the report.

use thiserror::Error;

/// Main Shroud error type
///
/// This is the primary error type used throughout the application.
#[derive(Debug, Error)]
pub enum ShroudError {
    /// Malformed rule sets, unknown generator types, missing service references
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A generator failed while producing a value
    #[error("Generator error: {0}")]
    Generator(String),

    /// Record store fetch, commit or truncate failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A custom anonymizer failed for a record
    #[error("Custom anonymizer error: {0}")]
    CustomService(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Record store errors
///
/// Errors raised by [`RecordStore`](crate::adapters::store::RecordStore)
/// implementations. They don't expose driver types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not obtain a connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Paged read failed
    #[error("Fetch failed for '{table}': {message}")]
    FetchFailed { table: String, message: String },

    /// Page commit failed and was rolled back
    #[error("Commit failed for '{table}': {message}")]
    CommitFailed { table: String, message: String },

    /// Truncation failed
    #[error("Truncate failed for '{table}': {message}")]
    TruncateFailed { table: String, message: String },

    /// Backing table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A value could not be converted to or from the store representation
    #[error("Value conversion failed for column '{column}': {message}")]
    Conversion { column: String, message: String },

    /// Malformed page token
    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),
}

impl From<std::io::Error> for ShroudError {
    fn from(err: std::io::Error) -> Self {
        ShroudError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ShroudError {
    fn from(err: serde_json::Error) -> Self {
        ShroudError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ShroudError {
    fn from(err: toml::de::Error) -> Self {
        ShroudError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shroud_error_display() {
        let err = ShroudError::Configuration("unknown generator 'foo'".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: unknown generator 'foo'"
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let store_err = StoreError::CommitFailed {
            table: "users".to_string(),
            message: "deadlock detected".to_string(),
        };
        let err: ShroudError = store_err.into();
        assert!(matches!(err, ShroudError::Store(_)));
        assert!(err.to_string().contains("users"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: ShroudError = io_err.into();
        assert!(matches!(err, ShroudError::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: ShroudError = toml_err.into();
        assert!(matches!(err, ShroudError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_shroud_error_implements_std_error() {
        let err = ShroudError::Generator("Test error".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
