//! Domain error types
//!
//! This module defines the error hierarchy for Quarry.
//! All errors are domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main Quarry error type
///
/// This is the primary error type used throughout the pipeline. The variants
/// map onto the recovery policy the orchestrator applies: schema and mapping
/// errors are fatal, `NotMigratable` is skipped, I/O style errors propagate to
/// the next scheduled run, and `ConcurrencyViolation` is a no-op exit.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Descriptor or registry errors (unknown datatype, malformed field list)
    #[error("Schema error: {0}")]
    Schema(String),

    /// A source row could not be mapped to its entity descriptor
    #[error("Mapping error in datatype '{datatype}', field '{field}': {reason} (row: {row})")]
    Mapping {
        /// Datatype being mapped
        datatype: String,
        /// Offending field
        field: String,
        /// Why the value was rejected
        reason: String,
        /// Raw source row, serialized as JSON
        row: String,
    },

    /// The source table for a datatype does not exist
    #[error("Datatype '{datatype}' is not migratable: table '{table}' does not exist")]
    NotMigratable {
        /// Datatype that was requested
        datatype: String,
        /// Physical table name that was probed
        table: String,
    },

    /// Another export run holds the run lock
    #[error("Another export run is already in progress: {0}")]
    ConcurrencyViolation(String),

    /// Source database errors
    #[error("Database error: {0}")]
    Database(String),

    /// Artifact store errors (flush, delete, checksum)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Export log persistence errors
    #[error("State management error: {0}")]
    State(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl QuarryError {
    /// Build a mapping error from its parts
    pub fn mapping(
        datatype: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
        row: impl Into<String>,
    ) -> Self {
        QuarryError::Mapping {
            datatype: datatype.into(),
            field: field.into(),
            reason: reason.into(),
            row: row.into(),
        }
    }

    /// Whether the orchestrator should skip the datatype instead of failing
    pub fn is_not_migratable(&self) -> bool {
        matches!(self, QuarryError::NotMigratable { .. })
    }

    /// Whether this error comes from the run lock
    pub fn is_concurrency_violation(&self) -> bool {
        matches!(self, QuarryError::ConcurrencyViolation(_))
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for QuarryError {
    fn from(err: std::io::Error) -> Self {
        QuarryError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for QuarryError {
    fn from(err: serde_json::Error) -> Self {
        QuarryError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for QuarryError {
    fn from(err: toml::de::Error) -> Self {
        QuarryError::Configuration(format!("TOML parse error: {err}"))
    }
}
