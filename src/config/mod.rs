//! Configuration management for Quarry.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Quarry uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `QUARRY_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Validation with descriptive messages
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level and dry-run mode
//! - [`SourceConfig`] - Source database connection and table prefix
//! - [`ExportConfig`] - Page size, flush threshold, output, datatype selection
//! - [`StateConfig`] - Export log backend
//! - [`LoggingConfig`] - Local file logging
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [source]
//! connection_string = "${QUARRY_SOURCE_DSN}"
//! table_prefix = "mdl_"
//!
//! [export]
//! page_size = 1000
//! flush_threshold = 500
//! output_dir = "./export"
//! datatypes = ["forumposts", "quizattempts"]
//!
//! [state]
//! backend = "file"
//! path = "./state"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, ExportConfig, LoggingConfig, QuarryConfig, SourceConfig, StateBackend,
    StateConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
