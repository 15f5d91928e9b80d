//! External system integrations for Quarry.
//!
//! - [`database`] - Adapter traits and the factory that picks implementations
//! - [`postgresql`] - Platform database source and optional export log backend
//! - [`filesystem`] - JSON-lines artifacts, export log file and run manifest
//! - [`memory`] - In-memory adapters for dry runs and tests
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies
//! and enable testing with in-memory implementations. The orchestrator only
//! sees the traits in [`database::traits`].
//!
//! ```rust,no_run
//! use quarry::adapters::database::traits::SourceDatabase;
//! use quarry::adapters::postgresql::PostgresSource;
//! use quarry::config::{secret_string, SourceConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SourceConfig {
//!     connection_string: secret_string("postgresql://moodle:pw@localhost/moodle".to_string()),
//!     table_prefix: "mdl_".to_string(),
//!     max_connections: 4,
//!     connection_timeout_seconds: 30,
//!     statement_timeout_seconds: 60,
//! };
//!
//! let source = PostgresSource::from_config(&config)?;
//! source.test_connection().await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod filesystem;
pub mod memory;
pub mod postgresql;
