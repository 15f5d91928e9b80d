//! Core business logic for Quarry.
//!
//! # Modules
//!
//! - [`entity`] - Entity descriptors: field lists, kinds, defaults and hooks
//! - [`transform`] - Record mapping and value cleaning
//! - [`query`] - Datatype queries and keyset cursors
//! - [`registry`] - The datatype catalog filtered by configuration
//! - [`state`] - The export log: per-datatype cursors and status
//! - [`export`] - Orchestration, batch writing and event exports
//!
//! # Export Workflow
//!
//! For every planned datatype:
//!
//! 1. **Count**: Rows remaining after the saved cursor
//! 2. **Fetch**: One page in cursor order
//! 3. **Map**: Validate, clean and stamp every row
//! 4. **Flush**: Append the page to the datatype's artifact
//! 5. **Checkpoint**: Advance the cursor to the last flushed row
//!
//! # Example
//!
//! ```rust,no_run
//! use quarry::config::load_config;
//! use quarry::core::export::{MigrationOrchestrator, ProcessOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("quarry.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let orchestrator = MigrationOrchestrator::from_config(&config, shutdown_rx).await?;
//! let summary = orchestrator.process(ProcessOptions::default()).await?;
//!
//! println!("Records: {}", summary.total_records());
//! # Ok(())
//! # }
//! ```

pub mod entity;
pub mod export;
pub mod query;
pub mod registry;
pub mod state;
pub mod transform;
