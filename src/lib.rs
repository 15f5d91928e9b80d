// Quarry - Resumable learning-platform data export
// Copyright (c) 2025 Quarry Contributors
// Licensed under the MIT License

//! # Quarry - Resumable Learning-Platform Data Export
//!
//! Quarry reads the tables of a learning platform's PostgreSQL database page
//! by page, maps each row to a flat record and appends it to one JSON-lines
//! artifact per datatype. Progress is saved after every flushed page, so an
//! interrupted run resumes exactly where it stopped.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Datatype registry, entity mapping, queries, export log, orchestration
//! - [`adapters`] - Source database, export log backends, artifact stores
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quarry::config::load_config;
//! use quarry::core::export::{MigrationOrchestrator, ProcessOptions};
//! use tokio::sync::watch;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("quarry.toml")?;
//! let (_tx, shutdown) = watch::channel(false);
//!
//! let orchestrator = MigrationOrchestrator::from_config(&config, shutdown).await?;
//! let summary = orchestrator.process(ProcessOptions::default()).await?;
//!
//! println!("Exported {} records", summary.total_records());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`domain::Result`], whose error type is
//! [`domain::QuarryError`]. A datatype whose tables are missing on the
//! connected site reports [`domain::QuarryError::NotMigratable`] and is
//! skipped; every other error stops the run.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
