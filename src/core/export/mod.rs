//! Export orchestration and batch writing
//!
//! This module provides the core export logic for Quarry, including:
//! - Buffered, all-or-nothing batch writes
//! - The migration orchestrator and its run lock
//! - Single-record event exports
//! - Run summaries

pub mod batch;
pub mod coordinator;
pub mod events;
pub mod lock;
pub mod summary;

pub use batch::{BatchWriter, OutputBatch};
pub use coordinator::{MigrationOrchestrator, ProcessOptions};
pub use events::EventExporter;
pub use lock::RunLock;
pub use summary::{DatatypeOutcome, DatatypeReport, ExportSummary};
