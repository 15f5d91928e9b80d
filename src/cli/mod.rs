//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Quarry using clap.

pub mod commands;

use crate::domain::QuarryError;
use clap::{Parser, Subcommand};

/// Process exit codes
pub mod exit_codes {
    /// Success, or nothing to do
    pub const SUCCESS: i32 = 0;
    /// The explicitly requested datatype was skipped
    pub const SKIPPED: i32 = 1;
    /// Invalid configuration or unknown datatype
    pub const CONFIGURATION: i32 = 2;
    /// A backend could not be reached
    pub const CONNECTION: i32 = 4;
    /// The run stopped on an error
    pub const FATAL: i32 = 5;
    /// Stopped by SIGINT/SIGTERM, progress saved
    pub const INTERRUPTED: i32 = 130;
}

/// Map a pipeline error to the exit code reported for it
pub fn exit_code_for(error: &QuarryError) -> i32 {
    match error {
        QuarryError::Configuration(_) | QuarryError::Schema(_) => exit_codes::CONFIGURATION,
        QuarryError::Database(_) => exit_codes::CONNECTION,
        QuarryError::ConcurrencyViolation(_) => exit_codes::SUCCESS,
        _ => exit_codes::FATAL,
    }
}

/// Quarry - resumable learning-platform data export
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(version, about, long_about = None)]
#[command(author = "Quarry Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "quarry.toml", env = "QUARRY_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "QUARRY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export datatypes to JSON-lines artifacts, resuming from saved cursors
    Export(commands::export::ExportArgs),

    /// Show per-datatype export status
    Status(commands::status::StatusArgs),

    /// Forget export progress of one or all datatypes
    Reset(commands::reset::ResetArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
