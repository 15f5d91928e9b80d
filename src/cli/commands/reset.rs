//! Reset command implementation
//!
//! This module implements the `reset` command, which returns one or all
//! datatypes to `not started` and deletes their artifacts, without running
//! an export.

use crate::adapters::database::{create_artifact_store, create_state_storage};
use crate::cli::exit_codes;
use crate::config::load_config;
use crate::core::export::RunLock;
use crate::core::registry::DatatypeRegistry;
use crate::core::state::ExportLog;
use clap::Args;

/// Arguments for the reset command
#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Reset only this datatype
    #[arg(long)]
    pub datatype: Option<String>,

    /// Keep already written artifacts
    #[arg(long)]
    pub keep_artifacts: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl ResetArgs {
    /// Execute the reset command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(exit_codes::CONFIGURATION);
            }
        };
        config.application.dry_run = false;

        let registry = match DatatypeRegistry::from_config(&config.export) {
            Ok(r) => r,
            Err(e) => {
                println!("❌ {e}");
                return Ok(exit_codes::CONFIGURATION);
            }
        };
        let targets = match &self.datatype {
            Some(name) => match registry.get(name) {
                Ok(entry) => vec![entry.name.clone()],
                Err(e) => {
                    println!("❌ {e}");
                    return Ok(exit_codes::CONFIGURATION);
                }
            },
            None => registry.all().iter().map(|e| e.name.clone()).collect(),
        };

        if !self.yes {
            use std::io::{self, Write};

            let scope = self.datatype.as_deref().unwrap_or("ALL datatypes");
            print!("Reset export progress of {scope}? [y/N]: ");
            io::stdout().flush()?;
            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Reset cancelled.");
                return Ok(exit_codes::SUCCESS);
            }
        }

        let _lock = match RunLock::acquire(&config.state.path) {
            Ok(lock) => lock,
            Err(e) if e.is_concurrency_violation() => {
                println!("⏸️  {e}");
                println!("   Try again once the running export has finished.");
                return Ok(exit_codes::SUCCESS);
            }
            Err(e) => {
                println!("❌ {e}");
                return Ok(exit_codes::FATAL);
            }
        };

        let storage = match create_state_storage(&config).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to open the export log");
                println!("   Error: {e}");
                return Ok(exit_codes::CONNECTION);
            }
        };
        let log = ExportLog::new(storage);
        let _lease = match log.acquire_lease().await {
            Ok(lease) => lease,
            Err(e) if e.is_concurrency_violation() => {
                println!("⏸️  {e}");
                println!("   Try again once the running export has finished.");
                return Ok(exit_codes::SUCCESS);
            }
            Err(e) => {
                println!("❌ {e}");
                return Ok(exit_codes::FATAL);
            }
        };
        let store = create_artifact_store(&config)?;

        for datatype in &targets {
            log.reset(datatype).await?;
            if !self.keep_artifacts {
                store.delete(datatype).await?;
            }
            println!("🔄 Reset {datatype}");
        }
        if self.datatype.is_none() {
            log.reset_all().await?;
        }

        println!();
        println!("✅ Reset {} datatype(s)", targets.len());
        Ok(exit_codes::SUCCESS)
    }
}
