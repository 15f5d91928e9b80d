//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Quarry configuration file.

use crate::cli::exit_codes;
use crate::config::{load_config, StateBackend};
use crate::core::registry::DatatypeRegistry;
use crate::core::transform::RecordMapper;
use clap::Args;
use secrecy::ExposeSecret;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as part of loading
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                return Ok(exit_codes::CONFIGURATION);
            }
        };

        let registry = match DatatypeRegistry::from_config(&config.export) {
            Ok(r) => r,
            Err(e) => {
                println!("❌ Datatype selection is invalid");
                println!("   Error: {e}");
                println!();
                return Ok(exit_codes::CONFIGURATION);
            }
        };

        let aliases = RecordMapper::new(config.export.actor_id)
            .with_aliases(&config.export.field_aliases)
            .and_then(|mapper| mapper.validate_aliases(&registry));
        if let Err(e) = aliases {
            println!("❌ Field aliases are invalid");
            println!("   Error: {e}");
            println!();
            return Ok(exit_codes::CONFIGURATION);
        }

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!(
            "  Source: {}",
            config.source.connection_string.expose_secret().redacted_dsn()
        );
        println!("  Table Prefix: {}", config.source.table_prefix);
        println!("  Max Connections: {}", config.source.max_connections);
        println!("  Page Size: {}", config.export.page_size);
        println!("  Flush Threshold: {}", config.export.flush_threshold);
        println!("  Output Directory: {}", config.export.output_dir.display());
        match config.state.backend {
            StateBackend::File => {
                println!("  Export Log: file ({})", config.state.path.display());
            }
            StateBackend::PostgreSQL => {
                let dsn = config
                    .state
                    .connection_string
                    .as_ref()
                    .map(|c| c.expose_secret().redacted_dsn())
                    .unwrap_or_default();
                println!("  Export Log: postgresql ({dsn}, table {})", config.state.table);
            }
        }

        let selected: Vec<String> = registry
            .selected()
            .map(|entry| {
                if entry.events_enabled {
                    format!("{} (events)", entry.name)
                } else {
                    entry.name.to_string()
                }
            })
            .collect();
        println!("  Datatypes: {}", selected.join(", "));
        println!();

        Ok(exit_codes::SUCCESS)
    }
}
