//! Status command implementation
//!
//! This module implements the `status` command, which lists every known
//! datatype with its saved export status.

use crate::adapters::database::create_state_storage;
use crate::cli::exit_codes;
use crate::config::load_config;
use crate::core::registry::{DatatypeRegistry, RegisteredDatatype};
use crate::core::state::{ExportCursor, ExportLog, ExportStatus};
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show only this datatype
    #[arg(long)]
    pub datatype: Option<String>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking export status");

        println!("📊 Export Status");
        println!();

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(exit_codes::CONFIGURATION);
            }
        };
        // status always reads the persisted log
        config.application.dry_run = false;

        let registry = match DatatypeRegistry::from_config(&config.export) {
            Ok(r) => r,
            Err(e) => {
                println!("❌ {e}");
                return Ok(exit_codes::CONFIGURATION);
            }
        };

        let entries: Vec<&RegisteredDatatype> = match &self.datatype {
            Some(name) => match registry.get(name) {
                Ok(entry) => vec![entry],
                Err(e) => {
                    println!("❌ {e}");
                    return Ok(exit_codes::CONFIGURATION);
                }
            },
            None => registry.all().iter().collect(),
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

        let last_completed = match log.last_completed().await {
            Ok(l) => l,
            Err(e) => {
                println!("❌ Failed to read the export log");
                println!("   Error: {e}");
                return Ok(exit_codes::FATAL);
            }
        };

        println!(
            "{:<20} {:<10} {:<18} {:>12} {:<24} {:<20}",
            "Datatype", "Selected", "Status", "Records", "Position", "Updated"
        );
        println!("{}", "-".repeat(108));

        let mut failures = Vec::new();
        for entry in entries {
            let cursor = match log.get_cursor(&entry.name).await {
                Ok(c) => c,
                Err(e) => {
                    println!("❌ Failed to read cursor of {}: {e}", entry.name);
                    return Ok(exit_codes::FATAL);
                }
            };
            println!("{}", format_row(entry, &cursor));
            if let Some(error) = &cursor.last_error {
                failures.push((entry.name.clone(), error.clone()));
            }
        }

        println!();
        if let Some(last) = last_completed {
            println!("Last completed datatype: {last}");
        }
        if !failures.is_empty() {
            println!();
            println!("⚠️  Last errors:");
            for (name, error) in failures {
                println!("  {name}: {error}");
            }
        }

        Ok(exit_codes::SUCCESS)
    }
}

fn selection_label(entry: &RegisteredDatatype) -> &'static str {
    match (entry.required, entry.enabled) {
        (true, _) => "required",
        (false, true) => "enabled",
        (false, false) => "-",
    }
}

fn status_label(status: ExportStatus) -> &'static str {
    match status {
        ExportStatus::Completed => "✅ Completed",
        ExportStatus::InProgress => "🔄 In Progress",
        ExportStatus::Failed => "❌ Failed",
        ExportStatus::NotStarted => "⏸️  Not Started",
    }
}

fn format_row(entry: &RegisteredDatatype, cursor: &ExportCursor) -> String {
    let position = cursor
        .position
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let updated = if cursor.status == ExportStatus::NotStarted {
        "Never".to_string()
    } else {
        cursor.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()
    };

    format!(
        "{:<20} {:<10} {:<18} {:>12} {:<24} {:<20}",
        entry.name.as_str(),
        selection_label(entry),
        status_label(cursor.status),
        cursor.records_exported,
        position,
        updated
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::core::state::CursorValue;

    #[test]
    fn test_format_row() {
        let registry = DatatypeRegistry::from_config(&ExportConfig::default()).unwrap();
        let users = registry.get("users").unwrap();

        let mut cursor = ExportCursor::new(users.name.clone());
        let row = format_row(users, &cursor);
        assert!(row.starts_with("users"));
        assert!(row.contains("required"));
        assert!(row.contains("Never"));

        cursor.advance(CursorValue::id(9), 9);
        cursor.mark_completed();
        let row = format_row(users, &cursor);
        assert!(row.contains("Completed"));
        assert!(row.contains('9'));
    }

    #[test]
    fn test_selection_label_for_optional() {
        let registry = DatatypeRegistry::from_config(&ExportConfig::default()).unwrap();
        assert_eq!(selection_label(registry.get("logstore").unwrap()), "-");
    }
}
