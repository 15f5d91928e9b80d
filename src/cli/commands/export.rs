//! Export command implementation
//!
//! This module implements the `export` command, which runs the migration
//! orchestrator once and reports the run summary.

use crate::cli::{exit_code_for, exit_codes};
use crate::config::{load_config, QuarryConfig};
use crate::core::export::{DatatypeOutcome, ExportSummary, MigrationOrchestrator, ProcessOptions};
use crate::core::registry::DatatypeRegistry;
use clap::Args;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Export only this datatype
    #[arg(long)]
    pub datatype: Option<String>,

    /// Forget saved progress and delete artifacts of the exported datatypes first
    #[arg(long)]
    pub reset: bool,

    /// Dry run mode - read the source, keep state and artifacts in memory
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl ExportArgs {
    /// Execute the export command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting export command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(exit_codes::CONFIGURATION);
            }
        };

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        if let Some(datatype) = &self.datatype {
            let known = DatatypeRegistry::from_config(&config.export)
                .and_then(|registry| registry.get(datatype).map(|_| ()));
            if let Err(e) = known {
                eprintln!("{e}");
                return Ok(exit_codes::CONFIGURATION);
            }
        }

        if config.application.dry_run {
            tracing::info!("Dry run mode enabled - nothing will be persisted");
            println!("🔍 DRY RUN MODE - artifacts and progress are kept in memory");
            println!();
        }

        if !self.yes && !config.application.dry_run && !self.confirm(&config)? {
            println!("Export cancelled.");
            return Ok(exit_codes::SUCCESS);
        }

        let shutdown_timeout = Duration::from_secs(config.export.shutdown_timeout_secs);

        let orchestrator =
            match MigrationOrchestrator::from_config(&config, shutdown_signal.clone()).await {
                Ok(o) => o,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to initialize export");
                    eprintln!("Failed to initialize export: {e}");
                    return Ok(match exit_code_for(&e) {
                        exit_codes::CONFIGURATION => exit_codes::CONFIGURATION,
                        _ => exit_codes::CONNECTION,
                    });
                }
            };

        if let Err(e) = orchestrator.source().test_connection().await {
            tracing::error!(error = %e, "Source database unreachable");
            eprintln!("Source database unreachable: {e}");
            return Ok(exit_codes::CONNECTION);
        }

        println!("🚀 Starting export...");
        println!();

        let options = ProcessOptions {
            datatype: self.datatype.clone(),
            reset: self.reset,
        };

        let result = tokio::select! {
            result = orchestrator.process(options) => result,
            _ = forced_shutdown(shutdown_signal, shutdown_timeout) => {
                tracing::warn!(
                    timeout_secs = shutdown_timeout.as_secs(),
                    "Shutdown timeout elapsed, abandoning the current page"
                );
                eprintln!("Shutdown timeout elapsed. The unflushed page will be re-read on the next run.");
                return Ok(exit_codes::INTERRUPTED);
            }
        };

        let summary = match result {
            Ok(s) => s,
            Err(e) if e.is_concurrency_violation() => {
                tracing::warn!(error = %e, "Export already running");
                println!("⏸️  {e}");
                println!("   Nothing to do.");
                return Ok(exit_codes::SUCCESS);
            }
            Err(e) => {
                tracing::error!(error = %e, "Export failed");
                eprintln!("Export failed: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        print_summary(&summary);
        Ok(summary_exit_code(&summary))
    }

    fn confirm(&self, config: &QuarryConfig) -> anyhow::Result<bool> {
        use std::io::{self, Write};

        println!("Export Configuration:");
        println!(
            "  Datatypes: {}",
            self.datatype.as_deref().unwrap_or("all selected")
        );
        println!("  Reset: {}", if self.reset { "yes" } else { "no" });
        println!("  Output: {}", config.export.output_dir.display());
        println!("  Page size: {}", config.export.page_size);
        println!();
        print!("Proceed with export? [y/N]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().eq_ignore_ascii_case("y"))
    }
}

/// Resolves once shutdown was requested and `timeout` has elapsed since
async fn forced_shutdown(mut shutdown: watch::Receiver<bool>, timeout: Duration) {
    if shutdown.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(timeout).await;
}

fn print_summary(summary: &ExportSummary) {
    println!();
    println!("📊 Export Summary (run {}):", summary.run_id);
    for report in &summary.datatypes {
        let label = match report.outcome {
            DatatypeOutcome::Completed => "✅ completed",
            DatatypeOutcome::Skipped => "⏭️  skipped",
            DatatypeOutcome::Failed => "❌ failed",
            DatatypeOutcome::Interrupted => "⏸️  interrupted",
        };
        println!(
            "  {:<20} {:<16} {:>10} records {:>6} pages",
            report.datatype.as_str(),
            label,
            report.records,
            report.pages
        );
        if let Some(reason) = &report.reason {
            println!("  {:<20} {reason}", "");
        }
    }
    if !summary.already_complete.is_empty() {
        let names: Vec<&str> = summary.already_complete.iter().map(|d| d.as_str()).collect();
        println!("  Already complete: {}", names.join(", "));
    }
    println!("  Total records: {}", summary.total_records());
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    if summary.notified {
        println!("  Completion notice delivered");
    }
    println!();

    if summary.interrupted {
        println!("⚠️  Export interrupted gracefully. Progress saved.");
        println!("   Run the same command to resume from checkpoint.");
    } else if summary.requested_skipped() {
        println!("⚠️  Requested datatype is not migratable on this site.");
    } else {
        println!("✅ Export completed!");
    }
}

/// Exit code for a finished run
pub fn summary_exit_code(summary: &ExportSummary) -> i32 {
    if summary.interrupted {
        exit_codes::INTERRUPTED
    } else if summary.requested_skipped() {
        exit_codes::SKIPPED
    } else if summary.is_successful() {
        exit_codes::SUCCESS
    } else {
        exit_codes::FATAL
    }
}
