//! Integration tests for dry-run mode
//!
//! These tests verify that a dry-run configuration keeps artifacts and the
//! export log in memory while the export itself runs normally.

use quarry::adapters::database::{create_artifact_store, create_notifier, create_state_storage};
use quarry::adapters::memory::MemorySource;
use quarry::config::{parse_config, QuarryConfig};
use quarry::core::export::{DatatypeOutcome, MigrationOrchestrator, ProcessOptions};
use quarry::core::registry::DatatypeRegistry;
use quarry::core::transform::RecordMapper;
use quarry::domain::SourceRow;
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &TempDir, dry_run: bool) -> QuarryConfig {
    parse_config(&format!(
        r#"
        [application]
        dry_run = {dry_run}

        [source]
        connection_string = "postgresql://moodle@localhost/moodle"

        [export]
        output_dir = "{out}"

        [state]
        path = "{state}"

        [logging]
        local_enabled = false
        "#,
        out = dir.path().join("export").display(),
        state = dir.path().join("state").display(),
    ))
    .unwrap()
}

async fn run(config: &QuarryConfig) -> quarry::core::export::ExportSummary {
    let rows = (1..=3)
        .map(|id| SourceRow::new().with("id", id).with("username", format!("u{id}")))
        .collect();
    let orchestrator = MigrationOrchestrator::new(
        Arc::new(DatatypeRegistry::from_config(&config.export).unwrap()),
        Arc::new(MemorySource::new().with_table("user", rows)),
        create_artifact_store(config).unwrap(),
        create_state_storage(config).await.unwrap(),
        create_notifier(config),
        RecordMapper::new(config.export.actor_id),
    )
    .with_page_size(2);

    orchestrator
        .process(ProcessOptions {
            datatype: Some("users".to_string()),
            reset: false,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_dry_run_exports_but_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, true);

    let summary = run(&config).await;
    let report = summary.report("users").unwrap();
    assert_eq!(report.outcome, DatatypeOutcome::Completed);
    assert_eq!(report.records, 3);
    assert!(summary.notified);

    assert!(!dir.path().join("export").exists());
    assert!(!dir.path().join("state").exists());
}

#[tokio::test]
async fn test_dry_run_does_not_remember_progress() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, true);

    assert_eq!(run(&config).await.report("users").unwrap().records, 3);
    // fresh in-memory state each time
    assert_eq!(run(&config).await.report("users").unwrap().records, 3);
}

#[tokio::test]
async fn test_real_run_persists_artifacts_and_progress() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, false);

    let summary = run(&config).await;
    assert_eq!(summary.report("users").unwrap().records, 3);
    assert!(dir.path().join("export").join("users.jsonl").exists());
    assert!(dir.path().join("export").join("manifest.json").exists());
    assert!(dir.path().join("state").join("export_log.json").exists());

    // completed on the first run, nothing left the second time
    let summary = run(&config).await;
    assert!(summary.datatypes.is_empty());
    assert_eq!(summary.already_complete.len(), 1);
}
