//! Integration tests for graceful shutdown functionality
//!
//! These tests verify that:
//! - A shutdown signal stops the run between pages
//! - The cursor reflects exactly the flushed pages
//! - The next run resumes from the interrupted position
//! - No record is written twice across the interruption

use async_trait::async_trait;
use quarry::adapters::database::SourceDatabase;
use quarry::adapters::filesystem::LogNotifier;
use quarry::adapters::memory::{MemoryArtifactStore, MemorySource, MemoryStateStorage};
use quarry::config::ExportConfig;
use quarry::core::export::{DatatypeOutcome, MigrationOrchestrator, ProcessOptions};
use quarry::core::query::SourceQuery;
use quarry::core::registry::DatatypeRegistry;
use quarry::core::state::{CursorValue, ExportStatus};
use quarry::core::transform::RecordMapper;
use quarry::domain::{DatatypeName, Result, SourceRow};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Source that requests shutdown once a given number of pages was served
struct InterruptingSource {
    inner: MemorySource,
    fetches: AtomicU64,
    interrupt_after: u64,
    shutdown: watch::Sender<bool>,
}

#[async_trait]
impl SourceDatabase for InterruptingSource {
    async fn test_connection(&self) -> Result<()> {
        self.inner.test_connection().await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.inner.table_exists(table).await
    }

    async fn count(&self, query: &SourceQuery<'_>) -> Result<u64> {
        self.inner.count(query).await
    }

    async fn fetch(&self, query: &SourceQuery<'_>) -> Result<Vec<SourceRow>> {
        let rows = self.inner.fetch(query).await?;
        if self.fetches.fetch_add(1, Ordering::SeqCst) + 1 == self.interrupt_after {
            let _ = self.shutdown.send(true);
        }
        Ok(rows)
    }

    fn description(&self) -> String {
        "interrupting source".to_string()
    }
}

fn user(id: i64) -> SourceRow {
    SourceRow::new()
        .with("id", id)
        .with("username", format!("user{id}"))
}

fn only_users() -> ProcessOptions {
    ProcessOptions {
        datatype: Some("users".to_string()),
        reset: false,
    }
}

#[tokio::test]
async fn test_shutdown_signal_propagation() {
    let (shutdown_tx, shutdown_rx1) = watch::channel(false);
    let shutdown_rx2 = shutdown_rx1.clone();

    assert!(!*shutdown_rx1.borrow());
    assert!(!*shutdown_rx2.borrow());

    shutdown_tx.send(true).unwrap();

    assert!(*shutdown_rx1.borrow());
    assert!(*shutdown_rx2.borrow());
}

#[tokio::test]
async fn test_interrupted_run_resumes_without_duplicates() {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let source = InterruptingSource {
        inner: MemorySource::new().with_table("user", (1..=5).map(user).collect()),
        fetches: AtomicU64::new(0),
        interrupt_after: 1,
        shutdown: shutdown_tx.clone(),
    };

    let registry = Arc::new(DatatypeRegistry::from_config(&ExportConfig::default()).unwrap());
    let store = Arc::new(MemoryArtifactStore::new());
    let state = Arc::new(MemoryStateStorage::new());
    let orchestrator = MigrationOrchestrator::new(
        registry,
        Arc::new(source),
        store.clone(),
        state,
        Arc::new(LogNotifier),
        RecordMapper::new(0),
    )
    .with_page_size(2)
    .with_shutdown(shutdown_rx);

    let users = DatatypeName::new("users").unwrap();

    // first page is flushed, then the run stops
    let summary = orchestrator.process(only_users()).await.unwrap();
    assert!(summary.interrupted);
    assert!(!summary.notified);
    let report = summary.report("users").unwrap();
    assert_eq!(report.outcome, DatatypeOutcome::Interrupted);
    assert_eq!(report.records, 2);

    let cursor = orchestrator.export_log().get_cursor(&users).await.unwrap();
    assert_eq!(cursor.status, ExportStatus::InProgress);
    assert_eq!(cursor.position, Some(CursorValue::id(2)));
    assert_eq!(cursor.records_exported, 2);

    // the next run picks up after id 2
    shutdown_tx.send(false).unwrap();
    let summary = orchestrator.process(only_users()).await.unwrap();
    assert!(!summary.interrupted);
    assert_eq!(summary.report("users").unwrap().records, 3);

    let ids: Vec<i64> = store
        .records(&users)
        .await
        .unwrap()
        .iter()
        .filter_map(|r| r["data"]["id"].as_i64())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    let cursor = orchestrator.export_log().get_cursor(&users).await.unwrap();
    assert!(cursor.is_completed());
    assert_eq!(cursor.records_exported, 5);
}

#[tokio::test]
async fn test_shutdown_before_run_changes_nothing() {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let registry = Arc::new(DatatypeRegistry::from_config(&ExportConfig::default()).unwrap());
    let state = Arc::new(MemoryStateStorage::new());
    let orchestrator = MigrationOrchestrator::new(
        registry,
        Arc::new(MemorySource::new().with_table("user", (1..=3).map(user).collect())),
        Arc::new(MemoryArtifactStore::new()),
        state.clone(),
        Arc::new(LogNotifier),
        RecordMapper::new(0),
    )
    .with_shutdown(shutdown_rx);

    let summary = orchestrator.process(only_users()).await.unwrap();
    assert!(summary.interrupted);
    assert!(summary.datatypes.is_empty());
    assert_eq!(state.writes(), 0);
}
