//! Migration orchestrator - main driver of the export process
//!
//! This module coordinates the whole export workflow: run lock, optional
//! reset, planning, the per-datatype page loop, progress checkpoints and the
//! completion notice.
//!
//! Each page is handled as fetch, map every row, append, flush, advance. The
//! cursor only moves after the flush succeeded, so a crash or error at any
//! point leaves the next run re-reading the page that was not durably
//! written.

use crate::adapters::database::factory::{
    create_artifact_store, create_notifier, create_source, create_state_storage,
};
use crate::adapters::database::traits::{
    ArtifactStore, CompletionNotifier, RunCompletion, SourceDatabase, StateStorage,
};
use crate::config::QuarryConfig;
use crate::core::export::batch::BatchWriter;
use crate::core::export::lock::RunLock;
use crate::core::export::summary::{DatatypeOutcome, DatatypeReport, ExportSummary};
use crate::core::query::QueryProvider;
use crate::core::registry::{DatatypeRegistry, RegisteredDatatype};
use crate::core::state::ExportLog;
use crate::core::transform::RecordMapper;
use crate::domain::ids::DatatypeName;
use crate::domain::Result;
use crate::{log_batch_processing, log_export_complete, log_export_start};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Options of a single run
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Restrict the run to one datatype
    pub datatype: Option<String>,
    /// Forget progress and delete artifacts of in-scope datatypes first
    pub reset: bool,
}

/// Drives datatypes through the export pipeline
pub struct MigrationOrchestrator {
    registry: Arc<DatatypeRegistry>,
    source: Arc<dyn SourceDatabase>,
    store: Arc<dyn ArtifactStore>,
    log: ExportLog,
    notifier: Arc<dyn CompletionNotifier>,
    mapper: RecordMapper,
    page_size: u64,
    flush_threshold: usize,
    lock_dir: Option<PathBuf>,
    shutdown: watch::Receiver<bool>,
}

impl MigrationOrchestrator {
    /// Create an orchestrator with default page size and flush threshold
    pub fn new(
        registry: Arc<DatatypeRegistry>,
        source: Arc<dyn SourceDatabase>,
        store: Arc<dyn ArtifactStore>,
        state: Arc<dyn StateStorage>,
        notifier: Arc<dyn CompletionNotifier>,
        mapper: RecordMapper,
    ) -> Self {
        let (_tx, shutdown) = watch::channel(false);
        Self {
            registry,
            source,
            store,
            log: ExportLog::new(state),
            notifier,
            mapper,
            page_size: 1000,
            flush_threshold: 500,
            lock_dir: None,
            shutdown,
        }
    }

    /// Build every collaborator from configuration
    ///
    /// In dry-run mode the artifact store and export log are in memory and
    /// no run lock is taken.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from the registry or mapper, and
    /// connection errors from the source or state backends.
    pub async fn from_config(
        config: &QuarryConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let registry = Arc::new(DatatypeRegistry::from_config(&config.export)?);
        let mapper =
            RecordMapper::new(config.export.actor_id).with_aliases(&config.export.field_aliases)?;
        mapper.validate_aliases(&registry)?;

        let source = create_source(&config.source).await?;
        let state = create_state_storage(config).await?;
        let store = create_artifact_store(config)?;
        let notifier = create_notifier(config);

        let mut orchestrator = Self::new(registry, source, store, state, notifier, mapper)
            .with_page_size(config.export.page_size)
            .with_flush_threshold(config.export.flush_threshold)
            .with_shutdown(shutdown);
        if !config.application.dry_run {
            orchestrator = orchestrator.with_lock_dir(config.state.path.clone());
        }
        Ok(orchestrator)
    }

    /// Rows per fetched page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1) as u64;
        self
    }

    /// Records buffered before an intermediate flush
    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold.max(1);
        self
    }

    /// Take an exclusive lock file in `dir` for the duration of each run
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    /// Stop between pages once `shutdown` turns true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Progress tracker used by this orchestrator
    pub fn export_log(&self) -> &ExportLog {
        &self.log
    }

    /// Datatype registry used by this orchestrator
    pub fn registry(&self) -> &DatatypeRegistry {
        &self.registry
    }

    /// Source database used by this orchestrator
    pub fn source(&self) -> &Arc<dyn SourceDatabase> {
        &self.source
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Execute one run
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::ConcurrencyViolation`](crate::domain::QuarryError)
    /// before any state change when another run holds the lock. Any error
    /// other than a missing source table stops the run and is returned after
    /// the datatype was marked failed; its cursor stays at the last flushed
    /// page.
    pub async fn process(&self, options: ProcessOptions) -> Result<ExportSummary> {
        let start_time = Instant::now();
        let _lock = match &self.lock_dir {
            Some(dir) => Some(RunLock::acquire(dir)?),
            None => None,
        };
        let _lease = self.log.acquire_lease().await?;

        let mut summary = ExportSummary::new();
        let scope: Vec<&RegisteredDatatype> = match &options.datatype {
            Some(name) => {
                let entry = self.registry.get(name)?;
                summary.requested = Some(entry.name.clone());
                vec![entry]
            }
            None => self.registry.selected().collect(),
        };

        tracing::info!(
            run_id = %summary.run_id,
            datatypes = scope.len(),
            reset = options.reset,
            source = %self.source.description(),
            "Starting export run"
        );

        if options.reset {
            for entry in &scope {
                self.log.reset(&entry.name).await?;
                self.store.delete(&entry.name).await?;
            }
        }

        let plan = self.plan(&scope, &mut summary).await?;
        let mut writer = BatchWriter::new(self.store.clone(), self.flush_threshold);

        for entry in plan {
            if self.shutdown_requested() {
                tracing::info!("Shutdown requested, stopping before next datatype");
                summary.interrupted = true;
                break;
            }

            match self.export_datatype(entry, &mut writer).await {
                Ok(report) => {
                    let interrupted = report.outcome == DatatypeOutcome::Interrupted;
                    summary.add(report);
                    if interrupted {
                        break;
                    }
                }
                Err(e) if e.is_not_migratable() => {
                    tracing::warn!(datatype = %entry.name, error = %e, "Skipping datatype");
                    summary.add(
                        DatatypeReport::new(entry.name.clone(), DatatypeOutcome::Skipped)
                            .with_reason(e.to_string()),
                    );
                }
                Err(e) => {
                    writer.discard(&entry.name);
                    if let Err(state_err) = self.log.mark_failed(&entry.name, &e.to_string()).await
                    {
                        tracing::warn!(
                            datatype = %entry.name,
                            error = %state_err,
                            "Failed to record datatype failure"
                        );
                    }
                    tracing::error!(datatype = %entry.name, error = %e, "Datatype export failed");
                    summary.add(
                        DatatypeReport::new(entry.name.clone(), DatatypeOutcome::Failed)
                            .with_reason(e.to_string()),
                    );
                    summary = summary.with_duration(start_time.elapsed());
                    summary.log_summary();
                    return Err(e);
                }
            }
        }

        if !summary.interrupted {
            self.notify_if_complete(&scope, &mut summary).await?;
        }

        summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    /// Order the in-scope datatypes for this run
    ///
    /// Completed datatypes are left out. Processing starts right after the
    /// datatype that completed last, so a run that keeps failing on one
    /// datatype does not starve the ones behind it.
    async fn plan<'a>(
        &self,
        scope: &[&'a RegisteredDatatype],
        summary: &mut ExportSummary,
    ) -> Result<Vec<&'a RegisteredDatatype>> {
        let mut ordered = scope.to_vec();
        if let Some(last) = self.log.last_completed().await? {
            if let Some(index) = ordered.iter().position(|e| e.name == last) {
                ordered.rotate_left(index + 1);
            }
        }

        let mut plan = Vec::with_capacity(ordered.len());
        for entry in ordered {
            if self.log.get_cursor(&entry.name).await?.is_completed() {
                tracing::debug!(datatype = %entry.name, "Already complete, not planned");
                summary.already_complete.push(entry.name.clone());
            } else {
                plan.push(entry);
            }
        }
        Ok(plan)
    }

    /// Export one datatype until it is exhausted or shutdown is requested
    async fn export_datatype(
        &self,
        entry: &RegisteredDatatype,
        writer: &mut BatchWriter,
    ) -> Result<DatatypeReport> {
        let started = Instant::now();
        let provider = QueryProvider::new(entry.name.clone(), entry.query.clone(), self.source.clone());

        let mut position = self.log.get_cursor(&entry.name).await?.position;
        let expected = provider.count(position.as_ref()).await?;
        self.log.mark_started(&entry.name).await?;
        log_export_start!(&entry.name, expected);

        let mut report = DatatypeReport::new(entry.name.clone(), DatatypeOutcome::Completed);
        report.expected = expected;

        loop {
            if report.pages > 0 && self.shutdown_requested() {
                tracing::info!(
                    datatype = %entry.name,
                    records = report.records,
                    "Shutdown requested, progress saved"
                );
                report.outcome = DatatypeOutcome::Interrupted;
                return Ok(report);
            }

            let mut page = provider
                .fetch(position.as_ref(), 0, Some(self.page_size))
                .await?;
            if page.is_exhausted() {
                page.close();
                break;
            }

            let page_rows = page.fetched();
            let mut records = Vec::with_capacity(page_rows);
            let mut last_row = None;
            for row in page.by_ref() {
                records.push(self.mapper.map(&row, &entry.descriptor)?);
                last_row = Some(row);
            }
            page.close();

            for record in &records {
                writer.append(record).await?;
            }
            writer.flush(&entry.name).await?;

            let Some(last_row) = last_row else {
                break;
            };
            let next = provider
                .spec()
                .position_after(position.as_ref(), &last_row, page_rows)?;
            self.log
                .advance(&entry.name, next, page_rows as u64)
                .await?;
            position = Some(next);

            report.records += page_rows as u64;
            report.pages += 1;
            log_batch_processing!(&entry.name, report.records, expected);

            if (page_rows as u64) < self.page_size {
                break;
            }
        }

        self.log.mark_complete(&entry.name).await?;
        log_export_complete!(&entry.name, report.records, started.elapsed());
        Ok(report)
    }

    /// Hand the artifact list to the completion sink once every in-scope
    /// datatype that can be exported is complete
    async fn notify_if_complete(
        &self,
        scope: &[&RegisteredDatatype],
        summary: &mut ExportSummary,
    ) -> Result<()> {
        if summary.count(DatatypeOutcome::Completed) == 0 {
            return Ok(());
        }

        let mut datatypes: Vec<DatatypeName> = Vec::with_capacity(scope.len());
        for entry in scope {
            if summary
                .report(entry.name.as_str())
                .is_some_and(|r| r.outcome == DatatypeOutcome::Skipped)
            {
                continue;
            }
            if !self.log.get_cursor(&entry.name).await?.is_completed() {
                tracing::debug!(datatype = %entry.name, "Run incomplete, no completion notice");
                return Ok(());
            }
            datatypes.push(entry.name.clone());
        }

        let mut artifacts = Vec::with_capacity(datatypes.len());
        for datatype in &datatypes {
            if let Some(info) = self.store.checksum(datatype).await? {
                artifacts.push(info);
            }
        }

        let completion = RunCompletion {
            run_id: summary.run_id,
            completed_at: Utc::now(),
            datatypes,
            artifacts,
        };
        self.notifier.notify(&completion).await?;
        summary.notified = true;

        tracing::info!(
            run_id = %completion.run_id,
            datatypes = completion.datatypes.len(),
            artifacts = completion.artifacts.len(),
            "Completion notice delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryArtifactStore, MemorySource, MemoryStateStorage};
    use crate::config::ExportConfig;
    use crate::core::state::{CursorValue, ExportStatus};
    use crate::domain::row::SourceRow;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<RunCompletion>>,
    }

    #[async_trait]
    impl CompletionNotifier for RecordingNotifier {
        async fn notify(&self, completion: &RunCompletion) -> Result<()> {
            self.notices.lock().await.push(completion.clone());
            Ok(())
        }
    }

    fn category(id: i64) -> SourceRow {
        SourceRow::new()
            .with("id", id)
            .with("name", format!("Category {id}"))
            .with("parent", 0)
            .with("sortorder", id)
            .with("depth", 1)
            .with("path", format!("/{id}"))
    }

    struct Fixture {
        orchestrator: MigrationOrchestrator,
        store: Arc<MemoryArtifactStore>,
        state: Arc<MemoryStateStorage>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(source: MemorySource) -> Fixture {
        let registry = DatatypeRegistry::from_config(&ExportConfig {
            datatypes: vec!["categories".to_string()],
            ..ExportConfig::default()
        })
        .unwrap();
        let store = Arc::new(MemoryArtifactStore::new());
        let state = Arc::new(MemoryStateStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = MigrationOrchestrator::new(
            Arc::new(registry),
            Arc::new(source),
            store.clone(),
            state.clone(),
            notifier.clone(),
            RecordMapper::new(0),
        )
        .with_page_size(2);
        Fixture {
            orchestrator,
            store,
            state,
            notifier,
        }
    }

    fn only_categories() -> ProcessOptions {
        ProcessOptions {
            datatype: Some("categories".to_string()),
            reset: false,
        }
    }

    #[tokio::test]
    async fn test_single_datatype_run() {
        let fx = fixture(
            MemorySource::new().with_table("course_categories", (1..=3).map(category).collect()),
        );

        let summary = fx.orchestrator.process(only_categories()).await.unwrap();
        let report = summary.report("categories").unwrap();
        assert_eq!(report.outcome, DatatypeOutcome::Completed);
        assert_eq!(report.records, 3);
        assert_eq!(report.pages, 2);
        assert_eq!(report.expected, 3);

        let categories = DatatypeName::new("categories").unwrap();
        let cursor = fx.orchestrator.export_log().get_cursor(&categories).await.unwrap();
        assert_eq!(cursor.status, ExportStatus::Completed);
        assert_eq!(cursor.position, Some(CursorValue::id(3)));
        assert_eq!(fx.store.records(&categories).await.unwrap().len(), 3);
        assert!(summary.notified);
        assert_eq!(fx.notifier.notices.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_completed_datatype_is_not_replanned() {
        let fx = fixture(
            MemorySource::new().with_table("course_categories", (1..=2).map(category).collect()),
        );
        fx.orchestrator.process(only_categories()).await.unwrap();
        let writes = fx.state.writes();

        let summary = fx.orchestrator.process(only_categories()).await.unwrap();
        assert!(summary.datatypes.is_empty());
        assert_eq!(summary.already_complete.len(), 1);
        assert!(!summary.notified);
        assert_eq!(fx.state.writes(), writes);
    }

    #[tokio::test]
    async fn test_reset_reexports_from_scratch() {
        let fx = fixture(
            MemorySource::new().with_table("course_categories", (1..=2).map(category).collect()),
        );
        fx.orchestrator.process(only_categories()).await.unwrap();

        let summary = fx
            .orchestrator
            .process(ProcessOptions {
                reset: true,
                ..only_categories()
            })
            .await
            .unwrap();
        assert_eq!(summary.report("categories").unwrap().records, 2);

        let categories = DatatypeName::new("categories").unwrap();
        assert_eq!(fx.store.records(&categories).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_table_is_skipped() {
        let fx = fixture(MemorySource::new());
        let summary = fx.orchestrator.process(only_categories()).await.unwrap();
        assert!(summary.requested_skipped());
        assert!(!summary.notified);

        let categories = DatatypeName::new("categories").unwrap();
        let cursor = fx.orchestrator.export_log().get_cursor(&categories).await.unwrap();
        assert_eq!(cursor.status, ExportStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_between_pages() {
        let fx = fixture(
            MemorySource::new().with_table("course_categories", (1..=5).map(category).collect()),
        );
        let (tx, rx) = watch::channel(false);
        let orchestrator = fx.orchestrator.with_shutdown(rx);
        tx.send(true).unwrap();

        let summary = orchestrator.process(only_categories()).await.unwrap();
        assert!(summary.interrupted);
        assert!(summary.datatypes.is_empty());

        tx.send(false).unwrap();
        let summary = orchestrator.process(only_categories()).await.unwrap();
        assert_eq!(summary.report("categories").unwrap().records, 5);
    }

    #[tokio::test]
    async fn test_lock_held_is_concurrency_violation() {
        let dir = tempfile::TempDir::new().unwrap();
        let fx = fixture(MemorySource::new());
        let orchestrator = fx.orchestrator.with_lock_dir(dir.path());

        let _held = RunLock::acquire(dir.path()).unwrap();
        let err = orchestrator.process(only_categories()).await.unwrap_err();
        assert!(err.is_concurrency_violation());
        assert_eq!(fx.state.writes(), 0);
    }

    #[tokio::test]
    async fn test_lock_file_left_by_killed_run_does_not_block() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(crate::core::export::lock::LOCK_FILE),
            "pid=4194304 acquired_at=2025-01-01T00:00:00+00:00\n",
        )
        .unwrap();
        let fx = fixture(
            MemorySource::new().with_table("course_categories", (1..=3).map(category).collect()),
        );
        let orchestrator = fx.orchestrator.with_lock_dir(dir.path());

        let summary = orchestrator.process(only_categories()).await.unwrap();
        assert_eq!(
            summary.report("categories").unwrap().outcome,
            DatatypeOutcome::Completed
        );
    }

    #[tokio::test]
    async fn test_claimed_export_log_is_concurrency_violation() {
        let fx = fixture(
            MemorySource::new().with_table("course_categories", (1..=3).map(category).collect()),
        );

        let lease = fx.state.acquire_lease().await.unwrap();
        let err = fx.orchestrator.process(only_categories()).await.unwrap_err();
        assert!(err.is_concurrency_violation());
        assert_eq!(fx.state.writes(), 0);

        drop(lease);
        assert!(fx.orchestrator.process(only_categories()).await.is_ok());
    }
}
