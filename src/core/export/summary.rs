//! Export summary and reporting
//!
//! This module defines structures for tracking and reporting the result of
//! one export run.

use crate::domain::ids::DatatypeName;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// How a datatype ended within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatatypeOutcome {
    /// Every row was exported and the datatype was marked complete
    Completed,
    /// The source table does not exist
    Skipped,
    /// A fatal error stopped the datatype
    Failed,
    /// A shutdown signal arrived between pages
    Interrupted,
}

impl fmt::Display for DatatypeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DatatypeOutcome::Completed => "completed",
            DatatypeOutcome::Skipped => "skipped",
            DatatypeOutcome::Failed => "failed",
            DatatypeOutcome::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

/// Result for a single datatype
#[derive(Debug, Clone, Serialize)]
pub struct DatatypeReport {
    /// Datatype name
    pub datatype: DatatypeName,

    /// Outcome
    pub outcome: DatatypeOutcome,

    /// Rows counted at the start of the datatype
    pub expected: u64,

    /// Records flushed during this run
    pub records: u64,

    /// Pages flushed during this run
    pub pages: u64,

    /// Skip or failure reason
    pub reason: Option<String>,
}

impl DatatypeReport {
    /// Create a report with no progress yet
    pub fn new(datatype: DatatypeName, outcome: DatatypeOutcome) -> Self {
        Self {
            datatype,
            outcome,
            expected: 0,
            records: 0,
            pages: 0,
            reason: None,
        }
    }

    /// Attach a reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Summary of an export run
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    /// Id of the run
    pub run_id: Uuid,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Per-datatype results in processing order
    pub datatypes: Vec<DatatypeReport>,

    /// Datatypes already complete before the run, not processed again
    pub already_complete: Vec<DatatypeName>,

    /// Datatype explicitly requested on the command line
    pub requested: Option<DatatypeName>,

    /// Whether a shutdown signal stopped the run
    pub interrupted: bool,

    /// Whether the completion sink was notified
    pub notified: bool,

    /// Duration of the run
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl ExportSummary {
    /// Create a new empty export summary
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            datatypes: Vec::new(),
            already_complete: Vec::new(),
            requested: None,
            interrupted: false,
            notified: false,
            duration: Duration::from_secs(0),
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Add a datatype result
    pub fn add(&mut self, report: DatatypeReport) {
        if report.outcome == DatatypeOutcome::Interrupted {
            self.interrupted = true;
        }
        self.datatypes.push(report);
    }

    /// Result of a datatype, if it was processed
    pub fn report(&self, datatype: &str) -> Option<&DatatypeReport> {
        self.datatypes.iter().find(|r| r.datatype == datatype)
    }

    /// Number of datatypes with the given outcome
    pub fn count(&self, outcome: DatatypeOutcome) -> usize {
        self.datatypes.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Records flushed across all datatypes
    pub fn total_records(&self) -> u64 {
        self.datatypes.iter().map(|r| r.records).sum()
    }

    /// Whether the run finished without failures or interruption
    pub fn is_successful(&self) -> bool {
        !self.interrupted && self.count(DatatypeOutcome::Failed) == 0
    }

    /// Whether the explicitly requested datatype was skipped
    pub fn requested_skipped(&self) -> bool {
        self.requested
            .as_ref()
            .and_then(|name| self.report(name.as_str()))
            .is_some_and(|r| r.outcome == DatatypeOutcome::Skipped)
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            run_id = %self.run_id,
            completed = self.count(DatatypeOutcome::Completed),
            skipped = self.count(DatatypeOutcome::Skipped),
            failed = self.count(DatatypeOutcome::Failed),
            already_complete = self.already_complete.len(),
            records = self.total_records(),
            interrupted = self.interrupted,
            duration_secs = self.duration.as_secs(),
            "Export run finished"
        );

        for report in &self.datatypes {
            match report.outcome {
                DatatypeOutcome::Completed => tracing::info!(
                    datatype = %report.datatype,
                    records = report.records,
                    pages = report.pages,
                    "Datatype completed"
                ),
                DatatypeOutcome::Interrupted => tracing::info!(
                    datatype = %report.datatype,
                    records = report.records,
                    "Datatype interrupted, progress saved"
                ),
                DatatypeOutcome::Skipped | DatatypeOutcome::Failed => tracing::warn!(
                    datatype = %report.datatype,
                    outcome = %report.outcome,
                    reason = report.reason.as_deref().unwrap_or(""),
                    "Datatype not exported"
                ),
            }
        }
    }
}

impl Default for ExportSummary {
    fn default() -> Self {
        Self::new()
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}
