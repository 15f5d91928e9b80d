//! Export cursor model for tracking per-datatype progress
//!
//! An [`ExportCursor`] records how far the export of one datatype has
//! progressed. It is the only state shared across runs and the sole source of
//! truth for resuming after a crash.

use crate::domain::ids::DatatypeName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Export status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    /// Export was never started, or was reset
    #[default]
    NotStarted,
    /// Export is in progress (or was interrupted)
    InProgress,
    /// Every page was flushed
    Completed,
    /// The last run failed with an error
    Failed,
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExportStatus::NotStarted => "not started",
            ExportStatus::InProgress => "in progress",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Resumption marker for one datatype
///
/// Keyset positions are compared against the query's cursor columns; grouped
/// datatypes are paged by offset instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CursorValue {
    /// Last processed primary key
    Id {
        /// Primary key value
        id: i64,
    },
    /// Last processed modification time, with the id breaking ties
    Timestamp {
        /// Unix timestamp
        time: i64,
        /// Primary key of the last row at `time`
        id: i64,
    },
    /// Number of aggregated groups already exported
    Offset {
        /// Groups already exported
        offset: u64,
    },
}

impl CursorValue {
    /// Id cursor
    pub fn id(id: i64) -> Self {
        Self::Id { id }
    }

    /// Timestamp cursor
    pub fn timestamp(time: i64, id: i64) -> Self {
        Self::Timestamp { time, id }
    }

    /// Offset cursor
    pub fn offset(offset: u64) -> Self {
        Self::Offset { offset }
    }
}

impl fmt::Display for CursorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorValue::Id { id } => write!(f, "id {id}"),
            CursorValue::Timestamp { time, id } => write!(f, "time {time} (id {id})"),
            CursorValue::Offset { offset } => write!(f, "offset {offset}"),
        }
    }
}

/// Persisted progress of one datatype
///
/// # Examples
///
/// ```
/// use quarry::core::state::cursor::{CursorValue, ExportCursorBuilder, ExportStatus};
/// use quarry::domain::DatatypeName;
///
/// let cursor = ExportCursorBuilder::new(DatatypeName::new("users").unwrap())
///     .position(CursorValue::id(2))
///     .records_exported(2)
///     .build();
///
/// assert_eq!(cursor.position, Some(CursorValue::id(2)));
/// assert_eq!(cursor.status, ExportStatus::NotStarted);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportCursor {
    /// Datatype this cursor tracks
    pub datatype: DatatypeName,

    /// Last durably flushed position, `None` before the first page
    pub position: Option<CursorValue>,

    /// Current status
    pub status: ExportStatus,

    /// Records flushed since the last reset
    pub records_exported: u64,

    /// Pages flushed since the last reset
    pub pages_flushed: u64,

    /// When the last run of this datatype started
    pub started_at: Option<DateTime<Utc>>,

    /// Last modification of this cursor
    pub updated_at: DateTime<Utc>,

    /// When the datatype last completed
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message of the last failed run
    pub last_error: Option<String>,
}

impl ExportCursor {
    /// A fresh, never-started cursor
    pub fn new(datatype: DatatypeName) -> Self {
        ExportCursorBuilder::new(datatype).build()
    }

    /// Check if an export of this datatype is in progress
    pub fn is_in_progress(&self) -> bool {
        self.status == ExportStatus::InProgress
    }

    /// Check if the datatype completed
    pub fn is_completed(&self) -> bool {
        self.status == ExportStatus::Completed
    }

    /// Check if the last run failed
    pub fn is_failed(&self) -> bool {
        self.status == ExportStatus::Failed
    }

    /// Duration of the last completed run
    pub fn last_run_duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }

    /// Mark the export as started
    pub fn mark_started(&mut self) {
        let now = Utc::now();
        self.started_at = Some(now);
        self.updated_at = now;
        self.completed_at = None;
        self.status = ExportStatus::InProgress;
    }

    /// Mark the export as completed, clearing any previous error
    pub fn mark_completed(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
        self.status = ExportStatus::Completed;
        self.last_error = None;
    }

    /// Mark the export as failed, keeping the position untouched
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.updated_at = Utc::now();
        self.status = ExportStatus::Failed;
        self.last_error = Some(error.into());
    }

    /// Record a flushed page
    ///
    /// Returns false (and changes nothing) when `position` equals the stored
    /// position.
    pub fn advance(&mut self, position: CursorValue, records: u64) -> bool {
        if self.position == Some(position) {
            return false;
        }
        self.position = Some(position);
        self.records_exported += records;
        self.pages_flushed += 1;
        self.updated_at = Utc::now();
        true
    }
}

/// Builder for creating ExportCursor instances
pub struct ExportCursorBuilder {
    datatype: DatatypeName,
    position: Option<CursorValue>,
    status: ExportStatus,
    records_exported: u64,
    pages_flushed: u64,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl ExportCursorBuilder {
    /// Create a new builder for `datatype`
    pub fn new(datatype: DatatypeName) -> Self {
        Self {
            datatype,
            position: None,
            status: ExportStatus::NotStarted,
            records_exported: 0,
            pages_flushed: 0,
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }

    /// Set the position
    pub fn position(mut self, position: CursorValue) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the status
    pub fn status(mut self, status: ExportStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the exported record count
    pub fn records_exported(mut self, count: u64) -> Self {
        self.records_exported = count;
        self
    }

    /// Set the flushed page count
    pub fn pages_flushed(mut self, count: u64) -> Self {
        self.pages_flushed = count;
        self
    }

    /// Set the start time
    pub fn started_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.started_at = Some(timestamp);
        self
    }

    /// Set the completion time
    pub fn completed_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.completed_at = Some(timestamp);
        self
    }

    /// Set the last error
    pub fn last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    /// Build the ExportCursor instance
    pub fn build(self) -> ExportCursor {
        ExportCursor {
            datatype: self.datatype,
            position: self.position,
            status: self.status,
            records_exported: self.records_exported,
            pages_flushed: self.pages_flushed,
            started_at: self.started_at,
            updated_at: Utc::now(),
            completed_at: self.completed_at,
            last_error: self.last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> DatatypeName {
        DatatypeName::new("users").unwrap()
    }

    #[test]
    fn test_new_cursor_is_not_started() {
        let cursor = ExportCursor::new(users());
        assert_eq!(cursor.status, ExportStatus::NotStarted);
        assert!(cursor.position.is_none());
        assert_eq!(cursor.records_exported, 0);
    }

    #[test]
    fn test_state_transitions() {
        let mut cursor = ExportCursor::new(users());

        cursor.mark_started();
        assert!(cursor.is_in_progress());
        assert!(cursor.started_at.is_some());

        cursor.mark_failed("disk full");
        assert!(cursor.is_failed());
        assert_eq!(cursor.last_error.as_deref(), Some("disk full"));

        cursor.mark_started();
        cursor.mark_completed();
        assert!(cursor.is_completed());
        assert!(cursor.last_error.is_none());
        assert!(cursor.last_run_duration().is_some());
    }

    #[test]
    fn test_advance_is_idempotent() {
        let mut cursor = ExportCursor::new(users());

        assert!(cursor.advance(CursorValue::id(2), 2));
        assert!(!cursor.advance(CursorValue::id(2), 2));
        assert_eq!(cursor.records_exported, 2);
        assert_eq!(cursor.pages_flushed, 1);

        assert!(cursor.advance(CursorValue::id(3), 1));
        assert_eq!(cursor.position, Some(CursorValue::id(3)));
        assert_eq!(cursor.records_exported, 3);
    }

    #[test]
    fn test_failure_keeps_position() {
        let mut cursor = ExportCursorBuilder::new(users())
            .position(CursorValue::id(10))
            .build();
        cursor.mark_failed("mapping error");
        assert_eq!(cursor.position, Some(CursorValue::id(10)));
    }

    #[test]
    fn test_cursor_value_serialization() {
        let json = serde_json::to_string(&CursorValue::timestamp(1_700_000_000, 4)).unwrap();
        assert_eq!(json, r#"{"kind":"timestamp","time":1700000000,"id":4}"#);

        let parsed: CursorValue = serde_json::from_str(r#"{"kind":"offset","offset":7}"#).unwrap();
        assert_eq!(parsed, CursorValue::offset(7));
    }

    #[test]
    fn test_cursor_roundtrip_through_json() {
        let cursor = ExportCursorBuilder::new(users())
            .position(CursorValue::id(5))
            .status(ExportStatus::Failed)
            .last_error("boom")
            .build();
        let json = serde_json::to_string(&cursor).unwrap();
        let back: ExportCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cursor);
    }
}
