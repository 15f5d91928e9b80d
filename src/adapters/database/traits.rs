//! Adapter traits
//!
//! This module defines the seams between the pipeline and the outside world:
//! the source database, the artifact store, export log persistence and the
//! completion sink.

use crate::core::query::SourceQuery;
use crate::core::state::cursor::ExportCursor;
use crate::domain::ids::DatatypeName;
use crate::domain::row::SourceRow;
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Read-only access to the learning platform database
#[async_trait]
pub trait SourceDatabase: Send + Sync {
    /// Test the database connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// Check whether an (unprefixed) table exists
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Count rows (or groups) matching the query's bound
    ///
    /// Offset and limit are ignored.
    async fn count(&self, query: &SourceQuery<'_>) -> Result<u64>;

    /// Fetch one page of rows in cursor order
    async fn fetch(&self, query: &SourceQuery<'_>) -> Result<Vec<SourceRow>>;

    /// Human-readable description, safe to log
    fn description(&self) -> String;
}

/// Description of one stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    /// Datatype the artifact holds
    pub datatype: DatatypeName,
    /// Where the artifact lives (path or in-memory key)
    pub location: String,
    /// Size in bytes
    pub bytes: u64,
    /// Number of records (lines)
    pub records: u64,
    /// Hex-encoded SHA-256 of the content
    pub sha256: String,
}

impl ArtifactInfo {
    /// Describe an in-memory artifact
    pub fn from_bytes(datatype: DatatypeName, location: impl Into<String>, content: &[u8]) -> Self {
        Self {
            datatype,
            location: location.into(),
            bytes: content.len() as u64,
            records: content.iter().filter(|b| **b == b'\n').count() as u64,
            sha256: hex_digest(Sha256::digest(content).as_slice()),
        }
    }
}

/// Lowercase hex encoding of a digest
pub fn hex_digest(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Durable destination of serialized records
///
/// `write_batch` is all-or-nothing: on error no part of `bytes` may remain
/// visible in the artifact.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Append one contiguous block of JSON lines
    async fn write_batch(&self, datatype: &DatatypeName, bytes: &[u8]) -> Result<()>;

    /// Delete the artifact of a datatype, if any
    async fn delete(&self, datatype: &DatatypeName) -> Result<()>;

    /// Describe the artifact of a datatype, `None` when nothing was written
    async fn checksum(&self, datatype: &DatatypeName) -> Result<Option<ArtifactInfo>>;
}

/// Exclusive claim on an export log for the duration of one run
///
/// The claim is released when the lease is dropped, or by the backend when
/// the holding process dies.
pub struct RunLease {
    _hold: Box<dyn Send>,
}

impl RunLease {
    /// Wrap whatever keeps the claim alive
    pub fn new(hold: impl Send + 'static) -> Self {
        Self {
            _hold: Box::new(hold),
        }
    }
}

impl std::fmt::Debug for RunLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLease").finish_non_exhaustive()
    }
}

/// Persistence of the export log
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Load the cursor of a datatype
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(cursor))` if found, `Ok(None)` if never saved.
    async fn load_cursor(&self, datatype: &DatatypeName) -> Result<Option<ExportCursor>>;

    /// Create or replace a cursor
    async fn save_cursor(&self, cursor: &ExportCursor) -> Result<()>;

    /// Remove a cursor
    async fn delete_cursor(&self, datatype: &DatatypeName) -> Result<()>;

    /// All saved cursors
    async fn list_cursors(&self) -> Result<Vec<ExportCursor>>;

    /// Run-level resume pointer: the last datatype that completed
    async fn load_last_completed(&self) -> Result<Option<DatatypeName>>;

    /// Update or clear the resume pointer
    async fn save_last_completed(&self, datatype: Option<&DatatypeName>) -> Result<()>;

    /// Claim the export log for one run
    ///
    /// Backends whose log sits next to the run lock file return `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::ConcurrencyViolation`](crate::domain::QuarryError)
    /// when another run holds the claim.
    async fn acquire_lease(&self) -> Result<Option<RunLease>> {
        Ok(None)
    }
}

/// Payload handed to the completion sink when a run finishes every datatype
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCompletion {
    /// Id of the run
    pub run_id: Uuid,
    /// When the run finished
    pub completed_at: DateTime<Utc>,
    /// Datatypes completed, in processing order
    pub datatypes: Vec<DatatypeName>,
    /// Artifacts available for downstream upload
    pub artifacts: Vec<ArtifactInfo>,
}

/// External collaborator told when every requested datatype is complete
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    /// Deliver the completion notice
    async fn notify(&self, completion: &RunCompletion) -> Result<()>;
}
