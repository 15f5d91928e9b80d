//! Export log
//!
//! [`ExportLog`] is the progress tracker: it owns the read-modify-write cycle
//! of per-datatype cursors over a [`StateStorage`] backend, plus the run-level
//! resume pointer.

use crate::adapters::database::traits::{RunLease, StateStorage};
use crate::core::state::cursor::{CursorValue, ExportCursor};
use crate::domain::ids::DatatypeName;
use crate::domain::Result;
use std::sync::Arc;

/// Progress tracker over a state storage backend
#[derive(Clone)]
pub struct ExportLog {
    /// State storage backend
    storage: Arc<dyn StateStorage>,
}

impl ExportLog {
    /// Create a new ExportLog with a state storage backend
    pub fn new(storage: Arc<dyn StateStorage>) -> Self {
        Self { storage }
    }

    /// Cursor of a datatype, or a fresh one if it was never saved
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn get_cursor(&self, datatype: &DatatypeName) -> Result<ExportCursor> {
        Ok(self
            .storage
            .load_cursor(datatype)
            .await?
            .unwrap_or_else(|| ExportCursor::new(datatype.clone())))
    }

    /// Record a durably flushed page
    ///
    /// Calling this twice with the same position is a no-op: nothing is
    /// written the second time. Returns whether the cursor moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor cannot be persisted.
    pub async fn advance(
        &self,
        datatype: &DatatypeName,
        position: CursorValue,
        records: u64,
    ) -> Result<bool> {
        let mut cursor = self.get_cursor(datatype).await?;
        if !cursor.advance(position, records) {
            tracing::debug!(
                datatype = %datatype,
                position = %position,
                "Cursor already at position, skipping write"
            );
            return Ok(false);
        }

        tracing::debug!(
            datatype = %datatype,
            position = %position,
            records_exported = cursor.records_exported,
            "Checkpointing cursor"
        );
        self.storage.save_cursor(&cursor).await?;
        Ok(true)
    }

    /// Mark a datatype as in progress
    pub async fn mark_started(&self, datatype: &DatatypeName) -> Result<ExportCursor> {
        let mut cursor = self.get_cursor(datatype).await?;
        cursor.mark_started();
        self.storage.save_cursor(&cursor).await?;
        Ok(cursor)
    }

    /// Mark a datatype as completed and move the resume pointer to it
    pub async fn mark_complete(&self, datatype: &DatatypeName) -> Result<ExportCursor> {
        let mut cursor = self.get_cursor(datatype).await?;
        cursor.mark_completed();
        self.storage.save_cursor(&cursor).await?;
        self.storage.save_last_completed(Some(datatype)).await?;
        Ok(cursor)
    }

    /// Mark a datatype as failed, recording the error for status display
    pub async fn mark_failed(&self, datatype: &DatatypeName, error: &str) -> Result<()> {
        let mut cursor = self.get_cursor(datatype).await?;
        cursor.mark_failed(error);
        self.storage.save_cursor(&cursor).await
    }

    /// Return a datatype to `NotStarted`, forgetting its position
    pub async fn reset(&self, datatype: &DatatypeName) -> Result<()> {
        self.storage.delete_cursor(datatype).await?;
        if self.last_completed().await?.as_ref() == Some(datatype) {
            self.storage.save_last_completed(None).await?;
        }
        tracing::info!(datatype = %datatype, "Export cursor reset");
        Ok(())
    }

    /// Reset every saved cursor and the resume pointer
    pub async fn reset_all(&self) -> Result<Vec<DatatypeName>> {
        let mut reset = Vec::new();
        for cursor in self.storage.list_cursors().await? {
            self.storage.delete_cursor(&cursor.datatype).await?;
            reset.push(cursor.datatype);
        }
        self.storage.save_last_completed(None).await?;
        tracing::info!(count = reset.len(), "All export cursors reset");
        Ok(reset)
    }

    /// Every saved cursor
    pub async fn all_cursors(&self) -> Result<Vec<ExportCursor>> {
        self.storage.list_cursors().await
    }

    /// Last datatype that completed, across runs
    pub async fn last_completed(&self) -> Result<Option<DatatypeName>> {
        self.storage.load_last_completed().await
    }

    /// Claim the log for one run; see [`StateStorage::acquire_lease`]
    pub async fn acquire_lease(&self) -> Result<Option<RunLease>> {
        self.storage.acquire_lease().await
    }
}
