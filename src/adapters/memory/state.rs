//! In-memory export log storage

use crate::adapters::database::traits::{RunLease, StateStorage};
use crate::core::state::cursor::ExportCursor;
use crate::domain::ids::DatatypeName;
use crate::domain::{QuarryError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// State storage that forgets everything on drop
#[derive(Debug, Default)]
pub struct MemoryStateStorage {
    cursors: Mutex<BTreeMap<DatatypeName, ExportCursor>>,
    last_completed: Mutex<Option<DatatypeName>>,
    writes: AtomicU64,
    /// Cursor saves still allowed before simulated failures start
    save_budget: Mutex<Option<u64>>,
    leased: Arc<AtomicBool>,
}

struct LeaseRelease(Arc<AtomicBool>);

impl Drop for LeaseRelease {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MemoryStateStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cursor writes performed so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Let `allowed` more cursor saves through, then fail every save
    pub async fn fail_saves_after(&self, allowed: u64) {
        *self.save_budget.lock().await = Some(allowed);
    }

    /// Let cursor saves succeed again
    pub async fn heal_saves(&self) {
        *self.save_budget.lock().await = None;
    }
}

#[async_trait]
impl StateStorage for MemoryStateStorage {
    async fn load_cursor(&self, datatype: &DatatypeName) -> Result<Option<ExportCursor>> {
        Ok(self.cursors.lock().await.get(datatype).cloned())
    }

    async fn save_cursor(&self, cursor: &ExportCursor) -> Result<()> {
        if let Some(left) = self.save_budget.lock().await.as_mut() {
            if *left == 0 {
                return Err(QuarryError::State(format!(
                    "simulated cursor write failure for '{}'",
                    cursor.datatype
                )));
            }
            *left -= 1;
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        self.cursors
            .lock()
            .await
            .insert(cursor.datatype.clone(), cursor.clone());
        Ok(())
    }

    async fn delete_cursor(&self, datatype: &DatatypeName) -> Result<()> {
        self.cursors.lock().await.remove(datatype);
        Ok(())
    }

    async fn list_cursors(&self) -> Result<Vec<ExportCursor>> {
        Ok(self.cursors.lock().await.values().cloned().collect())
    }

    async fn load_last_completed(&self) -> Result<Option<DatatypeName>> {
        Ok(self.last_completed.lock().await.clone())
    }

    async fn save_last_completed(&self, datatype: Option<&DatatypeName>) -> Result<()> {
        *self.last_completed.lock().await = datatype.cloned();
        Ok(())
    }

    async fn acquire_lease(&self) -> Result<Option<RunLease>> {
        if self
            .leased
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(QuarryError::ConcurrencyViolation(
                "in-memory export log is claimed by another run".to_string(),
            ));
        }
        Ok(Some(RunLease::new(LeaseRelease(self.leased.clone()))))
    }
}
