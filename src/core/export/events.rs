//! Event-driven export
//!
//! Exports a single record when the platform reports a change to a required
//! datatype with event tracking enabled. Uses the same mapper as the batch
//! path, so event records and backfill records share one schema.

use crate::adapters::database::traits::ArtifactStore;
use crate::core::registry::DatatypeRegistry;
use crate::core::transform::RecordMapper;
use crate::domain::record::{Crud, MappedRecord};
use crate::domain::row::SourceRow;
use crate::domain::{QuarryError, Result};
use std::sync::Arc;

/// Maps and immediately flushes single event records
pub struct EventExporter {
    registry: Arc<DatatypeRegistry>,
    mapper: RecordMapper,
    store: Arc<dyn ArtifactStore>,
}

impl EventExporter {
    /// Create an exporter writing to `store`
    pub fn new(
        registry: Arc<DatatypeRegistry>,
        mapper: RecordMapper,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            registry,
            mapper,
            store,
        }
    }

    /// Map one changed row and flush it as a single record
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Schema`] for unknown datatypes,
    /// [`QuarryError::Configuration`] when event tracking is disabled for the
    /// datatype, a mapping error for invalid rows, or the store's error.
    pub async fn export_event(
        &self,
        datatype: &str,
        row: &SourceRow,
        crud: Crud,
        event_name: &str,
    ) -> Result<MappedRecord> {
        let entry = self.registry.get(datatype)?;
        if !entry.events_enabled {
            return Err(QuarryError::Configuration(format!(
                "Event tracking is not enabled for datatype '{datatype}'"
            )));
        }

        let record =
            self.mapper
                .map_with(row, &entry.descriptor, crud, Some(event_name.to_string()))?;
        let line = record.to_json_line()?;
        self.store.write_batch(&entry.name, &line).await?;

        tracing::debug!(
            datatype = %entry.name,
            crud = %crud,
            event = %event_name,
            "Event record exported"
        );
        Ok(record)
    }
}
