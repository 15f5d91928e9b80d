//! Batch writer
//!
//! Buffers serialized records per datatype and hands them to the artifact
//! store in bounded chunks. One flush is one contiguous append; the store
//! guarantees it is all-or-nothing.

use crate::adapters::database::traits::ArtifactStore;
use crate::domain::ids::DatatypeName;
use crate::domain::record::MappedRecord;
use crate::domain::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered serialized records waiting to be flushed
#[derive(Debug, Default)]
pub struct OutputBatch {
    bytes: Vec<u8>,
    records: usize,
}

impl OutputBatch {
    /// Append one serialized, newline-terminated record
    pub fn push(&mut self, line: &[u8]) {
        self.bytes.extend_from_slice(line);
        self.records += 1;
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.records
    }

    /// Whether the batch holds no records
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Buffered bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Buffers records and flushes them to an [`ArtifactStore`]
pub struct BatchWriter {
    store: Arc<dyn ArtifactStore>,
    flush_threshold: usize,
    buffers: HashMap<DatatypeName, OutputBatch>,
}

impl BatchWriter {
    /// Create a writer flushing every `flush_threshold` records
    pub fn new(store: Arc<dyn ArtifactStore>, flush_threshold: usize) -> Self {
        Self {
            store,
            flush_threshold: flush_threshold.max(1),
            buffers: HashMap::new(),
        }
    }

    /// Serialize and buffer a record, flushing when the threshold is reached
    ///
    /// Returns the number of records flushed by this call (0 if none).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or a triggered flush fails.
    pub async fn append(&mut self, record: &MappedRecord) -> Result<usize> {
        let line = record.to_json_line()?;
        self.append_serialized(&record.datatype, &line).await
    }

    /// Buffer an already serialized, newline-terminated record
    pub async fn append_serialized(&mut self, datatype: &DatatypeName, line: &[u8]) -> Result<usize> {
        let batch = self.buffers.entry(datatype.clone()).or_default();
        batch.push(line);

        if batch.len() >= self.flush_threshold {
            return self.flush(datatype).await;
        }
        Ok(0)
    }

    /// Write all buffered records of a datatype as one block
    ///
    /// The buffer is consumed whether or not the write succeeds; the caller
    /// must not advance its cursor after a failed flush.
    ///
    /// # Errors
    ///
    /// Returns the store's error when the write fails.
    pub async fn flush(&mut self, datatype: &DatatypeName) -> Result<usize> {
        let Some(batch) = self.buffers.remove(datatype) else {
            return Ok(0);
        };
        if batch.is_empty() {
            return Ok(0);
        }

        self.store.write_batch(datatype, batch.as_bytes()).await?;

        tracing::debug!(
            datatype = %datatype,
            records = batch.len(),
            bytes = batch.as_bytes().len(),
            "Flushed batch"
        );
        Ok(batch.len())
    }

    /// Drop unflushed records of a datatype, returning how many were dropped
    pub fn discard(&mut self, datatype: &DatatypeName) -> usize {
        let dropped = self.buffers.remove(datatype).map_or(0, |b| b.len());
        if dropped > 0 {
            tracing::warn!(datatype = %datatype, records = dropped, "Discarded unflushed records");
        }
        dropped
    }

    /// Number of records buffered for a datatype
    pub fn pending(&self, datatype: &DatatypeName) -> usize {
        self.buffers.get(datatype).map_or(0, OutputBatch::len)
    }
}
