//! In-memory artifact store

use crate::adapters::database::traits::{ArtifactInfo, ArtifactStore};
use crate::domain::ids::DatatypeName;
use crate::domain::{QuarryError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Artifact store keeping every artifact as a byte buffer
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<DatatypeName, Vec<u8>>>,
    failing: Mutex<HashSet<DatatypeName>>,
}

impl MemoryArtifactStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write for `datatype` fail
    pub async fn fail_writes(&self, datatype: &DatatypeName) {
        self.failing.lock().await.insert(datatype.clone());
    }

    /// Let writes for `datatype` succeed again
    pub async fn heal(&self, datatype: &DatatypeName) {
        self.failing.lock().await.remove(datatype);
    }

    /// Raw artifact content
    pub async fn contents(&self, datatype: &DatatypeName) -> Vec<u8> {
        self.artifacts
            .lock()
            .await
            .get(datatype)
            .cloned()
            .unwrap_or_default()
    }

    /// Parsed JSON lines of an artifact
    pub async fn records(&self, datatype: &DatatypeName) -> Result<Vec<serde_json::Value>> {
        let content = self.contents(datatype).await;
        content
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_slice(line).map_err(QuarryError::from))
            .collect()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn write_batch(&self, datatype: &DatatypeName, bytes: &[u8]) -> Result<()> {
        if self.failing.lock().await.contains(datatype) {
            return Err(QuarryError::Storage(format!(
                "simulated write failure for '{datatype}'"
            )));
        }

        self.artifacts
            .lock()
            .await
            .entry(datatype.clone())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    async fn delete(&self, datatype: &DatatypeName) -> Result<()> {
        self.artifacts.lock().await.remove(datatype);
        Ok(())
    }

    async fn checksum(&self, datatype: &DatatypeName) -> Result<Option<ArtifactInfo>> {
        Ok(self.artifacts.lock().await.get(datatype).map(|content| {
            ArtifactInfo::from_bytes(datatype.clone(), format!("memory://{datatype}"), content)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_delete() {
        let store = MemoryArtifactStore::new();
        let users = DatatypeName::new("users").unwrap();

        store.write_batch(&users, b"{\"id\":1}\n").await.unwrap();
        store.write_batch(&users, b"{\"id\":2}\n").await.unwrap();
        assert_eq!(store.records(&users).await.unwrap().len(), 2);

        let info = store.checksum(&users).await.unwrap().unwrap();
        assert_eq!(info.records, 2);

        store.delete(&users).await.unwrap();
        assert!(store.checksum(&users).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failing_writes_leave_nothing() {
        let store = MemoryArtifactStore::new();
        let users = DatatypeName::new("users").unwrap();

        store.fail_writes(&users).await;
        assert!(store.write_batch(&users, b"{}\n").await.is_err());
        assert!(store.contents(&users).await.is_empty());

        store.heal(&users).await;
        assert!(store.write_batch(&users, b"{}\n").await.is_ok());
    }
}
