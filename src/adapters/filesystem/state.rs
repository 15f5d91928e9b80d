//! JSON file export log storage
//!
//! The whole export log lives in one document, `<state_dir>/export_log.json`.
//! Every write replaces the document atomically: the new content goes to a
//! temporary file that is synced and renamed over the old one.

use crate::adapters::database::traits::StateStorage;
use crate::core::state::cursor::ExportCursor;
use crate::domain::ids::DatatypeName;
use crate::domain::{QuarryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// File name of the export log document
pub const STATE_FILE: &str = "export_log.json";

/// On-disk layout of the export log
#[derive(Debug, Default, Serialize, Deserialize)]
struct ExportLogDocument {
    #[serde(default)]
    cursors: BTreeMap<DatatypeName, ExportCursor>,
    #[serde(default)]
    last_completed: Option<DatatypeName>,
}

/// State storage backed by a JSON document
#[derive(Debug)]
pub struct FileStateStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStateStorage {
    /// Store the export log in `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STATE_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Path of the export log document
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<ExportLogDocument> {
        match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                QuarryError::State(format!(
                    "Export log {} is corrupt: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ExportLogDocument::default()),
            Err(e) => Err(QuarryError::State(format!(
                "Failed to read export log {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write(&self, document: &ExportLogDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                QuarryError::State(format!(
                    "Failed to create state directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let content = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        let write = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&content).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &self.path).await
        };
        write.await.map_err(|e| {
            QuarryError::State(format!(
                "Failed to write export log {}: {e}",
                self.path.display()
            ))
        })
    }

    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut ExportLogDocument) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut document = self.read().await?;
        change(&mut document);
        self.write(&document).await
    }
}

#[async_trait]
impl StateStorage for FileStateStorage {
    async fn load_cursor(&self, datatype: &DatatypeName) -> Result<Option<ExportCursor>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.cursors.remove(datatype))
    }

    async fn save_cursor(&self, cursor: &ExportCursor) -> Result<()> {
        let cursor = cursor.clone();
        self.update(move |doc| {
            doc.cursors.insert(cursor.datatype.clone(), cursor);
        })
        .await
    }

    async fn delete_cursor(&self, datatype: &DatatypeName) -> Result<()> {
        self.update(|doc| {
            doc.cursors.remove(datatype);
        })
        .await
    }

    async fn list_cursors(&self) -> Result<Vec<ExportCursor>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.cursors.into_values().collect())
    }

    async fn load_last_completed(&self) -> Result<Option<DatatypeName>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.last_completed)
    }

    async fn save_last_completed(&self, datatype: Option<&DatatypeName>) -> Result<()> {
        let datatype = datatype.cloned();
        self.update(move |doc| doc.last_completed = datatype).await
    }
}
