//! Completion sinks
//!
//! [`ManifestNotifier`] writes `manifest.json` next to the artifacts so a
//! downstream uploader can pick up the finished run, with the size, record
//! count and SHA-256 of every file. [`LogNotifier`] only logs the notice.

use crate::adapters::database::traits::{CompletionNotifier, RunCompletion};
use crate::domain::{QuarryError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// File name of the run manifest
pub const MANIFEST_FILE: &str = "manifest.json";

/// Writes the run manifest into the output directory
#[derive(Debug, Clone)]
pub struct ManifestNotifier {
    path: PathBuf,
}

impl ManifestNotifier {
    /// Write manifests into `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(MANIFEST_FILE),
        }
    }

    /// Path of the manifest
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CompletionNotifier for ManifestNotifier {
    async fn notify(&self, completion: &RunCompletion) -> Result<()> {
        let content = serde_json::to_vec_pretty(completion)?;
        let tmp = self.path.with_extension("json.tmp");

        let write = async {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&content).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &self.path).await
        };
        write.await.map_err(|e| {
            QuarryError::Storage(format!(
                "Failed to write manifest {}: {e}",
                self.path.display()
            ))
        })?;

        tracing::info!(
            run_id = %completion.run_id,
            path = %self.path.display(),
            artifacts = completion.artifacts.len(),
            "Manifest written"
        );
        Ok(())
    }
}

/// Completion sink that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl CompletionNotifier for LogNotifier {
    async fn notify(&self, completion: &RunCompletion) -> Result<()> {
        let datatypes: Vec<&str> = completion.datatypes.iter().map(|d| d.as_str()).collect();
        tracing::info!(
            run_id = %completion.run_id,
            datatypes = %datatypes.join(","),
            "Run complete, no manifest written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::traits::ArtifactInfo;
    use crate::domain::ids::DatatypeName;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_manifest_lists_artifacts() {
        let dir = TempDir::new().unwrap();
        let notifier = ManifestNotifier::new(dir.path());
        let users = DatatypeName::new("users").unwrap();
        let completion = RunCompletion {
            run_id: Uuid::new_v4(),
            completed_at: Utc::now(),
            datatypes: vec![users.clone()],
            artifacts: vec![ArtifactInfo::from_bytes(users, "users.jsonl", b"{}\n")],
        };

        notifier.notify(&completion).await.unwrap();

        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(notifier.path()).unwrap()).unwrap();
        assert_eq!(manifest["run_id"], completion.run_id.to_string());
        assert_eq!(manifest["datatypes"][0], "users");
        assert_eq!(manifest["artifacts"][0]["records"], 1);
        assert_eq!(manifest["artifacts"][0]["sha256"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        let completion = RunCompletion {
            run_id: Uuid::new_v4(),
            completed_at: Utc::now(),
            datatypes: Vec::new(),
            artifacts: Vec::new(),
        };
        assert!(LogNotifier.notify(&completion).await.is_ok());
    }
}
