//! JSON-lines artifact store
//!
//! Each datatype is one append-only file, `<output_dir>/<datatype>.jsonl`.
//! A batch is written with a single `write_all` followed by `sync_data`; on
//! failure the file is truncated back to its length before the write.
//!
//! A process killed mid-write can still leave a partial last line. Before
//! appending, anything after the final newline is cut off, so the file only
//! ever grows by whole records.

use crate::adapters::database::traits::{hex_digest, ArtifactInfo, ArtifactStore};
use crate::domain::ids::DatatypeName;
use crate::domain::{QuarryError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::{self, ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

/// File extension of artifacts
pub const ARTIFACT_EXTENSION: &str = "jsonl";

const READ_CHUNK: usize = 64 * 1024;

/// Artifact store writing one JSON-lines file per datatype
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    /// Create a store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a datatype's artifact
    pub fn path(&self, datatype: &DatatypeName) -> PathBuf {
        self.dir.join(format!("{datatype}.{ARTIFACT_EXTENSION}"))
    }

}

/// Cut everything after the last newline; returns the new length
async fn trim_partial_line(file: &mut File, len: u64) -> io::Result<u64> {
    if len == 0 {
        return Ok(0);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1)).await?;
    file.read_exact(&mut last).await?;
    if last[0] == b'\n' {
        return Ok(len);
    }

    let mut buf = vec![0u8; READ_CHUNK];
    let mut end = len;
    let mut keep = 0;
    while end > 0 {
        let start = end.saturating_sub(READ_CHUNK as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(chunk).await?;
        if let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    file.set_len(keep).await?;
    Ok(keep)
}

/// Write `bytes` through `sink`, then sync `file`; on error `file` is cut
/// back to `prior_len`
async fn append_or_rollback<W>(
    sink: &mut W,
    file: &File,
    prior_len: u64,
    bytes: &[u8],
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        sink.write_all(bytes).await?;
        sink.flush().await?;
        file.sync_data().await
    }
    .await;

    if let Err(e) = written {
        if let Err(truncate_err) = file.set_len(prior_len).await {
            tracing::error!(
                prior_len,
                error = %truncate_err,
                "Failed to truncate partial batch"
            );
        }
        return Err(e);
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn write_batch(&self, datatype: &DatatypeName, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            QuarryError::Storage(format!(
                "Failed to create output directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let path = self.path(datatype);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| QuarryError::Storage(format!("Failed to open {}: {e}", path.display())))?;

        let len = file
            .metadata()
            .await
            .map_err(|e| QuarryError::Storage(format!("Failed to stat {}: {e}", path.display())))?
            .len();

        let prior_len = trim_partial_line(&mut file, len).await.map_err(|e| {
            QuarryError::Storage(format!("Failed to repair tail of {}: {e}", path.display()))
        })?;
        if prior_len != len {
            tracing::warn!(
                datatype = %datatype,
                path = %path.display(),
                dropped_bytes = len - prior_len,
                "Dropped partial record left by an interrupted write"
            );
        }

        let mut sink = file.try_clone().await.map_err(|e| {
            QuarryError::Storage(format!("Failed to open {}: {e}", path.display()))
        })?;
        if let Err(e) = append_or_rollback(&mut sink, &file, prior_len, bytes).await {
            return Err(QuarryError::Storage(format!(
                "Failed to append {} bytes to {}: {e}",
                bytes.len(),
                path.display()
            )));
        }

        tracing::trace!(
            datatype = %datatype,
            path = %path.display(),
            bytes = bytes.len(),
            "Batch appended"
        );
        Ok(())
    }

    async fn delete(&self, datatype: &DatatypeName) -> Result<()> {
        let path = self.path(datatype);
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(datatype = %datatype, path = %path.display(), "Artifact deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QuarryError::Storage(format!(
                "Failed to delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn checksum(&self, datatype: &DatatypeName) -> Result<Option<ArtifactInfo>> {
        let path = self.path(datatype);
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(QuarryError::Storage(format!(
                    "Failed to open {}: {e}",
                    path.display()
                )))
            }
        };

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let mut bytes = 0u64;
        let mut records = 0u64;
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| QuarryError::Storage(format!("Failed to read {}: {e}", path.display())))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            bytes += n as u64;
            records += buf[..n].iter().filter(|b| **b == b'\n').count() as u64;
        }

        Ok(Some(ArtifactInfo {
            datatype: datatype.clone(),
            location: path.display().to_string(),
            bytes,
            records,
            sha256: hex_digest(hasher.finalize().as_slice()),
        }))
    }
}
