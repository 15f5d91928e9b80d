//! Run lock
//!
//! At most one export run may touch a given state directory. The lock is an
//! exclusive advisory lock on `quarry.lock`, held through the open file
//! handle. The kernel drops it when the process exits, so a killed run never
//! leaves the directory locked; a leftover lock file without a live holder
//! is simply taken over.

use crate::domain::{QuarryError, Result};
use chrono::Utc;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Name of the lock file inside the lock directory
pub const LOCK_FILE: &str = "quarry.lock";

/// Exclusive run lock, released on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    /// Acquire the lock in `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::ConcurrencyViolation`] when a live run holds
    /// the lock, or an I/O error when the file cannot be opened.
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);

        // no truncate: the previous holder's note stays readable until we own the lock
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                return Err(QuarryError::ConcurrencyViolation(format!(
                    "lock file {} is held ({})",
                    path.display(),
                    holder.trim()
                )));
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        let previous = fs::read_to_string(&path).unwrap_or_default();
        if !previous.trim().is_empty() {
            tracing::warn!(
                path = %path.display(),
                previous = %previous.trim(),
                "Taking over run lock left by an exited process"
            );
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "pid={} acquired_at={}", std::process::id(), Utc::now().to_rfc3339())?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), "Run lock acquired");
        Ok(Self { path, file })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // the file stays in place; clearing it marks a clean release
        if let Err(e) = self.file.set_len(0) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to clear run lock"
            );
        }
        tracing::debug!(path = %self.path.display(), "Run lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_concurrency_violation() {
        let dir = TempDir::new().unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());

        let err = RunLock::acquire(dir.path()).unwrap_err();
        assert!(err.is_concurrency_violation());
        assert!(err.to_string().contains(&format!("pid={}", std::process::id())));
    }

    #[test]
    fn test_drop_releases_lock() {
        let dir = TempDir::new().unwrap();
        let path = {
            let lock = RunLock::acquire(dir.path()).unwrap();
            lock.path().to_path_buf()
        };
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert!(RunLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_lock_file_of_killed_run_is_taken_over() {
        let dir = TempDir::new().unwrap();
        // what a SIGKILLed run leaves behind: the note, but no kernel lock
        fs::write(
            dir.path().join(LOCK_FILE),
            "pid=4194304 acquired_at=2025-01-01T00:00:00+00:00\n",
        )
        .unwrap();

        let lock = RunLock::acquire(dir.path()).unwrap();
        let note = fs::read_to_string(lock.path()).unwrap();
        assert!(note.starts_with(&format!("pid={} ", std::process::id())));
        assert_eq!(note.lines().count(), 1);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("state").join("run");
        let lock = RunLock::acquire(&nested).unwrap();
        assert!(lock.path().starts_with(&nested));
    }
}
