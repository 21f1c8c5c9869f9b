// ABOUTME: Non-blocking exclusive lock on <root>/dumping.lock guarding one archive directory.
// ABOUTME: The lock file records the owner's PID and is removed when the guard is dropped.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::ArchiveError;

pub const LOCK_FILE: &str = "dumping.lock";

/// Held for the lifetime of a run.
#[derive(Debug)]
pub struct ArchiveLock {
    path: PathBuf,
    file: File,
}

impl ArchiveLock {
    /// Takes the lock or fails immediately with [`ErrorCode::AlreadyRunning`](crate::ErrorCode).
    pub fn acquire(root: &Path) -> Result<Self, ArchiveError> {
        let path = root.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| ArchiveError::io(path.display().to_string(), "Lock", e))?;

        if let Err(e) = file.try_lock_exclusive() {
            return Err(ArchiveError::already_running(
                path.display().to_string(),
                Some(anyhow::Error::new(e)),
            ));
        }

        let marker = format!("PID: {}: Running", std::process::id());
        file.set_len(0)
            .and_then(|_| file.write_all(marker.as_bytes()))
            .and_then(|_| file.flush())
            .map_err(|e| ArchiveError::io(path.display().to_string(), "Lock", e))?;
        debug!(path = %path.display(), "archive locked");

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArchiveLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "could not release lock");
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "could not remove lock file");
        }
    }
}
