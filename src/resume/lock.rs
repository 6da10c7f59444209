//! Advisory lock guarding one league season against concurrent ingestion
//!
//! Two processes ingesting the same league season would race on entity and
//! ledger writes. The runner holds this lock (a `.lock` file next to the
//! ledger, via fd-lock) for the whole run and refuses to start when another
//! process holds it.

use super::state::StateError;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lock file handle for a ledger
pub struct IngestionLock {
    lock: RwLock<File>,
    path: PathBuf,
}

impl IngestionLock {
    /// Open (creating if needed) the lock file for the ledger at `state_path`
    pub fn open(state_path: &Path) -> Result<Self, StateError> {
        if let Some(parent) = state_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StateError::IoError(e.to_string()))?;
        }

        let path = state_path.with_extension("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StateError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            lock: RwLock::new(file),
            path,
        })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive lock without blocking.
    ///
    /// The lock is released when the returned guard is dropped.
    pub fn try_hold(&mut self) -> Result<RwLockWriteGuard<'_, File>, StateError> {
        let path = self.path.clone();
        match self.lock.try_write() {
            Ok(guard) => {
                debug!(path = %path.display(), "Ingestion lock acquired");
                Ok(guard)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(StateError::Locked(path)),
            Err(e) => Err(StateError::LockError(format!("Failed to acquire lock: {e}"))),
        }
    }
}

impl std::fmt::Debug for IngestionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionLock").field("path", &self.path).finish()
    }
}
