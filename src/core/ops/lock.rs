//! core::ops::lock
//!
//! Exclusive repository lock for store mutations.
//!
//! # Architecture
//!
//! Every mutation (write the file, stage, commit) runs under this lock so
//! that two writers, in this process or another one, never interleave
//! their index updates. Reads do not take the lock.
//!
//! # Storage
//!
//! - `<git_dir>/pagevault/lock` - Lock file with OS-level exclusive lock
//!
//! # Invariants
//!
//! - Lock is held from the first working-tree write until the commit (or
//!   compensation) finishes
//! - Lock is automatically released on drop (RAII pattern)
//! - Waiting is bounded: [`RepoLock::acquire_timeout`] gives up with
//!   [`LockError::AlreadyLocked`]
//!
//! # Example
//!
//! ```ignore
//! use pagevault::core::ops::lock::RepoLock;
//! use pagevault::core::paths::StorePaths;
//! use std::time::Duration;
//!
//! let paths = StorePaths::from_repo_info(&info);
//! let lock = RepoLock::acquire_timeout(&paths, Duration::from_secs(10))?;
//!
//! // Perform operations while holding lock
//! // ...
//!
//! // Lock automatically released when dropped
//! drop(lock);
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

use crate::core::paths::StorePaths;

/// Pause between attempts while waiting for the lock.
const RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another writer holds the lock.
    #[error("repository is locked by another writer")]
    AlreadyLocked,

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// An exclusive lock on the repository.
///
/// The lock is automatically released when this guard is dropped, even if
/// the operation panics.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    /// `Some` while the lock is held.
    file: Option<File>,
}

impl RepoLock {
    /// Attempt to acquire the repository lock without waiting.
    ///
    /// This uses OS-level file locking via `fs2`, which works across
    /// processes and across handles within one process.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another writer holds the lock
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(paths: &StorePaths) -> Result<Self, LockError> {
        let vault_dir = paths.vault_dir();
        fs::create_dir_all(&vault_dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", vault_dir.display(), e))
        })?;

        let path = paths.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(LockError::AlreadyLocked)
            }
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Acquire the lock, retrying until `timeout` has elapsed.
    ///
    /// A zero timeout makes a single attempt.
    pub fn acquire_timeout(paths: &StorePaths, timeout: Duration) -> Result<Self, LockError> {
        let deadline = Instant::now() + timeout;
        loop {
            match Self::acquire(paths) {
                Err(LockError::AlreadyLocked) if Instant::now() < deadline => {
                    debug!(path = %paths.lock_path().display(), "waiting for repository lock");
                    thread::sleep(RETRY_INTERVAL);
                }
                other => return other,
            }
        }
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock before the guard goes out of scope.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.unlock()
                .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
