//! store::compensation
//!
//! Undo for half-finished mutations.
//!
//! A mutation writes the working tree, stages, then commits. If any step
//! after the first write fails, the paths it touched are put back the way
//! `HEAD` has them:
//!
//! - staged changes for the touched paths are dropped
//! - paths that exist at `HEAD` are checked out from `HEAD`
//! - paths that did not exist at `HEAD` are removed, along with any
//!   directories that became empty
//!
//! Steps run in reverse order of tracking. A step that fails is logged and
//! the remaining steps still run; the overall outcome reports whether every
//! step succeeded.
//!
//! # Known Limitations
//!
//! - A process killed between stage and commit leaves the stage behind;
//!   the next mutation of the same path stages over it
//! - Untracked content that was overwritten is not recovered
//!
//! # Example
//!
//! ```ignore
//! let mut guard = Compensation::new(&git, &paths);
//! guard.track(&path)?;
//! match write_and_commit() {
//!     Ok(()) => guard.disarm(),
//!     Err(e) => {
//!         let rolled_back = guard.rollback();
//!         return Err(StoreError::MutationFailed { operation: "save", source: Box::new(e), rolled_back });
//!     }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::paths::{BackendPath, StorePaths};
use crate::git::{Git, GitError};

/// A path a mutation is about to touch.
#[derive(Debug, Clone)]
struct Touched {
    repo_path: String,
    file: PathBuf,
    existed_at_head: bool,
}

/// Guard that restores touched paths unless disarmed.
///
/// Dropping an armed guard (an early return or a panic between tracking
/// and commit) runs the rollback.
#[derive(Debug)]
pub struct Compensation<'a> {
    git: &'a Git,
    paths: StorePaths,
    touched: Vec<Touched>,
    armed: bool,
}

impl<'a> Compensation<'a> {
    /// Start an armed guard with nothing tracked.
    pub fn new(git: &'a Git, paths: &StorePaths) -> Self {
        Self {
            git,
            paths: paths.clone(),
            touched: Vec::new(),
            armed: true,
        }
    }

    /// Record `path` before it is modified.
    pub fn track(&mut self, path: &BackendPath) -> Result<(), GitError> {
        let repo_path = path.repo_path();
        let existed_at_head = self.git.exists_at_head(&repo_path)?;
        debug!(path = %repo_path, existed_at_head, "tracking for compensation");
        self.touched.push(Touched {
            repo_path,
            file: self.paths.worktree_file(path),
            existed_at_head,
        });
        Ok(())
    }

    /// Repository paths tracked so far, in tracking order.
    pub fn repo_paths(&self) -> Vec<String> {
        self.touched.iter().map(|t| t.repo_path.clone()).collect()
    }

    /// The mutation succeeded; nothing to undo.
    pub fn disarm(mut self) {
        self.armed = false;
    }

    /// Undo every tracked path. Returns `true` if every step succeeded.
    pub fn rollback(mut self) -> bool {
        self.armed = false;
        self.run()
    }

    fn run(&self) -> bool {
        let mut clean = true;
        let paths = self.repo_paths();
        if !paths.is_empty() {
            if let Err(e) = self.git.unstage(&paths) {
                warn!(error = %e, "compensation: unstage failed");
                clean = false;
            }
        }
        for touched in self.touched.iter().rev() {
            let result = if touched.existed_at_head {
                self.git
                    .restore_from_head(&touched.repo_path)
                    .map_err(|e| e.to_string())
            } else {
                remove_created(&touched.file, self.paths.work_dir()).map_err(|e| e.to_string())
            };
            match result {
                Ok(()) => debug!(path = %touched.repo_path, "compensation: restored"),
                Err(e) => {
                    warn!(path = %touched.repo_path, error = %e, "compensation: restore failed");
                    clean = false;
                }
            }
        }
        clean
    }
}

impl Drop for Compensation<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("mutation abandoned; rolling back");
            self.run();
        }
    }
}

/// Remove a file the mutation created, then prune empty parents up to (not
/// including) `work_dir`.
fn remove_created(file: &Path, work_dir: &Path) -> std::io::Result<()> {
    match fs::remove_file(file) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let mut dir = file.parent();
    while let Some(d) = dir {
        if d == work_dir || !d.starts_with(work_dir) {
            break;
        }
        if fs::remove_dir(d).is_err() {
            // Not empty, or already gone.
            break;
        }
        dir = d.parent();
    }
    Ok(())
}
