//! store
//!
//! Versioned storage of pages and attachments.
//!
//! # Architecture
//!
//! Consumers talk to the [`ContentStore`] trait and never to a backend
//! directly. Backends:
//!
//! - [`GitStore`] - the durable backend: one git repository, one commit per
//!   mutation, history reconstructed from `git log`
//! - [`MemoryStore`] - in-process backend for tests and dry runs
//!
//! Stores are created once through the [`Registry`] from configuration and
//! shared by reference.
//!
//! # Example
//!
//! ```ignore
//! use pagevault::store::{ContentStore, Registry};
//!
//! let registry = Registry::from_config(&config)?;
//! let pages = Namespace::new("pages")?;
//! let store = registry.store_for(&pages)?;
//! for name in store.list(&pages)? {
//!     println!("{}", name);
//! }
//! ```

pub mod compensation;
mod git_store;
mod memory;
mod registry;
mod traits;

pub use git_store::{GitStore, StoreSettings};
pub use memory::MemoryStore;
pub use registry::{valid_backend_names, BackendKind, Registry, RegistryError};
pub use traits::ContentStore;

use std::path::PathBuf;

use thiserror::Error;

use crate::core::ops::LockError;
use crate::core::types::{Change, RevSpec, TypeError};
use crate::git::{GitError, RunnerError};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The repository is missing, bare, or busy with another operation.
    #[error(transparent)]
    Repository(GitError),

    /// The document does not exist at the requested revision.
    #[error("{path} not found at {revision}")]
    NotFound { path: String, revision: String },

    /// A rename target is already taken.
    #[error("{path} already exists")]
    AlreadyExists { path: String },

    /// A revision selector does not resolve to a commit.
    #[error("unknown revision: {revision}")]
    RevisionNotFound { revision: String },

    /// A namespace, name or revision failed validation.
    #[error(transparent)]
    InvalidName(#[from] TypeError),

    /// A backend process failed or timed out.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// The repository lock could not be taken.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Working-tree I/O failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Content was requested as text but is not UTF-8.
    #[error("content is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A multi-step mutation failed part way.
    #[error("{operation} failed ({}): {source}", rollback_note(.rolled_back))]
    MutationFailed {
        operation: &'static str,
        source: Box<StoreError>,
        /// Whether the working tree and index were restored
        rolled_back: bool,
    },
}

fn rollback_note(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        "changes rolled back"
    } else {
        "rollback incomplete"
    }
}

impl From<GitError> for StoreError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::Command(e) => StoreError::Runner(e),
            GitError::RevisionNotFound { revision } => StoreError::RevisionNotFound { revision },
            other => StoreError::Repository(other),
        }
    }
}

impl StoreError {
    /// Whether this error means "no such document".
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound { .. } => true,
            StoreError::MutationFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StoreError {
        let path = path.into();
        move |source| StoreError::Io { path, source }
    }
}

/// Order changes oldest first and keep the newest `limit` (all when 0).
///
/// The sort is stable: changes with equal dates keep the order in which
/// they were collected.
pub(crate) fn merge_changes(mut changes: Vec<Change>, limit: usize) -> Vec<Change> {
    changes.sort_by_key(|change| change.revision.date);
    if limit > 0 && changes.len() > limit {
        changes.drain(..changes.len() - limit);
    }
    changes
}

/// Mutations always apply to the tip.
pub(crate) fn ensure_unpinned(revision: &Option<RevSpec>) -> Result<(), StoreError> {
    match revision {
        Some(rev) if rev != &RevSpec::head() => Err(TypeError::InvalidRevision(format!(
            "cannot modify a document pinned to {}",
            rev
        ))
        .into()),
        _ => Ok(()),
    }
}

/// The commit message actually recorded for a user-supplied message.
pub(crate) fn commit_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        "-".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Message of a rename commit.
pub(crate) fn rename_message(from: &str, to: &str) -> String {
    format!("{} ⇒ {}", from, to)
}

/// Message of a delete commit.
pub(crate) fn delete_message(name: &str) -> String {
    format!("{} ⇒ void", name)
}
