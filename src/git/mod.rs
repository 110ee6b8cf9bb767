//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to Git. All repository reads and writes
//! flow through [`Git`]. No other module should import `git2` or build a git
//! command line.
//!
//! - [`interface`] - the [`Git`] doorway: validation via `git2`, history and
//!   mutations via the git CLI
//! - [`runner`] - the [`CommandRunner`] port and its process adapter
//!
//! # Invariants
//!
//! - Arguments are passed as argv, never through a shell
//! - Every process has a deadline
//! - Mutations are refused while a merge, rebase or similar is in progress

mod interface;
pub mod runner;

pub use interface::{EntryKind, Git, GitError, GitSettings, GitState, RepoInfo, TreeEntry};
pub use runner::{CommandRunner, Invocation, LineStream, Output, ProcessRunner, RunnerError};
