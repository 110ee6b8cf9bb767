//! core::ops
//!
//! Mutation coordination.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive repository lock
//!
//! # Architecture
//!
//! Every mutating store operation:
//! 1. Re-validates the repository and refuses to run mid-merge or mid-rebase
//! 2. Acquires the exclusive repo lock
//! 3. Writes the working tree, stages, commits
//! 4. On failure: compensates (see [`crate::store::compensation`])
//! 5. Releases the lock

pub mod lock;

pub use lock::{LockError, RepoLock};
