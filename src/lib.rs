//! pagevault - Versioned page and attachment storage backed by git
//!
//! pagevault keeps wiki-style documents in a git repository: every save,
//! rename and delete is one commit, and the history of each document is
//! read back from `git log`.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, calls the store)
//! - [`store`] - The `ContentStore` trait, its backends and the registry
//! - [`feed`] - Cross-namespace change feed grouped by day
//! - [`core`] - Domain types, path layout, history parsing, config, locking
//! - [`git`] - Single interface for all git invocations
//! - [`ui`] - Output formatting
//!
//! # Correctness Invariants
//!
//! 1. Every mutation produces at most one commit
//! 2. Mutations of one repository are serialized by an exclusive lock
//! 3. A failed mutation restores the working tree and index it touched
//! 4. Names reaching git are validated and can never be read as options

pub mod cli;
pub mod core;
pub mod feed;
pub mod git;
pub mod store;
pub mod ui;
