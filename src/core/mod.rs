//! core
//!
//! Core domain types, schemas, and operations for pagevault.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Namespace, DocumentName, Oid, Revision, etc.
//! - [`paths`] - Name encoding and repository path layout
//! - [`history`] - Parser for `git log` output
//! - [`ops`] - Repository locking
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Parsing is pure and deterministic

pub mod config;
pub mod history;
pub mod ops;
pub mod paths;
pub mod types;
