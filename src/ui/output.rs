//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Output is formatted consistently and respects the quiet flag.
//! When `--json` is enabled, output is machine-readable JSON.

use std::fmt::Display;

use serde::Serialize;

use crate::core::types::{Change, ChangeKind, Revision};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Print a value as pretty JSON (always shown).
pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One-line form of a revision: `SHORTID date author: message`.
///
/// ```
/// use chrono::DateTime;
/// use pagevault::core::types::{Oid, Revision};
/// use pagevault::ui::output::format_revision;
///
/// let rev = Revision::new(
///     Oid::new("abc123def4567890abc123def4567890abc12345").unwrap(),
///     "Alice",
///     "alice@example.com",
///     DateTime::parse_from_rfc3339("2023-01-01T12:00:00+01:00").unwrap(),
///     "init",
/// );
/// assert_eq!(format_revision(&rev), "ABC123DE 2023-01-01 12:00 +01:00 Alice: init");
/// ```
pub fn format_revision(revision: &Revision) -> String {
    format!(
        "{} {} {}: {}",
        revision.short_id,
        revision.date.format("%Y-%m-%d %H:%M %:z"),
        revision.author,
        revision.message
    )
}

/// One-line form of a change, qualified by namespace (and page for
/// attachments).
pub fn format_change(change: &Change) -> String {
    let target = match &change.kind {
        ChangeKind::Page => format!("{}/{}", change.namespace, change.name),
        ChangeKind::Attachment { page } => {
            format!("{}/{} [{}]", change.namespace, page, change.name)
        }
    };
    format!("{} {}", target, format_revision(&change.revision))
}

/// Format a list of items.
pub fn format_list<T: Display>(items: &[T], prefix: &str) -> String {
    items
        .iter()
        .map(|item| format!("{}{}", prefix, item))
        .collect::<Vec<_>>()
        .join("\n")
}
