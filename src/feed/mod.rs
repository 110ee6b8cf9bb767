//! feed
//!
//! Cross-namespace change feed ("recent changes").
//!
//! # Ordering
//!
//! Changes are bucketed by calendar day (`YYYY-MM-DD`, in each revision's
//! own UTC offset). Buckets run newest day first; within a bucket, entries
//! run newest first. The flattened sequence is then cut to exactly `limit`
//! entries.
//!
//! # Example
//!
//! ```ignore
//! use pagevault::feed::FeedBuilder;
//!
//! let entries = FeedBuilder::from_config(&config).build(&registry)?;
//! for entry in entries {
//!     println!("{} {} {}", entry.day, entry.change.name, entry.change.revision.short_id);
//! }
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::core::config::Config;
use crate::core::types::{Change, Namespace};
use crate::store::{Registry, RegistryError, StoreError};

/// Errors from building a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("namespace '{namespace}': {source}")]
    Store {
        namespace: Namespace,
        source: StoreError,
    },
}

/// One line of the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    /// Day bucket, `YYYY-MM-DD`
    pub day: String,
    #[serde(flatten)]
    pub change: Change,
}

/// Order `changes` into day buckets and keep the first `limit` entries.
///
/// `limit == 0` keeps everything.
///
/// ```
/// use chrono::DateTime;
/// use pagevault::core::types::{Change, Namespace, Oid, Revision};
/// use pagevault::feed::aggregate;
///
/// let change = |name: &str, date: &str| {
///     Change::page(
///         Namespace::new("pages").unwrap(),
///         name,
///         Revision::new(
///             Oid::new("0123456789abcdef0123456789abcdef01234567").unwrap(),
///             "Alice",
///             "alice@example.com",
///             DateTime::parse_from_rfc3339(date).unwrap(),
///             "edit",
///         ),
///     )
/// };
/// let feed = aggregate(
///     vec![
///         change("A", "2023-01-01T10:00:00Z"),
///         change("B", "2023-01-02T09:00:00Z"),
///         change("C", "2023-01-01T12:00:00Z"),
///     ],
///     0,
/// );
/// let names: Vec<_> = feed.iter().map(|e| e.change.name.as_str()).collect();
/// assert_eq!(names, ["B", "C", "A"]);
/// ```
pub fn aggregate(changes: Vec<Change>, limit: usize) -> Vec<FeedEntry> {
    let mut buckets: BTreeMap<String, Vec<Change>> = BTreeMap::new();
    for change in changes {
        buckets
            .entry(change.revision.day_key())
            .or_default()
            .push(change);
    }

    let mut entries = Vec::new();
    for (day, mut bucket) in buckets.into_iter().rev() {
        bucket.sort_by(|a, b| b.revision.date.cmp(&a.revision.date));
        entries.extend(bucket.into_iter().map(|change| FeedEntry {
            day: day.clone(),
            change,
        }));
    }

    if limit > 0 {
        entries.truncate(limit);
    }
    entries
}

/// Group consecutive entries of the same day, preserving order.
pub fn by_day(entries: &[FeedEntry]) -> Vec<(&str, Vec<&FeedEntry>)> {
    let mut groups: Vec<(&str, Vec<&FeedEntry>)> = Vec::new();
    for entry in entries {
        match groups.last_mut() {
            Some((day, items)) if *day == entry.day => items.push(entry),
            _ => groups.push((entry.day.as_str(), vec![entry])),
        }
    }
    groups
}

/// Builds the feed from every namespace of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedBuilder {
    per_namespace_limit: usize,
    limit: usize,
}

impl Default for FeedBuilder {
    fn default() -> Self {
        Self {
            per_namespace_limit: Config::DEFAULT_FEED_LIMIT,
            limit: Config::DEFAULT_FEED_LIMIT,
        }
    }
}

impl FeedBuilder {
    /// Builder with the default limits (15 and 15).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with the limits from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            per_namespace_limit: config.per_namespace_limit(),
            limit: config.feed_limit(),
        }
    }

    /// Changes taken from each namespace, per kind (0 = all).
    pub fn per_namespace_limit(mut self, limit: usize) -> Self {
        self.per_namespace_limit = limit;
        self
    }

    /// Entries in the final feed (0 = all).
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Page and attachment changes of every namespace, unordered.
    pub fn collect(&self, registry: &Registry) -> Result<Vec<Change>, FeedError> {
        let mut changes = Vec::new();
        for ns in registry.namespaces() {
            let store = registry.store_for(ns)?;
            let wrap = |source| FeedError::Store {
                namespace: ns.clone(),
                source,
            };
            let pages = store.changes(ns, self.per_namespace_limit).map_err(wrap)?;
            let attachments = store
                .attachment_changes(ns, None, self.per_namespace_limit)
                .map_err(wrap)?;
            debug!(
                namespace = %ns,
                pages = pages.len(),
                attachments = attachments.len(),
                "collected changes"
            );
            changes.extend(pages);
            changes.extend(attachments);
        }
        Ok(changes)
    }

    /// The ordered, truncated feed.
    pub fn build(&self, registry: &Registry) -> Result<Vec<FeedEntry>, FeedError> {
        Ok(aggregate(self.collect(registry)?, self.limit))
    }
}
