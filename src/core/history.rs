//! core::history
//!
//! Revision history parser.
//!
//! Turns the text produced by
//!
//! ```text
//! git log --reverse --raw --no-decorate --date=iso --all -- <path>
//! ```
//!
//! into [`Revision`] records, oldest first.
//!
//! # State Machine
//!
//! ```text
//!            commit <sha>            Author: / Date:          <indented text>
//!   Idle ───────────────▶ Header ─────────────────▶ Header ─────────────────▶ Message
//!    ▲                      │                                                  │
//!    └──── end of input ────┴──────────── commit <sha> (emit if complete) ◀────┘
//! ```
//!
//! A pending record is complete once it has an id, an author, a date and a
//! non-empty message. It is emitted when the next `commit` marker arrives or
//! when input ends. Incomplete records are dropped; this is the only place
//! where malformed backend output is tolerated silently, so a truncated tail
//! never hides an otherwise valid history.
//!
//! Raw diff lines (`:100644 100644 ...`) and `Merge:` headers carry no
//! revision fields and are ignored.
//!
//! # Example
//!
//! ```
//! use pagevault::core::history::parse_history;
//!
//! let log = "\
//! commit 0123456789abcdef0123456789abcdef01234567
//! Author: Alice <alice@example.com>
//! Date:   2023-01-01 12:00:00 +0100
//!
//!     init
//!
//! :000000 100644 0000000 e965047 A\tpages/Home
//! ";
//! let revisions = parse_history(log.lines());
//! assert_eq!(revisions.len(), 1);
//! assert_eq!(revisions[0].author, "Alice");
//! assert_eq!(revisions[0].message, "init");
//! assert_eq!(revisions[0].short_id, "01234567");
//! ```

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::core::types::{Oid, Revision};

/// Parse a backend timestamp.
///
/// Accepts `--date=iso` output (`2023-01-01 12:00:00 +0100`), RFC 3339
/// (`--date=iso-strict`) and git's default format
/// (`Sun Jan 1 12:00:00 2023 +0100`).
///
/// ```
/// use pagevault::core::history::parse_date;
///
/// let date = parse_date("2023-01-01 12:00:00 +0100").unwrap();
/// assert_eq!(date.offset().local_minus_utc(), 3600);
/// assert!(parse_date("yesterday").is_none());
/// ```
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .or_else(|_| DateTime::parse_from_str(raw, "%a %b %e %H:%M:%S %Y %z"))
        .ok()
}

/// Where the parser is within the current commit block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Before the first commit marker.
    Idle,
    /// Inside the header lines of a commit.
    Header,
    /// Inside the indented message body.
    Message,
}

/// Fields collected for the commit currently being read.
#[derive(Debug, Default)]
struct PendingRevision {
    id: Option<Oid>,
    author: Option<(String, String)>,
    date: Option<DateTime<FixedOffset>>,
    message: Vec<String>,
}

impl PendingRevision {
    fn starting_at(id: Oid) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.id.is_none() && self.author.is_none() && self.date.is_none() && self.message.is_empty()
    }

    /// Turn the collected fields into a revision, if all are present.
    fn complete(self) -> Result<Revision, Self> {
        let message = self.message.join(" ").trim().to_string();
        match (self.id, self.author, self.date) {
            (Some(id), Some((author, email)), Some(date)) if !message.is_empty() => {
                Ok(Revision::new(id, author, email, date, message))
            }
            (id, author, date) => Err(Self {
                id,
                author,
                date,
                message: self.message,
            }),
        }
    }
}

/// Push parser for `git log` output.
///
/// Feed it one line at a time; it hands back each revision as soon as the
/// record is known to be finished.
///
/// ```
/// use pagevault::core::history::HistoryParser;
///
/// let mut parser = HistoryParser::new();
/// assert!(parser.feed("commit 0123456789abcdef0123456789abcdef01234567").is_none());
/// assert!(parser.feed("Author: Bob <bob@example.com>").is_none());
/// assert!(parser.feed("Date:   2023-01-02 08:00:00 +0000").is_none());
/// assert!(parser.feed("    fix typo").is_none());
/// let last = parser.finish().unwrap();
/// assert_eq!(last.message, "fix typo");
/// ```
#[derive(Debug)]
pub struct HistoryParser {
    state: ParseState,
    pending: PendingRevision,
    dropped: usize,
}

impl Default for HistoryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryParser {
    /// Create a parser in the idle state.
    pub fn new() -> Self {
        Self {
            state: ParseState::Idle,
            pending: PendingRevision::default(),
            dropped: 0,
        }
    }

    /// Number of incomplete records discarded so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Consume one line of log output.
    ///
    /// Returns the previous revision when `line` starts a new commit and the
    /// previous record was complete.
    pub fn feed(&mut self, line: &str) -> Option<Revision> {
        let line = line.trim_end_matches(['\n', '\r']);

        if let Some(rest) = line.strip_prefix("commit ") {
            let sha = rest.split_whitespace().next().unwrap_or_default();
            if let Ok(id) = Oid::new(sha) {
                let previous = std::mem::replace(&mut self.pending, PendingRevision::starting_at(id));
                self.state = ParseState::Header;
                return self.settle(previous);
            }
        }

        match self.state {
            ParseState::Idle => {}
            ParseState::Header | ParseState::Message => {
                if let Some(rest) = line.strip_prefix("Author:") {
                    self.pending.author = parse_author(rest);
                } else if let Some(rest) = line.strip_prefix("Date:") {
                    self.pending.date = parse_date(rest);
                } else if line.starts_with(char::is_whitespace) && !line.trim().is_empty() {
                    self.pending.message.push(line.trim().to_string());
                    self.state = ParseState::Message;
                }
            }
        }
        None
    }

    /// Signal end of input, flushing the last record if it is complete.
    pub fn finish(mut self) -> Option<Revision> {
        let last = std::mem::take(&mut self.pending);
        self.state = ParseState::Idle;
        let revision = self.settle(last);
        if self.dropped > 0 {
            debug!(dropped = self.dropped, "discarded incomplete history records");
        }
        revision
    }

    fn settle(&mut self, pending: PendingRevision) -> Option<Revision> {
        if pending.is_empty() {
            return None;
        }
        match pending.complete() {
            Ok(revision) => Some(revision),
            Err(incomplete) => {
                self.dropped += 1;
                debug!(
                    id = incomplete.id.as_ref().map(|id| id.as_str()).unwrap_or("?"),
                    "incomplete history record"
                );
                None
            }
        }
    }
}

/// Parse `" Name <email>"` into its parts.
fn parse_author(rest: &str) -> Option<(String, String)> {
    let rest = rest.trim();
    let (name, email) = rest.rsplit_once(" <")?;
    let email = email.strip_suffix('>')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), email.to_string()))
}

/// Parse a complete log text, oldest first.
pub fn parse_history<I, S>(lines: I) -> Vec<Revision>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = HistoryParser::new();
    let mut revisions: Vec<Revision> = lines
        .into_iter()
        .filter_map(|line| parser.feed(line.as_ref()))
        .collect();
    revisions.extend(parser.finish());
    revisions
}

/// Pull adapter: yields revisions while lines are still being produced.
///
/// Wraps any fallible line iterator (such as a
/// [`LineStream`](crate::git::LineStream)). A line error is passed through
/// and ends the stream.
pub struct RevisionStream<I> {
    lines: I,
    parser: Option<HistoryParser>,
}

impl<I> RevisionStream<I> {
    /// Wrap a line iterator.
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            parser: Some(HistoryParser::new()),
        }
    }
}

impl<I, E> Iterator for RevisionStream<I>
where
    I: Iterator<Item = Result<String, E>>,
{
    type Item = Result<Revision, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let parser = self.parser.as_mut()?;
            match self.lines.next() {
                Some(Ok(line)) => {
                    if let Some(revision) = parser.feed(&line) {
                        return Some(Ok(revision));
                    }
                }
                Some(Err(e)) => {
                    self.parser = None;
                    return Some(Err(e));
                }
                None => {
                    return self.parser.take().and_then(HistoryParser::finish).map(Ok);
                }
            }
        }
    }
}
