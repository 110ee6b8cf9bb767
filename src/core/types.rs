//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`Oid`] - Git object identifier (commit SHA)
//! - [`Namespace`] - Validated document namespace (a repository subtree)
//! - [`DocumentName`] - Validated logical document name
//! - [`RevSpec`] - Validated revision selector (`HEAD`, a SHA, a branch)
//! - [`DocumentRef`] / [`AttachmentRef`] - Document identities
//! - [`Author`] - Commit attribution
//! - [`Revision`] / [`Change`] - History records
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, so nothing that reaches the git command line
//! can be mistaken for an option or a path traversal.
//!
//! # Examples
//!
//! ```
//! use pagevault::core::types::{DocumentName, Namespace, Oid};
//!
//! let ns = Namespace::new("pages").unwrap();
//! let name = DocumentName::new("Front Page").unwrap();
//! let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
//!
//! assert!(Namespace::new("../etc").is_err());
//! assert!(DocumentName::new(".hidden").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! # let _ = (ns, name, oid);
//! ```

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("invalid document name: {0}")]
    InvalidName(String),

    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),
}

/// A Git object identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase for consistency.
///
/// # Example
///
/// ```
/// use pagevault::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a 40 or 64
    /// character hex string.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        Self::validate(&oid)?;
        Ok(Self(oid))
    }

    /// Check whether a string looks like a full object id without allocating.
    pub fn is_valid(s: &str) -> bool {
        Self::validate(s).is_ok()
    }

    /// Get an abbreviated form of the OID.
    ///
    /// Returns the first `len` characters. If `len` exceeds the OID length,
    /// returns the full OID.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(oid: &str) -> Result<(), TypeError> {
        // SHA-1 is 40 hex chars, SHA-256 is 64
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(())
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated namespace.
///
/// Namespaces map one-to-one to top-level directories of the backing
/// repository, so they are restricted to ASCII letters, digits, `-` and `_`.
///
/// ```
/// use pagevault::core::types::Namespace;
///
/// assert_eq!(Namespace::new("user_pages").unwrap().as_str(), "user_pages");
/// assert!(Namespace::new("").is_err());
/// assert!(Namespace::new("a/b").is_err());
/// assert!(Namespace::new("-pages").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Create a new validated namespace.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::InvalidNamespace(
                "namespace cannot be empty".into(),
            ));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidNamespace(
                "namespace cannot start with '-'".into(),
            ));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(TypeError::InvalidNamespace(format!(
                "namespace cannot contain '{}'",
                c.escape_default()
            )));
        }
        Ok(Self(name))
    }

    /// Get the namespace as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Namespace {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated logical document name.
///
/// Names are what users type: they may contain spaces and most punctuation.
/// They become a single path component in the repository, so they must not:
/// - be empty or longer than 255 bytes
/// - start with `.` (reserved for hidden entries) or `-`
/// - contain `/`, `\` or ASCII control characters
///
/// The stored form is produced by [`crate::core::paths::encode_name`].
///
/// ```
/// use pagevault::core::types::DocumentName;
///
/// let name = DocumentName::new("Release notes: 2.0").unwrap();
/// assert_eq!(name.as_str(), "Release notes: 2.0");
///
/// assert!(DocumentName::new("").is_err());
/// assert!(DocumentName::new("a/b").is_err());
/// assert!(DocumentName::new(".git").is_err());
/// assert!(DocumentName::new("--force").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentName(String);

impl DocumentName {
    const MAX_LEN: usize = 255;

    /// Create a new validated document name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidName` if the name could not be stored as a
    /// single, visible path component.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.trim().is_empty() {
            return Err(TypeError::InvalidName("name cannot be empty".into()));
        }
        if name.len() > Self::MAX_LEN {
            return Err(TypeError::InvalidName(format!(
                "name cannot exceed {} bytes",
                Self::MAX_LEN
            )));
        }
        if name.starts_with('.') {
            return Err(TypeError::InvalidName("name cannot start with '.'".into()));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidName("name cannot start with '-'".into()));
        }
        for c in ['/', '\\'] {
            if name.contains(c) {
                return Err(TypeError::InvalidName(format!(
                    "name cannot contain '{c}'"
                )));
            }
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(TypeError::InvalidName(
                "name cannot contain control characters".into(),
            ));
        }
        Ok(())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DocumentName> for String {
    fn from(name: DocumentName) -> Self {
        name.0
    }
}

impl AsRef<str> for DocumentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated revision selector.
///
/// Anything git accepts as a commit-ish is allowed (`HEAD`, a full or
/// abbreviated SHA, a branch or tag name, `HEAD~2`) as long as it cannot be
/// parsed as an option and does not smuggle a path through `:`.
///
/// ```
/// use pagevault::core::types::RevSpec;
///
/// assert_eq!(RevSpec::head().as_str(), "HEAD");
/// assert!(RevSpec::new("HEAD~2").is_ok());
/// assert!(RevSpec::new("--all").is_err());
/// assert!(RevSpec::new("HEAD:secret").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevSpec(String);

impl RevSpec {
    /// The tip of history.
    pub fn head() -> Self {
        Self("HEAD".to_string())
    }

    /// Create a new validated revision selector.
    pub fn new(rev: impl Into<String>) -> Result<Self, TypeError> {
        let rev = rev.into();
        if rev.is_empty() {
            return Err(TypeError::InvalidRevision(
                "revision cannot be empty".into(),
            ));
        }
        if rev.starts_with('-') {
            return Err(TypeError::InvalidRevision(
                "revision cannot start with '-'".into(),
            ));
        }
        if rev.contains(':') {
            return Err(TypeError::InvalidRevision(
                "revision cannot contain ':'".into(),
            ));
        }
        if rev.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(TypeError::InvalidRevision(
                "revision cannot contain whitespace".into(),
            ));
        }
        Ok(Self(rev))
    }

    /// Get the selector as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RevSpec {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RevSpec> for String {
    fn from(rev: RevSpec) -> Self {
        rev.0
    }
}

impl From<Oid> for RevSpec {
    fn from(oid: Oid) -> Self {
        Self(oid.0)
    }
}

impl std::fmt::Display for RevSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a page, optionally pinned to a revision.
///
/// Identity is `(namespace, name)`. A `None` revision means the tip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub namespace: Namespace,
    pub name: DocumentName,
    pub revision: Option<RevSpec>,
}

impl DocumentRef {
    /// Reference the tip of a document.
    pub fn new(namespace: Namespace, name: DocumentName) -> Self {
        Self {
            namespace,
            name,
            revision: None,
        }
    }

    /// Validate raw strings and build a reference to the tip.
    ///
    /// ```
    /// use pagevault::core::types::DocumentRef;
    ///
    /// let doc = DocumentRef::parse("pages", "Home").unwrap();
    /// assert_eq!(doc.revision_or_head().as_str(), "HEAD");
    /// ```
    pub fn parse(namespace: &str, name: &str) -> Result<Self, TypeError> {
        Ok(Self::new(Namespace::new(namespace)?, DocumentName::new(name)?))
    }

    /// Pin this reference to a revision.
    pub fn at(mut self, revision: RevSpec) -> Self {
        self.revision = Some(revision);
        self
    }

    /// The revision to read, defaulting to `HEAD`.
    pub fn revision_or_head(&self) -> RevSpec {
        self.revision.clone().unwrap_or_else(RevSpec::head)
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{}/{}@{}", self.namespace, self.name, rev),
            None => write!(f, "{}/{}", self.namespace, self.name),
        }
    }
}

/// Identity of a file attached to a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub namespace: Namespace,
    pub page: DocumentName,
    pub name: DocumentName,
    pub revision: Option<RevSpec>,
}

impl AttachmentRef {
    /// Reference the tip of an attachment.
    pub fn new(namespace: Namespace, page: DocumentName, name: DocumentName) -> Self {
        Self {
            namespace,
            page,
            name,
            revision: None,
        }
    }

    /// Pin this reference to a revision.
    pub fn at(mut self, revision: RevSpec) -> Self {
        self.revision = Some(revision);
        self
    }

    /// The revision to read, defaulting to `HEAD`.
    pub fn revision_or_head(&self) -> RevSpec {
        self.revision.clone().unwrap_or_else(RevSpec::head)
    }
}

impl std::fmt::Display for AttachmentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.page, self.name)?;
        if let Some(rev) = &self.revision {
            write!(f, "@{}", rev)?;
        }
        Ok(())
    }
}

/// Who a commit is attributed to.
///
/// Both fields end up in `--author "name <email>"`, so angle brackets and
/// line breaks are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    /// Create a validated author identity.
    ///
    /// ```
    /// use pagevault::core::types::Author;
    ///
    /// let alice = Author::new("Alice", "alice@example.com").unwrap();
    /// assert_eq!(alice.to_string(), "Alice <alice@example.com>");
    /// assert!(Author::new("", "alice@example.com").is_err());
    /// assert!(Author::new("Alice", "<evil>").is_err());
    /// ```
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        let email = email.into();
        let bad = |s: &str| s.contains(['<', '>']) || s.chars().any(|c| c.is_control());
        if name.trim().is_empty() || bad(&name) {
            return Err(TypeError::InvalidName(format!(
                "invalid author name '{}'",
                name.escape_default()
            )));
        }
        if email.trim().is_empty() || bad(&email) || email.contains(char::is_whitespace) {
            return Err(TypeError::InvalidName(format!(
                "invalid author email '{}'",
                email.escape_default()
            )));
        }
        Ok(Self { name, email })
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// One commit that touched a document.
///
/// Revisions are only ever produced by the history parser, so every field
/// is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Full commit id
    pub id: Oid,
    /// Display form: first 8 characters, uppercased
    pub short_id: String,
    pub author: String,
    pub author_email: String,
    /// Author date, keeping the committer's UTC offset
    pub date: DateTime<FixedOffset>,
    /// Commit message collapsed to one line
    pub message: String,
}

impl Revision {
    /// Length of [`Revision::short_id`].
    pub const SHORT_ID_LEN: usize = 8;

    /// Build a revision, deriving the short id.
    ///
    /// ```
    /// use chrono::DateTime;
    /// use pagevault::core::types::{Oid, Revision};
    ///
    /// let rev = Revision::new(
    ///     Oid::new("abc123def4567890abc123def4567890abc12345").unwrap(),
    ///     "Alice",
    ///     "alice@example.com",
    ///     DateTime::parse_from_rfc3339("2023-01-01T12:00:00+01:00").unwrap(),
    ///     "init",
    /// );
    /// assert_eq!(rev.short_id, "ABC123DE");
    /// ```
    pub fn new(
        id: Oid,
        author: impl Into<String>,
        author_email: impl Into<String>,
        date: DateTime<FixedOffset>,
        message: impl Into<String>,
    ) -> Self {
        let short_id = id.short(Self::SHORT_ID_LEN).to_ascii_uppercase();
        Self {
            id,
            short_id,
            author: author.into(),
            author_email: author_email.into(),
            date,
            message: message.into(),
        }
    }

    /// Calendar day of the revision in its own offset (`YYYY-MM-DD`).
    pub fn day_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// What kind of document a [`Change`] refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Page,
    Attachment { page: String },
}

/// One historical mutation of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub namespace: Namespace,
    /// Display name of the document
    pub name: String,
    #[serde(flatten)]
    pub kind: ChangeKind,
    pub revision: Revision,
}

impl Change {
    /// A change to a page.
    pub fn page(namespace: Namespace, name: impl Into<String>, revision: Revision) -> Self {
        Self {
            namespace,
            name: name.into(),
            kind: ChangeKind::Page,
            revision,
        }
    }

    /// A change to an attachment of `page`.
    pub fn attachment(
        namespace: Namespace,
        page: impl Into<String>,
        name: impl Into<String>,
        revision: Revision,
    ) -> Self {
        Self {
            namespace,
            name: name.into(),
            kind: ChangeKind::Attachment { page: page.into() },
            revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod oid {
        use super::*;

        #[test]
        fn valid_sha1() {
            let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
            assert_eq!(oid.as_str().len(), 40);
        }

        #[test]
        fn valid_sha256() {
            let hex = "a".repeat(64);
            assert!(Oid::new(hex).is_ok());
        }

        #[test]
        fn normalizes_to_lowercase() {
            let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
            assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
        }

        #[test]
        fn short_form() {
            let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
            assert_eq!(oid.short(8), "abc123de");
            assert_eq!(oid.short(100), oid.as_str());
        }

        #[test]
        fn invalid_length() {
            assert!(Oid::new("").is_err());
            assert!(Oid::new("abc123").is_err());
        }

        #[test]
        fn non_hex_rejected() {
            assert!(Oid::new("xyz123def4567890abc123def4567890abc12345").is_err());
        }

        #[test]
        fn serde_roundtrip() {
            let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
            let json = serde_json::to_string(&oid).unwrap();
            let parsed: Oid = serde_json::from_str(&json).unwrap();
            assert_eq!(oid, parsed);
        }
    }

    mod names {
        use super::*;

        #[test]
        fn spaces_and_punctuation_allowed() {
            assert!(DocumentName::new("Meeting notes (draft) #3").is_ok());
            assert!(DocumentName::new("naïve café").is_ok());
            assert!(DocumentName::new("say \"hi\"").is_ok());
        }

        #[test]
        fn whitespace_only_rejected() {
            assert!(DocumentName::new("   ").is_err());
        }

        #[test]
        fn control_chars_rejected() {
            assert!(DocumentName::new("a\nb").is_err());
            assert!(DocumentName::new("a\tb").is_err());
        }

        #[test]
        fn overlong_rejected() {
            assert!(DocumentName::new("x".repeat(256)).is_err());
            assert!(DocumentName::new("x".repeat(255)).is_ok());
        }

        #[test]
        fn namespace_rejects_spaces() {
            assert!(Namespace::new("user pages").is_err());
        }

        #[test]
        fn deserialize_validates() {
            let bad: Result<DocumentName, _> = serde_json::from_str("\"../x\"");
            assert!(bad.is_err());
        }
    }

    mod revisions {
        use super::*;

        fn sample() -> Revision {
            Revision::new(
                Oid::new("0123456789abcdef0123456789abcdef01234567").unwrap(),
                "Alice",
                "alice@example.com",
                DateTime::parse_from_rfc3339("2023-01-01T23:30:00-05:00").unwrap(),
                "init",
            )
        }

        #[test]
        fn short_id_is_uppercased_prefix() {
            assert_eq!(sample().short_id, "01234567".to_uppercase());
            assert_eq!(
                Revision::new(
                    Oid::new("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef").unwrap(),
                    "a",
                    "a@b",
                    sample().date,
                    "m"
                )
                .short_id,
                "DEADBEEF"
            );
        }

        #[test]
        fn day_key_uses_own_offset() {
            // 23:30 at -05:00 is already the next day in UTC.
            assert_eq!(sample().day_key(), "2023-01-01");
        }

        #[test]
        fn change_serializes_kind() {
            let ns = Namespace::new("pages").unwrap();
            let change = Change::attachment(ns, "Home", "logo.png", sample());
            let json = serde_json::to_value(&change).unwrap();
            assert_eq!(json["kind"], "attachment");
            assert_eq!(json["page"], "Home");
            assert_eq!(json["name"], "logo.png");
        }
    }

    #[test]
    fn document_ref_display() {
        let doc = DocumentRef::parse("pages", "Home").unwrap();
        assert_eq!(doc.to_string(), "pages/Home");
        let pinned = doc.at(RevSpec::new("abc123").unwrap());
        assert_eq!(pinned.to_string(), "pages/Home@abc123");
    }
}
