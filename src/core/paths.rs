//! core::paths
//!
//! Path codec: where documents live in the repository, and how names and
//! arguments are rendered safely.
//!
//! # Storage Layout
//!
//! Inside the backing repository's working tree:
//! - `<namespace>/<encoded name>` - a page
//! - `<namespace>/.attachments/<encoded page>/<encoded name>` - an attachment
//!
//! Inside the git directory:
//! - `pagevault/lock` - exclusive mutation lock
//!
//! **Hard rule:** no code outside this module formats repository paths.
//!
//! # Name Encoding
//!
//! Spaces in logical names are stored as underscores. The mapping is lossy
//! by design of the on-disk format: `"My Page"` and `"My_Page"` address the
//! same file. Listings decode underscores back to spaces for display, and
//! either spelling can be used to read the document again.
//!
//! # Example
//!
//! ```
//! use pagevault::core::paths::{document_path, escape_for_shell};
//! use pagevault::core::types::DocumentRef;
//!
//! let doc = DocumentRef::parse("pages", "Front Page").unwrap();
//! assert_eq!(document_path(&doc).repo_path(), "pages/Front_Page");
//! assert_eq!(escape_for_shell("it's"), r"'it'\''s'");
//! ```

use std::path::{Path, PathBuf};

use crate::core::types::{AttachmentRef, DocumentName, DocumentRef, Namespace};
use crate::git::RepoInfo;

/// Directory (inside a namespace) that holds page attachments.
pub const ATTACHMENT_DIR: &str = ".attachments";

/// Marker that hides an entry from listings.
pub const HIDDEN_PREFIX: char = '.';

/// A repository-relative path, always `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendPath {
    dir: String,
    file: String,
}

impl BackendPath {
    fn new(dir: String, file: String) -> Self {
        Self { dir, file }
    }

    /// A path whose final component is already in stored form, as found in
    /// a tree listing.
    pub fn stored(dir: impl Into<String>, file: impl Into<String>) -> Self {
        Self::new(dir.into(), file.into())
    }

    /// The directory part (`pages`, `pages/.attachments/Home`).
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// The final component in its stored (encoded) form.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The full repository-relative path.
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.dir, self.file)
    }
}

impl std::fmt::Display for BackendPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.dir, self.file)
    }
}

/// Encode a logical name into its stored form.
///
/// ```
/// use pagevault::core::paths::encode_name;
///
/// assert_eq!(encode_name("Front Page"), "Front_Page");
/// assert_eq!(encode_name("Front_Page"), "Front_Page");
/// ```
pub fn encode_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Decode a stored name for display.
///
/// ```
/// use pagevault::core::paths::decode_name;
///
/// assert_eq!(decode_name("Front_Page"), "Front Page");
/// ```
pub fn decode_name(stored: &str) -> String {
    stored.replace('_', " ")
}

/// Whether a stored entry is hidden from listings.
pub fn is_hidden(stored: &str) -> bool {
    stored.starts_with(HIDDEN_PREFIX)
}

/// Path of a page.
pub fn document_path(doc: &DocumentRef) -> BackendPath {
    BackendPath::new(doc.namespace.as_str().to_string(), encode_name(doc.name.as_str()))
}

/// Directory holding the attachment directories of every page in `namespace`.
pub fn attachment_root(namespace: &Namespace) -> String {
    format!("{}/{}", namespace.as_str(), ATTACHMENT_DIR)
}

/// Directory holding the attachments of `page`.
///
/// ```
/// use pagevault::core::paths::attachment_dir;
/// use pagevault::core::types::{DocumentName, Namespace};
///
/// let ns = Namespace::new("pages").unwrap();
/// let page = DocumentName::new("Team Wiki").unwrap();
/// assert_eq!(attachment_dir(&ns, &page), "pages/.attachments/Team_Wiki");
/// ```
pub fn attachment_dir(namespace: &Namespace, page: &DocumentName) -> String {
    format!("{}/{}", attachment_root(namespace), encode_name(page.as_str()))
}

/// Path of an attachment.
pub fn attachment_path(attachment: &AttachmentRef) -> BackendPath {
    BackendPath::new(
        attachment_dir(&attachment.namespace, &attachment.page),
        encode_name(attachment.name.as_str()),
    )
}

/// Quote a string for display as a single POSIX shell word.
///
/// Commands are never run through a shell; this is used when rendering a
/// command line for logs and errors so that what is printed can be pasted
/// back into a shell verbatim. Words made only of characters that are inert
/// in every POSIX shell are returned unchanged.
///
/// ```
/// use pagevault::core::paths::escape_for_shell;
///
/// assert_eq!(escape_for_shell("pages/Home"), "pages/Home");
/// assert_eq!(escape_for_shell("a b"), "'a b'");
/// assert_eq!(escape_for_shell("say \"hi\"; rm -rf /"), "'say \"hi\"; rm -rf /'");
/// assert_eq!(escape_for_shell(""), "''");
/// ```
pub fn escape_for_shell(s: &str) -> String {
    let inert = |c: char| c.is_ascii_alphanumeric() || "-_./:=@,+%^".contains(c);
    if !s.is_empty() && s.chars().all(inert) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Decode a path as printed by git.
///
/// Git wraps names containing quotes, backslashes or control characters
/// (and, unless `core.quotePath` is off, non-ASCII bytes) in double quotes
/// with C-style escapes. Unquoted names are returned as-is.
///
/// ```
/// use pagevault::core::paths::unquote_tree_name;
///
/// assert_eq!(unquote_tree_name("Home"), "Home");
/// assert_eq!(unquote_tree_name(r#""say \"hi\"""#), "say \"hi\"");
/// assert_eq!(unquote_tree_name(r#""caf\303\251""#), "café");
/// ```
pub fn unquote_tree_name(raw: &str) -> String {
    let inner = match raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) => inner,
        None => return raw.to_string(),
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.bytes().peekable();
    while let Some(b) = chars.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        match chars.next() {
            Some(b'n') => bytes.push(b'\n'),
            Some(b't') => bytes.push(b'\t'),
            Some(b'r') => bytes.push(b'\r'),
            Some(b'a') => bytes.push(0x07),
            Some(b'b') => bytes.push(0x08),
            Some(b'f') => bytes.push(0x0c),
            Some(b'v') => bytes.push(0x0b),
            Some(d @ b'0'..=b'7') => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match chars.peek() {
                        Some(&o @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(o - b'0');
                            chars.next();
                        }
                        _ => break,
                    }
                }
                bytes.push((value & 0xff) as u8);
            }
            Some(other) => bytes.push(other),
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Repository locations used by a store.
///
/// # Invariants
///
/// - Working-tree files are only addressed through [`StorePaths::worktree_file`]
/// - Store-private state lives under `<git_dir>/pagevault/`, never in the
///   working tree, so it is never committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    /// Path to the .git directory.
    pub git_dir: PathBuf,
    /// Path to the working tree root.
    pub work_dir: PathBuf,
}

impl StorePaths {
    /// Create store paths from a git directory and working tree.
    pub fn new(git_dir: PathBuf, work_dir: PathBuf) -> Self {
        Self { git_dir, work_dir }
    }

    /// Create store paths from a [`RepoInfo`].
    pub fn from_repo_info(info: &RepoInfo) -> Self {
        Self {
            git_dir: info.git_dir.clone(),
            work_dir: info.work_dir.clone(),
        }
    }

    /// Directory for store-private state: `<git_dir>/pagevault`.
    pub fn vault_dir(&self) -> PathBuf {
        self.git_dir.join("pagevault")
    }

    /// The mutation lock file: `<git_dir>/pagevault/lock`.
    pub fn lock_path(&self) -> PathBuf {
        self.vault_dir().join("lock")
    }

    /// Absolute working-tree location of a repository path.
    pub fn worktree_file(&self, path: &BackendPath) -> PathBuf {
        self.worktree_dir(path.dir()).join(path.file())
    }

    /// Absolute working-tree location of a repository directory.
    pub fn worktree_dir(&self, dir: &str) -> PathBuf {
        dir.split('/')
            .fold(self.work_dir.clone(), |acc, part| acc.join(part))
    }

    /// Get the working tree as a Path reference.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}
