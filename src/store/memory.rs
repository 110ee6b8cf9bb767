//! store::memory
//!
//! In-memory [`ContentStore`] for deterministic testing.
//!
//! # Design
//!
//! The memory store keeps every commit as a full snapshot of the tree, so
//! reads at old revisions, history and change listings behave like the git
//! backend without touching the filesystem. It can be told to fail a given
//! mutation to exercise error paths.
//!
//! Revision selectors understand `HEAD`, `HEAD~<n>` and commit id prefixes
//! of at least four characters.
//!
//! # Example
//!
//! ```
//! use pagevault::store::{ContentStore, MemoryStore};
//! use pagevault::core::types::{Author, DocumentRef};
//!
//! let store = MemoryStore::new();
//! let alice = Author::new("Alice", "alice@example.com").unwrap();
//! let home = DocumentRef::parse("pages", "Home").unwrap();
//!
//! let rev = store.save(&home, b"Hello", "init", &alice).unwrap();
//! assert_eq!(rev.message, "init");
//! assert_eq!(store.read(&home).unwrap(), b"Hello");
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use super::traits::ContentStore;
use super::{
    commit_message, delete_message, ensure_unpinned, merge_changes, rename_message, BackendKind,
    StoreError,
};
use crate::core::paths::{
    attachment_dir, attachment_path, attachment_root, decode_name, document_path, is_hidden,
    BackendPath,
};
use crate::core::types::{
    AttachmentRef, Author, Change, DocumentName, DocumentRef, Namespace, Oid, RevSpec, Revision,
    TypeError,
};

type Tree = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone)]
struct Commit {
    revision: Revision,
    tree: Tree,
    touched: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// Oldest first.
    commits: Vec<Commit>,
    /// Operation name that should fail.
    fail_on: Option<&'static str>,
}

/// Mock content store for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named mutation (`"save"`, `"rename"`, `"delete"`,
    /// `"attachment save"`, `"attachment delete"`) fail.
    pub fn fail_on(self, operation: &'static str) -> Self {
        self.lock().fail_on = Some(operation);
        self
    }

    /// Clear the fail_on configuration.
    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    /// Number of commits recorded.
    pub fn commit_count(&self) -> usize {
        self.lock().commits.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        // A panic while holding the lock leaves the snapshots intact.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryInner {
    fn head(&self) -> Tree {
        self.commits
            .last()
            .map(|c| c.tree.clone())
            .unwrap_or_default()
    }

    /// Index of the commit `revision` names; `None` for `HEAD` of an empty store.
    fn resolve(&self, revision: &RevSpec) -> Result<Option<usize>, StoreError> {
        let unknown = || StoreError::RevisionNotFound {
            revision: revision.to_string(),
        };
        let spec = revision.as_str();
        let back = if spec == "HEAD" {
            Some(0)
        } else if let Some(n) = spec.strip_prefix("HEAD~") {
            Some(n.parse::<usize>().map_err(|_| unknown())?)
        } else {
            None
        };

        if let Some(back) = back {
            if self.commits.is_empty() && back == 0 {
                return Ok(None);
            }
            return back
                .checked_add(1)
                .and_then(|n| self.commits.len().checked_sub(n))
                .map(Some)
                .ok_or_else(unknown);
        }

        let prefix = spec.to_ascii_lowercase();
        if prefix.len() < 4 {
            return Err(unknown());
        }
        let mut matches = self
            .commits
            .iter()
            .enumerate()
            .filter(|(_, c)| c.revision.id.as_str().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some((i, _)), None) => Ok(Some(i)),
            _ => Err(unknown()),
        }
    }

    fn tree_at(&self, revision: &RevSpec) -> Result<Tree, StoreError> {
        Ok(self
            .resolve(revision)?
            .map(|i| self.commits[i].tree.clone())
            .unwrap_or_default())
    }

    fn history(&self, repo_path: &str) -> Vec<Revision> {
        self.commits
            .iter()
            .filter(|c| c.touched.iter().any(|p| p == repo_path))
            .map(|c| c.revision.clone())
            .collect()
    }

    fn last_revision(&self, repo_path: &str) -> Result<Revision, StoreError> {
        self.history(repo_path)
            .pop()
            .ok_or_else(|| StoreError::NotFound {
                path: repo_path.to_string(),
                revision: RevSpec::head().to_string(),
            })
    }

    fn check_fail(&mut self, operation: &'static str) -> Result<(), StoreError> {
        if self.fail_on == Some(operation) {
            return Err(StoreError::MutationFailed {
                operation,
                source: Box::new(StoreError::Io {
                    path: operation.into(),
                    source: std::io::Error::other("injected failure"),
                }),
                rolled_back: true,
            });
        }
        Ok(())
    }

    fn commit(
        &mut self,
        tree: Tree,
        touched: Vec<String>,
        message: &str,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        let revision = Revision::new(
            fresh_oid()?,
            author.name.clone(),
            author.email.clone(),
            Utc::now().fixed_offset(),
            one_line(&commit_message(message)),
        );
        self.commits.push(Commit {
            revision: revision.clone(),
            tree,
            touched,
        });
        Ok(revision)
    }

    fn save(
        &mut self,
        operation: &'static str,
        path: &BackendPath,
        content: &[u8],
        message: &str,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        self.check_fail(operation)?;
        let key = path.repo_path();
        let mut tree = self.head();
        if tree.get(&key).map(Vec::as_slice) == Some(content) {
            return self.last_revision(&key);
        }
        tree.insert(key.clone(), content.to_vec());
        self.commit(tree, vec![key], message, author)
    }

    fn delete(
        &mut self,
        operation: &'static str,
        path: &BackendPath,
        name: &str,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        let key = path.repo_path();
        let mut tree = self.head();
        if tree.remove(&key).is_none() {
            return Err(StoreError::NotFound {
                path: key,
                revision: RevSpec::head().to_string(),
            });
        }
        self.check_fail(operation)?;
        self.commit(tree, vec![key], &delete_message(name), author)
    }

    fn changes(&self, dir: &str, make: impl Fn(String, Revision) -> Change) -> Vec<Change> {
        let head = self.head();
        let mut changes = Vec::new();
        for stored in children(&head, dir, false) {
            let path = BackendPath::stored(dir, stored.as_str());
            for revision in self.history(&path.repo_path()) {
                changes.push(make(decode_name(&stored), revision));
            }
        }
        changes
    }
}

/// Visible direct children of `dir`: files, or subdirectories when `dirs`.
fn children(tree: &Tree, dir: &str, dirs: bool) -> BTreeSet<String> {
    let prefix = format!("{}/", dir);
    tree.keys()
        .filter_map(|key| key.strip_prefix(&prefix))
        .filter_map(|rest| match rest.split_once('/') {
            Some((sub, _)) if dirs => Some(sub),
            None if !dirs => Some(rest),
            _ => None,
        })
        .filter(|name| !is_hidden(name))
        .map(str::to_string)
        .collect()
}

fn display_names(tree: &Tree, dir: &str) -> Vec<String> {
    let mut names: Vec<String> = children(tree, dir, false)
        .iter()
        .map(|stored| decode_name(stored))
        .collect();
    names.sort();
    names
}

fn fresh_oid() -> Result<Oid, TypeError> {
    let hex = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    Oid::new(&hex[..40])
}

fn one_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Line-by-line diff without alignment: every differing line pair is shown
/// as a removal followed by an addition.
fn naive_diff(path: &str, old: &[u8], new: &[u8]) -> String {
    if old == new {
        return String::new();
    }
    let old = String::from_utf8_lossy(old);
    let new = String::from_utf8_lossy(new);
    let mut out = format!("--- a/{path}\n+++ b/{path}\n");
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    for i in 0..old_lines.len().max(new_lines.len()) {
        match (old_lines.get(i), new_lines.get(i)) {
            (Some(a), Some(b)) if a == b => out.push_str(&format!(" {a}\n")),
            (a, b) => {
                if let Some(a) = a {
                    out.push_str(&format!("-{a}\n"));
                }
                if let Some(b) = b {
                    out.push_str(&format!("+{b}\n"));
                }
            }
        }
    }
    out
}

impl ContentStore for MemoryStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn exists(&self, doc: &DocumentRef) -> Result<bool, StoreError> {
        let tree = self.lock().tree_at(&doc.revision_or_head())?;
        Ok(tree.contains_key(&document_path(doc).repo_path()))
    }

    fn read(&self, doc: &DocumentRef) -> Result<Vec<u8>, StoreError> {
        let revision = doc.revision_or_head();
        let path = document_path(doc).repo_path();
        let mut tree = self.lock().tree_at(&revision)?;
        tree.remove(&path).ok_or(StoreError::NotFound {
            path,
            revision: revision.to_string(),
        })
    }

    fn list(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError> {
        Ok(display_names(&self.lock().head(), namespace.as_str()))
    }

    fn save(
        &self,
        doc: &DocumentRef,
        content: &[u8],
        message: &str,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        ensure_unpinned(&doc.revision)?;
        self.lock()
            .save("save", &document_path(doc), content, message, author)
    }

    fn rename(
        &self,
        from: &DocumentRef,
        to: &DocumentRef,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        ensure_unpinned(&from.revision)?;
        ensure_unpinned(&to.revision)?;
        let src = document_path(from).repo_path();
        let dst = document_path(to).repo_path();
        let mut inner = self.lock();
        let mut tree = inner.head();
        if tree.contains_key(&dst) {
            return Err(StoreError::AlreadyExists { path: dst });
        }
        let content = tree.remove(&src).ok_or_else(|| StoreError::NotFound {
            path: src.clone(),
            revision: RevSpec::head().to_string(),
        })?;
        inner.check_fail("rename")?;
        tree.insert(dst.clone(), content);
        let message = rename_message(from.name.as_str(), to.name.as_str());
        inner.commit(tree, vec![src, dst], &message, author)
    }

    fn delete(&self, doc: &DocumentRef, author: &Author) -> Result<Revision, StoreError> {
        ensure_unpinned(&doc.revision)?;
        self.lock()
            .delete("delete", &document_path(doc), doc.name.as_str(), author)
    }

    fn revisions(&self, doc: &DocumentRef) -> Result<Vec<Revision>, StoreError> {
        Ok(self.lock().history(&document_path(doc).repo_path()))
    }

    fn changes(&self, namespace: &Namespace, limit: usize) -> Result<Vec<Change>, StoreError> {
        let changes = self.lock().changes(namespace.as_str(), |name, revision| {
            Change::page(namespace.clone(), name, revision)
        });
        Ok(merge_changes(changes, limit))
    }

    fn diff(
        &self,
        doc: &DocumentRef,
        from: &RevSpec,
        to: &RevSpec,
    ) -> Result<String, StoreError> {
        let path = document_path(doc).repo_path();
        let inner = self.lock();
        let old = inner.tree_at(from)?.remove(&path).unwrap_or_default();
        let new = inner.tree_at(to)?.remove(&path).unwrap_or_default();
        Ok(naive_diff(&path, &old, &new))
    }

    fn attachment_exists(&self, attachment: &AttachmentRef) -> Result<bool, StoreError> {
        let tree = self.lock().tree_at(&attachment.revision_or_head())?;
        Ok(tree.contains_key(&attachment_path(attachment).repo_path()))
    }

    fn attachment_read(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, StoreError> {
        let revision = attachment.revision_or_head();
        let path = attachment_path(attachment).repo_path();
        let mut tree = self.lock().tree_at(&revision)?;
        tree.remove(&path).ok_or(StoreError::NotFound {
            path,
            revision: revision.to_string(),
        })
    }

    fn attachment_list(
        &self,
        namespace: &Namespace,
        page: &DocumentName,
    ) -> Result<Vec<String>, StoreError> {
        Ok(display_names(
            &self.lock().head(),
            &attachment_dir(namespace, page),
        ))
    }

    fn attachment_save(
        &self,
        attachment: &AttachmentRef,
        content: &[u8],
        message: &str,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        ensure_unpinned(&attachment.revision)?;
        self.lock().save(
            "attachment save",
            &attachment_path(attachment),
            content,
            message,
            author,
        )
    }

    fn attachment_delete(
        &self,
        attachment: &AttachmentRef,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        ensure_unpinned(&attachment.revision)?;
        self.lock().delete(
            "attachment delete",
            &attachment_path(attachment),
            attachment.name.as_str(),
            author,
        )
    }

    fn attachment_revisions(
        &self,
        attachment: &AttachmentRef,
    ) -> Result<Vec<Revision>, StoreError> {
        Ok(self
            .lock()
            .history(&attachment_path(attachment).repo_path()))
    }

    fn attachment_changes(
        &self,
        namespace: &Namespace,
        page: Option<&DocumentName>,
        limit: usize,
    ) -> Result<Vec<Change>, StoreError> {
        let inner = self.lock();
        let root = attachment_root(namespace);
        let pages: Vec<(String, String)> = match page {
            Some(page) => vec![(page.as_str().to_string(), attachment_dir(namespace, page))],
            None => children(&inner.head(), &root, true)
                .into_iter()
                .map(|stored| {
                    let dir = BackendPath::stored(root.as_str(), stored.as_str()).repo_path();
                    (decode_name(&stored), dir)
                })
                .collect(),
        };

        let mut changes = Vec::new();
        for (page_name, dir) in pages {
            changes.extend(inner.changes(&dir, |name, revision| {
                Change::attachment(namespace.clone(), page_name.as_str(), name, revision)
            }));
        }
        Ok(merge_changes(changes, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Author {
        Author::new("Alice", "alice@example.com").unwrap()
    }

    fn doc(name: &str) -> DocumentRef {
        DocumentRef::parse("pages", name).unwrap()
    }

    #[test]
    fn save_then_read() {
        let store = MemoryStore::new();
        store.save(&doc("Home"), b"Hello", "init", &alice()).unwrap();
        assert!(store.exists(&doc("Home")).unwrap());
        assert_eq!(store.read_to_string(&doc("Home")).unwrap(), "Hello");
    }

    #[test]
    fn read_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(store.read(&doc("Nope")).unwrap_err().is_not_found());
        assert!(!store.exists(&doc("Nope")).unwrap());
    }

    #[test]
    fn unchanged_save_makes_no_commit() {
        let store = MemoryStore::new();
        let first = store.save(&doc("Home"), b"same", "one", &alice()).unwrap();
        let second = store.save(&doc("Home"), b"same", "two", &alice()).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn empty_message_placeholder() {
        let store = MemoryStore::new();
        let rev = store.save(&doc("Home"), b"x", "", &alice()).unwrap();
        assert_eq!(rev.message, "-");
    }

    #[test]
    fn old_revisions_stay_readable() {
        let store = MemoryStore::new();
        let first = store.save(&doc("Home"), b"v1", "one", &alice()).unwrap();
        store.save(&doc("Home"), b"v2", "two", &alice()).unwrap();

        let pinned = doc("Home").at(RevSpec::from(first.id.clone()));
        assert_eq!(store.read(&pinned).unwrap(), b"v1");
        let previous = doc("Home").at(RevSpec::new("HEAD~1").unwrap());
        assert_eq!(store.read(&previous).unwrap(), b"v1");
        assert_eq!(store.read(&doc("Home")).unwrap(), b"v2");
    }

    #[test]
    fn rename_moves_content() {
        let store = MemoryStore::new();
        store.save(&doc("Old"), b"body", "init", &alice()).unwrap();
        let rev = store.rename(&doc("Old"), &doc("New"), &alice()).unwrap();
        assert_eq!(rev.message, "Old ⇒ New");
        assert!(!store.exists(&doc("Old")).unwrap());
        assert_eq!(store.read(&doc("New")).unwrap(), b"body");
        assert_eq!(store.revisions(&doc("Old")).unwrap().len(), 2);
    }

    #[test]
    fn rename_onto_existing_fails() {
        let store = MemoryStore::new();
        store.save(&doc("A"), b"a", "", &alice()).unwrap();
        store.save(&doc("B"), b"b", "", &alice()).unwrap();
        assert!(matches!(
            store.rename(&doc("A"), &doc("B"), &alice()),
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn delete_keeps_history() {
        let store = MemoryStore::new();
        store.save(&doc("Gone"), b"x", "init", &alice()).unwrap();
        let rev = store.delete(&doc("Gone"), &alice()).unwrap();
        assert_eq!(rev.message, "Gone ⇒ void");
        assert!(store.list(&Namespace::new("pages").unwrap()).unwrap().is_empty());
        assert_eq!(store.revisions(&doc("Gone")).unwrap().len(), 2);
    }

    #[test]
    fn list_hides_attachments() {
        let store = MemoryStore::new();
        store.save(&doc("My Page"), b"x", "", &alice()).unwrap();
        let att = AttachmentRef::new(
            Namespace::new("pages").unwrap(),
            DocumentName::new("My Page").unwrap(),
            DocumentName::new("logo.png").unwrap(),
        );
        store.attachment_save(&att, b"\x89PNG", "logo", &alice()).unwrap();

        let ns = Namespace::new("pages").unwrap();
        assert_eq!(store.list(&ns).unwrap(), ["My Page"]);
        assert_eq!(
            store
                .attachment_list(&ns, &DocumentName::new("My Page").unwrap())
                .unwrap(),
            ["logo.png"]
        );
        let changes = store.attachment_changes(&ns, None, 0).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].kind,
            crate::core::types::ChangeKind::Attachment {
                page: "My Page".into()
            }
        );
    }

    #[test]
    fn injected_failure() {
        let store = MemoryStore::new().fail_on("save");
        let err = store.save(&doc("Home"), b"x", "", &alice()).unwrap_err();
        assert!(matches!(err, StoreError::MutationFailed { rolled_back: true, .. }));
        assert_eq!(store.commit_count(), 0);

        store.clear_fail_on();
        assert!(store.save(&doc("Home"), b"x", "", &alice()).is_ok());
    }

    #[test]
    fn unknown_revision() {
        let store = MemoryStore::new();
        store.save(&doc("Home"), b"x", "", &alice()).unwrap();
        let pinned = doc("Home").at(RevSpec::new("HEAD~5").unwrap());
        assert!(matches!(
            store.read(&pinned),
            Err(StoreError::RevisionNotFound { .. })
        ));
    }

    #[test]
    fn huge_ancestor_offset_is_not_found() {
        let store = MemoryStore::new();
        store.save(&doc("Home"), b"x", "", &alice()).unwrap();
        let pinned = doc("Home").at(RevSpec::new(format!("HEAD~{}", usize::MAX)).unwrap());
        assert!(matches!(
            store.read(&pinned),
            Err(StoreError::RevisionNotFound { .. })
        ));
        // The store stays usable afterwards.
        assert_eq!(store.read(&doc("Home")).unwrap(), b"x");
    }

    #[test]
    fn diff_marks_changed_lines() {
        let store = MemoryStore::new();
        store.save(&doc("Home"), b"a\nb\n", "", &alice()).unwrap();
        store.save(&doc("Home"), b"a\nc\n", "", &alice()).unwrap();
        let diff = store
            .diff(
                &doc("Home"),
                &RevSpec::new("HEAD~1").unwrap(),
                &RevSpec::head(),
            )
            .unwrap();
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+c\n"));
        assert!(diff.contains(" a\n"));
    }
}
