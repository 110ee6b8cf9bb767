//! store::git_store
//!
//! The git-backed [`ContentStore`].
//!
//! # Layout
//!
//! Pages are files directly under their namespace directory; attachments
//! live under `<namespace>/.attachments/<page>/`. See [`crate::core::paths`].
//!
//! # Mutations
//!
//! Every mutation follows the same sequence:
//!
//! 1. Re-validate the repository and refuse to run mid-merge/rebase
//! 2. Take the repository lock
//! 3. Track every path about to change ([`Compensation`])
//! 4. Write the working tree (temp file + rename), `git add -A -- <paths>`
//! 5. Skip the commit when nothing is staged, else commit exactly `<paths>`
//! 6. On any failure in 4-5, roll the tracked paths back to `HEAD`
//!
//! The resulting revision is read back with `git log -1 HEAD -- <path>`.
//!
//! # Reads
//!
//! Reads never take the lock. An empty repository (unborn `HEAD`) reads as
//! a store with no documents and no history.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use super::compensation::Compensation;
use super::traits::ContentStore;
use super::{
    commit_message, delete_message, ensure_unpinned, merge_changes, rename_message, BackendKind,
    StoreError,
};
use crate::core::history::RevisionStream;
use crate::core::ops::RepoLock;
use crate::core::paths::{
    attachment_dir, attachment_path, attachment_root, decode_name, document_path, is_hidden,
    BackendPath, StorePaths,
};
use crate::core::types::{
    AttachmentRef, Author, Change, DocumentName, DocumentRef, Namespace, RevSpec, Revision,
};
use crate::git::{
    CommandRunner, EntryKind, Git, GitSettings, ProcessRunner, RunnerError, TreeEntry,
};

/// Knobs for a [`GitStore`].
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub git: GitSettings,
    /// How long a mutation waits for another writer to finish
    pub lock_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            git: GitSettings::default(),
            lock_timeout: Duration::from_secs(10),
        }
    }
}

/// One working-tree change within a mutation.
enum Edit<'c> {
    Write { path: BackendPath, content: &'c [u8] },
    Remove { path: BackendPath },
    Move { from: BackendPath, to: BackendPath },
}

impl Edit<'_> {
    fn paths(&self) -> Vec<&BackendPath> {
        match self {
            Edit::Write { path, .. } | Edit::Remove { path } => vec![path],
            Edit::Move { from, to } => vec![from, to],
        }
    }
}

/// A [`ContentStore`] persisting documents in a git repository.
#[derive(Debug, Clone)]
pub struct GitStore {
    git: Git,
    lock_timeout: Duration,
}

impl GitStore {
    /// Open the repository whose working tree is `root`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Repository`] if `root` is not a non-bare repository.
    pub fn open(root: &Path, settings: StoreSettings) -> Result<Self, StoreError> {
        Self::with_runner(root, settings, Arc::new(ProcessRunner::new()))
    }

    /// Open with an alternative command runner.
    pub fn with_runner(
        root: &Path,
        settings: StoreSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, StoreError> {
        let git = Git::open(root, settings.git, runner)?;
        Ok(Self {
            git,
            lock_timeout: settings.lock_timeout,
        })
    }

    /// The underlying git doorway.
    pub fn git(&self) -> &Git {
        &self.git
    }

    // =========================================================================
    // Read helpers
    // =========================================================================

    /// Whether `revision` is the tip of a repository with no commits.
    fn is_empty_tip(&self, revision: &RevSpec) -> Result<bool, StoreError> {
        Ok(revision == &RevSpec::head() && self.git.is_unborn()?)
    }

    /// Entries of `dir` at `revision`.
    fn entries(&self, revision: &RevSpec, dir: &str) -> Result<Vec<TreeEntry>, StoreError> {
        self.git.info()?;
        if self.is_empty_tip(revision)? {
            return Ok(Vec::new());
        }
        Ok(self.git.ls_tree(revision, dir)?)
    }

    /// Stored names of the visible entries of `kind` in `dir` at the tip.
    fn visible(&self, dir: &str, kind: EntryKind) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries(&RevSpec::head(), dir)?
            .into_iter()
            .filter(|e| e.kind == kind && !is_hidden(&e.name))
            .map(|e| e.name)
            .collect())
    }

    fn display_names(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self
            .visible(dir, EntryKind::Blob)?
            .iter()
            .map(|stored| decode_name(stored))
            .collect();
        names.sort();
        Ok(names)
    }

    fn exists_at(&self, revision: &RevSpec, path: &BackendPath) -> Result<bool, StoreError> {
        Ok(self
            .entries(revision, path.dir())?
            .iter()
            .any(|e| e.kind == EntryKind::Blob && e.name == path.file()))
    }

    fn read_at(&self, revision: &RevSpec, path: &BackendPath) -> Result<Vec<u8>, StoreError> {
        self.git.info()?;
        let not_found = || StoreError::NotFound {
            path: path.repo_path(),
            revision: revision.to_string(),
        };
        if self.is_empty_tip(revision)? {
            return Err(not_found());
        }
        self.git
            .cat_blob(revision, &path.repo_path())?
            .ok_or_else(not_found)
    }

    fn history(&self, path: &BackendPath) -> Result<Vec<Revision>, StoreError> {
        self.git.info()?;
        if self.git.is_unborn()? {
            return Ok(Vec::new());
        }
        let revisions = RevisionStream::new(self.git.log_path(&path.repo_path())?)
            .collect::<Result<Vec<_>, RunnerError>>()?;
        Ok(revisions)
    }

    /// Revisions of every visible blob in `dir`, as changes.
    fn dir_changes(
        &self,
        dir: &str,
        out: &mut Vec<Change>,
        make: impl Fn(String, Revision) -> Change,
    ) -> Result<(), StoreError> {
        for stored in self.visible(dir, EntryKind::Blob)? {
            let path = BackendPath::stored(dir, stored.as_str());
            for revision in self.history(&path)? {
                out.push(make(decode_name(&stored), revision));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    fn mutate(
        &self,
        operation: &'static str,
        edits: &[Edit<'_>],
        primary: &BackendPath,
        message: &str,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        let info = self.git.ensure_writable()?;
        let paths = StorePaths::from_repo_info(&info);
        let _lock = RepoLock::acquire_timeout(&paths, self.lock_timeout)?;

        let mut guard = Compensation::new(&self.git, &paths);
        for path in edits.iter().flat_map(Edit::paths) {
            if let Err(e) = guard.track(path) {
                // Nothing has been written yet.
                guard.disarm();
                return Err(e.into());
            }
        }
        let repo_paths = guard.repo_paths();

        let committed = match self.apply(&paths, edits, &repo_paths, message, author) {
            Ok(committed) => {
                guard.disarm();
                committed
            }
            Err(e) => {
                let rolled_back = guard.rollback();
                return Err(StoreError::MutationFailed {
                    operation,
                    source: Box::new(e),
                    rolled_back,
                });
            }
        };

        let revision = self
            .git
            .last_revision(&primary.repo_path())?
            .ok_or_else(|| StoreError::NotFound {
                path: primary.repo_path(),
                revision: RevSpec::head().to_string(),
            })?;
        if committed {
            info!(operation, path = %primary, revision = %revision.short_id, "committed");
        } else {
            debug!(operation, path = %primary, "content unchanged; nothing committed");
        }
        Ok(revision)
    }

    /// Write, stage and commit. Returns whether a commit was made.
    fn apply(
        &self,
        paths: &StorePaths,
        edits: &[Edit<'_>],
        repo_paths: &[String],
        message: &str,
        author: &Author,
    ) -> Result<bool, StoreError> {
        for edit in edits {
            match edit {
                Edit::Write { path, content } => {
                    write_atomic(&paths.worktree_file(path), content)?;
                }
                Edit::Remove { path } => {
                    let file = paths.worktree_file(path);
                    fs::remove_file(&file).map_err(StoreError::io(&file))?;
                }
                Edit::Move { from, to } => {
                    let src = paths.worktree_file(from);
                    let dst = paths.worktree_file(to);
                    if let Some(parent) = dst.parent() {
                        fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
                    }
                    fs::rename(&src, &dst).map_err(StoreError::io(&dst))?;
                }
            }
        }

        self.git.stage(repo_paths)?;
        if !self.git.has_staged_changes(repo_paths)? {
            return Ok(false);
        }
        self.git
            .commit(&commit_message(message), author, repo_paths)?;
        Ok(true)
    }

    fn save_path(
        &self,
        operation: &'static str,
        path: BackendPath,
        content: &[u8],
        message: &str,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        let edits = [Edit::Write {
            path: path.clone(),
            content,
        }];
        self.mutate(operation, &edits, &path, message, author)
    }

    fn delete_path(
        &self,
        operation: &'static str,
        path: BackendPath,
        name: &str,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        if !self.exists_at(&RevSpec::head(), &path)? {
            return Err(StoreError::NotFound {
                path: path.repo_path(),
                revision: RevSpec::head().to_string(),
            });
        }
        let edits = [Edit::Remove { path: path.clone() }];
        self.mutate(operation, &edits, &path, &delete_message(name), author)
    }
}

/// Replace `path` with `content` without exposing a partial file.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| StoreError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other("path has no parent directory"),
    })?;
    fs::create_dir_all(parent).map_err(StoreError::io(parent))?;

    // Dot-prefixed so a leftover temp file never shows up in listings.
    let temp_path = parent.join(format!(".pagevault-{}.tmp", Uuid::new_v4().simple()));
    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();
    if let Err(source) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

impl ContentStore for GitStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Git
    }

    fn exists(&self, doc: &DocumentRef) -> Result<bool, StoreError> {
        self.exists_at(&doc.revision_or_head(), &document_path(doc))
    }

    fn read(&self, doc: &DocumentRef) -> Result<Vec<u8>, StoreError> {
        self.read_at(&doc.revision_or_head(), &document_path(doc))
    }

    fn list(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError> {
        self.display_names(namespace.as_str())
    }

    fn save(
        &self,
        doc: &DocumentRef,
        content: &[u8],
        message: &str,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        ensure_unpinned(&doc.revision)?;
        self.save_path("save", document_path(doc), content, message, author)
    }

    fn rename(
        &self,
        from: &DocumentRef,
        to: &DocumentRef,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        ensure_unpinned(&from.revision)?;
        ensure_unpinned(&to.revision)?;
        let head = RevSpec::head();
        let src = document_path(from);
        let dst = document_path(to);
        if !self.exists_at(&head, &src)? {
            return Err(StoreError::NotFound {
                path: src.repo_path(),
                revision: head.to_string(),
            });
        }
        if self.exists_at(&head, &dst)? {
            return Err(StoreError::AlreadyExists {
                path: dst.repo_path(),
            });
        }
        let message = rename_message(from.name.as_str(), to.name.as_str());
        let edits = [Edit::Move {
            from: src,
            to: dst.clone(),
        }];
        self.mutate("rename", &edits, &dst, &message, author)
    }

    fn delete(&self, doc: &DocumentRef, author: &Author) -> Result<Revision, StoreError> {
        ensure_unpinned(&doc.revision)?;
        self.delete_path("delete", document_path(doc), doc.name.as_str(), author)
    }

    fn revisions(&self, doc: &DocumentRef) -> Result<Vec<Revision>, StoreError> {
        self.history(&document_path(doc))
    }

    fn changes(&self, namespace: &Namespace, limit: usize) -> Result<Vec<Change>, StoreError> {
        let mut changes = Vec::new();
        self.dir_changes(namespace.as_str(), &mut changes, |name, revision| {
            Change::page(namespace.clone(), name, revision)
        })?;
        Ok(merge_changes(changes, limit))
    }

    fn diff(
        &self,
        doc: &DocumentRef,
        from: &RevSpec,
        to: &RevSpec,
    ) -> Result<String, StoreError> {
        self.git.info()?;
        Ok(self
            .git
            .diff(from, to, &document_path(doc).repo_path())?)
    }

    fn attachment_exists(&self, attachment: &AttachmentRef) -> Result<bool, StoreError> {
        self.exists_at(&attachment.revision_or_head(), &attachment_path(attachment))
    }

    fn attachment_read(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, StoreError> {
        self.read_at(&attachment.revision_or_head(), &attachment_path(attachment))
    }

    fn attachment_list(
        &self,
        namespace: &Namespace,
        page: &DocumentName,
    ) -> Result<Vec<String>, StoreError> {
        self.display_names(&attachment_dir(namespace, page))
    }

    fn attachment_save(
        &self,
        attachment: &AttachmentRef,
        content: &[u8],
        message: &str,
        author: &Author,
    ) -> Result<Revision, StoreError> {
        ensure_unpinned(&attachment.revision)?;
        self.save_path(
            "attachment save",
            attachment_path(attachment),
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
        self.delete_path(
            "attachment delete",
            attachment_path(attachment),
            attachment.name.as_str(),
            author,
        )
    }

    fn attachment_revisions(
        &self,
        attachment: &AttachmentRef,
    ) -> Result<Vec<Revision>, StoreError> {
        self.history(&attachment_path(attachment))
    }

    fn attachment_changes(
        &self,
        namespace: &Namespace,
        page: Option<&DocumentName>,
        limit: usize,
    ) -> Result<Vec<Change>, StoreError> {
        let dirs: Vec<(String, String)> = match page {
            Some(page) => vec![(page.as_str().to_string(), attachment_dir(namespace, page))],
            None => {
                let root = attachment_root(namespace);
                self.visible(&root, EntryKind::Tree)?
                    .into_iter()
                    .map(|stored| {
                        let dir = BackendPath::stored(root.as_str(), stored.as_str()).repo_path();
                        (decode_name(&stored), dir)
                    })
                    .collect()
            }
        };

        let mut changes = Vec::new();
        for (page_name, dir) in dirs {
            self.dir_changes(&dir, &mut changes, |name, revision| {
                Change::attachment(namespace.clone(), page_name.as_str(), name, revision)
            })?;
        }
        Ok(merge_changes(changes, limit))
    }
}
