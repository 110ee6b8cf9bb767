//! git::interface
//!
//! The single doorway to the backing repository.
//!
//! # Architecture
//!
//! Repository validation and state detection go through `git2`; everything
//! that reads history or mutates the repository runs the git CLI through a
//! [`CommandRunner`]. No other module builds git command lines or imports
//! `git2`.
//!
//! Every command is started with:
//! - `-c core.quotePath=false` so non-ASCII names are printed verbatim
//! - `--literal-pathspecs` so `*`, `?` and `[` in names are not globs
//! - `--no-pager`, `GIT_TERMINAL_PROMPT=0` and `LC_ALL=C`
//!
//! # Error Handling
//!
//! Failures are categorized into typed variants:
//! - [`GitError::NotARepo`]: Root is not a git repository
//! - [`GitError::BareRepo`]: Repository has no working tree
//! - [`GitError::OperationInProgress`]: Merge/rebase/etc. in progress
//! - [`GitError::RevisionNotFound`]: Revision does not resolve to a commit
//! - [`GitError::Command`]: A git process failed or timed out
//!
//! # Example
//!
//! ```ignore
//! use pagevault::git::{Git, GitSettings, ProcessRunner};
//! use std::sync::Arc;
//!
//! let git = Git::open(Path::new("/srv/wiki"), GitSettings::default(), Arc::new(ProcessRunner::new()))?;
//! for entry in git.ls_tree(&RevSpec::head(), "pages")? {
//!     println!("{} ({} bytes)", entry.name, entry.size.unwrap_or(0));
//! }
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::runner::{CommandRunner, Invocation, LineStream, Output, RunnerError};
use crate::core::history::parse_history;
use crate::core::types::{Author, Oid, RevSpec, Revision};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was checked
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Git operation in progress (rebase, merge, etc.).
    #[error("{operation} in progress")]
    OperationInProgress {
        /// The type of operation in progress
        operation: GitState,
    },

    /// Revision does not name a commit.
    #[error("unknown revision: {revision}")]
    RevisionNotFound {
        /// The revision that was requested
        revision: String,
    },

    /// A git process failed.
    #[error(transparent)]
    Command(#[from] RunnerError),

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::Internal {
            message: err.message().to_string(),
        }
    }
}

/// Information about a Git repository.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    /// Path to .git directory
    pub git_dir: PathBuf,
    /// Path to working directory
    pub work_dir: PathBuf,
}

/// State of in-progress Git operations.
///
/// Mutations are refused unless the repository is [`GitState::Clean`]:
/// committing in the middle of someone's merge would record half of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitState {
    /// No operation in progress.
    Clean,
    /// Rebase in progress.
    Rebase,
    /// Merge in progress.
    Merge,
    /// Cherry-pick in progress.
    CherryPick,
    /// Revert in progress.
    Revert,
    /// Bisect in progress.
    Bisect,
    /// Apply mailbox in progress.
    ApplyMailbox,
}

impl GitState {
    /// Check if any operation is in progress.
    ///
    /// # Example
    ///
    /// ```
    /// use pagevault::git::GitState;
    ///
    /// assert!(!GitState::Clean.is_in_progress());
    /// assert!(GitState::Merge.is_in_progress());
    /// ```
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, GitState::Clean)
    }

    /// Get a human-readable description of the state.
    pub fn description(&self) -> &'static str {
        match self {
            GitState::Clean => "clean",
            GitState::Rebase => "rebase",
            GitState::Merge => "merge",
            GitState::CherryPick => "cherry-pick",
            GitState::Revert => "revert",
            GitState::Bisect => "bisect",
            GitState::ApplyMailbox => "apply-mailbox",
        }
    }
}

impl std::fmt::Display for GitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Kind of object in a tree listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
    /// Submodule
    Commit,
}

/// One line of `git ls-tree -l`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub kind: EntryKind,
    pub oid: Oid,
    /// Blob size in bytes; `None` for trees and submodules
    pub size: Option<u64>,
    /// Entry name relative to the listed tree, unquoted
    pub name: String,
}

impl TreeEntry {
    /// Parse `<mode> <type> <object> <size>\t<name>`.
    ///
    /// ```
    /// use pagevault::git::{EntryKind, TreeEntry};
    ///
    /// let line = "100644 blob e69de29bb2d1d6434b8b29ae775ad8c2e48c5391       5\tFront_Page";
    /// let entry = TreeEntry::parse(line).unwrap();
    /// assert_eq!(entry.kind, EntryKind::Blob);
    /// assert_eq!(entry.size, Some(5));
    /// assert_eq!(entry.name, "Front_Page");
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let (meta, raw_name) = line.split_once('\t')?;
        let mut fields = meta.split_whitespace();
        let mode = fields.next()?.to_string();
        let kind = match fields.next()? {
            "blob" => EntryKind::Blob,
            "tree" => EntryKind::Tree,
            "commit" => EntryKind::Commit,
            _ => return None,
        };
        let oid = Oid::new(fields.next()?).ok()?;
        let size = fields.next().and_then(|s| s.parse().ok());
        Some(Self {
            mode,
            kind,
            oid,
            size,
            name: crate::core::paths::unquote_tree_name(raw_name),
        })
    }
}

/// How the doorway invokes the git binary.
#[derive(Debug, Clone)]
pub struct GitSettings {
    /// Program to run (`git` by default)
    pub git_bin: OsString,
    /// Deadline for each git process
    pub timeout: Duration,
    /// Committer identity; the commit author is used when unset
    pub committer: Option<Author>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            git_bin: OsString::from("git"),
            timeout: Invocation::DEFAULT_TIMEOUT,
            committer: None,
        }
    }
}

/// The Git interface.
///
/// Cheap to clone: the runner is shared.
#[derive(Clone)]
pub struct Git {
    root: PathBuf,
    work_dir: PathBuf,
    settings: GitSettings,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("root", &self.root)
            .field("runner", &self.runner)
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening and Info
    // =========================================================================

    /// Open the repository whose working tree is `root`.
    ///
    /// Unlike discovery, this does not walk up to parent directories: a
    /// misconfigured root inside some other checkout must fail rather than
    /// silently write into the enclosing repository.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if `root` is not a repository
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(
        root: &Path,
        settings: GitSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, GitError> {
        let info = Self::inspect(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            work_dir: info.work_dir,
            settings,
            runner,
        })
    }

    /// Create a new repository with a working tree at `root`.
    pub fn init(root: &Path) -> Result<RepoInfo, GitError> {
        git2::Repository::init(root)?;
        Self::inspect(root)
    }

    fn inspect(root: &Path) -> Result<RepoInfo, GitError> {
        let repo = Self::repository(root)?;
        let git_dir = repo.path().to_path_buf();
        let work_dir = repo.workdir().ok_or(GitError::BareRepo)?.to_path_buf();
        Ok(RepoInfo { git_dir, work_dir })
    }

    fn repository(root: &Path) -> Result<git2::Repository, GitError> {
        let repo = git2::Repository::open(root).map_err(|_| GitError::NotARepo {
            path: root.to_path_buf(),
        })?;
        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }
        Ok(repo)
    }

    /// Re-validate the repository and return its locations.
    ///
    /// Called at the start of every store operation; the directory may have
    /// been removed or replaced since the store was built.
    pub fn info(&self) -> Result<RepoInfo, GitError> {
        Self::inspect(&self.root)
    }

    /// The configured repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // =========================================================================
    // State Detection
    // =========================================================================

    /// Get the current Git state (rebase, merge, etc.).
    pub fn state(&self) -> Result<GitState, GitError> {
        let repo = Self::repository(&self.root)?;
        Ok(match repo.state() {
            git2::RepositoryState::Clean => GitState::Clean,
            git2::RepositoryState::Rebase
            | git2::RepositoryState::RebaseInteractive
            | git2::RepositoryState::RebaseMerge => GitState::Rebase,
            git2::RepositoryState::Merge => GitState::Merge,
            git2::RepositoryState::CherryPick | git2::RepositoryState::CherryPickSequence => {
                GitState::CherryPick
            }
            git2::RepositoryState::Revert | git2::RepositoryState::RevertSequence => {
                GitState::Revert
            }
            git2::RepositoryState::Bisect => GitState::Bisect,
            git2::RepositoryState::ApplyMailbox | git2::RepositoryState::ApplyMailboxOrRebase => {
                GitState::ApplyMailbox
            }
        })
    }

    /// Fail unless the repository is valid and no operation is in progress.
    pub fn ensure_writable(&self) -> Result<RepoInfo, GitError> {
        let info = self.info()?;
        let state = self.state()?;
        if state.is_in_progress() {
            return Err(GitError::OperationInProgress { operation: state });
        }
        Ok(info)
    }

    /// Whether `HEAD` points at a branch with no commits yet.
    pub fn is_unborn(&self) -> Result<bool, GitError> {
        let repo = Self::repository(&self.root)?;
        let head = repo.head().map(|_| ());
        match head {
            Ok(()) => Ok(false),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Whether `revision` resolves to a commit.
    pub fn revision_exists(&self, revision: &RevSpec) -> Result<bool, GitError> {
        let out = self.output([
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("{}^{{commit}}", revision),
        ])?;
        Ok(out.success())
    }

    /// List the entries of directory `dir` at `revision`.
    ///
    /// A directory that does not exist at that revision lists as empty.
    ///
    /// # Errors
    ///
    /// [`GitError::RevisionNotFound`] if `revision` does not resolve.
    pub fn ls_tree(&self, revision: &RevSpec, dir: &str) -> Result<Vec<TreeEntry>, GitError> {
        let out = self.output(["ls-tree", "-l", &format!("{}:{}", revision, dir)])?;
        if !out.success() {
            return if self.revision_exists(revision)? {
                Ok(Vec::new())
            } else {
                Err(GitError::RevisionNotFound {
                    revision: revision.to_string(),
                })
            };
        }
        Ok(out
            .stdout_lossy()
            .lines()
            .filter_map(TreeEntry::parse)
            .collect())
    }

    /// Read the blob at `revision:path`.
    ///
    /// Returns `Ok(None)` when the path does not exist at that revision.
    pub fn cat_blob(&self, revision: &RevSpec, path: &str) -> Result<Option<Vec<u8>>, GitError> {
        let out = self.output(["cat-file", "blob", &format!("{}:{}", revision, path)])?;
        if out.success() {
            return Ok(Some(out.stdout));
        }
        if self.revision_exists(revision)? {
            Ok(None)
        } else {
            Err(GitError::RevisionNotFound {
                revision: revision.to_string(),
            })
        }
    }

    /// Stream the full history of `path` across all refs, oldest first.
    ///
    /// The output is meant for [`crate::core::history`].
    pub fn log_path(&self, path: &str) -> Result<LineStream, GitError> {
        let inv = self.invocation([
            "log",
            "--reverse",
            "--date-order",
            "--raw",
            "--no-decorate",
            "--no-color",
            "--pretty=medium",
            "--date=iso",
            "--all",
            "--",
            path,
        ]);
        Ok(self.runner.lines(&inv)?)
    }

    /// The most recent commit on `HEAD` that touched `path`.
    pub fn last_revision(&self, path: &str) -> Result<Option<Revision>, GitError> {
        if self.is_unborn()? {
            return Ok(None);
        }
        let args = [
            "log",
            "-1",
            "--no-decorate",
            "--no-color",
            "--pretty=medium",
            "--date=iso",
            "HEAD",
            "--",
            path,
        ];
        let out = self.output(args)?.into_result(&self.invocation(args))?;
        Ok(parse_history(out.stdout_lossy().lines()).pop())
    }

    /// Textual diff of `path` between two revisions.
    pub fn diff(&self, from: &RevSpec, to: &RevSpec, path: &str) -> Result<String, GitError> {
        for rev in [from, to] {
            if !self.revision_exists(rev)? {
                return Err(GitError::RevisionNotFound {
                    revision: rev.to_string(),
                });
            }
        }
        let args = [
            "diff",
            "--no-color",
            "--no-ext-diff",
            from.as_str(),
            to.as_str(),
            "--",
            path,
        ];
        let out = self.output(args)?.into_result(&self.invocation(args))?;
        Ok(out.stdout_lossy())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Stage additions, modifications and removals of `paths`.
    pub fn stage(&self, paths: &[String]) -> Result<(), GitError> {
        self.checked(["add", "-A", "--"], paths)
    }

    /// Whether anything is staged for `paths`.
    pub fn has_staged_changes(&self, paths: &[String]) -> Result<bool, GitError> {
        let inv = self
            .invocation(["diff", "--cached", "--quiet", "--"])
            .args(paths);
        let out = self.runner.output(&inv)?;
        match out.code {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(RunnerError::Failed {
                command: inv.to_string(),
                code: out.code,
                stderr: out.stderr,
            }
            .into()),
        }
    }

    /// Commit exactly `paths` with `message`, attributed to `author`.
    ///
    /// The committer is the configured committer, or the author.
    pub fn commit(&self, message: &str, author: &Author, paths: &[String]) -> Result<(), GitError> {
        let committer = self.settings.committer.as_ref().unwrap_or(author);
        let inv = self
            .invocation(["commit", "--quiet", "--no-edit"])
            .arg("-m")
            .arg(message)
            .arg(format!("--author={}", author))
            .arg("--")
            .args(paths)
            .env("GIT_COMMITTER_NAME", &committer.name)
            .env("GIT_COMMITTER_EMAIL", &committer.email);
        self.runner.output(&inv)?.into_result(&inv)?;
        Ok(())
    }

    /// Drop whatever is staged for `paths`, leaving the working tree alone.
    pub fn unstage(&self, paths: &[String]) -> Result<(), GitError> {
        if self.is_unborn()? {
            self.checked(["rm", "--cached", "-r", "-q", "--ignore-unmatch", "--"], paths)
        } else {
            self.checked(["reset", "-q", "HEAD", "--"], paths)
        }
    }

    /// Restore `path` in the working tree to its content at `HEAD`.
    pub fn restore_from_head(&self, path: &str) -> Result<(), GitError> {
        self.checked(["checkout", "-q", "HEAD", "--"], &[path.to_string()])
    }

    /// Whether `path` exists at `HEAD`.
    pub fn exists_at_head(&self, path: &str) -> Result<bool, GitError> {
        if self.is_unborn()? {
            return Ok(false);
        }
        let out = self.output(["cat-file", "-e", &format!("HEAD:{}", path)])?;
        Ok(out.success())
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Invocation::new(&self.settings.git_bin)
            .args([
                "-c",
                "core.quotePath=false",
                "--no-pager",
                "--literal-pathspecs",
            ])
            .args(args)
            .current_dir(&self.work_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .timeout(self.settings.timeout)
    }

    fn output<I, S>(&self, args: I) -> Result<Output, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Ok(self.runner.output(&self.invocation(args))?)
    }

    fn checked<const N: usize>(&self, args: [&str; N], paths: &[String]) -> Result<(), GitError> {
        let inv = self.invocation(args).args(paths);
        self.runner.output(&inv)?.into_result(&inv)?;
        Ok(())
    }
}
