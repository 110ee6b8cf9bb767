//! Integration tests for the git-backed store.
//!
//! Every test works on a real repository in a temporary directory, driven
//! through the same `git` binary the store shells out to.

use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use pagevault::core::types::{
    AttachmentRef, Author, ChangeKind, DocumentName, DocumentRef, Namespace, RevSpec,
};
use pagevault::git::{CommandRunner, Invocation, LineStream, Output, ProcessRunner, RunnerError};
use pagevault::store::{ContentStore, GitStore, StoreError, StoreSettings};

// =============================================================================
// Test Fixtures
// =============================================================================

/// Run a git command in the specified directory.
fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(output.status.success(), "git {:?} failed", args);
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Test fixture that creates an empty repository.
struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init", "-q", "-b", "main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn store(&self) -> GitStore {
        GitStore::open(self.path(), StoreSettings::default()).expect("failed to open store")
    }

    fn status(&self) -> String {
        run_git(self.path(), &["status", "--porcelain"])
    }

    fn commit_count(&self) -> usize {
        run_git(self.path(), &["rev-list", "--count", "--all"])
            .trim()
            .parse()
            .unwrap()
    }
}

fn alice() -> Author {
    Author::new("Alice", "alice@example.com").unwrap()
}

fn pages() -> Namespace {
    Namespace::new("pages").unwrap()
}

fn doc(name: &str) -> DocumentRef {
    DocumentRef::parse("pages", name).unwrap()
}

fn attachment(page: &str, name: &str) -> AttachmentRef {
    AttachmentRef::new(
        pages(),
        DocumentName::new(page).unwrap(),
        DocumentName::new(name).unwrap(),
    )
}

// =============================================================================
// Opening
// =============================================================================

#[test]
fn open_rejects_plain_directory() {
    let dir = TempDir::new().unwrap();
    let err = GitStore::open(dir.path(), StoreSettings::default()).unwrap_err();
    assert!(matches!(err, StoreError::Repository(_)));
}

#[test]
fn open_rejects_bare_repository() {
    let dir = TempDir::new().unwrap();
    run_git(dir.path(), &["init", "-q", "--bare"]);
    let err = GitStore::open(dir.path(), StoreSettings::default()).unwrap_err();
    assert!(matches!(err, StoreError::Repository(_)));
}

#[test]
fn operations_fail_after_repository_is_removed() {
    let repo = TestRepo::new();
    let store = repo.store();
    std::fs::remove_dir_all(repo.path().join(".git")).unwrap();
    assert!(matches!(
        store.list(&pages()),
        Err(StoreError::Repository(_))
    ));
}

// =============================================================================
// Empty repository
// =============================================================================

#[test]
fn empty_repository_reads_as_empty() {
    let repo = TestRepo::new();
    let store = repo.store();

    assert!(!store.exists(&doc("Home")).unwrap());
    assert!(store.list(&pages()).unwrap().is_empty());
    assert!(store.revisions(&doc("Home")).unwrap().is_empty());
    assert!(store.changes(&pages(), 0).unwrap().is_empty());
    assert!(store.read(&doc("Home")).unwrap_err().is_not_found());
}

// =============================================================================
// Pages
// =============================================================================

#[test]
fn save_then_read_scenario() {
    let repo = TestRepo::new();
    let store = repo.store();

    let revision = store.save(&doc("Home"), b"Hello", "init", &alice()).unwrap();
    assert_eq!(store.read_to_string(&doc("Home")).unwrap(), "Hello");

    let revisions = store.revisions(&doc("Home")).unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].message, "init");
    assert_eq!(revisions[0].author, "Alice");
    assert_eq!(revisions[0].author_email, "alice@example.com");
    assert_eq!(revisions[0], revision);

    let head = run_git(repo.path(), &["rev-parse", "HEAD"]);
    assert_eq!(revision.id.as_str(), head.trim());
    assert_eq!(revision.short_id, head.trim()[..8].to_ascii_uppercase());
    assert!(repo.status().is_empty());
}

#[test]
fn saves_accumulate_revisions_oldest_first() {
    let repo = TestRepo::new();
    let store = repo.store();

    store.save(&doc("Home"), b"one", "first", &alice()).unwrap();
    store.save(&doc("Home"), b"two", "", &alice()).unwrap();
    store.save(&doc("Home"), b"three", "third", &alice()).unwrap();

    let revisions = store.revisions(&doc("Home")).unwrap();
    let messages: Vec<_> = revisions.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, ["first", "-", "third"]);
    assert!(revisions.windows(2).all(|w| w[0].date <= w[1].date));
    for revision in &revisions {
        assert_eq!(revision.short_id.len(), 8);
        assert_eq!(revision.short_id, revision.short_id.to_ascii_uppercase());
    }
    assert_eq!(store.read_to_string(&doc("Home")).unwrap(), "three");
}

#[test]
fn history_spans_every_branch_in_commit_order() {
    let repo = TestRepo::new();
    let store = repo.store();

    store.save(&doc("Home"), b"one", "one", &alice()).unwrap();
    run_git(repo.path(), &["checkout", "-q", "-b", "other"]);
    store.save(&doc("Home"), b"two", "two", &alice()).unwrap();
    run_git(repo.path(), &["checkout", "-q", "main"]);

    // Both commits usually share a timestamp here.
    let messages: Vec<_> = store
        .revisions(&doc("Home"))
        .unwrap()
        .into_iter()
        .map(|r| r.message)
        .collect();
    assert_eq!(messages, ["one", "two"]);
    assert_eq!(store.read_to_string(&doc("Home")).unwrap(), "one");
}

#[test]
fn unchanged_save_makes_no_commit() {
    let repo = TestRepo::new();
    let store = repo.store();

    let first = store.save(&doc("Home"), b"same", "init", &alice()).unwrap();
    let second = store.save(&doc("Home"), b"same", "again", &alice()).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(repo.commit_count(), 1);
    assert_eq!(store.revisions(&doc("Home")).unwrap().len(), 1);
}

#[test]
fn read_pinned_revision() {
    let repo = TestRepo::new();
    let store = repo.store();

    let old = store.save(&doc("Home"), b"old", "v1", &alice()).unwrap();
    store.save(&doc("Home"), b"new", "v2", &alice()).unwrap();

    let pinned = doc("Home").at(RevSpec::from(old.id.clone()));
    assert_eq!(store.read(&pinned).unwrap(), b"old");
    assert!(store.exists(&pinned).unwrap());

    let bogus = doc("Home").at(RevSpec::new("0000000000000000000000000000000000000000").unwrap());
    assert!(matches!(
        store.exists(&bogus),
        Err(StoreError::RevisionNotFound { .. })
    ));
}

#[test]
fn binary_content_round_trips() {
    let repo = TestRepo::new();
    let store = repo.store();
    let content: Vec<u8> = (0..=255u8).collect();

    store.save(&doc("Blob"), &content, "bytes", &alice()).unwrap();
    assert_eq!(store.read(&doc("Blob")).unwrap(), content);
    assert!(matches!(
        store.read_to_string(&doc("Blob")),
        Err(StoreError::Utf8(_))
    ));
}

#[test]
fn names_with_spaces_round_trip_through_list() {
    let repo = TestRepo::new();
    let store = repo.store();

    store.save(&doc("Front Page"), b"x", "m", &alice()).unwrap();
    store.save(&doc("About"), b"y", "m", &alice()).unwrap();

    assert!(repo.path().join("pages/Front_Page").is_file());
    assert_eq!(store.list(&pages()).unwrap(), ["About", "Front Page"]);
    assert!(store.exists(&doc("Front Page")).unwrap());
}

#[test]
fn list_ignores_hidden_files_and_directories() {
    let repo = TestRepo::new();
    let store = repo.store();

    store.save(&doc("Home"), b"x", "m", &alice()).unwrap();
    store
        .attachment_save(&attachment("Home", "logo.png"), b"png", "m", &alice())
        .unwrap();
    std::fs::write(repo.path().join("pages/.hidden"), "h").unwrap();
    run_git(repo.path(), &["add", "pages/.hidden"]);
    run_git(repo.path(), &["commit", "-q", "-m", "hidden"]);

    assert_eq!(store.list(&pages()).unwrap(), ["Home"]);
}

#[test]
fn exists_and_read_are_idempotent() {
    let repo = TestRepo::new();
    let store = repo.store();
    store.save(&doc("Home"), b"Hello", "init", &alice()).unwrap();

    for _ in 0..3 {
        assert!(store.exists(&doc("Home")).unwrap());
        assert_eq!(store.read(&doc("Home")).unwrap(), b"Hello");
    }
    assert_eq!(repo.commit_count(), 1);
}

#[test]
fn rename_moves_page_in_one_commit() {
    let repo = TestRepo::new();
    let store = repo.store();
    store.save(&doc("Old Name"), b"body", "init", &alice()).unwrap();

    let revision = store
        .rename(&doc("Old Name"), &doc("New Name"), &alice())
        .unwrap();
    assert_eq!(revision.message, "Old Name ⇒ New Name");
    assert!(!store.exists(&doc("Old Name")).unwrap());
    assert!(store.exists(&doc("New Name")).unwrap());
    assert_eq!(store.read(&doc("New Name")).unwrap(), b"body");
    assert_eq!(repo.commit_count(), 2);

    let revisions = store.revisions(&doc("New Name")).unwrap();
    assert_eq!(revisions.last().unwrap().id, revision.id);
    assert!(repo.status().is_empty());
}

#[test]
fn rename_preconditions() {
    let repo = TestRepo::new();
    let store = repo.store();
    store.save(&doc("A"), b"a", "m", &alice()).unwrap();
    store.save(&doc("B"), b"b", "m", &alice()).unwrap();

    assert!(matches!(
        store.rename(&doc("A"), &doc("B"), &alice()),
        Err(StoreError::AlreadyExists { .. })
    ));
    assert!(store
        .rename(&doc("Missing"), &doc("C"), &alice())
        .unwrap_err()
        .is_not_found());
    assert_eq!(repo.commit_count(), 2);
}

#[test]
fn delete_keeps_history() {
    let repo = TestRepo::new();
    let store = repo.store();
    store.save(&doc("Doomed"), b"x", "init", &alice()).unwrap();

    let revision = store.delete(&doc("Doomed"), &alice()).unwrap();
    assert_eq!(revision.message, "Doomed ⇒ void");
    assert!(!store.exists(&doc("Doomed")).unwrap());
    assert!(!repo.path().join("pages/Doomed").exists());

    let revisions = store.revisions(&doc("Doomed")).unwrap();
    assert_eq!(revisions.len(), 2);

    assert!(store
        .delete(&doc("Doomed"), &alice())
        .unwrap_err()
        .is_not_found());
}

#[test]
fn pinned_mutations_are_rejected() {
    let repo = TestRepo::new();
    let store = repo.store();
    let rev = store.save(&doc("Home"), b"x", "m", &alice()).unwrap();
    let pinned = doc("Home").at(RevSpec::from(rev.id));
    assert!(matches!(
        store.save(&pinned, b"y", "m", &alice()),
        Err(StoreError::InvalidName(_))
    ));
}

#[test]
fn changes_merge_all_pages() {
    let repo = TestRepo::new();
    let store = repo.store();
    store.save(&doc("A"), b"1", "a1", &alice()).unwrap();
    store.save(&doc("B"), b"1", "b1", &alice()).unwrap();
    store.save(&doc("A"), b"2", "a2", &alice()).unwrap();

    let changes = store.changes(&pages(), 0).unwrap();
    assert_eq!(changes.len(), 3);
    assert!(changes
        .windows(2)
        .all(|w| w[0].revision.date <= w[1].revision.date));
    assert!(changes.iter().all(|c| c.kind == ChangeKind::Page));

    let mut messages: Vec<_> = changes.iter().map(|c| c.revision.message.clone()).collect();
    messages.sort();
    assert_eq!(messages, ["a1", "a2", "b1"]);

    assert_eq!(store.changes(&pages(), 2).unwrap().len(), 2);
}

#[test]
fn diff_between_revisions() {
    let repo = TestRepo::new();
    let store = repo.store();
    let v1 = store.save(&doc("Home"), b"line one\n", "v1", &alice()).unwrap();
    let v2 = store.save(&doc("Home"), b"line two\n", "v2", &alice()).unwrap();

    let diff = store
        .diff(&doc("Home"), &RevSpec::from(v1.id), &RevSpec::from(v2.id))
        .unwrap();
    assert!(diff.contains("-line one"));
    assert!(diff.contains("+line two"));

    assert!(matches!(
        store.diff(
            &doc("Home"),
            &RevSpec::new("nonexistent-branch").unwrap(),
            &RevSpec::head()
        ),
        Err(StoreError::RevisionNotFound { .. })
    ));
}

// =============================================================================
// Attachments
// =============================================================================

#[test]
fn attachments_lifecycle() {
    let repo = TestRepo::new();
    let store = repo.store();
    let logo = attachment("Home", "logo.png");
    let page = DocumentName::new("Home").unwrap();

    store.attachment_save(&logo, b"\x89PNG", "add logo", &alice()).unwrap();
    assert!(store.attachment_exists(&logo).unwrap());
    assert_eq!(store.attachment_read(&logo).unwrap(), b"\x89PNG");
    assert_eq!(store.attachment_list(&pages(), &page).unwrap(), ["logo.png"]);
    assert!(repo
        .path()
        .join("pages/.attachments/Home/logo.png")
        .is_file());

    let changes = store.attachment_changes(&pages(), Some(&page), 0).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(
        changes[0].kind,
        ChangeKind::Attachment {
            page: "Home".into()
        }
    );

    let revision = store.attachment_delete(&logo, &alice()).unwrap();
    assert_eq!(revision.message, "logo.png ⇒ void");
    assert!(!store.attachment_exists(&logo).unwrap());
    assert_eq!(store.attachment_revisions(&logo).unwrap().len(), 2);
}

#[test]
fn attachment_changes_across_pages() {
    let repo = TestRepo::new();
    let store = repo.store();
    store
        .attachment_save(&attachment("Home", "a.txt"), b"a", "m", &alice())
        .unwrap();
    store
        .attachment_save(&attachment("Front Page", "b.txt"), b"b", "m", &alice())
        .unwrap();

    let changes = store.attachment_changes(&pages(), None, 0).unwrap();
    let mut pages_seen: Vec<_> = changes
        .iter()
        .map(|c| match &c.kind {
            ChangeKind::Attachment { page } => page.clone(),
            ChangeKind::Page => panic!("page change in attachment changes"),
        })
        .collect();
    pages_seen.sort();
    assert_eq!(pages_seen, ["Front Page", "Home"]);
}

// =============================================================================
// Atomicity
// =============================================================================

/// Delegates to the real runner but fails every `git commit`.
#[derive(Debug)]
struct FailingCommit {
    inner: ProcessRunner,
    armed: AtomicBool,
}

impl FailingCommit {
    fn is_commit(invocation: &Invocation) -> bool {
        invocation.get_args().iter().any(|a| a == "commit")
    }
}

impl CommandRunner for FailingCommit {
    fn lines(&self, invocation: &Invocation) -> Result<LineStream, RunnerError> {
        self.inner.lines(invocation)
    }

    fn output(&self, invocation: &Invocation) -> Result<Output, RunnerError> {
        if self.armed.load(Ordering::SeqCst) && Self::is_commit(invocation) {
            return Ok(Output {
                stdout: Vec::new(),
                stderr: "simulated failure".into(),
                code: Some(1),
            });
        }
        self.inner.output(invocation)
    }
}

fn failing_store(repo: &TestRepo) -> (GitStore, Arc<FailingCommit>) {
    let runner = Arc::new(FailingCommit {
        inner: ProcessRunner::new(),
        armed: AtomicBool::new(false),
    });
    let store = GitStore::with_runner(repo.path(), StoreSettings::default(), runner.clone())
        .expect("failed to open store");
    (store, runner)
}

#[test]
fn failed_commit_of_new_page_leaves_nothing_behind() {
    let repo = TestRepo::new();
    let (store, runner) = failing_store(&repo);
    store.save(&doc("Home"), b"x", "init", &alice()).unwrap();
    runner.armed.store(true, Ordering::SeqCst);

    let err = store.save(&doc("Fresh"), b"new", "m", &alice()).unwrap_err();
    assert!(matches!(
        err,
        StoreError::MutationFailed {
            rolled_back: true,
            ..
        }
    ));
    assert!(!repo.path().join("pages/Fresh").exists());
    assert!(repo.status().is_empty(), "dirty: {}", repo.status());
}

#[test]
fn failed_commit_of_edit_restores_previous_content() {
    let repo = TestRepo::new();
    let (store, runner) = failing_store(&repo);
    store.save(&doc("Home"), b"original", "init", &alice()).unwrap();
    runner.armed.store(true, Ordering::SeqCst);

    assert!(store.save(&doc("Home"), b"edited", "m", &alice()).is_err());
    assert_eq!(
        std::fs::read(repo.path().join("pages/Home")).unwrap(),
        b"original"
    );
    assert!(repo.status().is_empty(), "dirty: {}", repo.status());
}

#[test]
fn failed_rename_and_delete_restore_working_tree() {
    let repo = TestRepo::new();
    let (store, runner) = failing_store(&repo);
    store.save(&doc("A"), b"a", "init", &alice()).unwrap();
    runner.armed.store(true, Ordering::SeqCst);

    assert!(store.rename(&doc("A"), &doc("B"), &alice()).is_err());
    assert!(repo.path().join("pages/A").is_file());
    assert!(!repo.path().join("pages/B").exists());

    assert!(store.delete(&doc("A"), &alice()).is_err());
    assert!(repo.path().join("pages/A").is_file());
    assert!(repo.status().is_empty(), "dirty: {}", repo.status());

    runner.armed.store(false, Ordering::SeqCst);
    assert_eq!(store.revisions(&doc("A")).unwrap().len(), 1);
}

#[test]
fn failed_first_commit_in_empty_repository() {
    let repo = TestRepo::new();
    let (store, runner) = failing_store(&repo);
    runner.armed.store(true, Ordering::SeqCst);

    assert!(store.save(&doc("Home"), b"x", "init", &alice()).is_err());
    assert!(!repo.path().join("pages").exists());
    assert!(repo.status().is_empty(), "dirty: {}", repo.status());
}

#[test]
fn mutation_refused_during_merge() {
    let repo = TestRepo::new();
    let store = repo.store();
    store.save(&doc("Home"), b"x", "init", &alice()).unwrap();
    let head = run_git(repo.path(), &["rev-parse", "HEAD"]);
    std::fs::write(repo.path().join(".git/MERGE_HEAD"), head).unwrap();

    assert!(matches!(
        store.save(&doc("Home"), b"y", "m", &alice()),
        Err(StoreError::Repository(_))
    ));
    assert_eq!(store.read(&doc("Home")).unwrap(), b"x");
}

#[test]
fn concurrent_saves_are_serialized() {
    let repo = TestRepo::new();
    let store = Arc::new(repo.store());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let name = format!("Page {}", i);
                store
                    .save(&doc(&name), name.as_bytes(), "m", &alice())
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.list(&pages()).unwrap().len(), 4);
    assert_eq!(repo.commit_count(), 4);
    assert!(repo.status().is_empty());
}
