//! Integration tests for the change feed over real registries.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;

use pagevault::core::config::{Config, ConfigFile, FeedConfig, ProviderConfig, DEFAULT_PROVIDER};
use pagevault::core::types::{AttachmentRef, Author, ChangeKind, DocumentName, DocumentRef, Namespace};
use pagevault::feed::{by_day, FeedBuilder, FeedError};
use pagevault::store::{ContentStore, MemoryStore, Registry};

fn run_git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("failed to run git");
    assert!(status.success(), "git {:?} failed", args);
}

fn alice() -> Author {
    Author::new("Alice", "alice@example.com").unwrap()
}

fn ns(name: &str) -> Namespace {
    Namespace::new(name).unwrap()
}

fn memory_registry() -> (Registry, MemoryStore) {
    let store = MemoryStore::new();
    let registry = Registry::single(vec![ns("pages"), ns("users")], Arc::new(store.clone()));
    (registry, store)
}

#[test]
fn feed_covers_pages_and_attachments_of_every_namespace() {
    let (registry, store) = memory_registry();
    store
        .save(&DocumentRef::parse("pages", "Home").unwrap(), b"x", "home", &alice())
        .unwrap();
    store
        .save(&DocumentRef::parse("users", "Alice").unwrap(), b"y", "me", &alice())
        .unwrap();
    store
        .attachment_save(
            &AttachmentRef::new(
                ns("pages"),
                DocumentName::new("Home").unwrap(),
                DocumentName::new("logo.png").unwrap(),
            ),
            b"png",
            "logo",
            &alice(),
        )
        .unwrap();

    let feed = FeedBuilder::new().limit(0).build(&registry).unwrap();
    assert_eq!(feed.len(), 3);
    assert!(feed
        .windows(2)
        .all(|w| w[0].change.revision.date >= w[1].change.revision.date));

    let namespaces: Vec<_> = feed.iter().map(|e| e.change.namespace.as_str()).collect();
    assert!(namespaces.contains(&"pages"));
    assert!(namespaces.contains(&"users"));
    assert!(feed
        .iter()
        .any(|e| matches!(e.change.kind, ChangeKind::Attachment { .. })));

    let groups = by_day(&feed);
    assert_eq!(
        groups.iter().map(|(_, items)| items.len()).sum::<usize>(),
        3
    );
}

#[test]
fn feed_limits() {
    let (registry, store) = memory_registry();
    for i in 0..10 {
        store
            .save(
                &DocumentRef::parse("pages", &format!("P{}", i)).unwrap(),
                b"x",
                "m",
                &alice(),
            )
            .unwrap();
    }

    assert_eq!(FeedBuilder::new().limit(4).build(&registry).unwrap().len(), 4);
    assert_eq!(
        FeedBuilder::new()
            .per_namespace_limit(3)
            .limit(0)
            .build(&registry)
            .unwrap()
            .len(),
        3
    );
    assert_eq!(
        FeedBuilder::new()
            .per_namespace_limit(0)
            .limit(0)
            .build(&registry)
            .unwrap()
            .len(),
        10
    );
}

#[test]
fn failing_namespace_is_reported() {
    let dir = TempDir::new().unwrap();
    run_git(dir.path(), &["init", "-q"]);
    let store = pagevault::store::GitStore::open(dir.path(), Default::default()).unwrap();
    let registry = Registry::single(vec![ns("pages")], Arc::new(store));
    std::fs::remove_dir_all(dir.path().join(".git")).unwrap();

    let err = FeedBuilder::new().build(&registry).unwrap_err();
    assert!(matches!(err, FeedError::Store { .. }));
    assert!(err.to_string().contains("pages"));
}

#[test]
fn feed_from_git_config() {
    let dir = TempDir::new().unwrap();
    run_git(dir.path(), &["init", "-q"]);

    let mut file = ConfigFile {
        namespaces: Some(vec!["pages".into(), "users".into()]),
        feed: Some(FeedConfig {
            limit: Some(2),
            per_namespace_limit: None,
        }),
        ..Default::default()
    };
    file.providers.insert(
        DEFAULT_PROVIDER.into(),
        ProviderConfig {
            backend: Some("git".into()),
            path: Some(dir.path().to_path_buf()),
        },
    );
    let config = Config::from_file(file).unwrap();
    let registry = Registry::from_config(&config).unwrap();

    let store = registry.store_for(&ns("pages")).unwrap();
    store
        .save(&DocumentRef::parse("pages", "Home").unwrap(), b"x", "home", &alice())
        .unwrap();
    store
        .save(&DocumentRef::parse("users", "Alice").unwrap(), b"y", "me", &alice())
        .unwrap();
    store
        .save(&DocumentRef::parse("pages", "About").unwrap(), b"z", "about", &alice())
        .unwrap();

    let feed = FeedBuilder::from_config(&config).build(&registry).unwrap();
    assert_eq!(feed.len(), 2);
    for entry in &feed {
        assert_eq!(entry.day, entry.change.revision.day_key());
    }
}
