//! store::traits
//!
//! The versioned content store abstraction.
//!
//! # Design
//!
//! The `ContentStore` trait is synchronous: every operation is a handful of
//! short-lived git processes. Implementations must be `Send + Sync` so one
//! store can serve many request threads.
//!
//! # Example
//!
//! ```ignore
//! use pagevault::store::ContentStore;
//!
//! fn publish(store: &dyn ContentStore, doc: &DocumentRef, author: &Author) -> Result<(), StoreError> {
//!     let rev = store.save(doc, b"hello", "first draft", author)?;
//!     println!("saved {} as {}", doc, rev.short_id);
//!     Ok(())
//! }
//! ```

use super::{BackendKind, StoreError};
use crate::core::types::{
    AttachmentRef, Author, Change, DocumentName, DocumentRef, Namespace, RevSpec, Revision,
};

/// A store of versioned pages and their attachments.
///
/// Reads honor the revision pinned on the reference (`HEAD` when unset).
/// Mutations always apply to the tip and reject pinned references.
pub trait ContentStore: Send + Sync + std::fmt::Debug {
    /// Which backend this is.
    fn backend(&self) -> BackendKind;

    // =========================================================================
    // Pages
    // =========================================================================

    /// Whether the page exists at its revision.
    ///
    /// An empty repository or a namespace with no pages yields `false`.
    fn exists(&self, doc: &DocumentRef) -> Result<bool, StoreError>;

    /// Raw content of the page at its revision.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the page does not exist there.
    fn read(&self, doc: &DocumentRef) -> Result<Vec<u8>, StoreError>;

    /// Content of the page as UTF-8 text.
    fn read_to_string(&self, doc: &DocumentRef) -> Result<String, StoreError> {
        Ok(String::from_utf8(self.read(doc)?)?)
    }

    /// Display names of the pages in `namespace` at the tip, sorted.
    fn list(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError>;

    /// Write `content` and commit it.
    ///
    /// An empty `message` is recorded as `-`. Saving identical content
    /// makes no commit and returns the page's current revision, so the
    /// length of [`ContentStore::revisions`] counts changes, not calls to
    /// `save`.
    fn save(
        &self,
        doc: &DocumentRef,
        content: &[u8],
        message: &str,
        author: &Author,
    ) -> Result<Revision, StoreError>;

    /// Move a page in one commit with message `"<from> ⇒ <to>"`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if `from` does not exist
    /// - [`StoreError::AlreadyExists`] if `to` does
    fn rename(
        &self,
        from: &DocumentRef,
        to: &DocumentRef,
        author: &Author,
    ) -> Result<Revision, StoreError>;

    /// Remove a page in one commit with message `"<name> ⇒ void"`.
    fn delete(&self, doc: &DocumentRef, author: &Author) -> Result<Revision, StoreError>;

    /// Every commit that touched the page, oldest first, across all refs.
    ///
    /// History outlives the page: a deleted page still has revisions.
    fn revisions(&self, doc: &DocumentRef) -> Result<Vec<Revision>, StoreError>;

    /// Revisions of every page currently in `namespace`, oldest first.
    ///
    /// With `limit > 0` only the newest `limit` changes are kept.
    fn changes(&self, namespace: &Namespace, limit: usize) -> Result<Vec<Change>, StoreError>;

    /// Textual diff of the page between two revisions.
    fn diff(&self, doc: &DocumentRef, from: &RevSpec, to: &RevSpec)
        -> Result<String, StoreError>;

    // =========================================================================
    // Attachments
    // =========================================================================

    /// Whether the attachment exists at its revision.
    fn attachment_exists(&self, attachment: &AttachmentRef) -> Result<bool, StoreError>;

    /// Raw content of the attachment at its revision.
    fn attachment_read(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, StoreError>;

    /// Display names of the attachments of `page` at the tip, sorted.
    fn attachment_list(
        &self,
        namespace: &Namespace,
        page: &DocumentName,
    ) -> Result<Vec<String>, StoreError>;

    /// Write an attachment and commit it.
    fn attachment_save(
        &self,
        attachment: &AttachmentRef,
        content: &[u8],
        message: &str,
        author: &Author,
    ) -> Result<Revision, StoreError>;

    /// Remove an attachment in one commit.
    fn attachment_delete(
        &self,
        attachment: &AttachmentRef,
        author: &Author,
    ) -> Result<Revision, StoreError>;

    /// Every commit that touched the attachment, oldest first.
    fn attachment_revisions(&self, attachment: &AttachmentRef)
        -> Result<Vec<Revision>, StoreError>;

    /// Revisions of the attachments of `page`, or of every page when `None`,
    /// oldest first and bounded like [`ContentStore::changes`].
    fn attachment_changes(
        &self,
        namespace: &Namespace,
        page: Option<&DocumentName>,
        limit: usize,
    ) -> Result<Vec<Change>, StoreError>;
}
