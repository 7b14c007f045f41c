use scloud_crypto::ContentHasher;
use scloud_pool::Transaction;
use scloud_types::{Blob, BlobId, GroupId, Page, PageId, Revision, RevisionId, UserId};

use crate::error::StoreResult;

/// Raw content storage, independent of page and revision semantics.
///
/// Implementations must satisfy these invariants:
/// - Blobs are immutable once written.
/// - Every `put` allocates a fresh identifier, even for byte-identical
///   content. The checksum is metadata, not a key.
/// - The checksum is SHA-256 of the content, computed at write time.
pub trait BlobStore: Send + Sync {
    /// Store content and return its new identifier.
    ///
    /// Fails with `StorageFault` if the write affects no rows.
    fn put(&self, tx: &mut Transaction<'_>, content: &[u8]) -> StoreResult<BlobId>;

    /// Fetch the full record, content included.
    ///
    /// Fails with `NotFound` if the blob does not exist.
    fn fetch(&self, tx: &Transaction<'_>, id: BlobId) -> StoreResult<Blob>;

    /// Remove a blob. Returns the number of rows removed (0 if absent); the
    /// caller decides whether a miss is fatal.
    fn delete(&self, tx: &mut Transaction<'_>, id: BlobId) -> StoreResult<u64>;

    /// Raw content of a blob.
    fn get(&self, tx: &Transaction<'_>, id: BlobId) -> StoreResult<Vec<u8>> {
        self.fetch(tx, id).map(|blob| blob.content)
    }

    /// Recompute the digest and compare it with the stored checksum.
    fn verify(&self, tx: &Transaction<'_>, id: BlobId) -> StoreResult<bool> {
        let blob = self.fetch(tx, id)?;
        Ok(ContentHasher::verify(&blob.content, &blob.checksum))
    }
}

/// Fields of a revision about to be appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRevision<'a> {
    pub page_id: PageId,
    pub committed_by: UserId,
    /// `None` only for a page's first revision. The log does not enforce
    /// this; it cannot tell which revision is first.
    pub parent_revision_id: Option<RevisionId>,
    pub commit_message: &'a str,
    pub blob_id: BlobId,
}

/// Persistent log of revision records forming a parent-linked forest.
pub trait RevisionLog: Send + Sync {
    /// Insert one immutable record and return its identifier.
    fn append(&self, tx: &mut Transaction<'_>, revision: NewRevision<'_>)
        -> StoreResult<RevisionId>;

    /// Point lookup. Fails with `NotFound` if absent.
    fn get(&self, tx: &Transaction<'_>, id: RevisionId) -> StoreResult<Revision>;

    /// Every revision of a page, oldest first.
    fn list_by_page(&self, tx: &Transaction<'_>, page_id: PageId) -> StoreResult<Vec<Revision>>;

    /// Hard delete of one record. Returns 0 if absent.
    fn delete(&self, tx: &mut Transaction<'_>, id: RevisionId) -> StoreResult<u64>;
}

/// Page metadata plus the pointer to each page's current revision.
pub trait PageRegistry: Send + Sync {
    /// Insert a page with no latest revision yet.
    fn create(&self, tx: &mut Transaction<'_>, group_id: GroupId, name: &str)
        -> StoreResult<PageId>;

    /// Point lookup. Fails with `NotFound` if absent.
    fn get(&self, tx: &Transaction<'_>, id: PageId) -> StoreResult<Page>;

    /// Move the latest pointer. Fails with `StorageFault` if the page does
    /// not exist.
    fn set_latest_revision(
        &self,
        tx: &mut Transaction<'_>,
        page_id: PageId,
        revision_id: RevisionId,
    ) -> StoreResult<()>;

    /// Current latest revision. Fails with `NotFound` if the page is absent
    /// and with `StorageFault` if it has no revision linked.
    fn latest_revision(&self, tx: &Transaction<'_>, page_id: PageId) -> StoreResult<RevisionId>;

    /// Every page of a group, in creation order.
    fn list_by_group(&self, tx: &Transaction<'_>, group_id: GroupId) -> StoreResult<Vec<Page>>;

    /// Remove a page row. Returns 0 if absent.
    fn delete(&self, tx: &mut Transaction<'_>, id: PageId) -> StoreResult<u64>;
}
