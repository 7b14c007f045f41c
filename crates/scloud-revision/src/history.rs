use serde::Serialize;

use scloud_types::{BlobId, PageId, Revision, RevisionId};

/// One row of a page's revision history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Position in commit order, starting at 0 for the root revision.
    pub commit_number: usize,
    pub revision: Revision,
    /// Whether the page's latest pointer targets this revision.
    pub is_latest: bool,
}

/// Outcome of a cascading page delete.
///
/// The per-revision cleanup is best effort: rows that were already gone are
/// counted here instead of failing the delete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub page_id: PageId,
    pub revisions_deleted: usize,
    pub blobs_deleted: usize,
    pub missing_revisions: Vec<RevisionId>,
    pub missing_blobs: Vec<BlobId>,
}

impl DeleteReport {
    pub(crate) fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            revisions_deleted: 0,
            blobs_deleted: 0,
            missing_revisions: Vec::new(),
            missing_blobs: Vec::new(),
        }
    }

    /// `true` when every revision and blob was found and removed.
    pub fn is_complete(&self) -> bool {
        self.missing_revisions.is_empty() && self.missing_blobs.is_empty()
    }
}

/// Checksum audit of every blob of a page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub page_id: PageId,
    pub checked: usize,
    /// Revisions whose blob no longer matches its stored checksum.
    pub corrupted: Vec<RevisionId>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.corrupted.is_empty()
    }
}
