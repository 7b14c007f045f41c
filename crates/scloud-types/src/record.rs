//! Record shapes of the three persisted relations.
//!
//! Records are plain values. The storage engine owns the canonical copy;
//! callers receive clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::id::{BlobId, GroupId, PageId, RevisionId, UserId};

/// A named, group-scoped document tracked across revisions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub group_id: GroupId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// `None` only inside the transaction that creates the page, before its
    /// first revision is linked.
    pub latest_revision_id: Option<RevisionId>,
}

impl Page {
    /// Returns `true` once the page points at a revision.
    pub fn has_revision(&self) -> bool {
        self.latest_revision_id.is_some()
    }
}

/// One immutable snapshot of a page's content plus commit metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    pub page_id: PageId,
    pub blob_id: BlobId,
    pub committed_by: UserId,
    pub parent_revision_id: Option<RevisionId>,
    pub commit_message: String,
    pub created_at: DateTime<Utc>,
}

impl Revision {
    /// A root revision is the first revision of a page.
    pub fn is_root(&self) -> bool {
        self.parent_revision_id.is_none()
    }
}

/// Raw file content stored independently of revision metadata.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub id: BlobId,
    pub content: Vec<u8>,
    pub checksum: Checksum,
    pub created_at: DateTime<Utc>,
}

impl Blob {
    /// Size of the content in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("id", &self.id)
            .field("size", &self.content.len())
            .field("checksum", &self.checksum)
            .field("created_at", &self.created_at)
            .finish()
    }
}
