use std::collections::HashSet;

use tracing::{info, info_span, warn};

use scloud_pool::{Pool, Transaction};
use scloud_store::{
    BlobStore, NewRevision, PageRegistry, RevisionLog, StoreResult, TableBlobStore,
    TablePageRegistry, TableRevisionLog,
};
use scloud_types::{GroupId, Page, PageId, Revision, RevisionId, UserId};

use crate::config::RevisionStoreConfig;
use crate::error::{RevisionError, RevisionResult};
use crate::history::{DeleteReport, HistoryEntry, VerifyReport};

/// How a cleanup step treats a write that affected no rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeletePolicy {
    /// Zero rows or an error aborts the whole unit of work.
    Strict,
    /// Zero rows or an error is logged and the operation continues.
    Lenient,
}

impl DeletePolicy {
    /// Returns whether the row was actually removed.
    fn apply(self, outcome: StoreResult<u64>, what: &str, id: i64) -> RevisionResult<bool> {
        match (self, outcome) {
            (_, Ok(n)) if n > 0 => Ok(true),
            (DeletePolicy::Strict, Ok(_)) => Err(RevisionError::StorageFault(format!(
                "{what} {id} not found for deletion"
            ))),
            (DeletePolicy::Strict, Err(e)) => Err(e.into()),
            (DeletePolicy::Lenient, Ok(_)) => {
                warn!(what, id, "not found during cascade delete; continuing");
                Ok(false)
            }
            (DeletePolicy::Lenient, Err(e)) => {
                warn!(what, id, error = %e, "cascade delete step failed; continuing");
                Ok(false)
            }
        }
    }
}

/// Transactional orchestrator over the three table managers.
///
/// The pool is injected at construction, so the same store works against a
/// file-backed database in production and an in-memory one in tests. The
/// component types default to the table-backed implementations and can be
/// swapped to wrap or fake any of them.
pub struct RevisionStore<
    B = TableBlobStore,
    R = TableRevisionLog,
    P = TablePageRegistry,
> {
    pool: Pool,
    blobs: B,
    revisions: R,
    pages: P,
    config: RevisionStoreConfig,
}

impl RevisionStore {
    /// Store over the table-backed components.
    pub fn new(pool: Pool, config: RevisionStoreConfig) -> Self {
        Self::with_components(
            pool,
            TableBlobStore,
            TableRevisionLog,
            TablePageRegistry,
            config,
        )
    }
}

impl<B, R, P> RevisionStore<B, R, P>
where
    B: BlobStore,
    R: RevisionLog,
    P: PageRegistry,
{
    pub fn with_components(
        pool: Pool,
        blobs: B,
        revisions: R,
        pages: P,
        config: RevisionStoreConfig,
    ) -> Self {
        Self {
            pool,
            blobs,
            revisions,
            pages,
            config,
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn config(&self) -> &RevisionStoreConfig {
        &self.config
    }

    // ---- Composite operations ----

    /// Create a page together with its root revision.
    ///
    /// On success the page's latest pointer targets a parentless revision of
    /// that page. On failure nothing is left behind.
    pub fn create_page(
        &self,
        author: UserId,
        group_id: GroupId,
        name: &str,
        content: &[u8],
        message: &str,
    ) -> RevisionResult<PageId> {
        let _span = info_span!("create_page", group = %group_id, name).entered();
        if name.trim().is_empty() {
            return Err(RevisionError::Validation("page name must not be empty".into()));
        }
        self.check_content(content)?;

        let (page_id, revision_id) = self.unit_of_work("create_page", |tx| {
            let page_id = self.pages.create(tx, group_id, name)?;
            let blob_id = self.blobs.put(tx, content)?;
            let revision_id = self.revisions.append(
                tx,
                NewRevision {
                    page_id,
                    committed_by: author,
                    parent_revision_id: None,
                    commit_message: message,
                    blob_id,
                },
            )?;
            self.pages.set_latest_revision(tx, page_id, revision_id)?;
            Ok((page_id, revision_id))
        })?;

        info!(page = %page_id, revision = %revision_id, "page created");
        Ok(page_id)
    }

    /// Append a revision whose parent is `parent`, and make it the page's
    /// latest revision.
    ///
    /// `parent` may be any revision of the same page, not only the current
    /// tip; branching from an older revision simply moves the tip forward.
    pub fn append_revision(
        &self,
        author: UserId,
        page_id: PageId,
        parent: RevisionId,
        content: &[u8],
        message: &str,
    ) -> RevisionResult<RevisionId> {
        let _span = info_span!("append_revision", page = %page_id, parent = %parent).entered();
        if self.config.require_commit_message && message.trim().is_empty() {
            return Err(RevisionError::Validation("commit message must not be empty".into()));
        }
        self.check_content(content)?;

        let revision_id = self.unit_of_work("append_revision", |tx| {
            self.pages.get(tx, page_id)?;
            let parent_rev = self.revisions.get(tx, parent)?;
            if parent_rev.page_id != page_id {
                return Err(RevisionError::Validation(format!(
                    "parent revision {parent} belongs to page {}, not page {page_id}",
                    parent_rev.page_id
                )));
            }

            let blob_id = self.blobs.put(tx, content)?;
            let revision_id = self.revisions.append(
                tx,
                NewRevision {
                    page_id,
                    committed_by: author,
                    parent_revision_id: Some(parent),
                    commit_message: message,
                    blob_id,
                },
            )?;
            self.pages.set_latest_revision(tx, page_id, revision_id)?;
            Ok(revision_id)
        })?;

        info!(revision = %revision_id, "revision appended");
        Ok(revision_id)
    }

    /// Delete a page with every revision and blob it owns.
    ///
    /// Revision and blob rows that are already gone are logged and skipped.
    /// The page row itself must exist, otherwise the delete fails and nothing
    /// is removed.
    pub fn delete_page(&self, page_id: PageId) -> RevisionResult<DeleteReport> {
        let _span = info_span!("delete_page", page = %page_id).entered();

        let report = self.unit_of_work("delete_page", |tx| {
            let mut report = DeleteReport::new(page_id);
            for revision in self.revisions.list_by_page(tx, page_id)? {
                let removed = DeletePolicy::Lenient.apply(
                    self.revisions.delete(tx, revision.id),
                    "revision",
                    revision.id.get(),
                )?;
                if removed {
                    report.revisions_deleted += 1;
                } else {
                    report.missing_revisions.push(revision.id);
                }

                let removed = DeletePolicy::Lenient.apply(
                    self.blobs.delete(tx, revision.blob_id),
                    "blob",
                    revision.blob_id.get(),
                )?;
                if removed {
                    report.blobs_deleted += 1;
                } else {
                    report.missing_blobs.push(revision.blob_id);
                }
            }

            DeletePolicy::Strict.apply(self.pages.delete(tx, page_id), "page", page_id.get())?;
            Ok(report)
        })?;

        info!(
            revisions = report.revisions_deleted,
            blobs = report.blobs_deleted,
            complete = report.is_complete(),
            "page deleted"
        );
        Ok(report)
    }

    // ---- Reads ----

    pub fn page(&self, page_id: PageId) -> RevisionResult<Page> {
        self.read(|tx| Ok(self.pages.get(tx, page_id)?))
    }

    /// Every page of a group, in creation order.
    pub fn pages_in_group(&self, group_id: GroupId) -> RevisionResult<Vec<Page>> {
        self.read(|tx| Ok(self.pages.list_by_group(tx, group_id)?))
    }

    pub fn revision(&self, revision_id: RevisionId) -> RevisionResult<Revision> {
        self.read(|tx| Ok(self.revisions.get(tx, revision_id)?))
    }

    /// Every revision of a page, oldest first.
    pub fn revisions(&self, page_id: PageId) -> RevisionResult<Vec<Revision>> {
        self.read(|tx| Ok(self.revisions.list_by_page(tx, page_id)?))
    }

    pub fn latest_revision(&self, page_id: PageId) -> RevisionResult<RevisionId> {
        self.read(|tx| Ok(self.pages.latest_revision(tx, page_id)?))
    }

    /// The page's revisions numbered in commit order, with the tip flagged.
    pub fn history(&self, page_id: PageId) -> RevisionResult<Vec<HistoryEntry>> {
        self.read(|tx| {
            let latest = self.pages.get(tx, page_id)?.latest_revision_id;
            let entries = self
                .revisions
                .list_by_page(tx, page_id)?
                .into_iter()
                .enumerate()
                .map(|(commit_number, revision)| HistoryEntry {
                    commit_number,
                    is_latest: Some(revision.id) == latest,
                    revision,
                })
                .collect();
            Ok(entries)
        })
    }

    /// Walk parent links from `revision_id` back to the page's root.
    /// The starting revision comes first.
    pub fn lineage(&self, revision_id: RevisionId) -> RevisionResult<Vec<Revision>> {
        self.read(|tx| {
            let mut chain = Vec::new();
            let mut seen = HashSet::new();
            let mut next = Some(revision_id);
            while let Some(id) = next {
                if !seen.insert(id) {
                    return Err(RevisionError::StorageFault(format!(
                        "parent chain of revision {revision_id} loops at {id}"
                    )));
                }
                let revision = self.revisions.get(tx, id)?;
                next = revision.parent_revision_id;
                chain.push(revision);
            }
            Ok(chain)
        })
    }

    /// Content stored for one revision.
    pub fn revision_content(&self, revision_id: RevisionId) -> RevisionResult<Vec<u8>> {
        self.read(|tx| {
            let revision = self.revisions.get(tx, revision_id)?;
            Ok(self.blobs.get(tx, revision.blob_id)?)
        })
    }

    /// The page's latest revision and its content.
    pub fn latest_content(&self, page_id: PageId) -> RevisionResult<(Revision, Vec<u8>)> {
        self.read(|tx| {
            let latest = self.pages.latest_revision(tx, page_id)?;
            let revision = self.revisions.get(tx, latest)?;
            let content = self.blobs.get(tx, revision.blob_id)?;
            Ok((revision, content))
        })
    }

    /// Recompute the checksum of every blob the page owns.
    pub fn verify_page(&self, page_id: PageId) -> RevisionResult<VerifyReport> {
        self.read(|tx| {
            self.pages.get(tx, page_id)?;
            let revisions = self.revisions.list_by_page(tx, page_id)?;
            let mut report = VerifyReport {
                page_id,
                checked: 0,
                corrupted: Vec::new(),
            };
            for revision in revisions {
                report.checked += 1;
                if !self.blobs.verify(tx, revision.blob_id)? {
                    warn!(revision = %revision.id, blob = %revision.blob_id, "checksum mismatch");
                    report.corrupted.push(revision.id);
                }
            }
            Ok(report)
        })
    }

    // ---- Units of work ----

    fn check_content(&self, content: &[u8]) -> RevisionResult<()> {
        match self.config.max_content_bytes {
            Some(limit) if content.len() > limit => Err(RevisionError::Validation(format!(
                "content is {} bytes, limit is {limit}",
                content.len()
            ))),
            _ => Ok(()),
        }
    }

    /// Run `work` in one transaction: commit if it succeeds, roll back
    /// otherwise. The connection returns to the pool either way.
    fn unit_of_work<T>(
        &self,
        op: &'static str,
        work: impl FnOnce(&mut Transaction<'_>) -> RevisionResult<T>,
    ) -> RevisionResult<T> {
        let mut conn = self.pool.acquire()?;
        let mut tx = conn.begin();
        match work(&mut tx) {
            Ok(value) => match tx.commit() {
                Ok(()) => Ok(value),
                Err(e) => {
                    warn!(op, error = %e, "commit refused; unit of work rolled back");
                    Err(e.into())
                }
            },
            Err(e) => {
                tx.rollback();
                warn!(op, error = %e, "unit of work rolled back");
                Err(e)
            }
        }
    }

    fn read<T>(
        &self,
        work: impl FnOnce(&Transaction<'_>) -> RevisionResult<T>,
    ) -> RevisionResult<T> {
        let mut conn = self.pool.acquire()?;
        let tx = conn.begin();
        let result = work(&tx);
        tx.rollback();
        result
    }
}

impl<B, R, P> std::fmt::Debug for RevisionStore<B, R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionStore")
            .field("pool", &self.pool.status())
            .field("config", &self.config)
            .finish()
    }
}
