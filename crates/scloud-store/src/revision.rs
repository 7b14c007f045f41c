use chrono::Utc;
use tracing::debug;

use scloud_pool::Transaction;
use scloud_types::{PageId, Revision, RevisionId};

use crate::error::{StoreError, StoreResult};
use crate::traits::{NewRevision, RevisionLog};

/// [`RevisionLog`] over the engine's `file_revisions` relation.
#[derive(Clone, Copy, Debug, Default)]
pub struct TableRevisionLog;

impl TableRevisionLog {
    pub fn new() -> Self {
        Self
    }
}

impl RevisionLog for TableRevisionLog {
    fn append(
        &self,
        tx: &mut Transaction<'_>,
        revision: NewRevision<'_>,
    ) -> StoreResult<RevisionId> {
        let id = tx.next_id::<Revision>();
        let record = Revision {
            id,
            page_id: revision.page_id,
            blob_id: revision.blob_id,
            committed_by: revision.committed_by,
            parent_revision_id: revision.parent_revision_id,
            commit_message: revision.commit_message.to_string(),
            created_at: Utc::now(),
        };
        if tx.insert(record) == 0 {
            return Err(StoreError::StorageFault(format!(
                "inserting revision {id} failed, no rows affected"
            )));
        }
        debug!(
            revision = %id,
            page = %revision.page_id,
            parent = ?revision.parent_revision_id,
            "revision appended"
        );
        Ok(id)
    }

    fn get(&self, tx: &Transaction<'_>, id: RevisionId) -> StoreResult<Revision> {
        tx.get::<Revision>(id)
            .ok_or_else(|| StoreError::not_found("revision", id))
    }

    fn list_by_page(&self, tx: &Transaction<'_>, page_id: PageId) -> StoreResult<Vec<Revision>> {
        Ok(tx.scan::<Revision>(|r| r.page_id == page_id))
    }

    fn delete(&self, tx: &mut Transaction<'_>, id: RevisionId) -> StoreResult<u64> {
        Ok(tx.delete::<Revision>(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::TableBlobStore;
    use crate::page::TablePageRegistry;
    use crate::traits::{BlobStore, PageRegistry};
    use scloud_pool::{Database, Pool, PoolConfig};
    use scloud_types::{GroupId, UserId};

    fn pool() -> Pool {
        let config = PoolConfig {
            max_size: 1,
            min_idle: 0,
            connection_timeout_ms: 100,
            ..Default::default()
        };
        Pool::new(Database::in_memory(), config).unwrap()
    }

    fn append(
        tx: &mut Transaction<'_>,
        page_id: PageId,
        parent: Option<RevisionId>,
        content: &[u8],
    ) -> RevisionId {
        let blob_id = TableBlobStore.put(tx, content).unwrap();
        TableRevisionLog
            .append(
                tx,
                NewRevision {
                    page_id,
                    committed_by: UserId::new(1),
                    parent_revision_id: parent,
                    commit_message: "msg",
                    blob_id,
                },
            )
            .unwrap()
    }

    #[test]
    fn append_and_get() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let mut tx = conn.begin();
        let page = TablePageRegistry.create(&mut tx, GroupId::new(1), "a.txt").unwrap();
        let root = append(&mut tx, page, None, b"v1");
        let child = append(&mut tx, page, Some(root), b"v2");

        let log = TableRevisionLog::new();
        assert!(log.get(&tx, root).unwrap().is_root());
        assert_eq!(log.get(&tx, child).unwrap().parent_revision_id, Some(root));
        assert_eq!(log.get(&tx, child).unwrap().commit_message, "msg");
    }

    #[test]
    fn list_by_page_filters_and_orders() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let mut tx = conn.begin();
        let a = TablePageRegistry.create(&mut tx, GroupId::new(1), "a").unwrap();
        let b = TablePageRegistry.create(&mut tx, GroupId::new(1), "b").unwrap();
        let a1 = append(&mut tx, a, None, b"a1");
        append(&mut tx, b, None, b"b1");
        let a2 = append(&mut tx, a, Some(a1), b"a2");

        let ids: Vec<RevisionId> = TableRevisionLog
            .list_by_page(&tx, a)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![a1, a2]);
        assert!(TableRevisionLog
            .list_by_page(&tx, PageId::new(404))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn missing_revision_is_not_found() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let tx = conn.begin();
        assert!(TableRevisionLog
            .get(&tx, RevisionId::new(5))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn delete_reports_affected_rows() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let mut tx = conn.begin();
        let page = TablePageRegistry.create(&mut tx, GroupId::new(1), "a").unwrap();
        let rev = append(&mut tx, page, None, b"x");
        assert_eq!(TableRevisionLog.delete(&mut tx, rev).unwrap(), 1);
        assert_eq!(TableRevisionLog.delete(&mut tx, rev).unwrap(), 0);
    }
}
