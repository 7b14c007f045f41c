use chrono::Utc;
use tracing::debug;

use scloud_pool::Transaction;
use scloud_types::{GroupId, Page, PageId, RevisionId};

use crate::error::{StoreError, StoreResult};
use crate::traits::PageRegistry;

/// [`PageRegistry`] over the engine's `pages` relation.
#[derive(Clone, Copy, Debug, Default)]
pub struct TablePageRegistry;

impl TablePageRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl PageRegistry for TablePageRegistry {
    fn create(
        &self,
        tx: &mut Transaction<'_>,
        group_id: GroupId,
        name: &str,
    ) -> StoreResult<PageId> {
        let id = tx.next_id::<Page>();
        let page = Page {
            id,
            group_id,
            name: name.to_string(),
            created_at: Utc::now(),
            latest_revision_id: None,
        };
        if tx.insert(page) == 0 {
            return Err(StoreError::StorageFault(format!(
                "inserting page {id} failed, no rows affected"
            )));
        }
        debug!(page = %id, group = %group_id, name, "page row inserted");
        Ok(id)
    }

    fn get(&self, tx: &Transaction<'_>, id: PageId) -> StoreResult<Page> {
        tx.get::<Page>(id).ok_or_else(|| StoreError::not_found("page", id))
    }

    fn set_latest_revision(
        &self,
        tx: &mut Transaction<'_>,
        page_id: PageId,
        revision_id: RevisionId,
    ) -> StoreResult<()> {
        let affected = tx.update::<Page>(page_id, |page| {
            page.latest_revision_id = Some(revision_id);
        });
        if affected == 0 {
            return Err(StoreError::StorageFault(format!(
                "updating latest revision failed, page {page_id} not found"
            )));
        }
        debug!(page = %page_id, revision = %revision_id, "latest revision moved");
        Ok(())
    }

    fn latest_revision(&self, tx: &Transaction<'_>, page_id: PageId) -> StoreResult<RevisionId> {
        let page = self.get(tx, page_id)?;
        page.latest_revision_id.ok_or_else(|| {
            StoreError::StorageFault(format!("page {page_id} has no latest revision"))
        })
    }

    fn list_by_group(&self, tx: &Transaction<'_>, group_id: GroupId) -> StoreResult<Vec<Page>> {
        Ok(tx.scan::<Page>(|p| p.group_id == group_id))
    }

    fn delete(&self, tx: &mut Transaction<'_>, id: PageId) -> StoreResult<u64> {
        Ok(tx.delete::<Page>(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scloud_pool::{Database, Pool, PoolConfig};

    fn pool() -> Pool {
        let config = PoolConfig {
            max_size: 1,
            min_idle: 0,
            connection_timeout_ms: 100,
            ..Default::default()
        };
        Pool::new(Database::in_memory(), config).unwrap()
    }

    #[test]
    fn create_starts_without_pointer() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let mut tx = conn.begin();
        let registry = TablePageRegistry::new();
        let id = registry.create(&mut tx, GroupId::new(3), "a.txt").unwrap();
        let page = registry.get(&tx, id).unwrap();
        assert_eq!(page.name, "a.txt");
        assert_eq!(page.group_id, GroupId::new(3));
        assert!(!page.has_revision());
        assert!(matches!(
            registry.latest_revision(&tx, id),
            Err(StoreError::StorageFault(_))
        ));
    }

    #[test]
    fn set_latest_on_missing_page_faults() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let mut tx = conn.begin();
        let err = TablePageRegistry
            .set_latest_revision(&mut tx, PageId::new(9), RevisionId::new(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::StorageFault(_)));
    }

    #[test]
    fn latest_on_missing_page_is_not_found() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let tx = conn.begin();
        assert!(TablePageRegistry
            .latest_revision(&tx, PageId::new(9))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn list_by_group_only_returns_that_group() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let mut tx = conn.begin();
        let registry = TablePageRegistry::new();
        let a = registry.create(&mut tx, GroupId::new(1), "a").unwrap();
        registry.create(&mut tx, GroupId::new(2), "b").unwrap();
        let c = registry.create(&mut tx, GroupId::new(1), "c").unwrap();
        let ids: Vec<PageId> = registry
            .list_by_group(&tx, GroupId::new(1))
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn delete_reports_affected_rows() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let mut tx = conn.begin();
        let id = TablePageRegistry.create(&mut tx, GroupId::new(1), "a").unwrap();
        assert_eq!(TablePageRegistry.delete(&mut tx, id).unwrap(), 1);
        assert_eq!(TablePageRegistry.delete(&mut tx, id).unwrap(), 0);
    }
}
