use chrono::Utc;
use tracing::debug;

use scloud_crypto::ContentHasher;
use scloud_pool::Transaction;
use scloud_types::{Blob, BlobId};

use crate::error::{StoreError, StoreResult};
use crate::traits::BlobStore;

/// [`BlobStore`] over the engine's `file_data` relation.
#[derive(Clone, Copy, Debug, Default)]
pub struct TableBlobStore;

impl TableBlobStore {
    pub fn new() -> Self {
        Self
    }
}

impl BlobStore for TableBlobStore {
    fn put(&self, tx: &mut Transaction<'_>, content: &[u8]) -> StoreResult<BlobId> {
        let id = tx.next_id::<Blob>();
        let checksum = ContentHasher::checksum(content);
        let blob = Blob {
            id,
            content: content.to_vec(),
            checksum,
            created_at: Utc::now(),
        };
        if tx.insert(blob) == 0 {
            return Err(StoreError::StorageFault(format!(
                "inserting file_data {id} failed, no rows affected"
            )));
        }
        debug!(blob = %id, size = content.len(), checksum = %checksum.short_hex(), "blob stored");
        Ok(id)
    }

    fn fetch(&self, tx: &Transaction<'_>, id: BlobId) -> StoreResult<Blob> {
        tx.get::<Blob>(id)
            .ok_or_else(|| StoreError::not_found("blob", id))
    }

    fn delete(&self, tx: &mut Transaction<'_>, id: BlobId) -> StoreResult<u64> {
        Ok(tx.delete::<Blob>(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use scloud_pool::{Database, Pool, PoolConfig};

    fn pool() -> Pool {
        let config = PoolConfig {
            max_size: 2,
            min_idle: 0,
            connection_timeout_ms: 100,
            ..Default::default()
        };
        Pool::new(Database::in_memory(), config).unwrap()
    }

    #[test]
    fn put_then_get() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let mut tx = conn.begin();
        let store = TableBlobStore::new();
        let id = store.put(&mut tx, b"hello").unwrap();
        assert_eq!(store.get(&tx, id).unwrap(), b"hello");
        tx.commit().unwrap();

        let tx = conn.begin();
        let blob = store.fetch(&tx, id).unwrap();
        assert_eq!(
            blob.checksum.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn identical_content_gets_distinct_blobs() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let mut tx = conn.begin();
        let store = TableBlobStore::new();
        let a = store.put(&mut tx, b"same").unwrap();
        let b = store.put(&mut tx, b"same").unwrap();
        assert_ne!(a, b);
        assert_eq!(
            store.fetch(&tx, a).unwrap().checksum,
            store.fetch(&tx, b).unwrap().checksum
        );
    }

    #[test]
    fn missing_blob_is_not_found() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let tx = conn.begin();
        let err = TableBlobStore::new().get(&tx, BlobId::new(77)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn delete_is_idempotent() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let mut tx = conn.begin();
        let store = TableBlobStore::new();
        let id = store.put(&mut tx, b"x").unwrap();
        assert_eq!(store.delete(&mut tx, id).unwrap(), 1);
        assert_eq!(store.delete(&mut tx, id).unwrap(), 0);
        assert_eq!(store.delete(&mut tx, BlobId::new(999)).unwrap(), 0);
    }

    #[test]
    fn verify_detects_matching_checksum() {
        let pool = pool();
        let mut conn = pool.acquire().unwrap();
        let mut tx = conn.begin();
        let store = TableBlobStore::new();
        let id = store.put(&mut tx, b"audit me").unwrap();
        assert!(store.verify(&tx, id).unwrap());
    }

    proptest! {
        #[test]
        fn roundtrip_arbitrary_bytes(content in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let pool = pool();
            let mut conn = pool.acquire().unwrap();
            let store = TableBlobStore::new();
            let mut tx = conn.begin();
            let id = store.put(&mut tx, &content).unwrap();
            tx.commit().unwrap();
            let tx = conn.begin();
            prop_assert_eq!(store.get(&tx, id).unwrap(), content);
        }
    }
}
