use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::database::Database;
use crate::error::PoolResult;
use crate::table::{Row, Staged, WriteSet};

/// Lifecycle of a [`Transaction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting reads and writes.
    Active,
    /// Write set applied to the database.
    Committed,
    /// Write set discarded.
    RolledBack,
}

/// A unit of work on one connection.
///
/// Writes are staged in the transaction and are invisible to every other
/// transaction until [`commit`](Self::commit) succeeds. Reads see this
/// transaction's own staged writes first, then committed data.
///
/// Row operations return affected-row counts the way SQL statements do:
/// inserting an existing key, or updating/deleting a missing one, affects
/// zero rows and is not an error at this layer.
///
/// Dropping an active transaction rolls it back.
pub struct Transaction<'c> {
    id: u64,
    database: &'c Database,
    writes: WriteSet,
    state: TransactionState,
}

impl<'c> Transaction<'c> {
    pub(crate) fn begin(id: u64, database: &'c Database) -> Self {
        debug!(tx = id, "transaction started");
        Self {
            id,
            database,
            writes: WriteSet::new(),
            state: TransactionState::Active,
        }
    }

    /// Transaction identifier, unique per pool.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of staged row changes.
    pub fn pending_changes(&self) -> usize {
        self.writes.len()
    }

    /// Allocate a fresh primary key for a relation.
    pub fn next_id<R: Row>(&self) -> R::Key {
        self.database.allocate::<R>()
    }

    /// Point lookup by primary key.
    pub fn get<R: Row>(&self, key: R::Key) -> Option<R> {
        match R::overlay(&self.writes).get(&key) {
            Some(staged) => staged.row().cloned(),
            None => self.database.read::<R>(&key),
        }
    }

    /// All visible rows matching `pred`, in primary-key order.
    pub fn scan<R: Row>(&self, pred: impl Fn(&R) -> bool) -> Vec<R> {
        let overlay = R::overlay(&self.writes);
        let mut rows: BTreeMap<R::Key, R> = self
            .database
            .scan::<R>(|r| !overlay.contains(&r.key()) && pred(r))
            .into_iter()
            .map(|r| (r.key(), r))
            .collect();
        for (key, staged) in overlay.iter() {
            if let Some(row) = staged.row() {
                if pred(row) {
                    rows.insert(*key, row.clone());
                }
            }
        }
        rows.into_values().collect()
    }

    /// Stage a new row. Returns 0 if the key is already taken.
    pub fn insert<R: Row>(&mut self, row: R) -> u64 {
        let key = row.key();
        if self.get::<R>(key).is_some() {
            return 0;
        }
        let overlay = R::overlay_mut(&mut self.writes);
        // A key deleted earlier in this transaction comes back as an update.
        let staged = match overlay.entries.get(&key) {
            Some(Staged::Deleted) => Staged::Updated(row),
            _ => Staged::Inserted(row),
        };
        overlay.entries.insert(key, staged);
        debug!(tx = self.id, table = R::TABLE, %key, "row inserted");
        1
    }

    /// Modify a visible row in place. Returns 0 if the row does not exist.
    pub fn update<R: Row>(&mut self, key: R::Key, f: impl FnOnce(&mut R)) -> u64 {
        let Some(mut row) = self.get::<R>(key) else {
            return 0;
        };
        f(&mut row);
        let overlay = R::overlay_mut(&mut self.writes);
        let staged = match overlay.entries.get(&key) {
            Some(Staged::Inserted(_)) => Staged::Inserted(row),
            _ => Staged::Updated(row),
        };
        overlay.entries.insert(key, staged);
        debug!(tx = self.id, table = R::TABLE, %key, "row updated");
        1
    }

    /// Remove a visible row. Returns 0 if the row does not exist.
    pub fn delete<R: Row>(&mut self, key: R::Key) -> u64 {
        if self.get::<R>(key).is_none() {
            return 0;
        }
        let overlay = R::overlay_mut(&mut self.writes);
        match overlay.entries.get(&key) {
            // Never committed: forgetting it is enough.
            Some(Staged::Inserted(_)) => {
                overlay.entries.remove(&key);
            }
            _ => {
                overlay.entries.insert(key, Staged::Deleted);
            }
        }
        debug!(tx = self.id, table = R::TABLE, %key, "row deleted");
        1
    }

    /// Apply all staged writes atomically.
    ///
    /// On error nothing is applied and the transaction ends rolled back.
    pub fn commit(mut self) -> PoolResult<()> {
        let changes = self.writes.len();
        match self.database.commit(&self.writes) {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!(tx = self.id, changes, "transaction committed");
                Ok(())
            }
            Err(e) => {
                self.writes.clear();
                self.state = TransactionState::RolledBack;
                debug!(tx = self.id, changes, error = %e, "commit failed; rolled back");
                Err(e)
            }
        }
    }

    /// Discard all staged writes.
    pub fn rollback(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        let changes = self.writes.len();
        self.writes.clear();
        self.state = TransactionState::RolledBack;
        debug!(tx = self.id, changes, "transaction rolled back");
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            if !self.writes.is_empty() {
                warn!(
                    tx = self.id,
                    changes = self.writes.len(),
                    "transaction dropped without commit; rolling back"
                );
            }
            self.discard();
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending_changes", &self.writes.len())
            .finish()
    }
}
