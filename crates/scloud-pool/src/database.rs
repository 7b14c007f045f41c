use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use scloud_types::{Blob, BlobId, Page, PageId, Revision, RevisionId};

use crate::error::{PoolError, PoolResult};
use crate::table::{Merged, Row, Staged, Table, Tables, WriteSet};

/// Row counts of the three relations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub blobs: usize,
    pub revisions: usize,
    pub pages: usize,
}

/// Shared handle to the storage engine.
///
/// Cloning is cheap; all clones see the same committed state. A database is
/// either purely in memory or backed by a snapshot file that is rewritten
/// atomically after every commit that changed something.
///
/// The snapshot is a full image, blob content included, so a file-backed
/// commit costs time proportional to the whole database. Commits run one at
/// a time. Readers are only blocked while the write set is applied, not
/// while the snapshot is encoded and synced.
#[derive(Clone)]
pub struct Database {
    engine: Arc<Engine>,
}

struct Engine {
    tables: RwLock<Tables>,
    /// Held for the whole of a commit; only commits mutate rows.
    commit_lock: Mutex<()>,
    path: Option<PathBuf>,
}

/// On-disk image of the engine, written with bincode.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    blobs: Vec<&'a Blob>,
    revisions: Vec<&'a Revision>,
    pages: Vec<&'a Page>,
    last_ids: [i64; 3],
}

#[derive(Deserialize)]
struct Snapshot {
    blobs: Vec<Blob>,
    revisions: Vec<Revision>,
    pages: Vec<Page>,
    last_ids: [i64; 3],
}

impl Database {
    /// Create an empty database that lives only in memory.
    pub fn in_memory() -> Self {
        Self::from_parts(Tables::empty(), None)
    }

    /// Open a snapshot-backed database, loading the file if it exists.
    ///
    /// Every later commit rewrites the entire file, so this suits databases
    /// that fit comfortably in memory.
    pub fn open(path: impl AsRef<Path>) -> PoolResult<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let bytes = fs::read(&path)?;
            let snapshot: Snapshot = bincode::deserialize(&bytes)
                .map_err(|e| PoolError::Persistence(format!("{}: {e}", path.display())))?;
            let [blobs, revisions, pages] = snapshot.last_ids;
            let tables = Tables {
                blobs: Table::from_rows(snapshot.blobs, blobs),
                revisions: Table::from_rows(snapshot.revisions, revisions),
                pages: Table::from_rows(snapshot.pages, pages),
            };
            info!(
                path = %path.display(),
                pages = tables.pages.len(),
                revisions = tables.revisions.len(),
                blobs = tables.blobs.len(),
                "database snapshot loaded"
            );
            tables
        } else {
            info!(path = %path.display(), "creating new database");
            Tables::empty()
        };
        Ok(Self::from_parts(tables, Some(path)))
    }

    fn from_parts(tables: Tables, path: Option<PathBuf>) -> Self {
        Self {
            engine: Arc::new(Engine {
                tables: RwLock::new(tables),
                commit_lock: Mutex::new(()),
                path,
            }),
        }
    }

    /// Snapshot file backing this database, if any.
    pub fn path(&self) -> Option<&Path> {
        self.engine.path.as_deref()
    }

    /// Current committed row counts.
    pub fn counts(&self) -> TableCounts {
        let tables = self.engine.tables.read().expect("lock poisoned");
        TableCounts {
            blobs: tables.blobs.len(),
            revisions: tables.revisions.len(),
            pages: tables.pages.len(),
        }
    }

    pub(crate) fn read<R: Row>(&self, key: &R::Key) -> Option<R> {
        let tables = self.engine.tables.read().expect("lock poisoned");
        R::table(&tables).rows.get(key).cloned()
    }

    pub(crate) fn scan<R: Row>(&self, pred: impl Fn(&R) -> bool) -> Vec<R> {
        let tables = self.engine.tables.read().expect("lock poisoned");
        R::table(&tables)
            .rows
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect()
    }

    /// Take the next identifier from a relation's sequence.
    ///
    /// Sequences advance outside of transactions, so an identifier handed to
    /// a transaction that later rolls back is never reused.
    pub(crate) fn allocate<R: Row>(&self) -> R::Key {
        let mut tables = self.engine.tables.write().expect("lock poisoned");
        R::table_mut(&mut tables).allocate()
    }

    /// Validate and apply a write set atomically.
    ///
    /// Validation and the snapshot write happen under a read lock. Rows can
    /// not change before the write lock is taken because the commit lock
    /// keeps other commits out; only sequences may advance meanwhile.
    pub(crate) fn commit(&self, writes: &WriteSet) -> PoolResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let _serial = self.engine.commit_lock.lock().expect("lock poisoned");
        {
            let tables = self.engine.tables.read().expect("lock poisoned");
            check_constraints(&tables, writes)?;
            if let Some(path) = &self.engine.path {
                persist(path, &Merged::new(&tables, writes), &tables)?;
            }
        }
        let mut tables = self.engine.tables.write().expect("lock poisoned");
        apply(&mut tables.blobs, &writes.blobs);
        apply(&mut tables.revisions, &writes.revisions);
        apply(&mut tables.pages, &writes.pages);
        debug!(changes = writes.len(), "write set applied");
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.engine.path)
            .field("counts", &self.counts())
            .finish()
    }
}

fn apply<R: Row>(table: &mut Table<R>, overlay: &crate::table::Overlay<R>) {
    for (key, staged) in overlay.iter() {
        match staged {
            Staged::Inserted(row) | Staged::Updated(row) => {
                table.rows.insert(*key, row.clone());
            }
            Staged::Deleted => {
                table.rows.remove(key);
            }
        }
    }
}

fn violation<R: Row>(reason: String) -> PoolError {
    PoolError::ConstraintViolation {
        table: R::TABLE,
        reason,
    }
}

/// Check foreign keys and update targets on the state the commit would produce.
fn check_constraints(tables: &Tables, writes: &WriteSet) -> PoolResult<()> {
    let merged = Merged::new(tables, writes);

    check_updates_target_live_rows(tables, &writes.blobs)?;
    check_updates_target_live_rows(tables, &writes.revisions)?;
    check_updates_target_live_rows(tables, &writes.pages)?;

    for (_, staged) in writes.revisions.iter() {
        let Some(rev) = staged.row() else { continue };
        if merged.get::<Page>(&rev.page_id).is_none() {
            return Err(violation::<Revision>(format!(
                "revision {} references missing page {}",
                rev.id, rev.page_id
            )));
        }
        if merged.get::<Blob>(&rev.blob_id).is_none() {
            return Err(violation::<Revision>(format!(
                "revision {} references missing blob {}",
                rev.id, rev.blob_id
            )));
        }
        if let Some(parent_id) = rev.parent_revision_id {
            match merged.get::<Revision>(&parent_id) {
                None => {
                    return Err(violation::<Revision>(format!(
                        "revision {} references missing parent {parent_id}",
                        rev.id
                    )))
                }
                Some(parent) if parent.page_id != rev.page_id => {
                    return Err(violation::<Revision>(format!(
                        "revision {} has parent {parent_id} from page {}",
                        rev.id, parent.page_id
                    )))
                }
                Some(_) => {}
            }
        }
    }

    for (_, staged) in writes.pages.iter() {
        let Some(page) = staged.row() else { continue };
        if let Some(latest) = page.latest_revision_id {
            match merged.get::<Revision>(&latest) {
                Some(rev) if rev.page_id == page.id => {}
                Some(rev) => {
                    return Err(violation::<Page>(format!(
                        "page {} points at revision {latest} of page {}",
                        page.id, rev.page_id
                    )))
                }
                None => {
                    return Err(violation::<Page>(format!(
                        "page {} points at missing revision {latest}",
                        page.id
                    )))
                }
            }
        }
    }

    let deleted_pages: BTreeSet<PageId> = deleted_keys(&writes.pages);
    let deleted_blobs: BTreeSet<BlobId> = deleted_keys(&writes.blobs);
    let deleted_revisions: BTreeSet<RevisionId> = deleted_keys(&writes.revisions);

    if !deleted_pages.is_empty() || !deleted_blobs.is_empty() || !deleted_revisions.is_empty() {
        for rev in merged.rows::<Revision>() {
            if deleted_pages.contains(&rev.page_id) {
                return Err(violation::<Page>(format!(
                    "page {} is still referenced by revision {}",
                    rev.page_id, rev.id
                )));
            }
            if deleted_blobs.contains(&rev.blob_id) {
                return Err(violation::<Blob>(format!(
                    "blob {} is still referenced by revision {}",
                    rev.blob_id, rev.id
                )));
            }
            if let Some(parent) = rev.parent_revision_id {
                if deleted_revisions.contains(&parent) {
                    return Err(violation::<Revision>(format!(
                        "revision {parent} is still the parent of revision {}",
                        rev.id
                    )));
                }
            }
        }
    }

    if !deleted_revisions.is_empty() {
        for page in merged.rows::<Page>() {
            if let Some(latest) = page.latest_revision_id {
                if deleted_revisions.contains(&latest) {
                    return Err(violation::<Revision>(format!(
                        "revision {latest} is still the latest revision of page {}",
                        page.id
                    )));
                }
            }
        }
    }

    Ok(())
}

/// A staged update or delete whose row vanished under a concurrent commit
/// must not resurrect it.
fn check_updates_target_live_rows<R: Row>(
    tables: &Tables,
    overlay: &crate::table::Overlay<R>,
) -> PoolResult<()> {
    for (key, staged) in overlay.iter() {
        if matches!(staged, Staged::Updated(_)) && !R::table(tables).rows.contains_key(key) {
            return Err(violation::<R>(format!(
                "row {key} was deleted by a concurrent transaction"
            )));
        }
    }
    Ok(())
}

fn deleted_keys<R: Row>(overlay: &crate::table::Overlay<R>) -> BTreeSet<R::Key> {
    overlay
        .iter()
        .filter(|(_, staged)| matches!(staged, Staged::Deleted))
        .map(|(key, _)| *key)
        .collect()
}

/// Write the post-commit image next to the target and rename it into place.
fn persist(path: &Path, merged: &Merged<'_>, tables: &Tables) -> PoolResult<()> {
    let snapshot = SnapshotRef {
        blobs: merged.rows::<Blob>().collect(),
        revisions: merged.rows::<Revision>().collect(),
        pages: merged.rows::<Page>().collect(),
        last_ids: [
            tables.blobs.last_id,
            tables.revisions.last_id,
            tables.pages.last_id,
        ],
    };
    let bytes =
        bincode::serialize(&snapshot).map_err(|e| PoolError::Persistence(e.to_string()))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PoolError::Io(e.error))?;
    debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
    Ok(())
}
