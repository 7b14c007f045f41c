//! Relations, staged write sets, and the [`Row`] trait tying them together.

use std::collections::BTreeMap;
use std::fmt;

use scloud_types::{Blob, BlobId, Page, PageId, Revision, RevisionId};

mod sealed {
    pub trait Sealed {}
    impl Sealed for scloud_types::Blob {}
    impl Sealed for scloud_types::Revision {}
    impl Sealed for scloud_types::Page {}
}

/// A record type stored in one of the engine's relations.
///
/// Implemented for [`Blob`], [`Revision`] and [`Page`] only. The trait lets
/// [`Transaction`](crate::Transaction) expose one generic set of row
/// operations over all three relations.
pub trait Row: sealed::Sealed + Clone + Send + Sync + 'static {
    /// Primary key type. Values are allocated from the relation's sequence.
    type Key: Copy + Ord + fmt::Debug + fmt::Display + From<i64> + Send + Sync + 'static;

    /// Relation name, used in logs and constraint errors.
    const TABLE: &'static str;

    fn key(&self) -> Self::Key;

    #[doc(hidden)]
    fn table(tables: &Tables) -> &Table<Self>;
    #[doc(hidden)]
    fn table_mut(tables: &mut Tables) -> &mut Table<Self>;
    #[doc(hidden)]
    fn overlay(writes: &WriteSet) -> &Overlay<Self>;
    #[doc(hidden)]
    fn overlay_mut(writes: &mut WriteSet) -> &mut Overlay<Self>;
}

impl Row for Blob {
    type Key = BlobId;
    const TABLE: &'static str = "file_data";

    fn key(&self) -> BlobId {
        self.id
    }
    fn table(tables: &Tables) -> &Table<Self> {
        &tables.blobs
    }
    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.blobs
    }
    fn overlay(writes: &WriteSet) -> &Overlay<Self> {
        &writes.blobs
    }
    fn overlay_mut(writes: &mut WriteSet) -> &mut Overlay<Self> {
        &mut writes.blobs
    }
}

impl Row for Revision {
    type Key = RevisionId;
    const TABLE: &'static str = "file_revisions";

    fn key(&self) -> RevisionId {
        self.id
    }
    fn table(tables: &Tables) -> &Table<Self> {
        &tables.revisions
    }
    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.revisions
    }
    fn overlay(writes: &WriteSet) -> &Overlay<Self> {
        &writes.revisions
    }
    fn overlay_mut(writes: &mut WriteSet) -> &mut Overlay<Self> {
        &mut writes.revisions
    }
}

impl Row for Page {
    type Key = PageId;
    const TABLE: &'static str = "pages";

    fn key(&self) -> PageId {
        self.id
    }
    fn table(tables: &Tables) -> &Table<Self> {
        &tables.pages
    }
    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.pages
    }
    fn overlay(writes: &WriteSet) -> &Overlay<Self> {
        &writes.pages
    }
    fn overlay_mut(writes: &mut WriteSet) -> &mut Overlay<Self> {
        &mut writes.pages
    }
}

/// Committed rows of one relation plus its id sequence.
pub struct Table<R: Row> {
    pub(crate) rows: BTreeMap<R::Key, R>,
    /// Last identifier handed out; the next one is `last_id + 1`.
    pub(crate) last_id: i64,
}

impl<R: Row> Table<R> {
    pub(crate) fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }

    pub(crate) fn from_rows(rows: Vec<R>, last_id: i64) -> Self {
        let rows: BTreeMap<R::Key, R> = rows.into_iter().map(|r| (r.key(), r)).collect();
        Self { rows, last_id }
    }

    pub(crate) fn allocate(&mut self) -> R::Key {
        self.last_id += 1;
        R::Key::from(self.last_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }
}

/// The committed state of the engine.
pub struct Tables {
    pub(crate) blobs: Table<Blob>,
    pub(crate) revisions: Table<Revision>,
    pub(crate) pages: Table<Page>,
}

impl Tables {
    pub(crate) fn empty() -> Self {
        Self {
            blobs: Table::new(),
            revisions: Table::new(),
            pages: Table::new(),
        }
    }
}

/// A buffered change to one row.
#[derive(Clone, Debug)]
pub(crate) enum Staged<R> {
    /// Row created by this transaction.
    Inserted(R),
    /// Committed row replaced by this transaction.
    Updated(R),
    /// Committed row removed by this transaction.
    Deleted,
}

impl<R> Staged<R> {
    pub(crate) fn row(&self) -> Option<&R> {
        match self {
            Staged::Inserted(r) | Staged::Updated(r) => Some(r),
            Staged::Deleted => None,
        }
    }
}

/// Staged changes to one relation, keyed by primary key.
pub struct Overlay<R: Row> {
    pub(crate) entries: BTreeMap<R::Key, Staged<R>>,
}

impl<R: Row> Overlay<R> {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn get(&self, key: &R::Key) -> Option<&Staged<R>> {
        self.entries.get(key)
    }

    pub(crate) fn contains(&self, key: &R::Key) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&R::Key, &Staged<R>)> {
        self.entries.iter()
    }
}

/// All changes staged by one transaction.
pub struct WriteSet {
    pub(crate) blobs: Overlay<Blob>,
    pub(crate) revisions: Overlay<Revision>,
    pub(crate) pages: Overlay<Page>,
}

impl WriteSet {
    pub(crate) fn new() -> Self {
        Self {
            blobs: Overlay::new(),
            revisions: Overlay::new(),
            pages: Overlay::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.blobs.is_empty() && self.revisions.is_empty() && self.pages.is_empty()
    }

    /// Number of staged row changes across all relations.
    pub(crate) fn len(&self) -> usize {
        self.blobs.len() + self.revisions.len() + self.pages.len()
    }

    pub(crate) fn clear(&mut self) {
        self.blobs.entries.clear();
        self.revisions.entries.clear();
        self.pages.entries.clear();
    }
}

/// Read view of committed rows with a write set laid over them.
pub(crate) struct Merged<'a> {
    pub(crate) tables: &'a Tables,
    pub(crate) writes: &'a WriteSet,
}

impl<'a> Merged<'a> {
    pub(crate) fn new(tables: &'a Tables, writes: &'a WriteSet) -> Self {
        Self { tables, writes }
    }

    pub(crate) fn get<R: Row>(&self, key: &R::Key) -> Option<&'a R> {
        match R::overlay(self.writes).get(key) {
            Some(staged) => staged.row(),
            None => R::table(self.tables).rows.get(key),
        }
    }

    /// Every visible row of a relation, committed rows first.
    pub(crate) fn rows<R: Row>(&self) -> impl Iterator<Item = &'a R> + 'a {
        let overlay = R::overlay(self.writes);
        let committed = R::table(self.tables)
            .rows
            .iter()
            .filter(move |(k, _)| !overlay.contains(k))
            .map(|(_, r)| r);
        let staged = overlay.entries.values().filter_map(Staged::row);
        committed.chain(staged)
    }
}
