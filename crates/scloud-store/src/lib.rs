//! Table managers for Sharing Cloud.
//!
//! Three independent components, each owning one relation of the storage
//! engine. None of them knows about the others; composing them into atomic
//! page operations is the job of `scloud-revision`.
//!
//! - [`BlobStore`] -- raw file content keyed by an opaque [`BlobId`](scloud_types::BlobId)
//! - [`RevisionLog`] -- immutable, parent-linked revision records
//! - [`PageRegistry`] -- page metadata and the latest-revision pointer
//!
//! Every operation runs inside a caller-supplied
//! [`Transaction`](scloud_pool::Transaction), so several calls can be grouped
//! into one unit of work.
//!
//! # Implementations
//!
//! - [`TableBlobStore`], [`TableRevisionLog`], [`TablePageRegistry`] -- backed
//!   by the engine's `file_data`, `file_revisions` and `pages` relations

pub mod blob;
pub mod error;
pub mod page;
pub mod revision;
pub mod traits;

pub use blob::TableBlobStore;
pub use error::{StoreError, StoreResult};
pub use page::TablePageRegistry;
pub use revision::TableRevisionLog;
pub use traits::{BlobStore, NewRevision, PageRegistry, RevisionLog};
