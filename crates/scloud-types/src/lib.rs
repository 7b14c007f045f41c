//! Foundation types for Sharing Cloud.
//!
//! Every other `scloud-*` crate depends on `scloud-types`. It defines the
//! identifiers handed out by the storage engine and the three record shapes
//! persisted by the revision store.
//!
//! # Key Types
//!
//! - [`PageId`], [`RevisionId`], [`BlobId`] -- engine-allocated row identifiers
//! - [`GroupId`], [`UserId`] -- identifiers owned by external collaborators
//! - [`Page`] -- group-scoped document with a pointer to its latest revision
//! - [`Revision`] -- immutable snapshot metadata with an optional parent link
//! - [`Blob`] -- raw file content plus its SHA-256 [`Checksum`]

pub mod checksum;
pub mod error;
pub mod id;
pub mod record;

pub use checksum::Checksum;
pub use error::TypeError;
pub use id::{BlobId, GroupId, PageId, RevisionId, UserId};
pub use record::{Blob, Page, Revision};
