//! Revision store for Sharing Cloud.
//!
//! Composes the blob store, revision log, and page registry into three
//! all-or-nothing operations, each running in one transaction on one pooled
//! connection:
//!
//! - [`RevisionStore::create_page`] -- page row, first blob, root revision,
//!   latest pointer
//! - [`RevisionStore::append_revision`] -- blob, child revision, pointer advance
//! - [`RevisionStore::delete_page`] -- every revision and blob of the page,
//!   then the page row
//!
//! Any failure before commit rolls back every write of the operation, and
//! the connection goes back to the pool on every exit path.
//!
//! # Latest pointer
//!
//! A page tracks a single tip. Appending always moves the tip to the new
//! revision, even when its parent is an older revision. Two concurrent
//! appends to one page both succeed and the later commit owns the tip.

pub mod config;
pub mod error;
pub mod history;
pub mod store;

pub use config::RevisionStoreConfig;
pub use error::{RevisionError, RevisionResult};
pub use history::{DeleteReport, HistoryEntry, VerifyReport};
pub use store::RevisionStore;
