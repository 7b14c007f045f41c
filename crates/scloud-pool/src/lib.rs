//! Storage engine and connection pool for Sharing Cloud.
//!
//! The engine holds three related relations, mirroring the layout the
//! revision store expects:
//!
//! - `file_data` -- blob content and checksum ([`scloud_types::Blob`])
//! - `file_revisions` -- parent-linked revision records ([`scloud_types::Revision`])
//! - `pages` -- page metadata and latest-revision pointer ([`scloud_types::Page`])
//!
//! Access goes through a size-bounded [`Pool`] of connections. Each
//! connection runs one [`Transaction`] at a time; writes are buffered in the
//! transaction and only become visible when [`Transaction::commit`] succeeds.
//!
//! # Design Rules
//!
//! 1. Identifiers come from per-relation sequences and are never reused.
//! 2. Foreign keys are checked at commit against the merged state.
//! 3. A failed commit leaves committed state untouched.
//! 4. A transaction dropped without commit is rolled back.
//! 5. A pooled connection is returned to the pool when its guard drops.
//! 6. Concurrent writers to the same row: the last commit wins.

pub mod config;
pub mod database;
pub mod error;
pub mod pool;
pub mod table;
pub mod transaction;

pub use config::PoolConfig;
pub use database::{Database, TableCounts};
pub use error::{PoolError, PoolResult};
pub use pool::{Connection, Pool, PoolStatus, PooledConnection};
pub use table::Row;
pub use transaction::{Transaction, TransactionState};
