/// Errors from the storage engine and the connection pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No connection became free within the acquisition timeout.
    #[error("connection pool exhausted: no connection available after {waited_ms} ms")]
    Exhausted { waited_ms: u64 },

    /// The pool has been closed and hands out no more connections.
    #[error("connection pool is closed")]
    Unavailable,

    /// The pool configuration is inconsistent.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// Committing would break a relation between rows.
    #[error("constraint violation on {table}: {reason}")]
    ConstraintViolation { table: &'static str, reason: String },

    /// Snapshot file could not be encoded or decoded.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// I/O error from the snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for pool and engine operations.
pub type PoolResult<T> = Result<T, PoolError>;
