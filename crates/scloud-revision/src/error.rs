use scloud_pool::PoolError;
use scloud_store::StoreError;
use thiserror::Error;

/// Errors surfaced to callers of the revision store.
#[derive(Debug, Error)]
pub enum RevisionError {
    /// A write affected no rows, no identifier came back, or the engine
    /// refused the commit. The operation was rolled back.
    #[error("storage fault: {0}")]
    StorageFault(String),

    /// Lookup of an identifier that does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// No pooled connection became free in time.
    #[error("connection pool exhausted after {waited_ms} ms")]
    PoolExhausted { waited_ms: u64 },

    /// Storage cannot be reached at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The request was rejected before anything was written.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl RevisionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<PoolError> for RevisionError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted { waited_ms } => Self::PoolExhausted { waited_ms },
            PoolError::Unavailable => Self::Unavailable("connection pool is closed".into()),
            PoolError::InvalidConfig(reason) => Self::Unavailable(reason),
            other @ (PoolError::ConstraintViolation { .. }
            | PoolError::Persistence(_)
            | PoolError::Io(_)) => Self::StorageFault(other.to_string()),
        }
    }
}

impl From<StoreError> for RevisionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StorageFault(reason) => Self::StorageFault(reason),
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
        }
    }
}

/// Result alias for revision store operations.
pub type RevisionResult<T> = Result<T, RevisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_map_onto_caller_taxonomy() {
        assert!(matches!(
            RevisionError::from(PoolError::Exhausted { waited_ms: 5 }),
            RevisionError::PoolExhausted { waited_ms: 5 }
        ));
        assert!(matches!(
            RevisionError::from(PoolError::Unavailable),
            RevisionError::Unavailable(_)
        ));
        assert!(matches!(
            RevisionError::from(PoolError::ConstraintViolation {
                table: "pages",
                reason: "x".into()
            }),
            RevisionError::StorageFault(_)
        ));
    }

    #[test]
    fn store_errors_keep_their_kind() {
        let err = RevisionError::from(StoreError::not_found("page", 3));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "page 3 not found");
        assert!(matches!(
            RevisionError::from(StoreError::StorageFault("no rows".into())),
            RevisionError::StorageFault(reason) if reason == "no rows"
        ));
    }
}
