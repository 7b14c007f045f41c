use thiserror::Error;

/// Errors from the table managers.
///
/// Engine failures such as constraint violations surface at commit, as a
/// `PoolError` from `Transaction::commit`, and never through this type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write affected no rows or produced no identifier. Always aborts the
    /// enclosing unit of work.
    #[error("storage fault: {0}")]
    StorageFault(String),

    /// Point lookup on an identifier that does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias for table manager operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_entity_and_id() {
        let err = StoreError::not_found("revision", scloud_types::RevisionId::new(4));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "revision 4 not found");
    }

    #[test]
    fn storage_fault_is_not_a_miss() {
        let err = StoreError::StorageFault("no rows affected".into());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "storage fault: no rows affected");
    }
}
