//! Error types for record store calls

/// Errors raised by a [`crate::RecordStore`] implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend unreachable or refused the call
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record with this id already exists in the collection
    #[error("record {id} already exists in {collection}")]
    Conflict {
        /// Collection name
        collection: String,
        /// Conflicting record id
        id: String,
    },

    /// Failure injected by a test store
    #[error("injected failure on {operation} call #{call}")]
    Injected {
        /// Operation name (`create_many`, `delete_many`, `list_many`)
        operation: String,
        /// 1-based call number for that operation
        call: usize,
    },

    /// Call exceeded its deadline
    #[error("store call timed out after {duration_ms}ms")]
    Timeout {
        /// Elapsed time
        duration_ms: u64,
    },

    /// Payload could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Check if the failure is transient
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::Conflict {
            collection: "cloned_entities".to_string(),
            id: "e1".to_string(),
        };
        assert_eq!(err.to_string(), "record e1 already exists in cloned_entities");
    }

    #[test]
    fn store_error_is_retryable() {
        assert!(StoreError::Unavailable("down".to_string()).is_retryable());
        assert!(StoreError::Timeout { duration_ms: 500 }.is_retryable());
        assert!(!StoreError::Serialization("bad".to_string()).is_retryable());
        assert!(!StoreError::Injected {
            operation: "create_many".to_string(),
            call: 1
        }
        .is_retryable());
    }
}
