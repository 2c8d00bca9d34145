//! Error types for KGC Core
//!
//! Provides error handling for:
//! - Unknown clone ids on commit/reject/edit
//! - Store failures during duplication (after rollback)
//! - Fatal rollback failures
//! - Stale clone reuse
//! - Edits that would break the clone's referential closure
//! - Lifecycle and configuration errors

use crate::ids::{CloneId, GraphId};
use crate::model::CloneStatus;
use kgc_store::StoreError;

/// Main clone service error type
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    /// No active clone with this id
    #[error("clone not found: {0}")]
    NotFound(CloneId),

    /// A store call failed; any partial writes were rolled back
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// A rollback action failed; persisted rows may be orphaned
    #[error("fatal rollback failure: {0}")]
    RollbackFailed(TransactionError),

    /// Transaction misuse
    #[error("transaction error: {0}")]
    Transaction(TransactionError),

    /// Active clone exceeded its TTL and the stale policy forbids reuse
    #[error("clone {clone_id} for graph {graph_id} is stale")]
    StaleClone {
        /// Stale clone
        clone_id: CloneId,
        /// Its parent graph
        graph_id: GraphId,
    },

    /// Illegal status change
    #[error("invalid clone transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: CloneStatus,
        /// Requested status
        to: CloneStatus,
    },

    /// Edit attempted on a clone that no longer holds its graph slot
    #[error("clone {clone_id} is {status}, not active")]
    NotActive {
        /// Clone that was edited
        clone_id: CloneId,
        /// Its current status
        status: CloneStatus,
    },

    /// Original id not present in the clone
    #[error("{kind} {original_id} not found in clone {clone_id}")]
    RowNotFound {
        /// Owning clone
        clone_id: CloneId,
        /// `entity` or `edge`
        kind: &'static str,
        /// Original id that was looked up
        original_id: String,
    },

    /// Original id already present in the clone
    #[error("{kind} {original_id} already exists in clone {clone_id}")]
    DuplicateRow {
        /// Owning clone
        clone_id: CloneId,
        /// `entity` or `edge`
        kind: &'static str,
        /// Original id that was added
        original_id: String,
    },

    /// New edge points at an entity the clone does not have
    #[error("edge {edge_id} in clone {clone_id} references missing entity {endpoint}")]
    DanglingEdge {
        /// Owning clone
        clone_id: CloneId,
        /// Original id of the rejected edge
        edge_id: String,
        /// Original id of the missing endpoint
        endpoint: String,
    },

    /// JSON encoding failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CloneError {
    /// Rollback failures leave the store in an unknown state
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RollbackFailed(_))
    }

    /// Check if the caller may retry the same call
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(e) if e.is_retryable())
    }

    /// Check for `NotFound`
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<TransactionError> for CloneError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::StepFailed { source, .. } => Self::Persistence(source),
            e @ TransactionError::RollbackFailed { .. } => Self::RollbackFailed(e),
            e @ TransactionError::NotBegun => Self::Transaction(e),
        }
    }
}

/// Clone transaction errors
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// `commit` or `rollback` without `begin`
    #[error("transaction not begun")]
    NotBegun,

    /// A forward operation failed
    #[error("step {step} ({operation}) failed: {source}")]
    StepFailed {
        /// 1-based step number
        step: usize,
        /// Forward operation description
        operation: String,
        /// Store failure
        source: StoreError,
    },

    /// A rollback action failed
    #[error("rollback of step {step} ({action}) failed: {source}")]
    RollbackFailed {
        /// 1-based step number of the action that failed
        step: usize,
        /// Rollback action description
        action: String,
        /// Store failure
        source: StoreError,
        /// Forward failure that triggered the rollback, if any
        original: Option<Box<TransactionError>>,
    },
}

impl TransactionError {
    /// Forward failure that triggered a failed rollback
    #[must_use]
    pub fn original(&self) -> Option<&TransactionError> {
        match self {
            Self::RollbackFailed { original, .. } => original.as_deref(),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML did not parse
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML encoding failed
    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}
