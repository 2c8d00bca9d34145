//! KGC Core - transactional graph clones
//!
//! Before a caller modifies a knowledge graph it asks the service for a
//! clone. The clone is an isolated copy of the graph's entities and edges,
//! persisted under one clone id, that collects modifications until it is
//! committed or rejected:
//! - at most one active clone per graph; later callers reuse it
//! - duplication is all-or-nothing: a failed write rolls back every batch
//!   already written, in reverse order
//! - clones go stale after a TTL and are replaced, refused, or reaped
//! - rejecting a clone deletes its persisted rows
//!
//! # Example
//!
//! ```rust,ignore
//! use kgc_core::prelude::*;
//! use kgc_store::InMemoryRecordStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), CloneError> {
//! let store = Arc::new(InMemoryRecordStore::new());
//! let service = GraphCloneService::new(CloneConfig::new(), store)?;
//!
//! let graph = GraphId::from("graph-1");
//! let clone = service
//!     .clone_before_modify(&graph, Operation::add_episode("Ada joined Acme", "text"))
//!     .await?;
//! service.commit_clone(clone.id()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod clock;
pub mod clone;
pub mod config;
pub mod duplicator;
pub mod error;
pub mod ids;
pub mod model;
pub mod operation;
pub mod registry;
pub mod service;
pub mod source;
pub mod state_machine;
pub mod transaction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use clone::{CloneDiff, CloneSummary, GraphClone, RowChange};
pub use config::{
    CloneConfig, Collections, StalePolicy, DEFAULT_BATCH_SIZE, DEFAULT_TTL_SECONDS,
    DEFAULT_WRITE_CHUNK_SIZE,
};
pub use duplicator::{Duplication, DuplicationReport, EntityEdgeDuplicator};
pub use error::{CloneError, ConfigError, TransactionError};
pub use ids::{CloneId, GraphId, TxnToken};
pub use model::{
    Attributes, CloneSize, CloneStatus, ClonedEdge, ClonedEntity, Modification, SourceEdge,
    SourceEntity,
};
pub use operation::{Operation, OperationKind};
pub use registry::CloneRegistry;
pub use service::{CleanupReport, GraphCloneService, RejectOutcome, ServiceStats};
pub use source::{GraphSource, RecordStoreGraphSource};
pub use transaction::{
    CloneTransaction, ForwardOp, RollbackAction, TransactionReceipt, TransactionState,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with KGC Core
    pub use crate::{
        CloneConfig, CloneError, CloneId, CloneStatus, GraphClone, GraphCloneService, GraphId,
        Operation, OperationKind, StalePolicy,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
