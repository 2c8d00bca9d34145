//! KGC Store - bulk record store seam
//!
//! The clone service never talks to a database directly. Everything it
//! persists goes through the [`RecordStore`] trait, a bulk document store
//! with three calls:
//! - `create_many` inserts a batch of records into a collection
//! - `list_many` reads records back, optionally filtered
//! - `delete_many` removes records by id
//!
//! [`InMemoryRecordStore`] implements the trait for tests and the simulator.
//! It can inject failures on a chosen call and keeps a journal of every call
//! so callers can assert on ordering.
//!
//! # Example
//!
//! ```rust,ignore
//! use kgc_store::{InMemoryRecordStore, ListFilter, Record, RecordStore};
//!
//! # async fn example() -> Result<(), kgc_store::StoreError> {
//! let store = InMemoryRecordStore::new();
//! store
//!     .create_many("entities", vec![Record::new("e1", serde_json::json!({"graph_id": "g1"}))])
//!     .await?;
//! let rows = store.list_many("entities", &ListFilter::All).await?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod error;
mod memory;
mod record;
mod store;

pub use error::StoreError;
pub use memory::{FaultPlan, InMemoryRecordStore, StoreCall, StoreOp};
pub use record::{ListFilter, Record};
pub use store::RecordStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
