//! The record store trait

use crate::error::StoreError;
use crate::record::{ListFilter, Record};

/// Bulk document store
///
/// Every call is a suspension point. Implementations must be safe to share
/// across tasks.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Insert records into `collection`
    ///
    /// Either every record in the call is stored or none is.
    ///
    /// # Errors
    /// - `StoreError::Conflict` if an id already exists
    /// - any backend failure
    async fn create_many(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError>;

    /// Read records from `collection`
    ///
    /// # Errors
    /// Returns error on backend failure
    async fn list_many(
        &self,
        collection: &str,
        filter: &ListFilter,
    ) -> Result<Vec<Record>, StoreError>;

    /// Delete records by id, returning how many existed
    ///
    /// Deleting an id that is not present is not an error.
    ///
    /// # Errors
    /// Returns error on backend failure
    async fn delete_many(&self, collection: &str, ids: &[String]) -> Result<usize, StoreError>;
}
