//! In-memory record store with fault injection
//!
//! Used by tests and the simulator. Collections are insertion-ordered so
//! listings are deterministic.

use crate::error::StoreError;
use crate::record::{ListFilter, Record};
use crate::store::RecordStore;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;

/// Store operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `create_many`
    Create,
    /// `list_many`
    List,
    /// `delete_many`
    Delete,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            StoreOp::Create => "create_many",
            StoreOp::List => "list_many",
            StoreOp::Delete => "delete_many",
        }
    }
}

/// One journaled call against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    /// Operation kind
    pub op: StoreOp,
    /// Target collection
    pub collection: String,
    /// Record ids carried by the call (empty for listings)
    pub ids: Vec<String>,
    /// Whether the call succeeded
    pub ok: bool,
}

/// Which calls should fail
///
/// Call numbers are 1-based and counted per operation across all
/// collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Fail exactly this `create_many` call
    pub fail_create_on: Option<usize>,
    /// Fail every `create_many` call from this one onwards
    pub fail_creates_from: Option<usize>,
    /// Fail exactly this `delete_many` call
    pub fail_delete_on: Option<usize>,
    /// Fail every `delete_many` call
    pub fail_all_deletes: bool,
    /// Fail every `list_many` call
    pub fail_all_lists: bool,
}

impl FaultPlan {
    /// No injected failures
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Fail the n-th `create_many` call
    #[inline]
    #[must_use]
    pub fn fail_create_on(mut self, call: usize) -> Self {
        self.fail_create_on = Some(call);
        self
    }

    /// Fail every `create_many` call starting at the n-th
    #[inline]
    #[must_use]
    pub fn fail_creates_from(mut self, call: usize) -> Self {
        self.fail_creates_from = Some(call);
        self
    }

    /// Fail the n-th `delete_many` call
    #[inline]
    #[must_use]
    pub fn fail_delete_on(mut self, call: usize) -> Self {
        self.fail_delete_on = Some(call);
        self
    }

    /// Fail all deletes
    #[inline]
    #[must_use]
    pub fn fail_all_deletes(mut self) -> Self {
        self.fail_all_deletes = true;
        self
    }

    /// Fail all listings
    #[inline]
    #[must_use]
    pub fn fail_all_lists(mut self) -> Self {
        self.fail_all_lists = true;
        self
    }

    fn should_fail(&self, op: StoreOp, call: usize) -> bool {
        match op {
            StoreOp::Create => {
                self.fail_create_on == Some(call)
                    || self.fail_creates_from.is_some_and(|from| call >= from)
            }
            StoreOp::Delete => self.fail_all_deletes || self.fail_delete_on == Some(call),
            StoreOp::List => self.fail_all_lists,
        }
    }
}

#[derive(Debug, Default)]
struct CallCounts {
    create: usize,
    list: usize,
    delete: usize,
}

impl CallCounts {
    fn bump(&mut self, op: StoreOp) -> usize {
        let slot = match op {
            StoreOp::Create => &mut self.create,
            StoreOp::List => &mut self.list,
            StoreOp::Delete => &mut self.delete,
        };
        *slot += 1;
        *slot
    }
}

/// Record store backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    collections: DashMap<String, IndexMap<String, Record>>,
    faults: Mutex<FaultPlan>,
    counts: Mutex<CallCounts>,
    journal: Mutex<Vec<StoreCall>>,
    latency: Option<Duration>,
}

impl InMemoryRecordStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store that sleeps before every call
    #[inline]
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Replace the fault plan and reset call counters
    pub fn set_faults(&self, plan: FaultPlan) {
        *self.faults.lock() = plan;
        *self.counts.lock() = CallCounts::default();
    }

    /// Insert records directly, bypassing faults and the journal
    pub fn seed(&self, collection: &str, records: impl IntoIterator<Item = Record>) {
        let mut rows = self.collections.entry(collection.to_string()).or_default();
        for record in records {
            rows.insert(record.id.clone(), record);
        }
    }

    /// Number of records in a collection
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |rows| rows.len())
    }

    /// Whether a record id is present
    #[must_use]
    pub fn contains(&self, collection: &str, id: &str) -> bool {
        self.collections
            .get(collection)
            .is_some_and(|rows| rows.contains_key(id))
    }

    /// Snapshot of the call journal
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.journal.lock().clone()
    }

    /// Journaled calls of one kind
    #[must_use]
    pub fn calls_for(&self, op: StoreOp) -> Vec<StoreCall> {
        self.journal
            .lock()
            .iter()
            .filter(|call| call.op == op)
            .cloned()
            .collect()
    }

    /// Sizes of successful `create_many` calls against a collection, in order
    #[must_use]
    pub fn create_call_sizes(&self, collection: &str) -> Vec<usize> {
        self.journal
            .lock()
            .iter()
            .filter(|call| call.op == StoreOp::Create && call.ok && call.collection == collection)
            .map(|call| call.ids.len())
            .collect()
    }

    /// Clear the call journal
    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }

    async fn enter(&self, op: StoreOp, collection: &str, ids: &[String]) -> Result<(), StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let call = self.counts.lock().bump(op);
        if self.faults.lock().should_fail(op, call) {
            tracing::debug!("Injecting failure on {} call #{} ({})", op.name(), call, collection);
            self.record(op, collection, ids.to_vec(), false);
            return Err(StoreError::Injected {
                operation: op.name().to_string(),
                call,
            });
        }
        Ok(())
    }

    fn record(&self, op: StoreOp, collection: &str, ids: Vec<String>, ok: bool) {
        self.journal.lock().push(StoreCall {
            op,
            collection: collection.to_string(),
            ids,
            ok,
        });
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_many(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        self.enter(StoreOp::Create, collection, &ids).await?;

        let mut rows = self.collections.entry(collection.to_string()).or_default();

        // All-or-nothing: validate the whole call before inserting anything
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if rows.contains_key(&record.id) || !seen.insert(record.id.as_str()) {
                drop(rows);
                self.record(StoreOp::Create, collection, ids, false);
                return Err(StoreError::Conflict {
                    collection: collection.to_string(),
                    id: record.id.clone(),
                });
            }
        }

        for record in &records {
            rows.insert(record.id.clone(), record.clone());
        }
        drop(rows);

        self.record(StoreOp::Create, collection, ids, true);
        Ok(records)
    }

    async fn list_many(
        &self,
        collection: &str,
        filter: &ListFilter,
    ) -> Result<Vec<Record>, StoreError> {
        self.enter(StoreOp::List, collection, &[]).await?;

        let found = self
            .collections
            .get(collection)
            .map(|rows| {
                rows.values()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        self.record(StoreOp::List, collection, Vec::new(), true);
        Ok(found)
    }

    async fn delete_many(&self, collection: &str, ids: &[String]) -> Result<usize, StoreError> {
        self.enter(StoreOp::Delete, collection, ids).await?;

        let removed = match self.collections.get_mut(collection) {
            Some(mut rows) => ids
                .iter()
                .filter(|id| rows.shift_remove(id.as_str()).is_some())
                .count(),
            None => 0,
        };

        self.record(StoreOp::Delete, collection, ids.to_vec(), true);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rec(id: &str) -> Record {
        Record::new(id, json!({ "graph_id": "g1" }))
    }

    #[tokio::test]
    async fn create_list_delete_roundtrip() {
        let store = InMemoryRecordStore::new();
        store
            .create_many("c", vec![rec("a"), rec("b"), rec("c")])
            .await
            .unwrap();
        assert_eq!(store.count("c"), 3);

        let listed = store.list_many("c", &ListFilter::All).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let removed = store
            .delete_many("c", &["a".to_string(), "zz".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!store.contains("c", "a"));
        assert!(store.contains("c", "b"));
    }

    #[tokio::test]
    async fn create_conflict_is_all_or_nothing() {
        let store = InMemoryRecordStore::new();
        store.create_many("c", vec![rec("a")]).await.unwrap();

        let err = store
            .create_many("c", vec![rec("b"), rec("a")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref id, .. } if id == "a"));
        assert!(!store.contains("c", "b"));
        assert_eq!(store.count("c"), 1);
    }

    #[tokio::test]
    async fn duplicate_ids_within_call_conflict() {
        let store = InMemoryRecordStore::new();
        let err = store
            .create_many("c", vec![rec("a"), rec("a")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.count("c"), 0);
    }

    #[tokio::test]
    async fn fault_plan_fails_nth_create() {
        let store = InMemoryRecordStore::new();
        store.set_faults(FaultPlan::none().fail_create_on(2));

        assert!(store.create_many("c", vec![rec("a")]).await.is_ok());
        let err = store.create_many("c", vec![rec("b")]).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Injected {
                operation: "create_many".to_string(),
                call: 2
            }
        );
        assert!(store.create_many("c", vec![rec("c")]).await.is_ok());
        assert_eq!(store.count("c"), 2);
    }

    #[tokio::test]
    async fn fault_plan_fails_deletes_and_lists() {
        let store = InMemoryRecordStore::new();
        store.seed("c", vec![rec("a")]);
        store.set_faults(FaultPlan::none().fail_all_deletes().fail_all_lists());

        assert!(store.delete_many("c", &["a".to_string()]).await.is_err());
        assert!(store.list_many("c", &ListFilter::All).await.is_err());
        assert!(store.contains("c", "a"));
    }

    #[tokio::test]
    async fn journal_records_attempts_in_order() {
        let store = InMemoryRecordStore::new();
        store.set_faults(FaultPlan::none().fail_delete_on(1));

        store.create_many("c", vec![rec("a"), rec("b")]).await.unwrap();
        let _ = store.delete_many("c", &["a".to_string()]).await;
        store.delete_many("c", &["b".to_string()]).await.unwrap();

        let calls = store.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].op, StoreOp::Create);
        assert!(calls[0].ok);
        assert_eq!(calls[1].op, StoreOp::Delete);
        assert!(!calls[1].ok);
        assert_eq!(calls[2].ids, vec!["b".to_string()]);
        assert_eq!(store.create_call_sizes("c"), vec![2]);
    }

    #[tokio::test]
    async fn seed_bypasses_faults_and_journal() {
        let store = InMemoryRecordStore::new();
        store.set_faults(FaultPlan::none().fail_creates_from(1));
        store.seed("c", vec![rec("a"), rec("b")]);

        assert_eq!(store.count("c"), 2);
        assert!(store.calls().is_empty());
    }
}
