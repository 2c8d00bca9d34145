//! Clone lifecycle service
//!
//! [`GraphCloneService`] is the entry point callers use before modifying a
//! graph. It guarantees at most one active clone per graph, creates clones
//! through the duplicator, and finalizes them on commit or reject.
//!
//! # Concurrency
//!
//! Every operation on a graph's clone runs under that graph's slot lock
//! (see [`CloneRegistry`]). Check-then-create in `clone_before_modify` is one
//! critical section, so concurrent callers on the same graph get the same
//! clone. Statistics sit behind a `parking_lot` mutex that is never held
//! across an await.

use crate::clock::{Clock, SystemClock};
use crate::clone::{CloneDiff, CloneSummary, GraphClone};
use crate::config::{CloneConfig, StalePolicy};
use crate::duplicator::EntityEdgeDuplicator;
use crate::error::CloneError;
use crate::ids::{CloneId, GraphId};
use crate::model::{
    CloneStatus, ClonedEdge, ClonedEntity, Modification, SourceEdge, SourceEntity,
};
use crate::operation::Operation;
use crate::registry::{CloneRegistry, CloneSlot};
use crate::source::{GraphSource, RecordStoreGraphSource};
use kgc_store::RecordStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Lifecycle counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Clones created
    pub created: usize,
    /// `clone_before_modify` calls served by an existing clone
    pub reused: usize,
    /// Clones committed
    pub committed: usize,
    /// Clones rejected by callers
    pub rejected: usize,
    /// Stale clones replaced on the reuse path
    pub replaced: usize,
    /// Stale clones removed by `reap_stale`
    pub reaped: usize,
    /// Duplications that failed and were rolled back
    pub duplication_failures: usize,
    /// Duplications whose rollback failed
    pub rollback_failures: usize,
    /// Row deletions that failed during cleanup
    pub cleanup_failures: usize,
}

/// Result of deleting a clone's persisted rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Entity rows removed
    pub deleted_entities: usize,
    /// Edge rows removed
    pub deleted_edges: usize,
    /// Store failures, one message per failed collection
    pub failures: Vec<String>,
}

impl CleanupReport {
    /// Every delete succeeded
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A rejected clone and what happened to its rows
#[derive(Debug, Clone, PartialEq)]
pub struct RejectOutcome {
    /// The clone, now `Rejected`
    pub clone: GraphClone,
    /// Row cleanup result
    pub cleanup: CleanupReport,
}

/// Transactional clone-before-modify service
#[derive(Debug)]
pub struct GraphCloneService {
    config: CloneConfig,
    source: Arc<dyn GraphSource>,
    clock: Arc<dyn Clock>,
    registry: CloneRegistry,
    duplicator: EntityEdgeDuplicator,
    stats: Mutex<ServiceStats>,
}

impl GraphCloneService {
    /// Create service over `store`
    ///
    /// Parent graphs are read from the configured source collections and
    /// time comes from the system clock; see [`Self::with_source`] and
    /// [`Self::with_clock`].
    ///
    /// # Errors
    /// `CloneError::Config` if the configuration is invalid
    pub fn new(config: CloneConfig, store: Arc<dyn RecordStore>) -> Result<Self, CloneError> {
        config.validate()?;
        let source = Arc::new(RecordStoreGraphSource::new(store.clone(), &config.collections));
        let duplicator = EntityEdgeDuplicator::new(store, &config);

        Ok(Self {
            config,
            source,
            clock: Arc::new(SystemClock),
            registry: CloneRegistry::new(),
            duplicator,
            stats: Mutex::new(ServiceStats::default()),
        })
    }

    /// Read parent graphs from `source`
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn GraphSource>) -> Self {
        self.source = source;
        self
    }

    /// Use `clock` for creation times and staleness
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CloneConfig {
        &self.config
    }

    /// Return the graph's active clone, creating it if needed
    ///
    /// A fresh active clone is reused and `op` appended to its journal.
    /// A stale one is handled per [`StalePolicy`]. Otherwise the graph is
    /// duplicated, the new clone becomes active and `op` is its first
    /// journal entry.
    ///
    /// # Errors
    /// - `CloneError::StaleClone` under `StalePolicy::Error`
    /// - `CloneError::Persistence` if duplication failed (rows rolled back)
    /// - `CloneError::RollbackFailed` if rolling back failed too
    pub async fn clone_before_modify(
        &self,
        graph_id: &GraphId,
        op: Operation,
    ) -> Result<GraphClone, CloneError> {
        let slot = self.registry.slot(graph_id);
        let mut guard = slot.lock().await;

        if let Some(existing) = guard.as_mut() {
            if !existing.is_stale(self.clock.as_ref()) {
                existing.register_operation(op);
                self.stats.lock().reused += 1;
                tracing::debug!(
                    graph = %graph_id,
                    clone = %existing.id(),
                    operations = existing.operations().len(),
                    "Reusing active clone"
                );
                return Ok(existing.clone());
            }

            match self.config.stale_policy {
                StalePolicy::Error => {
                    return Err(CloneError::StaleClone {
                        clone_id: existing.id().clone(),
                        graph_id: graph_id.clone(),
                    });
                }
                StalePolicy::Replace => {
                    existing.transition(CloneStatus::Rejected)?;
                    if let Some(stale) = guard.take() {
                        tracing::info!(
                            graph = %graph_id,
                            clone = %stale.id(),
                            "Replacing stale clone"
                        );
                        self.discard(stale).await;
                        self.stats.lock().replaced += 1;
                    }
                }
            }
        }

        let mut clone = match self.create_clone(graph_id).await {
            Ok(clone) => clone,
            Err(err) => {
                drop(guard);
                drop(slot);
                self.registry.prune(graph_id);
                return Err(err);
            }
        };
        clone.register_operation(op);
        self.registry.index(clone.id().clone(), graph_id.clone());
        *guard = Some(clone.clone());
        Ok(clone)
    }

    async fn create_clone(&self, graph_id: &GraphId) -> Result<GraphClone, CloneError> {
        let duplication = match self
            .duplicator
            .duplicate_graph(self.source.as_ref(), graph_id)
            .await
        {
            Ok(duplication) => duplication,
            Err(err) => {
                let mut stats = self.stats.lock();
                stats.duplication_failures += 1;
                if err.is_fatal() {
                    stats.rollback_failures += 1;
                    tracing::error!(
                        fatal = true,
                        graph = %graph_id,
                        "Clone rollback failed: {}",
                        err
                    );
                } else {
                    tracing::warn!(graph = %graph_id, "Clone creation failed: {}", err);
                }
                return Err(err);
            }
        };

        let mut clone = GraphClone::from_duplication(
            graph_id.clone(),
            duplication,
            self.clock.now(),
            self.config.ttl_seconds,
        );
        clone.transition(CloneStatus::Active)?;
        self.stats.lock().created += 1;

        tracing::info!(
            graph = %graph_id,
            clone = %clone.id(),
            entities = clone.size().entity_count,
            edges = clone.size().edge_count,
            bytes = clone.size().byte_size,
            "Created clone"
        );
        Ok(clone)
    }

    /// The graph's active clone, stale or not
    pub async fn get_active_clone(&self, graph_id: &GraphId) -> Option<GraphClone> {
        let slot = self.registry.existing_slot(graph_id)?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Mark a clone committed and free its graph
    ///
    /// Committing does not merge anything into the parent graph.
    ///
    /// # Errors
    /// `CloneError::NotFound` if no active clone has this id
    pub async fn commit_clone(&self, clone_id: &CloneId) -> Result<GraphClone, CloneError> {
        let (graph_id, slot) = self.locate(clone_id)?;
        let mut guard = slot.lock().await;

        let clone = active_in(&mut guard, clone_id)?;
        clone.transition(CloneStatus::Committed)?;
        let committed = guard
            .take()
            .ok_or_else(|| CloneError::NotFound(clone_id.clone()))?;
        self.registry.unindex(clone_id);
        self.stats.lock().committed += 1;
        drop(guard);
        drop(slot);
        self.registry.prune(&graph_id);

        tracing::info!(
            graph = %graph_id,
            clone = %clone_id,
            operations = committed.operations().len(),
            "Committed clone"
        );
        Ok(committed)
    }

    /// Mark a clone rejected, delete its rows, then free its graph
    ///
    /// Row deletion is best effort: failures are logged and reported in
    /// the outcome, never returned.
    ///
    /// # Errors
    /// `CloneError::NotFound` if no active clone has this id
    pub async fn reject_clone(&self, clone_id: &CloneId) -> Result<RejectOutcome, CloneError> {
        let (graph_id, slot) = self.locate(clone_id)?;
        let mut guard = slot.lock().await;

        active_in(&mut guard, clone_id)?.transition(CloneStatus::Rejected)?;
        let rejected = guard
            .take()
            .ok_or_else(|| CloneError::NotFound(clone_id.clone()))?;
        let outcome = self.discard(rejected).await;
        self.stats.lock().rejected += 1;
        drop(guard);
        drop(slot);
        self.registry.prune(&graph_id);

        tracing::info!(
            graph = %graph_id,
            clone = %clone_id,
            deleted_entities = outcome.cleanup.deleted_entities,
            deleted_edges = outcome.cleanup.deleted_edges,
            "Rejected clone"
        );
        Ok(outcome)
    }

    /// Append an operation to an active clone's journal
    ///
    /// # Errors
    /// `CloneError::NotFound` if no active clone has this id
    pub async fn record_operation(
        &self,
        clone_id: &CloneId,
        op: Operation,
    ) -> Result<GraphClone, CloneError> {
        self.with_active(clone_id, |clone| {
            clone.register_operation(op);
            Ok(clone.clone())
        })
        .await
    }

    /// Edit an entity attribute in an active clone
    ///
    /// # Errors
    /// - `CloneError::NotFound` if no active clone has this id
    /// - `CloneError::RowNotFound` for an unknown entity
    pub async fn modify_entity(
        &self,
        clone_id: &CloneId,
        original_id: &str,
        field: &str,
        value: Value,
    ) -> Result<Modification, CloneError> {
        let now = self.clock.now();
        self.with_active(clone_id, |clone| clone.modify_entity(original_id, field, value, now))
            .await
    }

    /// Edit an edge property in an active clone
    ///
    /// # Errors
    /// - `CloneError::NotFound` if no active clone has this id
    /// - `CloneError::RowNotFound` for an unknown edge
    pub async fn modify_edge(
        &self,
        clone_id: &CloneId,
        original_id: &str,
        field: &str,
        value: Value,
    ) -> Result<Modification, CloneError> {
        let now = self.clock.now();
        self.with_active(clone_id, |clone| clone.modify_edge(original_id, field, value, now))
            .await
    }

    /// Add an entity to an active clone
    ///
    /// # Errors
    /// - `CloneError::NotFound` if no active clone has this id
    /// - `CloneError::DuplicateRow` if the clone already has the entity
    pub async fn add_entity(
        &self,
        clone_id: &CloneId,
        entity: SourceEntity,
    ) -> Result<ClonedEntity, CloneError> {
        let now = self.clock.now();
        self.with_active(clone_id, |clone| clone.add_entity(entity, now)).await
    }

    /// Add an edge between entities of an active clone
    ///
    /// # Errors
    /// - `CloneError::NotFound` if no active clone has this id
    /// - `CloneError::DuplicateRow` if the clone already has the edge
    /// - `CloneError::DanglingEdge` if an endpoint is not in the clone
    pub async fn add_edge(
        &self,
        clone_id: &CloneId,
        edge: SourceEdge,
    ) -> Result<ClonedEdge, CloneError> {
        let now = self.clock.now();
        self.with_active(clone_id, |clone| clone.add_edge(edge, now)).await
    }

    /// Delete an entity, and the edges touching it, from an active clone
    ///
    /// Returns the original ids of the cascaded edges.
    ///
    /// # Errors
    /// - `CloneError::NotFound` if no active clone has this id
    /// - `CloneError::RowNotFound` for an unknown entity
    pub async fn delete_entity(
        &self,
        clone_id: &CloneId,
        original_id: &str,
    ) -> Result<Vec<String>, CloneError> {
        let now = self.clock.now();
        self.with_active(clone_id, |clone| clone.delete_entity(original_id, now)).await
    }

    /// Delete an edge from an active clone
    ///
    /// # Errors
    /// - `CloneError::NotFound` if no active clone has this id
    /// - `CloneError::RowNotFound` for an unknown edge
    pub async fn delete_edge(
        &self,
        clone_id: &CloneId,
        original_id: &str,
    ) -> Result<ClonedEdge, CloneError> {
        let now = self.clock.now();
        self.with_active(clone_id, |clone| clone.delete_edge(original_id, now)).await
    }

    /// Compare an active clone with its parent
    ///
    /// # Errors
    /// `CloneError::NotFound` if no active clone has this id
    pub async fn diff(&self, clone_id: &CloneId) -> Result<CloneDiff, CloneError> {
        self.with_active(clone_id, |clone| Ok(clone.diff())).await
    }

    /// Every active clone, oldest first
    pub async fn active_clones(&self) -> Vec<CloneSummary> {
        let now = self.clock.now();
        let mut summaries = Vec::new();
        for graph_id in self.registry.graph_ids() {
            let Some(slot) = self.registry.existing_slot(&graph_id) else {
                continue;
            };
            let guard = slot.lock().await;
            if let Some(clone) = guard.as_ref() {
                summaries.push(clone.summary(now));
            }
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Reject every clone that is stale now
    ///
    /// Also prunes idle graph slots. Returns the ids of the removed clones.
    pub async fn reap_stale(&self) -> Vec<CloneId> {
        let mut reaped = Vec::new();
        for graph_id in self.registry.graph_ids() {
            let Some(slot) = self.registry.existing_slot(&graph_id) else {
                continue;
            };
            let mut guard = slot.lock().await;

            let Some(clone) = guard.as_mut() else {
                continue;
            };
            if !clone.is_stale(self.clock.as_ref()) {
                continue;
            }
            if let Err(err) = clone.transition(CloneStatus::Rejected) {
                tracing::warn!(graph = %graph_id, "Skipping stale clone: {}", err);
                continue;
            }
            if let Some(stale) = guard.take() {
                let id = stale.id().clone();
                self.discard(stale).await;
                tracing::info!(graph = %graph_id, clone = %id, "Reaped stale clone");
                reaped.push(id);
            }
        }

        if !reaped.is_empty() {
            self.stats.lock().reaped += reaped.len();
        }
        let pruned = self.registry.prune_idle();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned idle graph slots");
        }
        reaped
    }

    /// Run `reap_stale` every `interval` in the background
    ///
    /// The task ends once the service is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    tracing::debug!("Service dropped, stopping sweeper");
                    break;
                };
                let reaped = service.reap_stale().await;
                if !reaped.is_empty() {
                    tracing::debug!(count = reaped.len(), "Sweeper reaped stale clones");
                }
            }
        })
    }

    /// Start the sweeper if the configuration asks for one
    pub fn spawn_configured_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        self.config.sweep_interval().map(|every| self.spawn_sweeper(every))
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn stats(&self) -> ServiceStats {
        self.stats.lock().clone()
    }

    /// Graph and slot of an indexed clone
    fn locate(&self, clone_id: &CloneId) -> Result<(GraphId, CloneSlot), CloneError> {
        self.registry
            .locate(clone_id)
            .and_then(|graph_id| {
                let slot = self.registry.existing_slot(&graph_id)?;
                Some((graph_id, slot))
            })
            .ok_or_else(|| CloneError::NotFound(clone_id.clone()))
    }

    async fn with_active<R>(
        &self,
        clone_id: &CloneId,
        f: impl FnOnce(&mut GraphClone) -> Result<R, CloneError>,
    ) -> Result<R, CloneError> {
        let (_, slot) = self.locate(clone_id)?;
        let mut guard = slot.lock().await;
        f(active_in(&mut guard, clone_id)?)
    }

    /// Unindex a finalized clone and delete its rows, edges first
    ///
    /// Called with the slot lock held, so the slot frees only afterwards.
    async fn discard(&self, clone: GraphClone) -> RejectOutcome {
        self.registry.unindex(clone.id());

        let (edge_ids, entity_ids) = clone.persisted_ids();
        let writer = self.duplicator.writer();
        let collections = self.duplicator.collections();
        let mut cleanup = CleanupReport::default();

        match writer.delete_ids(&collections.cloned_edges, &edge_ids).await {
            Ok(n) => cleanup.deleted_edges = n,
            Err(err) => {
                tracing::warn!(clone = %clone.id(), "Failed to delete cloned edges: {}", err);
                cleanup.failures.push(format!("{}: {}", collections.cloned_edges, err));
            }
        }
        match writer.delete_ids(&collections.cloned_entities, &entity_ids).await {
            Ok(n) => cleanup.deleted_entities = n,
            Err(err) => {
                tracing::warn!(clone = %clone.id(), "Failed to delete cloned entities: {}", err);
                cleanup.failures.push(format!("{}: {}", collections.cloned_entities, err));
            }
        }

        if !cleanup.is_complete() {
            self.stats.lock().cleanup_failures += cleanup.failures.len();
        }
        RejectOutcome { clone, cleanup }
    }
}

fn active_in<'a>(
    slot: &'a mut Option<GraphClone>,
    clone_id: &CloneId,
) -> Result<&'a mut GraphClone, CloneError> {
    match slot.as_mut() {
        Some(clone) if clone.id() == clone_id => Ok(clone),
        _ => Err(CloneError::NotFound(clone_id.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::source::{edge_record, entity_record};
    use kgc_store::{FaultPlan, InMemoryRecordStore};
    use serde_json::json;

    fn setup(
        config: CloneConfig,
    ) -> (GraphCloneService, Arc<InMemoryRecordStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryRecordStore::new());
        let g = GraphId::from("g1");
        let ada = SourceEntity::new("e1", "Person").with_attribute("name", "Ada");
        store.seed(
            "entities",
            vec![
                entity_record(&g, &ada).unwrap(),
                entity_record(&g, &SourceEntity::new("e2", "Person")).unwrap(),
            ],
        );
        store.seed(
            "edges",
            vec![edge_record(&g, &SourceEdge::new("r1", "KNOWS", "e1", "e2")).unwrap()],
        );
        let clock = Arc::new(ManualClock::starting_now());
        let service = GraphCloneService::new(config, store.clone())
            .unwrap()
            .with_clock(clock.clone());
        (service, store, clock)
    }

    #[tokio::test]
    async fn create_then_reuse() {
        let (service, store, _) = setup(CloneConfig::default());
        let g = GraphId::from("g1");

        let first = service
            .clone_before_modify(&g, Operation::add_episode("a", "text"))
            .await
            .unwrap();
        let second = service
            .clone_before_modify(&g, Operation::add_episode("b", "text"))
            .await
            .unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(second.operations().len(), 2);
        assert_eq!(second.status(), CloneStatus::Active);
        assert_eq!(store.count("cloned_entities"), 2);
        assert_eq!(store.count("cloned_edges"), 1);

        let stats = service.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
    }

    #[tokio::test]
    async fn commit_frees_slot_and_keeps_rows() {
        let (service, store, _) = setup(CloneConfig::default());
        let g = GraphId::from("g1");
        let clone = service
            .clone_before_modify(&g, Operation::delete_edge("r1"))
            .await
            .unwrap();

        let committed = service.commit_clone(clone.id()).await.unwrap();
        assert_eq!(committed.status(), CloneStatus::Committed);
        assert!(service.get_active_clone(&g).await.is_none());
        assert_eq!(store.count("cloned_entities"), 2);

        let err = service.commit_clone(clone.id()).await.unwrap_err();
        assert!(matches!(err, CloneError::NotFound(ref id) if id == clone.id()));
    }

    #[tokio::test]
    async fn reject_deletes_rows_edges_first() {
        let (service, store, _) = setup(CloneConfig::default());
        let g = GraphId::from("g1");
        let clone = service
            .clone_before_modify(&g, Operation::delete_edge("r1"))
            .await
            .unwrap();
        store.clear_journal();

        let outcome = service.reject_clone(clone.id()).await.unwrap();
        assert_eq!(outcome.clone.status(), CloneStatus::Rejected);
        assert_eq!(outcome.cleanup.deleted_edges, 1);
        assert_eq!(outcome.cleanup.deleted_entities, 2);
        assert!(outcome.cleanup.is_complete());
        assert_eq!(store.count("cloned_entities"), 0);
        assert_eq!(store.count("cloned_edges"), 0);

        let collections: Vec<_> = store.calls().into_iter().map(|c| c.collection).collect();
        assert_eq!(collections, vec!["cloned_edges", "cloned_entities"]);
    }

    #[tokio::test]
    async fn reject_reports_cleanup_failures() {
        let (service, store, _) = setup(CloneConfig::default());
        let g = GraphId::from("g1");
        let clone = service
            .clone_before_modify(&g, Operation::delete_edge("r1"))
            .await
            .unwrap();
        store.set_faults(FaultPlan::none().fail_all_deletes());

        let outcome = service.reject_clone(clone.id()).await.unwrap();
        assert_eq!(outcome.cleanup.failures.len(), 2);
        assert!(service.get_active_clone(&g).await.is_none());
        assert_eq!(service.stats().cleanup_failures, 2);
    }

    #[tokio::test]
    async fn stale_clone_is_replaced_by_default() {
        let config = CloneConfig::default().with_ttl_seconds(60);
        let (service, store, clock) = setup(config);
        let g = GraphId::from("g1");

        let old = service
            .clone_before_modify(&g, Operation::add_episode("a", "text"))
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(61));
        let new = service
            .clone_before_modify(&g, Operation::add_episode("b", "text"))
            .await
            .unwrap();

        assert_ne!(old.id(), new.id());
        assert_eq!(new.operations().len(), 1);
        assert_eq!(store.count("cloned_entities"), 2);
        assert!(service.commit_clone(old.id()).await.unwrap_err().is_not_found());
        assert_eq!(service.stats().replaced, 1);
    }

    #[tokio::test]
    async fn stale_clone_errors_under_error_policy() {
        let config = CloneConfig::default()
            .with_ttl_seconds(60)
            .with_stale_policy(StalePolicy::Error);
        let (service, _, clock) = setup(config);
        let g = GraphId::from("g1");

        let old = service
            .clone_before_modify(&g, Operation::add_episode("a", "text"))
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(120));

        let err = service
            .clone_before_modify(&g, Operation::add_episode("b", "text"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloneError::StaleClone { ref clone_id, .. } if clone_id == old.id()));
        // Still active and still rejectable
        assert!(service.reject_clone(old.id()).await.is_ok());
    }

    #[tokio::test]
    async fn modify_and_diff() {
        let (service, _, _) = setup(CloneConfig::default());
        let g = GraphId::from("g1");
        let clone = service
            .clone_before_modify(&g, Operation::update_entity("e1", "name", json!("Grace")))
            .await
            .unwrap();

        let m = service
            .modify_entity(clone.id(), "e1", "name", json!("Grace"))
            .await
            .unwrap();
        assert_eq!(m.old_value, Some(json!("Ada")));
        service
            .modify_edge(clone.id(), "r1", "weight", json!(0.5))
            .await
            .unwrap();

        let diff = service.diff(clone.id()).await.unwrap();
        assert_eq!(diff.entities_modified.len(), 1);
        assert_eq!(diff.edges_modified.len(), 1);
        assert_eq!(diff.operation_count, 3);

        let err = service
            .modify_entity(clone.id(), "nope", "x", json!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CloneError::RowNotFound { .. }));
    }

    #[tokio::test]
    async fn structural_edits_and_cleanup() {
        let (service, store, _) = setup(CloneConfig::default());
        let g = GraphId::from("g1");
        let clone = service
            .clone_before_modify(&g, Operation::add_episode("a", "text"))
            .await
            .unwrap();

        service
            .add_entity(clone.id(), SourceEntity::new("e3", "Company"))
            .await
            .unwrap();
        service
            .add_edge(clone.id(), SourceEdge::new("r2", "WORKS_AT", "e1", "e3"))
            .await
            .unwrap();
        let err = service
            .add_edge(clone.id(), SourceEdge::new("r3", "WORKS_AT", "e1", "ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloneError::DanglingEdge { .. }));

        let cascaded = service.delete_entity(clone.id(), "e2").await.unwrap();
        assert_eq!(cascaded, vec!["r1".to_string()]);

        let diff = service.diff(clone.id()).await.unwrap();
        assert_eq!(diff.entities_added.len(), 1);
        assert_eq!(diff.edges_added.len(), 1);
        assert_eq!(diff.entities_removed, vec!["e2".to_string()]);
        assert_eq!(diff.edges_removed, vec!["r1".to_string()]);
        assert_eq!((diff.master_entity_count, diff.entity_count), (2, 2));

        // Deleted rows are still in the store until the clone is rejected
        assert_eq!(store.count("cloned_entities"), 2);
        let outcome = service.reject_clone(clone.id()).await.unwrap();
        assert_eq!(outcome.cleanup.deleted_entities, 2);
        assert_eq!(outcome.cleanup.deleted_edges, 1);
        assert_eq!(store.count("cloned_entities"), 0);
        assert_eq!(store.count("cloned_edges"), 0);
    }

    #[tokio::test]
    async fn finalized_graphs_release_their_slots() {
        let (service, store, _) = setup(CloneConfig::default());
        let g = GraphId::from("g1");

        let clone = service
            .clone_before_modify(&g, Operation::add_episode("a", "text"))
            .await
            .unwrap();
        assert_eq!(service.registry.graph_ids(), vec![g.clone()]);
        service.commit_clone(clone.id()).await.unwrap();
        assert!(service.registry.graph_ids().is_empty());

        let clone = service
            .clone_before_modify(&g, Operation::add_episode("b", "text"))
            .await
            .unwrap();
        service.reject_clone(clone.id()).await.unwrap();
        assert!(service.registry.graph_ids().is_empty());

        store.set_faults(FaultPlan::none().fail_creates_from(1));
        assert!(service
            .clone_before_modify(&g, Operation::add_episode("c", "text"))
            .await
            .is_err());
        assert!(service.registry.graph_ids().is_empty());
        assert!(service.get_active_clone(&GraphId::from("unknown")).await.is_none());
        assert!(service.registry.graph_ids().is_empty());
    }

    #[tokio::test]
    async fn record_operation_requires_active_clone() {
        let (service, _, _) = setup(CloneConfig::default());
        let err = service
            .record_operation(&CloneId::from_raw("clone_missing"), Operation::delete_edge("r1"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn reap_stale_removes_only_stale_clones() {
        let config = CloneConfig::default().with_ttl_seconds(60);
        let (service, store, clock) = setup(config);
        let g = GraphId::from("g1");
        let clone = service
            .clone_before_modify(&g, Operation::add_episode("a", "text"))
            .await
            .unwrap();

        assert!(service.reap_stale().await.is_empty());
        assert_eq!(service.active_clones().await.len(), 1);

        clock.advance(chrono::Duration::seconds(61));
        assert!(service.active_clones().await[0].stale);
        assert_eq!(service.reap_stale().await, vec![clone.id().clone()]);
        assert!(service.active_clones().await.is_empty());
        assert_eq!(store.count("cloned_entities"), 0);
        assert_eq!(service.stats().reaped, 1);
    }

    #[tokio::test]
    async fn duplication_failure_leaves_no_clone() {
        let (service, store, _) = setup(CloneConfig::default());
        store.set_faults(FaultPlan::none().fail_create_on(1));
        let g = GraphId::from("g1");

        let err = service
            .clone_before_modify(&g, Operation::add_episode("a", "text"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloneError::Persistence(_)));
        assert!(service.get_active_clone(&g).await.is_none());
        assert_eq!(service.stats().duplication_failures, 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let store = Arc::new(InMemoryRecordStore::new());
        let err =
            GraphCloneService::new(CloneConfig::default().with_batch_size(0), store).unwrap_err();
        assert!(matches!(err, CloneError::Config(_)));
    }
}
