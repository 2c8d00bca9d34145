//! Entity/edge duplication
//!
//! Turns a parent graph into a referentially closed set of cloned rows and
//! persists them through one [`CloneTransaction`]:
//! - one `clone_id` for the whole clone, shared by entities and edges
//! - row ids derived as `clone_id::original_id`
//! - edge endpoints rewritten into the same id space
//! - rows written in batches of `batch_size`, each batch one transaction
//!   step, each step split into store calls of `write_chunk_size`
//!
//! Nothing is returned unless every batch was written.

use crate::config::CloneConfig;
use crate::error::CloneError;
use crate::ids::{CloneId, GraphId, TxnToken};
use crate::model::{CloneSize, ClonedEdge, ClonedEntity, SourceEdge, SourceEntity};
use crate::source::GraphSource;
use crate::transaction::{CloneTransaction, ForwardOp, StoreWriter};
use kgc_store::{Record, RecordStore};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Batch accounting for one duplication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicationReport {
    /// Transaction token used for the writes
    pub token: TxnToken,
    /// Rows per entity batch, in write order
    pub entity_batches: Vec<usize>,
    /// Rows per edge batch, in write order
    pub edge_batches: Vec<usize>,
    /// Store create calls issued
    pub create_calls: usize,
    /// Original ids of edges dropped because an endpoint was not in the graph
    pub dangling_edges: Vec<String>,
}

/// Persisted copy of a graph, ready to become a clone
#[derive(Debug, Clone)]
pub struct Duplication {
    /// Id shared by every cloned row
    pub clone_id: CloneId,
    /// Cloned entities, in source order
    pub entities: Vec<ClonedEntity>,
    /// Cloned edges, in source order
    pub edges: Vec<ClonedEdge>,
    /// Counts and serialized payload size
    pub size: CloneSize,
    /// Batch accounting
    pub report: DuplicationReport,
}

/// Produces and persists cloned rows
#[derive(Debug, Clone)]
pub struct EntityEdgeDuplicator {
    writer: StoreWriter,
    batch_size: usize,
    write_chunk_size: usize,
}

impl EntityEdgeDuplicator {
    /// Create duplicator writing to `store`
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, config: &CloneConfig) -> Self {
        Self {
            writer: StoreWriter::new(store, config.collections.clone(), config.write_chunk_size),
            batch_size: config.batch_size.max(1),
            write_chunk_size: config.write_chunk_size.max(1),
        }
    }

    /// Copy one entity into the clone's id space
    #[must_use]
    pub fn clone_entity(clone_id: &CloneId, entity: &SourceEntity) -> ClonedEntity {
        ClonedEntity {
            id: clone_id.derive_row_id(&entity.id),
            original_id: entity.id.clone(),
            clone_id: clone_id.to_string(),
            entity_type: entity.entity_type.clone(),
            attributes: entity.attributes.clone(),
            is_modified: false,
            is_added: false,
            modifications: Vec::new(),
        }
    }

    /// Copy one edge into the clone's id space, endpoints included
    #[must_use]
    pub fn clone_edge(clone_id: &CloneId, edge: &SourceEdge) -> ClonedEdge {
        ClonedEdge {
            id: clone_id.derive_row_id(&edge.id),
            original_id: edge.id.clone(),
            clone_id: clone_id.to_string(),
            edge_type: edge.edge_type.clone(),
            from_entity_id: clone_id.derive_row_id(&edge.from_entity_id),
            to_entity_id: clone_id.derive_row_id(&edge.to_entity_id),
            properties: edge.properties.clone(),
            is_modified: false,
            is_added: false,
            modifications: Vec::new(),
        }
    }

    /// Fetch a parent graph and duplicate it under a fresh clone id
    ///
    /// # Errors
    /// Source read failure, or any duplication failure (after rollback)
    pub async fn duplicate_graph(
        &self,
        source: &dyn GraphSource,
        graph_id: &GraphId,
    ) -> Result<Duplication, CloneError> {
        let entities = source.fetch_entities(graph_id).await?;
        let edges = source.fetch_edges(graph_id).await?;
        tracing::debug!(
            graph = %graph_id,
            entities = entities.len(),
            edges = edges.len(),
            "Fetched parent graph"
        );

        self.duplicate(&CloneId::generate(), &entities, &edges).await
    }

    /// Duplicate the given rows under `clone_id`
    ///
    /// # Errors
    /// - `CloneError::Persistence` if a write failed (rows already removed)
    /// - `CloneError::RollbackFailed` if removing them failed too
    pub async fn duplicate(
        &self,
        clone_id: &CloneId,
        entities: &[SourceEntity],
        edges: &[SourceEdge],
    ) -> Result<Duplication, CloneError> {
        let cloned_entities: Vec<ClonedEntity> = entities
            .iter()
            .map(|e| Self::clone_entity(clone_id, e))
            .collect();

        let known: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        let mut dangling_edges = Vec::new();
        let mut cloned_edges = Vec::with_capacity(edges.len());
        for edge in edges {
            if known.contains(edge.from_entity_id.as_str())
                && known.contains(edge.to_entity_id.as_str())
            {
                cloned_edges.push(Self::clone_edge(clone_id, edge));
            } else {
                tracing::warn!(
                    clone = %clone_id,
                    edge = %edge.id,
                    "Dropping edge with endpoint outside the graph"
                );
                dangling_edges.push(edge.id.clone());
            }
        }

        let mut tx = CloneTransaction::with_writer(self.writer.clone());
        let token = tx.begin();

        let entity_batches =
            self.register_batches(&mut tx, &cloned_entities, ForwardOp::PersistEntities)?;
        let edge_batches =
            self.register_batches(&mut tx, &cloned_edges, ForwardOp::PersistEdges)?;

        let byte_size = serde_json::to_vec(&(&cloned_entities, &cloned_edges))?.len();
        let create_calls: usize = entity_batches
            .iter()
            .chain(edge_batches.iter())
            .map(|n| n.div_ceil(self.write_chunk_size))
            .sum();

        let receipt = tx.commit().await?;
        tracing::info!(
            clone = %clone_id,
            %token,
            steps = receipt.steps,
            records = receipt.records_written,
            "Duplicated {} entities and {} edges",
            cloned_entities.len(),
            cloned_edges.len()
        );

        let size = CloneSize {
            entity_count: cloned_entities.len(),
            edge_count: cloned_edges.len(),
            byte_size,
        };

        Ok(Duplication {
            clone_id: clone_id.clone(),
            entities: cloned_entities,
            edges: cloned_edges,
            size,
            report: DuplicationReport {
                token,
                entity_batches,
                edge_batches,
                create_calls,
                dangling_edges,
            },
        })
    }

    fn register_batches<T, F>(
        &self,
        tx: &mut CloneTransaction,
        rows: &[T],
        step: F,
    ) -> Result<Vec<usize>, CloneError>
    where
        T: Serialize + RowId,
        F: Fn(Vec<Record>) -> ForwardOp,
    {
        let mut sizes = Vec::new();
        for batch in rows.chunks(self.batch_size) {
            let records = batch
                .iter()
                .map(|row| Record::from_serialize(row.row_id(), row))
                .collect::<Result<Vec<_>, _>>()?;
            sizes.push(records.len());
            tx.register(step(records));
        }
        Ok(sizes)
    }

    /// Collections this duplicator writes to
    #[inline]
    #[must_use]
    pub fn collections(&self) -> &crate::config::Collections {
        self.writer.collections()
    }

    pub(crate) fn writer(&self) -> &StoreWriter {
        &self.writer
    }
}

/// Rows that carry their own derived id
trait RowId {
    fn row_id(&self) -> &str;
}

impl RowId for ClonedEntity {
    fn row_id(&self) -> &str {
        &self.id
    }
}

impl RowId for ClonedEdge {
    fn row_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgc_store::{FaultPlan, InMemoryRecordStore, StoreError};
    use pretty_assertions::assert_eq;

    fn graph(n: usize) -> (Vec<SourceEntity>, Vec<SourceEdge>) {
        let entities: Vec<_> = (0..n)
            .map(|i| SourceEntity::new(format!("e{i}"), "Person").with_attribute("n", i as u64))
            .collect();
        let edges: Vec<_> = (1..n)
            .map(|i| {
                SourceEdge::new(format!("r{i}"), "KNOWS", format!("e{}", i - 1), format!("e{i}"))
            })
            .collect();
        (entities, edges)
    }

    fn duplicator(store: &Arc<InMemoryRecordStore>, batch: usize) -> EntityEdgeDuplicator {
        let config = CloneConfig::new().with_batch_size(batch);
        EntityEdgeDuplicator::new(store.clone(), &config)
    }

    #[test]
    fn clone_edge_rewrites_endpoints() {
        let id = CloneId::from_raw("clone_A");
        let edge = SourceEdge::new("r1", "KNOWS", "e1", "e2").with_property("since", 2020);
        let cloned = EntityEdgeDuplicator::clone_edge(&id, &edge);

        assert_eq!(cloned.id, "clone_A::r1");
        assert_eq!(cloned.from_entity_id, "clone_A::e1");
        assert_eq!(cloned.to_entity_id, "clone_A::e2");
        assert_eq!(cloned.properties["since"], serde_json::json!(2020));
        assert!(!cloned.is_modified);
    }

    #[tokio::test]
    async fn entities_and_edges_share_one_clone_id() {
        let store = Arc::new(InMemoryRecordStore::new());
        let (entities, edges) = graph(4);
        let id = CloneId::generate();

        let dup = duplicator(&store, 500).duplicate(&id, &entities, &edges).await.unwrap();

        assert!(dup.entities.iter().all(|e| e.clone_id == id.as_str()));
        assert!(dup.edges.iter().all(|e| e.clone_id == id.as_str()));
        assert_eq!(store.count("cloned_entities"), 4);
        assert_eq!(store.count("cloned_edges"), 3);
    }

    #[tokio::test]
    async fn batches_and_size_are_reported() {
        let store = Arc::new(InMemoryRecordStore::new());
        let (entities, edges) = graph(12);

        let dup = duplicator(&store, 5)
            .duplicate(&CloneId::generate(), &entities, &edges)
            .await
            .unwrap();

        assert_eq!(dup.report.entity_batches, vec![5, 5, 2]);
        assert_eq!(dup.report.edge_batches, vec![5, 5, 1]);
        assert_eq!(dup.report.create_calls, 6);
        assert_eq!(dup.size.entity_count, 12);
        assert_eq!(dup.size.edge_count, 11);
        let expected = serde_json::to_vec(&(&dup.entities, &dup.edges)).unwrap().len();
        assert_eq!(dup.size.byte_size, expected);
    }

    #[tokio::test]
    async fn dangling_edges_are_dropped() {
        let store = Arc::new(InMemoryRecordStore::new());
        let entities = vec![SourceEntity::new("e1", "Person")];
        let edges = vec![
            SourceEdge::new("r1", "KNOWS", "e1", "e1"),
            SourceEdge::new("r2", "KNOWS", "e1", "ghost"),
        ];

        let dup = duplicator(&store, 500)
            .duplicate(&CloneId::generate(), &entities, &edges)
            .await
            .unwrap();

        assert_eq!(dup.edges.len(), 1);
        assert_eq!(dup.report.dangling_edges, vec!["r2".to_string()]);
    }

    #[tokio::test]
    async fn edge_write_failure_removes_entity_rows() {
        let store = Arc::new(InMemoryRecordStore::new());
        let (entities, edges) = graph(20);
        // 2 entity create calls (batch 10, chunk 10), then fail the first edge call
        store.set_faults(FaultPlan::none().fail_create_on(3));

        let err = duplicator(&store, 10)
            .duplicate(&CloneId::generate(), &entities, &edges)
            .await
            .unwrap_err();

        assert!(matches!(err, CloneError::Persistence(StoreError::Injected { call: 3, .. })));
        assert_eq!(store.count("cloned_entities"), 0);
        assert_eq!(store.count("cloned_edges"), 0);
    }

    #[tokio::test]
    async fn empty_graph_duplicates_to_empty_clone() {
        let store = Arc::new(InMemoryRecordStore::new());
        let dup = duplicator(&store, 500)
            .duplicate(&CloneId::generate(), &[], &[])
            .await
            .unwrap();

        assert!(dup.entities.is_empty());
        assert_eq!(dup.report.create_calls, 0);
        assert!(store.calls().is_empty());
    }
}
