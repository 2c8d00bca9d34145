//! Clone aggregate
//!
//! A [`GraphClone`] owns the duplicated rows of one parent graph, its
//! lifecycle status, its TTL and the append-only operation journal.
//!
//! Edits happen in memory. Rows added in the clone are never persisted;
//! persisted rows deleted in the clone are kept aside so cleanup can still
//! remove them from the store. Every edit keeps the clone referentially
//! closed.

use crate::clock::Clock;
use crate::duplicator::{Duplication, EntityEdgeDuplicator};
use crate::error::CloneError;
use crate::ids::{self, CloneId, GraphId};
use crate::model::{
    CloneSize, CloneStatus, ClonedEdge, ClonedEntity, Modification, SourceEdge, SourceEntity,
};
use crate::operation::{Operation, OperationKind};
use crate::state_machine::validate_transition;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Isolated, mutable copy of a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphClone {
    id: CloneId,
    parent_graph_id: GraphId,
    status: CloneStatus,
    created_at: DateTime<Utc>,
    ttl_seconds: u64,
    operations: Vec<Operation>,
    size: CloneSize,
    entities: Vec<ClonedEntity>,
    edges: Vec<ClonedEdge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    removed_entities: Vec<ClonedEntity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    removed_edges: Vec<ClonedEdge>,
}

impl GraphClone {
    /// Assemble a pending clone from persisted rows
    #[must_use]
    pub fn from_duplication(
        parent_graph_id: GraphId,
        duplication: Duplication,
        created_at: DateTime<Utc>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            id: duplication.clone_id,
            parent_graph_id,
            status: CloneStatus::Pending,
            created_at,
            ttl_seconds,
            operations: Vec::new(),
            size: duplication.size,
            entities: duplication.entities,
            edges: duplication.edges,
            removed_entities: Vec::new(),
            removed_edges: Vec::new(),
        }
    }

    /// Clone id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &CloneId {
        &self.id
    }

    /// Graph this clone shadows
    #[inline]
    #[must_use]
    pub fn parent_graph_id(&self) -> &GraphId {
        &self.parent_graph_id
    }

    /// Lifecycle status
    #[inline]
    #[must_use]
    pub fn status(&self) -> CloneStatus {
        self.status
    }

    /// Creation time
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Staleness horizon
    #[inline]
    #[must_use]
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Journal, oldest first
    #[inline]
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Size fixed at creation
    #[inline]
    #[must_use]
    pub fn size(&self) -> CloneSize {
        self.size
    }

    /// Cloned entities
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[ClonedEntity] {
        &self.entities
    }

    /// Cloned edges
    #[inline]
    #[must_use]
    pub fn edges(&self) -> &[ClonedEdge] {
        &self.edges
    }

    /// `(now - created_at) > ttl`
    ///
    /// Pure and monotonic in `now`. A TTL too large for a `TimeDelta`
    /// never expires.
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        let Some(ttl) = i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
        else {
            return false;
        };
        now.signed_duration_since(self.created_at) > ttl
    }

    /// Staleness against a clock
    #[inline]
    #[must_use]
    pub fn is_stale(&self, clock: &dyn Clock) -> bool {
        self.is_stale_at(clock.now())
    }

    /// Append to the journal; no validation
    pub fn register_operation(&mut self, op: Operation) {
        self.operations.push(op);
    }

    /// Move to another status
    ///
    /// # Errors
    /// `CloneError::InvalidTransition` if the state machine forbids it
    pub fn transition(&mut self, to: CloneStatus) -> Result<(), CloneError> {
        validate_transition(self.status, to)?;
        tracing::debug!(clone = %self.id, from = %self.status, %to, "Clone transition");
        self.status = to;
        Ok(())
    }

    /// Entity by original id
    #[must_use]
    pub fn entity(&self, original_id: &str) -> Option<&ClonedEntity> {
        let row_id = self.id.derive_row_id(original_id);
        self.entities.iter().find(|e| e.id == row_id)
    }

    /// Edge by original id
    #[must_use]
    pub fn edge(&self, original_id: &str) -> Option<&ClonedEdge> {
        let row_id = self.id.derive_row_id(original_id);
        self.edges.iter().find(|e| e.id == row_id)
    }

    /// Original id behind a derived row id
    #[inline]
    #[must_use]
    pub fn original_id_of<'a>(&self, row_id: &'a str) -> Option<&'a str> {
        ids::original_id_of(self.id.as_str(), row_id)
    }

    /// Change an entity attribute in the clone
    ///
    /// Records the modification on the row and an `UpdateEntity` operation
    /// in the journal.
    ///
    /// # Errors
    /// - `CloneError::NotActive` unless the clone is active
    /// - `CloneError::RowNotFound` for an unknown original id
    pub fn modify_entity(
        &mut self,
        original_id: &str,
        field: &str,
        value: Value,
        at: DateTime<Utc>,
    ) -> Result<Modification, CloneError> {
        self.ensure_active()?;
        let row_id = self.id.derive_row_id(original_id);
        let entity = self
            .entities
            .iter_mut()
            .find(|e| e.id == row_id)
            .ok_or_else(|| CloneError::RowNotFound {
                clone_id: self.id.clone(),
                kind: "entity",
                original_id: original_id.to_string(),
            })?;

        let modification = entity.apply(field, value.clone(), at);
        self.operations.push(Operation::at(
            OperationKind::UpdateEntity {
                entity_id: original_id.to_string(),
                field: field.to_string(),
                value,
            },
            at,
        ));
        Ok(modification)
    }

    /// Change an edge property in the clone
    ///
    /// # Errors
    /// - `CloneError::NotActive` unless the clone is active
    /// - `CloneError::RowNotFound` for an unknown original id
    pub fn modify_edge(
        &mut self,
        original_id: &str,
        field: &str,
        value: Value,
        at: DateTime<Utc>,
    ) -> Result<Modification, CloneError> {
        self.ensure_active()?;
        let row_id = self.id.derive_row_id(original_id);
        let edge = self
            .edges
            .iter_mut()
            .find(|e| e.id == row_id)
            .ok_or_else(|| CloneError::RowNotFound {
                clone_id: self.id.clone(),
                kind: "edge",
                original_id: original_id.to_string(),
            })?;

        let modification = edge.apply(field, value.clone(), at);
        self.operations.push(Operation::at(
            OperationKind::UpdateEdge {
                edge_id: original_id.to_string(),
                field: field.to_string(),
                value,
            },
            at,
        ));
        Ok(modification)
    }

    /// Add an entity that the parent graph does not have
    ///
    /// The row id is derived from `entity.id` the same way duplicated rows
    /// are.
    ///
    /// # Errors
    /// - `CloneError::NotActive` unless the clone is active
    /// - `CloneError::DuplicateRow` if the clone already has this id
    pub fn add_entity(
        &mut self,
        entity: SourceEntity,
        at: DateTime<Utc>,
    ) -> Result<ClonedEntity, CloneError> {
        self.ensure_active()?;
        if self.entity(&entity.id).is_some() {
            return Err(self.duplicate_row("entity", &entity.id));
        }

        let mut row = EntityEdgeDuplicator::clone_entity(&self.id, &entity);
        row.is_added = true;
        self.entities.push(row.clone());
        self.operations.push(Operation::at(
            OperationKind::AddEntity {
                entity_id: entity.id,
                entity_type: entity.entity_type,
                attributes: entity.attributes,
            },
            at,
        ));
        Ok(row)
    }

    /// Add an edge between two entities of the clone
    ///
    /// Endpoints are original ids and must name entities the clone has
    /// now, duplicated or added.
    ///
    /// # Errors
    /// - `CloneError::NotActive` unless the clone is active
    /// - `CloneError::DuplicateRow` if the clone already has this id
    /// - `CloneError::DanglingEdge` if an endpoint is missing
    pub fn add_edge(
        &mut self,
        edge: SourceEdge,
        at: DateTime<Utc>,
    ) -> Result<ClonedEdge, CloneError> {
        self.ensure_active()?;
        if self.edge(&edge.id).is_some() {
            return Err(self.duplicate_row("edge", &edge.id));
        }
        for endpoint in [&edge.from_entity_id, &edge.to_entity_id] {
            if self.entity(endpoint).is_none() {
                return Err(CloneError::DanglingEdge {
                    clone_id: self.id.clone(),
                    edge_id: edge.id.clone(),
                    endpoint: endpoint.clone(),
                });
            }
        }

        let mut row = EntityEdgeDuplicator::clone_edge(&self.id, &edge);
        row.is_added = true;
        self.edges.push(row.clone());
        self.operations.push(Operation::at(
            OperationKind::AddEdge {
                edge_id: edge.id,
                edge_type: edge.edge_type,
                from_entity_id: edge.from_entity_id,
                to_entity_id: edge.to_entity_id,
            },
            at,
        ));
        Ok(row)
    }

    /// Remove an entity and every edge touching it
    ///
    /// Returns the original ids of the edges removed with it.
    ///
    /// # Errors
    /// - `CloneError::NotActive` unless the clone is active
    /// - `CloneError::RowNotFound` for an unknown original id
    pub fn delete_entity(
        &mut self,
        original_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>, CloneError> {
        self.ensure_active()?;
        let row_id = self.id.derive_row_id(original_id);
        let index = self
            .entities
            .iter()
            .position(|e| e.id == row_id)
            .ok_or_else(|| self.row_not_found("entity", original_id))?;

        let entity = self.entities.remove(index);
        let (incident, kept): (Vec<ClonedEdge>, Vec<ClonedEdge>) =
            std::mem::take(&mut self.edges)
                .into_iter()
                .partition(|e| e.from_entity_id == row_id || e.to_entity_id == row_id);
        self.edges = kept;

        let cascaded: Vec<String> = incident.iter().map(|e| e.original_id.clone()).collect();
        for edge in incident {
            self.retire_edge(edge);
        }
        if !entity.is_added {
            self.removed_entities.push(entity);
        }
        self.operations.push(Operation::at(
            OperationKind::DeleteEntity {
                entity_id: original_id.to_string(),
            },
            at,
        ));
        Ok(cascaded)
    }

    /// Remove an edge
    ///
    /// # Errors
    /// - `CloneError::NotActive` unless the clone is active
    /// - `CloneError::RowNotFound` for an unknown original id
    pub fn delete_edge(
        &mut self,
        original_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ClonedEdge, CloneError> {
        self.ensure_active()?;
        let row_id = self.id.derive_row_id(original_id);
        let index = self
            .edges
            .iter()
            .position(|e| e.id == row_id)
            .ok_or_else(|| self.row_not_found("edge", original_id))?;

        let edge = self.edges.remove(index);
        self.retire_edge(edge.clone());
        self.operations.push(Operation::at(
            OperationKind::DeleteEdge {
                edge_id: original_id.to_string(),
            },
            at,
        ));
        Ok(edge)
    }

    fn retire_edge(&mut self, edge: ClonedEdge) {
        // Added rows were never written
        if !edge.is_added {
            self.removed_edges.push(edge);
        }
    }

    fn row_not_found(&self, kind: &'static str, original_id: &str) -> CloneError {
        CloneError::RowNotFound {
            clone_id: self.id.clone(),
            kind,
            original_id: original_id.to_string(),
        }
    }

    fn duplicate_row(&self, kind: &'static str, original_id: &str) -> CloneError {
        CloneError::DuplicateRow {
            clone_id: self.id.clone(),
            kind,
            original_id: original_id.to_string(),
        }
    }

    fn ensure_active(&self) -> Result<(), CloneError> {
        if self.status == CloneStatus::Active {
            Ok(())
        } else {
            Err(CloneError::NotActive {
                clone_id: self.id.clone(),
                status: self.status,
            })
        }
    }

    /// Ids of edges whose endpoints are not entities of this clone
    ///
    /// Empty for every clone built by the duplicator.
    #[must_use]
    pub fn verify_referential_closure(&self) -> Vec<String> {
        let known: HashSet<&str> = self.entities.iter().map(|e| e.id.as_str()).collect();
        self.edges
            .iter()
            .filter(|e| {
                !known.contains(e.from_entity_id.as_str())
                    || !known.contains(e.to_entity_id.as_str())
            })
            .map(|e| e.id.clone())
            .collect()
    }

    /// What this clone changed relative to its parent
    #[must_use]
    pub fn diff(&self) -> CloneDiff {
        let entities_modified = self
            .entities
            .iter()
            .filter(|e| e.is_modified && !e.is_added)
            .map(|e| RowChange {
                original_id: e.original_id.clone(),
                cloned_id: e.id.clone(),
                modifications: e.modifications.clone(),
            })
            .collect();
        let edges_modified = self
            .edges
            .iter()
            .filter(|e| e.is_modified && !e.is_added)
            .map(|e| RowChange {
                original_id: e.original_id.clone(),
                cloned_id: e.id.clone(),
                modifications: e.modifications.clone(),
            })
            .collect();

        CloneDiff {
            clone_id: self.id.clone(),
            parent_graph_id: self.parent_graph_id.clone(),
            master_entity_count: self.size.entity_count,
            master_edge_count: self.size.edge_count,
            entity_count: self.entities.len(),
            edge_count: self.edges.len(),
            entities_added: self.entities.iter().filter(|e| e.is_added).cloned().collect(),
            edges_added: self.edges.iter().filter(|e| e.is_added).cloned().collect(),
            entities_modified,
            edges_modified,
            entities_removed: self
                .removed_entities
                .iter()
                .map(|e| e.original_id.clone())
                .collect(),
            edges_removed: self
                .removed_edges
                .iter()
                .map(|e| e.original_id.clone())
                .collect(),
            operation_count: self.operations.len(),
        }
    }

    /// Lightweight view
    #[must_use]
    pub fn summary(&self, now: DateTime<Utc>) -> CloneSummary {
        CloneSummary {
            id: self.id.clone(),
            parent_graph_id: self.parent_graph_id.clone(),
            status: self.status,
            created_at: self.created_at,
            stale: self.is_stale_at(now),
            size: self.size,
            operation_count: self.operations.len(),
        }
    }

    /// Ids of every persisted row, edges first
    ///
    /// Includes rows deleted in the clone and skips rows added to it.
    pub(crate) fn persisted_ids(&self) -> (Vec<String>, Vec<String>) {
        let edges = self
            .edges
            .iter()
            .filter(|e| !e.is_added)
            .chain(&self.removed_edges)
            .map(|e| e.id.clone())
            .collect();
        let entities = self
            .entities
            .iter()
            .filter(|e| !e.is_added)
            .chain(&self.removed_entities)
            .map(|e| e.id.clone())
            .collect();
        (edges, entities)
    }
}

/// Edits made to one cloned row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    /// Id in the parent graph
    pub original_id: String,
    /// Id in the clone
    pub cloned_id: String,
    /// Edits, oldest first
    pub modifications: Vec<Modification>,
}

/// Clone vs. parent comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneDiff {
    /// Compared clone
    pub clone_id: CloneId,
    /// Its parent graph
    pub parent_graph_id: GraphId,
    /// Entities in the parent when the clone was made
    pub master_entity_count: usize,
    /// Edges in the parent when the clone was made
    pub master_edge_count: usize,
    /// Entities in the clone
    pub entity_count: usize,
    /// Edges in the clone
    pub edge_count: usize,
    /// Entities created in the clone
    pub entities_added: Vec<ClonedEntity>,
    /// Edges created in the clone
    pub edges_added: Vec<ClonedEdge>,
    /// Parent entities that were edited
    pub entities_modified: Vec<RowChange>,
    /// Parent edges that were edited
    pub edges_modified: Vec<RowChange>,
    /// Original ids of parent entities deleted in the clone
    pub entities_removed: Vec<String>,
    /// Original ids of parent edges deleted in the clone, cascades included
    pub edges_removed: Vec<String>,
    /// Journal length
    pub operation_count: usize,
}

impl CloneDiff {
    /// No row was added, edited or removed
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.entities_added.is_empty()
            && self.edges_added.is_empty()
            && self.entities_modified.is_empty()
            && self.edges_modified.is_empty()
            && self.entities_removed.is_empty()
            && self.edges_removed.is_empty()
    }
}

/// Listing entry for an active clone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneSummary {
    /// Clone id
    pub id: CloneId,
    /// Parent graph
    pub parent_graph_id: GraphId,
    /// Status
    pub status: CloneStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Stale at listing time
    pub stale: bool,
    /// Size fixed at creation
    pub size: CloneSize,
    /// Journal length
    pub operation_count: usize,
}
