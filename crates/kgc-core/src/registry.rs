//! Per-graph clone slots
//!
//! Each parent graph owns one slot, an async mutex around the active clone
//! (if any). Whoever holds the slot lock may inspect, create, replace or
//! finalize that graph's clone; different graphs never contend.
//!
//! Slots are created on first use. An empty slot is pruned only while the
//! map holds the sole reference to it, under the map's entry lock, so a lock
//! obtained for a graph is always the lock every other caller sees. The map
//! holds the graphs with an active clone plus those with a caller in flight.

use crate::clone::GraphClone;
use crate::ids::{CloneId, GraphId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Slot holding a graph's active clone
pub type CloneSlot = Arc<Mutex<Option<GraphClone>>>;

/// Active clones keyed by graph, with a reverse index by clone id
#[derive(Debug, Default)]
pub struct CloneRegistry {
    slots: DashMap<GraphId, CloneSlot>,
    by_clone: DashMap<CloneId, GraphId>,
}

impl CloneRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for a graph, created on first use
    #[must_use]
    pub fn slot(&self, graph_id: &GraphId) -> CloneSlot {
        self.slots
            .entry(graph_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Slot for a graph, without creating one
    #[must_use]
    pub fn existing_slot(&self, graph_id: &GraphId) -> Option<CloneSlot> {
        self.slots.get(graph_id).map(|s| s.value().clone())
    }

    /// Graph whose slot holds this clone
    #[must_use]
    pub fn locate(&self, clone_id: &CloneId) -> Option<GraphId> {
        self.by_clone.get(clone_id).map(|g| g.value().clone())
    }

    /// Record that `clone_id` now occupies `graph_id`'s slot
    ///
    /// Call with the slot lock held.
    pub fn index(&self, clone_id: CloneId, graph_id: GraphId) {
        self.by_clone.insert(clone_id, graph_id);
    }

    /// Forget a clone id; call with the slot lock held
    pub fn unindex(&self, clone_id: &CloneId) {
        self.by_clone.remove(clone_id);
    }

    /// Drop a graph's slot if it is empty and nobody else holds it
    ///
    /// Returns `true` if the slot was removed.
    pub fn prune(&self, graph_id: &GraphId) -> bool {
        self.slots.remove_if(graph_id, |_, slot| is_idle(slot)).is_some()
    }

    /// Drop every idle slot; returns how many were removed
    pub fn prune_idle(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !is_idle(slot));
        before.saturating_sub(self.slots.len())
    }

    /// Graphs that currently have a slot
    #[must_use]
    pub fn graph_ids(&self) -> Vec<GraphId> {
        self.slots.iter().map(|e| e.key().clone()).collect()
    }

    /// Clones currently indexed
    #[inline]
    #[must_use]
    pub fn indexed_count(&self) -> usize {
        self.by_clone.len()
    }
}

/// Only the map references the slot and it holds no clone
fn is_idle(slot: &CloneSlot) -> bool {
    Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|clone| clone.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_graph_shares_one_slot() {
        let registry = CloneRegistry::new();
        let g = GraphId::from("g1");
        let a = registry.slot(&g);
        let b = registry.slot(&g);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &registry.slot(&GraphId::from("g2"))));
        assert_eq!(registry.graph_ids().len(), 2);
        assert!(registry.existing_slot(&GraphId::from("g3")).is_none());
    }

    #[test]
    fn index_round_trip() {
        let registry = CloneRegistry::new();
        let id = CloneId::from_raw("clone_A");
        registry.index(id.clone(), GraphId::from("g1"));
        assert_eq!(registry.locate(&id), Some(GraphId::from("g1")));
        assert_eq!(registry.indexed_count(), 1);

        registry.unindex(&id);
        assert_eq!(registry.locate(&id), None);
    }

    #[tokio::test]
    async fn prune_removes_only_idle_slots() {
        let registry = CloneRegistry::new();
        let g = GraphId::from("g1");

        let held = registry.slot(&g);
        assert!(!registry.prune(&g));
        drop(held);
        assert!(registry.prune(&g));
        assert!(registry.existing_slot(&g).is_none());
        assert!(!registry.prune(&g));
    }

    #[tokio::test]
    async fn prune_idle_keeps_slots_in_use() {
        let registry = CloneRegistry::new();
        let busy = registry.slot(&GraphId::from("busy"));
        drop(registry.slot(&GraphId::from("idle")));
        let _ = registry.slot(&GraphId::from("idle-too"));

        assert_eq!(registry.prune_idle(), 2);
        assert_eq!(registry.graph_ids(), vec![GraphId::from("busy")]);

        // A slot a caller still holds survives and stays the shared one
        assert!(Arc::ptr_eq(&busy, &registry.slot(&GraphId::from("busy"))));
    }
}
