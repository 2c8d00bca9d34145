//! End-to-end clone simulation against an in-memory store

use kgc_core::{
    CloneConfig, CloneError, GraphCloneService, GraphId, Operation, ServiceStats, SourceEdge,
    SourceEntity,
};
use kgc_store::{FaultPlan, InMemoryRecordStore};
use kgc_test_utils::{seed_graph, synthetic_graph};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

/// Simulation parameters
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimulatorConfig {
    pub(crate) entities: usize,
    pub(crate) edges: usize,
    pub(crate) seed: u64,
    pub(crate) fail_at_create: Option<usize>,
    pub(crate) reject: bool,
    pub(crate) clone_config: CloneConfig,
}

/// What the simulation observed
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimulatorReport {
    pub(crate) config: SimulatorConfig,
    pub(crate) outcome: String,
    pub(crate) clone_id: Option<String>,
    pub(crate) create_calls: usize,
    pub(crate) largest_create_call: usize,
    pub(crate) cloned_entities: usize,
    pub(crate) cloned_edges: usize,
    pub(crate) byte_size: usize,
    pub(crate) modified_rows: usize,
    pub(crate) added_rows: usize,
    pub(crate) stats: ServiceStats,
    pub(crate) violations: Vec<String>,
}

impl SimulatorReport {
    /// No invariant was violated
    pub(crate) fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    pub(crate) fn generate_text(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "=== KGC Clone Simulation ===\n");
        let _ = writeln!(
            report,
            "Graph: {} entities, {} edges (seed {})",
            self.config.entities, self.config.edges, self.config.seed
        );
        let _ = writeln!(
            report,
            "Batch size: {}, chunk size: {}",
            self.config.clone_config.batch_size, self.config.clone_config.write_chunk_size
        );
        let _ = writeln!(report, "Outcome: {}", self.outcome);
        if let Some(id) = &self.clone_id {
            let _ = writeln!(report, "Clone: {id}");
        }
        let _ = writeln!(
            report,
            "Create calls: {} (largest {})",
            self.create_calls, self.largest_create_call
        );
        let _ = writeln!(
            report,
            "Cloned rows left in store: {} entities, {} edges",
            self.cloned_entities, self.cloned_edges
        );
        let _ = writeln!(report, "Payload bytes: {}", self.byte_size);
        let _ = writeln!(report, "Modified rows: {}", self.modified_rows);
        let _ = writeln!(report, "Added rows: {}", self.added_rows);
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            let _ = writeln!(report, "\n=== Violations ===");
            for (i, v) in self.violations.iter().enumerate() {
                let _ = writeln!(report, "{}. {}", i + 1, v);
            }
        }
        report
    }
}

/// Seed a graph, clone it, edit it, then commit or reject, checking
/// invariants along the way
pub(crate) async fn run_simulator(config: SimulatorConfig) -> Result<SimulatorReport, CloneError> {
    let graph_id = GraphId::from("sim-graph");
    let collections = config.clone_config.collections.clone();
    let store = Arc::new(InMemoryRecordStore::new());
    let (entities, edges) = synthetic_graph(config.entities, config.edges, config.seed);
    seed_graph(&store, &collections, &graph_id, &entities, &edges);
    if let Some(call) = config.fail_at_create {
        store.set_faults(FaultPlan::none().fail_create_on(call));
    }

    let service = GraphCloneService::new(config.clone_config.clone(), store.clone())?;
    let mut violations = Vec::new();
    let mut clone_id = None;
    let mut byte_size = 0;
    let mut modified_rows = 0;
    let mut added_rows = 0;

    let outcome = match service
        .clone_before_modify(&graph_id, Operation::add_episode("simulated episode", "text"))
        .await
    {
        Err(err) if err.is_fatal() => {
            violations.push(format!("rollback failed: {err}"));
            "rollback_failed".to_string()
        }
        Err(err) => {
            tracing::info!("Duplication failed as configured: {}", err);
            if service.get_active_clone(&graph_id).await.is_some() {
                violations.push("failed duplication left an active clone".into());
            }
            "duplication_failed".to_string()
        }
        Ok(clone) => {
            clone_id = Some(clone.id().to_string());
            byte_size = clone.size().byte_size;

            let size = clone.size();
            if size.entity_count != entities.len() {
                violations.push(format!(
                    "cloned {} of {} entities",
                    size.entity_count,
                    entities.len()
                ));
            }
            if size.edge_count != edges.len() {
                violations.push(format!("cloned {} of {} edges", size.edge_count, edges.len()));
            }
            for dangling in clone.verify_referential_closure() {
                violations.push(format!("dangling edge {dangling}"));
            }
            for entity in clone.entities() {
                if entity.id != clone.id().derive_row_id(&entity.original_id) {
                    violations.push(format!("entity {} has a foreign id", entity.id));
                }
            }

            if let Some(first) = entities.first() {
                service
                    .modify_entity(clone.id(), &first.id, "simulated", serde_json::json!(true))
                    .await?;
                service
                    .add_entity(clone.id(), SourceEntity::new("sim-added", "Simulated"))
                    .await?;
                service
                    .add_edge(
                        clone.id(),
                        SourceEdge::new("sim-added-edge", "SIMULATED", &first.id, "sim-added"),
                    )
                    .await?;
            }
            let diff = service.diff(clone.id()).await?;
            modified_rows = diff.entities_modified.len() + diff.edges_modified.len();
            added_rows = diff.entities_added.len() + diff.edges_added.len();
            for dangling in service
                .get_active_clone(&graph_id)
                .await
                .map(|c| c.verify_referential_closure())
                .unwrap_or_default()
            {
                violations.push(format!("edit left dangling edge {dangling}"));
            }

            if config.reject {
                let rejected = service.reject_clone(clone.id()).await?;
                for failure in &rejected.cleanup.failures {
                    violations.push(format!("cleanup failed: {failure}"));
                }
                "rejected".to_string()
            } else {
                service.commit_clone(clone.id()).await?;
                "committed".to_string()
            }
        }
    };

    if service.get_active_clone(&graph_id).await.is_some() {
        violations.push("graph still has an active clone".into());
    }

    let create_sizes: Vec<usize> = [&collections.cloned_entities, &collections.cloned_edges]
        .iter()
        .flat_map(|c| store.create_call_sizes(c))
        .collect();
    let largest_create_call = create_sizes.iter().copied().max().unwrap_or(0);
    if largest_create_call > config.clone_config.write_chunk_size {
        violations.push(format!(
            "create call of {largest_create_call} records exceeds chunk size {}",
            config.clone_config.write_chunk_size
        ));
    }

    let cloned_entities = store.count(&collections.cloned_entities);
    let cloned_edges = store.count(&collections.cloned_edges);
    let expect_rows = outcome == "committed";
    if !expect_rows && (cloned_entities > 0 || cloned_edges > 0) {
        violations.push(format!("{cloned_entities} entities and {cloned_edges} edges orphaned"));
    }
    if expect_rows && (cloned_entities != entities.len() || cloned_edges != edges.len()) {
        violations.push("committed clone rows missing from store".into());
    }

    Ok(SimulatorReport {
        config,
        outcome,
        clone_id,
        create_calls: create_sizes.len(),
        largest_create_call,
        cloned_entities,
        cloned_edges,
        byte_size,
        modified_rows,
        added_rows,
        stats: service.stats(),
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(entities: usize, edges: usize) -> SimulatorConfig {
        SimulatorConfig {
            entities,
            edges,
            seed: 42,
            fail_at_create: None,
            reject: false,
            clone_config: CloneConfig::default().with_batch_size(50),
        }
    }

    #[tokio::test]
    async fn commit_run_passes() {
        let report = run_simulator(config(120, 200)).await.unwrap();
        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.outcome, "committed");
        assert_eq!(report.cloned_entities, 120);
        assert_eq!(report.create_calls, 32);
        assert_eq!(report.largest_create_call, 10);
        assert_eq!(report.modified_rows, 1);
        assert_eq!(report.added_rows, 2);
    }

    #[tokio::test]
    async fn reject_run_leaves_no_rows() {
        let mut cfg = config(30, 30);
        cfg.reject = true;
        let report = run_simulator(cfg).await.unwrap();
        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.outcome, "rejected");
        assert_eq!(report.cloned_entities + report.cloned_edges, 0);
    }

    #[tokio::test]
    async fn injected_failure_rolls_back() {
        let mut cfg = config(100, 100);
        cfg.fail_at_create = Some(7);
        let report = run_simulator(cfg).await.unwrap();
        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.outcome, "duplication_failed");
        assert_eq!(report.stats.duplication_failures, 1);
        assert!(report.generate_text().contains("duplication_failed"));
    }
}
