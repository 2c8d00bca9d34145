//! Testing utilities for KGC workspace
//!
//! Shared fixtures: synthetic graphs, store seeding and service setup.

#![allow(missing_docs)]

use kgc_core::source::{edge_record, entity_record};
use kgc_core::{
    CloneConfig, CloneError, Collections, GraphCloneService, GraphId, GraphSource, ManualClock,
    SourceEdge, SourceEntity,
};
use kgc_store::{InMemoryRecordStore, Record};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const ENTITY_TYPES: [&str; 4] = ["Person", "Company", "Place", "Event"];
const EDGE_TYPES: [&str; 4] = ["KNOWS", "WORKS_AT", "LOCATED_IN", "ATTENDED"];

/// Deterministic random graph
///
/// Entity ids are `e0..`, edge ids `r0..`. Every edge endpoint is one of the
/// generated entities; with no entities there are no edges.
pub fn synthetic_graph(
    n_entities: usize,
    n_edges: usize,
    seed: u64,
) -> (Vec<SourceEntity>, Vec<SourceEdge>) {
    let mut rng = StdRng::seed_from_u64(seed);

    let entities: Vec<SourceEntity> = (0..n_entities)
        .map(|i| {
            let kind = ENTITY_TYPES[rng.random_range(0..ENTITY_TYPES.len())];
            SourceEntity::new(format!("e{i}"), kind)
                .with_attribute("name", format!("{kind} {i}"))
                .with_attribute("rank", rng.random_range(0..100u64))
        })
        .collect();

    if entities.is_empty() {
        return (entities, Vec::new());
    }

    let edges = (0..n_edges)
        .map(|i| {
            let from = rng.random_range(0..n_entities);
            let to = rng.random_range(0..n_entities);
            SourceEdge::new(
                format!("r{i}"),
                EDGE_TYPES[rng.random_range(0..EDGE_TYPES.len())],
                format!("e{from}"),
                format!("e{to}"),
            )
            .with_property("weight", f64::from(rng.random_range(1..=10u8)) / 10.0)
        })
        .collect();

    (entities, edges)
}

/// Write a parent graph into the source collections
///
/// Store keys are scoped by graph so several graphs built from the same
/// fixture can share one store; row bodies keep their plain ids.
pub fn seed_graph(
    store: &InMemoryRecordStore,
    collections: &Collections,
    graph_id: &GraphId,
    entities: &[SourceEntity],
    edges: &[SourceEdge],
) {
    store.seed(
        &collections.source_entities,
        entities
            .iter()
            .map(|e| scoped(graph_id, entity_record(graph_id, e).unwrap())),
    );
    store.seed(
        &collections.source_edges,
        edges
            .iter()
            .map(|e| scoped(graph_id, edge_record(graph_id, e).unwrap())),
    );
}

fn scoped(graph_id: &GraphId, mut record: Record) -> Record {
    record.id = format!("{graph_id}/{}", record.id);
    record
}

/// Service wired to an in-memory store and a manual clock
pub struct TestHarness {
    pub service: Arc<GraphCloneService>,
    pub store: Arc<InMemoryRecordStore>,
    pub clock: Arc<ManualClock>,
    pub graph_id: GraphId,
}

/// Harness with one seeded synthetic graph, `graph-1`
pub fn setup_service(config: CloneConfig, n_entities: usize, n_edges: usize) -> TestHarness {
    let store = Arc::new(InMemoryRecordStore::new());
    let graph_id = GraphId::from("graph-1");
    let (entities, edges) = synthetic_graph(n_entities, n_edges, 7);
    seed_graph(&store, &config.collections, &graph_id, &entities, &edges);

    let clock = Arc::new(ManualClock::starting_now());
    let service = GraphCloneService::new(config, store.clone())
        .unwrap()
        .with_clock(clock.clone());

    TestHarness {
        service: Arc::new(service),
        store,
        clock,
        graph_id,
    }
}

/// Graph source serving fixed rows for every graph id
#[derive(Debug, Clone, Default)]
pub struct StaticGraphSource {
    pub entities: Vec<SourceEntity>,
    pub edges: Vec<SourceEdge>,
}

impl StaticGraphSource {
    pub fn new(entities: Vec<SourceEntity>, edges: Vec<SourceEdge>) -> Self {
        Self { entities, edges }
    }
}

#[async_trait::async_trait]
impl GraphSource for StaticGraphSource {
    async fn fetch_entities(&self, _graph_id: &GraphId) -> Result<Vec<SourceEntity>, CloneError> {
        Ok(self.entities.clone())
    }

    async fn fetch_edges(&self, _graph_id: &GraphId) -> Result<Vec<SourceEdge>, CloneError> {
        Ok(self.edges.clone())
    }
}

/// Check a service-level error for `NotFound`
pub fn assert_not_found<T: std::fmt::Debug>(result: Result<T, CloneError>) {
    match result {
        Err(err) => assert!(err.is_not_found(), "expected NotFound, got {err:?}"),
        Ok(value) => panic!("expected NotFound, got Ok({value:?})"),
    }
}
