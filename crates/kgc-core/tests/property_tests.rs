use chrono::{Duration, TimeZone, Utc};
use kgc_core::ids::original_id_of;
use kgc_core::{
    CloneConfig, CloneId, CloneSize, CloneTransaction, Collections, Duplication,
    DuplicationReport, EntityEdgeDuplicator, ForwardOp, GraphClone, GraphId, SourceEdge,
    SourceEntity, TransactionError, TxnToken,
};
use kgc_store::{FaultPlan, InMemoryRecordStore, Record, StoreOp};
use proptest::collection::{hash_set, vec};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn empty_clone(created_at: chrono::DateTime<Utc>, ttl_seconds: u64) -> GraphClone {
    let duplication = Duplication {
        clone_id: CloneId::generate(),
        entities: Vec::new(),
        edges: Vec::new(),
        size: CloneSize::default(),
        report: DuplicationReport {
            token: TxnToken::acquire(),
            entity_batches: Vec::new(),
            edge_batches: Vec::new(),
            create_calls: 0,
            dangling_edges: Vec::new(),
        },
    };
    GraphClone::from_duplication(GraphId::from("g"), duplication, created_at, ttl_seconds)
}

proptest! {
    #[test]
    fn prop_derived_ids_are_injective(originals in hash_set("[a-z0-9:_-]{1,12}", 1..64)) {
        let clone_id = CloneId::generate();
        let derived: HashSet<String> = originals
            .iter()
            .map(|o| clone_id.derive_row_id(o))
            .collect();

        prop_assert_eq!(derived.len(), originals.len());
        for original in &originals {
            let row_id = clone_id.derive_row_id(original);
            prop_assert_eq!(original_id_of(clone_id.as_str(), &row_id), Some(original.as_str()));
        }
    }

    #[test]
    fn prop_no_dangling_edges(
        n_entities in 0usize..30,
        endpoints in vec((0usize..40, 0usize..40), 0..60),
        batch_size in 1usize..12,
    ) {
        let entities: Vec<_> = (0..n_entities)
            .map(|i| SourceEntity::new(format!("e{i}"), "Node"))
            .collect();
        let edges: Vec<_> = endpoints
            .iter()
            .enumerate()
            .map(|(i, (from, to))| {
                SourceEdge::new(format!("r{i}"), "LINK", format!("e{from}"), format!("e{to}"))
            })
            .collect();
        let expected_dangling = endpoints
            .iter()
            .filter(|(from, to)| *from >= n_entities || *to >= n_entities)
            .count();

        let store = Arc::new(InMemoryRecordStore::new());
        let config = CloneConfig::default().with_batch_size(batch_size);
        let duplicator = EntityEdgeDuplicator::new(store.clone(), &config);
        let dup = runtime()
            .block_on(duplicator.duplicate(&CloneId::generate(), &entities, &edges))
            .unwrap();

        prop_assert_eq!(dup.report.dangling_edges.len(), expected_dangling);
        prop_assert_eq!(dup.edges.len() + expected_dangling, edges.len());

        let known: HashSet<&str> = dup.entities.iter().map(|e| e.id.as_str()).collect();
        for edge in &dup.edges {
            prop_assert!(known.contains(edge.from_entity_id.as_str()));
            prop_assert!(known.contains(edge.to_entity_id.as_str()));
        }
        prop_assert_eq!(store.count("cloned_edges"), dup.edges.len());

        let clone = GraphClone::from_duplication(GraphId::from("g"), dup, Utc::now(), 60);
        prop_assert!(clone.verify_referential_closure().is_empty());
    }

    #[test]
    fn prop_rollback_runs_completed_steps_in_reverse(
        (n, k) in (1usize..10).prop_flat_map(|n| (Just(n), 1..=n)),
    ) {
        let store = Arc::new(InMemoryRecordStore::new());
        store.set_faults(FaultPlan::none().fail_create_on(k));

        let mut tx = CloneTransaction::new(store.clone(), Collections::default(), 10);
        tx.begin();
        for step in 1..=n {
            let record = Record::new(format!("s{step}"), serde_json::json!({ "step": step }));
            tx.register(ForwardOp::PersistEntities(vec![record]));
        }

        let err = runtime().block_on(tx.commit()).unwrap_err();
        let failed_step = match err {
            TransactionError::StepFailed { step, .. } => step,
            other => return Err(TestCaseError::fail(format!("unexpected {other:?}"))),
        };
        prop_assert_eq!(failed_step, k);

        let undone: Vec<String> = store
            .calls_for(StoreOp::Delete)
            .into_iter()
            .flat_map(|c| c.ids)
            .collect();
        let expected: Vec<String> = (1..k).rev().map(|s| format!("s{s}")).collect();
        prop_assert_eq!(undone, expected);
        prop_assert_eq!(store.count("cloned_entities"), 0);
    }

    #[test]
    fn prop_staleness_is_monotonic(
        ttl in 0u64..100_000,
        earlier in 0i64..200_000,
        gap in 0i64..200_000,
    ) {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clone = empty_clone(created, ttl);
        let t1 = created + Duration::seconds(earlier);
        let t2 = t1 + Duration::seconds(gap);

        if clone.is_stale_at(t1) {
            prop_assert!(clone.is_stale_at(t2));
        }
        prop_assert_eq!(clone.is_stale_at(t1), earlier > i64::try_from(ttl).unwrap());
    }
}
