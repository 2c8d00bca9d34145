//! Parent graph reads
//!
//! The duplicator only needs two reads from the parent graph: all of its
//! entities and all of its edges. [`RecordStoreGraphSource`] serves them from
//! the record store, where parent rows carry a `graph_id` field.

use crate::config::Collections;
use crate::error::CloneError;
use crate::ids::GraphId;
use crate::model::{SourceEdge, SourceEntity};
use kgc_store::{ListFilter, Record, RecordStore};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Field on parent rows naming their graph
pub const GRAPH_ID_FIELD: &str = "graph_id";

/// Read access to parent graphs
#[async_trait::async_trait]
pub trait GraphSource: Send + Sync + std::fmt::Debug {
    /// Every entity of the graph
    async fn fetch_entities(&self, graph_id: &GraphId) -> Result<Vec<SourceEntity>, CloneError>;

    /// Every edge of the graph
    async fn fetch_edges(&self, graph_id: &GraphId) -> Result<Vec<SourceEdge>, CloneError>;
}

/// Graph source backed by `list_many`
#[derive(Debug, Clone)]
pub struct RecordStoreGraphSource {
    store: Arc<dyn RecordStore>,
    entities: String,
    edges: String,
}

impl RecordStoreGraphSource {
    /// Read from the configured source collections
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, collections: &Collections) -> Self {
        Self {
            store,
            entities: collections.source_entities.clone(),
            edges: collections.source_edges.clone(),
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        collection: &str,
        graph_id: &GraphId,
    ) -> Result<Vec<T>, CloneError> {
        let filter = ListFilter::field_equals(GRAPH_ID_FIELD, graph_id.as_str());
        let records = self.store.list_many(collection, &filter).await?;
        records.into_iter().map(decode).collect()
    }
}

fn decode<T: DeserializeOwned>(record: Record) -> Result<T, CloneError> {
    let mut data = record.data;
    // The record id is authoritative even if the body omits it
    if let Some(body) = data.as_object_mut() {
        body.entry("id")
            .or_insert_with(|| serde_json::Value::String(record.id.clone()));
    }
    Ok(serde_json::from_value(data)?)
}

#[async_trait::async_trait]
impl GraphSource for RecordStoreGraphSource {
    async fn fetch_entities(&self, graph_id: &GraphId) -> Result<Vec<SourceEntity>, CloneError> {
        self.fetch(&self.entities, graph_id).await
    }

    async fn fetch_edges(&self, graph_id: &GraphId) -> Result<Vec<SourceEdge>, CloneError> {
        self.fetch(&self.edges, graph_id).await
    }
}

/// Encode a parent entity as a source-collection record
///
/// # Errors
/// JSON encoding failure
pub fn entity_record(graph_id: &GraphId, entity: &SourceEntity) -> Result<Record, CloneError> {
    tagged_record(graph_id, &entity.id, entity)
}

/// Encode a parent edge as a source-collection record
///
/// # Errors
/// JSON encoding failure
pub fn edge_record(graph_id: &GraphId, edge: &SourceEdge) -> Result<Record, CloneError> {
    tagged_record(graph_id, &edge.id, edge)
}

fn tagged_record<T: serde::Serialize>(
    graph_id: &GraphId,
    id: &str,
    row: &T,
) -> Result<Record, CloneError> {
    let mut record = Record::from_serialize(id, row)?;
    if let Some(body) = record.data.as_object_mut() {
        body.insert(
            GRAPH_ID_FIELD.to_string(),
            serde_json::Value::String(graph_id.to_string()),
        );
    }
    Ok(record)
}
