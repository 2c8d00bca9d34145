//! Operation journal entries
//!
//! Operations record what a caller attempted against a clone. They are an
//! audit trail; nothing ever re-executes them.

use crate::model::Attributes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What was attempted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OperationKind {
    /// New entity in the clone
    AddEntity {
        /// Id the entity is known by in the clone's parent id space
        entity_id: String,
        /// Ontology type name
        entity_type: String,
        /// Initial attributes
        attributes: Attributes,
    },
    /// Attribute change on an entity
    UpdateEntity {
        /// Original entity id
        entity_id: String,
        /// Field name
        field: String,
        /// New value
        value: Value,
    },
    /// Entity removal
    DeleteEntity {
        /// Original entity id
        entity_id: String,
    },
    /// New edge in the clone
    AddEdge {
        /// Id the edge is known by in the clone's parent id space
        edge_id: String,
        /// Relationship type name
        edge_type: String,
        /// Original source entity id
        from_entity_id: String,
        /// Original target entity id
        to_entity_id: String,
    },
    /// Property change on an edge
    UpdateEdge {
        /// Original edge id
        edge_id: String,
        /// Field name
        field: String,
        /// New value
        value: Value,
    },
    /// Edge removal
    DeleteEdge {
        /// Original edge id
        edge_id: String,
    },
    /// Unstructured content ingested into the clone for impact assessment
    AddEpisode {
        /// Episode body
        content: String,
        /// Where it came from (`text`, `json`, `message`, ...)
        source: String,
    },
}

impl OperationKind {
    /// Snake-case method name, as serialized
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::AddEntity { .. } => "add_entity",
            Self::UpdateEntity { .. } => "update_entity",
            Self::DeleteEntity { .. } => "delete_entity",
            Self::AddEdge { .. } => "add_edge",
            Self::UpdateEdge { .. } => "update_edge",
            Self::DeleteEdge { .. } => "delete_edge",
            Self::AddEpisode { .. } => "add_episode",
        }
    }
}

/// One journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// What was attempted
    #[serde(flatten)]
    pub kind: OperationKind,
    /// When it was recorded
    pub timestamp: DateTime<Utc>,
}

impl Operation {
    /// Create operation stamped now
    #[inline]
    #[must_use]
    pub fn new(kind: OperationKind) -> Self {
        Self::at(kind, Utc::now())
    }

    /// Create operation with explicit timestamp
    #[inline]
    #[must_use]
    pub fn at(kind: OperationKind, timestamp: DateTime<Utc>) -> Self {
        Self { kind, timestamp }
    }

    /// Shorthand for an entity attribute update
    #[must_use]
    pub fn update_entity(
        entity_id: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self::new(OperationKind::UpdateEntity {
            entity_id: entity_id.into(),
            field: field.into(),
            value: value.into(),
        })
    }

    /// Shorthand for an entity removal
    #[must_use]
    pub fn delete_entity(entity_id: impl Into<String>) -> Self {
        Self::new(OperationKind::DeleteEntity {
            entity_id: entity_id.into(),
        })
    }

    /// Shorthand for an edge removal
    #[must_use]
    pub fn delete_edge(edge_id: impl Into<String>) -> Self {
        Self::new(OperationKind::DeleteEdge {
            edge_id: edge_id.into(),
        })
    }

    /// Shorthand for an episode ingestion
    #[must_use]
    pub fn add_episode(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(OperationKind::AddEpisode {
            content: content.into(),
            source: source.into(),
        })
    }

    /// Method name of the wrapped kind
    #[inline]
    #[must_use]
    pub fn method(&self) -> &'static str {
        self.kind.method()
    }
}
