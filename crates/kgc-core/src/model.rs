//! Graph rows: source entities/edges and their cloned counterparts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form key/value payload of an entity or edge
pub type Attributes = Map<String, Value>;

/// Entity as read from the parent graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntity {
    /// Original entity id
    pub id: String,
    /// Ontology type name
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Entity attributes
    #[serde(default)]
    pub attributes: Attributes,
}

impl SourceEntity {
    /// Create new entity
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            attributes: Attributes::new(),
        }
    }

    /// With attribute
    #[inline]
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Edge as read from the parent graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEdge {
    /// Original edge id
    pub id: String,
    /// Relationship type name
    #[serde(rename = "type")]
    pub edge_type: String,
    /// Original id of the source entity
    pub from_entity_id: String,
    /// Original id of the target entity
    pub to_entity_id: String,
    /// Edge properties
    #[serde(default)]
    pub properties: Attributes,
}

impl SourceEdge {
    /// Create new edge
    #[inline]
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        edge_type: impl Into<String>,
        from_entity_id: impl Into<String>,
        to_entity_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            edge_type: edge_type.into(),
            from_entity_id: from_entity_id.into(),
            to_entity_id: to_entity_id.into(),
            properties: Attributes::new(),
        }
    }

    /// With property
    #[inline]
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// One recorded edit of a cloned row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    /// Field that changed
    pub field: String,
    /// Previous value (`None` if the field did not exist)
    pub old_value: Option<Value>,
    /// New value
    pub new_value: Value,
    /// When the edit was made
    pub timestamp: DateTime<Utc>,
}

/// Duplicated entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClonedEntity {
    /// `clone_id::original_id`
    pub id: String,
    /// Id in the parent graph
    pub original_id: String,
    /// Owning clone
    pub clone_id: String,
    /// Ontology type name
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Shallow copy of the source attributes
    pub attributes: Attributes,
    /// Set once any edit touches this copy
    pub is_modified: bool,
    /// Created in the clone, with no counterpart in the parent graph
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_added: bool,
    /// Edits applied to this copy, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifications: Vec<Modification>,
}

impl ClonedEntity {
    /// Apply an attribute edit and record it
    pub fn apply(&mut self, field: &str, value: Value, at: DateTime<Utc>) -> Modification {
        let old_value = self.attributes.insert(field.to_string(), value.clone());
        let modification = Modification {
            field: field.to_string(),
            old_value,
            new_value: value,
            timestamp: at,
        };
        self.is_modified = true;
        self.modifications.push(modification.clone());
        modification
    }
}

/// Duplicated edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClonedEdge {
    /// `clone_id::original_id`
    pub id: String,
    /// Id in the parent graph
    pub original_id: String,
    /// Owning clone
    pub clone_id: String,
    /// Relationship type name
    #[serde(rename = "type")]
    pub edge_type: String,
    /// Cloned source entity id (`clone_id::original_from`)
    pub from_entity_id: String,
    /// Cloned target entity id (`clone_id::original_to`)
    pub to_entity_id: String,
    /// Shallow copy of the source properties
    pub properties: Attributes,
    /// Set once any edit touches this copy
    pub is_modified: bool,
    /// Created in the clone, with no counterpart in the parent graph
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_added: bool,
    /// Edits applied to this copy, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifications: Vec<Modification>,
}

impl ClonedEdge {
    /// Apply a property edit and record it
    pub fn apply(&mut self, field: &str, value: Value, at: DateTime<Utc>) -> Modification {
        let old_value = self.properties.insert(field.to_string(), value.clone());
        let modification = Modification {
            field: field.to_string(),
            old_value,
            new_value: value,
            timestamp: at,
        };
        self.is_modified = true;
        self.modifications.push(modification.clone());
        modification
    }
}

/// Size of a clone, fixed at creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSize {
    /// Number of duplicated entities
    pub entity_count: usize,
    /// Number of duplicated edges
    pub edge_count: usize,
    /// Length of the serialized entities + edges payload
    pub byte_size: usize,
}

/// Clone lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneStatus {
    /// Assembled but not yet registered
    Pending,
    /// Holds the parent graph's slot
    Active,
    /// Accepted by the caller (terminal)
    Committed,
    /// Discarded (terminal)
    Rejected,
}

impl CloneStatus {
    /// Terminal states never change again
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Rejected)
    }
}

impl std::fmt::Display for CloneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}
