//! Record and filter types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single document in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique id within the collection
    pub id: String,
    /// Document body
    pub data: Value,
}

impl Record {
    /// Create new record
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Build a record from any serializable value
    ///
    /// # Errors
    /// Returns error if `value` cannot be converted to JSON
    pub fn from_serialize<T: Serialize>(
        id: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(id, serde_json::to_value(value)?))
    }

    /// Top-level field lookup
    #[inline]
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// Filter for `list_many`
#[derive(Debug, Clone, PartialEq)]
pub enum ListFilter {
    /// Every record in the collection
    All,
    /// Only the listed ids (missing ids are skipped)
    Ids(Vec<String>),
    /// Records whose top-level `field` equals `value`
    FieldEquals {
        /// Field name
        field: String,
        /// Expected value
        value: Value,
    },
}

impl ListFilter {
    /// Shorthand for a top-level equality filter
    #[inline]
    #[must_use]
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check whether a record passes this filter
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.iter().any(|id| *id == record.id),
            Self::FieldEquals { field, value } => record.field(field) == Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_all_matches_everything() {
        let record = Record::new("a", json!({}));
        assert!(ListFilter::All.matches(&record));
    }

    #[test]
    fn filter_ids() {
        let record = Record::new("a", json!({}));
        assert!(ListFilter::Ids(vec!["a".into(), "b".into()]).matches(&record));
        assert!(!ListFilter::Ids(vec!["c".into()]).matches(&record));
    }

    #[test]
    fn filter_field_equals() {
        let record = Record::new("a", json!({"graph_id": "g1", "n": 3}));
        assert!(ListFilter::field_equals("graph_id", "g1").matches(&record));
        assert!(!ListFilter::field_equals("graph_id", "g2").matches(&record));
        assert!(ListFilter::field_equals("n", 3).matches(&record));
        assert!(!ListFilter::field_equals("missing", "x").matches(&record));
    }

    #[test]
    fn record_from_serialize() {
        #[derive(Serialize)]
        struct Row {
            name: &'static str,
        }
        let record = Record::from_serialize("r1", &Row { name: "x" }).unwrap();
        assert_eq!(record.field("name"), Some(&json!("x")));
    }
}
