//! Identifiers
//!
//! Clone ids are prefixed ULIDs so they can never be mistaken for graph or
//! entity ids. Rows inside a clone get ids derived from the clone id and the
//! original row id, never random ones.

use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

/// Prefix carried by every clone id
pub const CLONE_ID_PREFIX: &str = "clone_";

/// Separator between the clone id and the original id in derived row ids
pub const CLONED_ID_SEPARATOR: &str = "::";

/// Identifier of a parent graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(pub String);

impl GraphId {
    /// Create graph id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GraphId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for GraphId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unique clone identifier (`clone_` + ULID)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CloneId(String);

impl CloneId {
    /// Generate new clone id
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{CLONE_ID_PREFIX}{}", Ulid::new()))
    }

    /// Wrap an existing id string
    ///
    /// No prefix check is done; unknown ids simply never match a clone.
    #[inline]
    #[must_use]
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the id of a cloned row from its original id
    #[inline]
    #[must_use]
    pub fn derive_row_id(&self, original_id: &str) -> String {
        cloned_row_id(self.as_str(), original_id)
    }
}

impl std::fmt::Display for CloneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// `clone_id::original_id`
#[inline]
#[must_use]
pub fn cloned_row_id(clone_id: &str, original_id: &str) -> String {
    format!("{clone_id}{CLONED_ID_SEPARATOR}{original_id}")
}

/// Recover the original id from a derived row id
///
/// Returns `None` if `row_id` was not derived from `clone_id`.
#[inline]
#[must_use]
pub fn original_id_of<'a>(clone_id: &str, row_id: &'a str) -> Option<&'a str> {
    row_id
        .strip_prefix(clone_id)
        .and_then(|rest| rest.strip_prefix(CLONED_ID_SEPARATOR))
}

/// Correlation token held by a transaction between `begin` and release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnToken(pub Uuid);

impl TxnToken {
    /// Acquire fresh token
    #[inline]
    #[must_use]
    pub fn acquire() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TxnToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_id_has_prefix_and_is_unique() {
        let a = CloneId::generate();
        let b = CloneId::generate();
        assert!(a.as_str().starts_with(CLONE_ID_PREFIX));
        assert_ne!(a, b);
    }

    #[test]
    fn derived_row_id_format() {
        let id = CloneId::from_raw("clone_X");
        assert_eq!(id.derive_row_id("e1"), "clone_X::e1");
    }

    #[test]
    fn original_id_reverse_lookup() {
        assert_eq!(original_id_of("clone_X", "clone_X::e1"), Some("e1"));
        assert_eq!(original_id_of("clone_X", "clone_X::a::b"), Some("a::b"));
        assert_eq!(original_id_of("clone_X", "clone_Y::e1"), None);
        assert_eq!(original_id_of("clone_X", "clone_Xe1"), None);
    }

    #[test]
    fn graph_id_display() {
        assert_eq!(GraphId::from("g1").to_string(), "g1");
    }

    #[test]
    fn txn_tokens_differ() {
        assert_ne!(TxnToken::acquire(), TxnToken::acquire());
    }
}
