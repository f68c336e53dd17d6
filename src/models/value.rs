//! Attribute values and materialized value nodes.

use super::LocalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from attribute name to its tagged value.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// A tagged attribute value.
///
/// Attribute dictionaries from the remote tier are dynamic; values are
/// validated against the entity schema at the boundary and carried as this
/// variant throughout the core. Remote file payloads arrive flattened to
/// their URL and are represented as [`AttributeValue::Text`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// UTF-8 text.
    Text(String),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// Boolean.
    Boolean(bool),
    /// Point in time.
    Date(DateTime<Utc>),
    /// Opaque binary payload.
    Blob(Vec<u8>),
    /// Pointer to another remote object: destination class and server id.
    Reference {
        /// Remote class of the referenced object.
        class_name: String,
        /// Server id of the referenced object.
        server_id: String,
    },
    /// Explicit null.
    Null,
}

impl AttributeValue {
    /// Returns the text content if this is a `Text` value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for [`AttributeValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Materialized (possibly partial) attribute snapshot for one local
/// identifier.
///
/// `complete == false` means only identity and bookkeeping fields are known
/// and the full attribute set is pending a remote fetch; the access layer
/// may still read the node and will be notified when materialization
/// finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueNode {
    /// The identifier this node materializes.
    pub id: LocalId,
    /// Attribute name → value, as last merged.
    pub values: AttributeMap,
    /// Monotonic version, bumped on every merge.
    pub version: u64,
    /// Whether the full attribute set has been loaded.
    pub complete: bool,
}

impl ValueNode {
    /// Creates an empty placeholder node for an identifier.
    #[must_use]
    pub const fn placeholder(id: LocalId) -> Self {
        Self {
            id,
            values: BTreeMap::new(),
            version: 1,
            complete: false,
        }
    }

    /// Merges a fresh attribute payload into the node and marks it complete.
    pub fn merge(&mut self, values: AttributeMap) {
        self.values = values;
        self.version += 1;
        self.complete = true;
    }
}

/// One row of the durable cache: the entity's attributes plus the remote
/// bookkeeping fields.
///
/// Created when an object is first fetched or inserted, updated on every
/// successful save or merge, deleted only on confirmed remote deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Entity this row belongs to.
    pub entity: String,
    /// Server id of the mirrored remote object.
    pub server_id: String,
    /// Remote creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Remote last-update timestamp; drives last-write-wins merging.
    pub updated_at: DateTime<Utc>,
    /// The entity's attribute values.
    pub values: AttributeMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_incomplete() {
        let node = ValueNode::placeholder(LocalId::new("Band", "a1"));
        assert!(!node.complete);
        assert!(node.values.is_empty());
        assert_eq!(node.version, 1);
    }

    #[test]
    fn test_merge_marks_complete_and_bumps_version() {
        let mut node = ValueNode::placeholder(LocalId::new("Band", "a1"));
        let mut values = AttributeMap::new();
        values.insert("name".to_string(), AttributeValue::Text("Pixies".into()));

        node.merge(values.clone());

        assert!(node.complete);
        assert_eq!(node.version, 2);
        assert_eq!(node.values, values);
    }

    #[test]
    fn test_attribute_value_serde_round_trip() {
        let value = AttributeValue::Reference {
            class_name: "Band".to_string(),
            server_id: "xK91aa".to_string(),
        };
        let json = serde_json::to_string(&value).unwrap();
        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);
    }
}
