//! Entity schema descriptions supplied by the access layer.
//!
//! The schema names each entity's attributes and relationships and maps the
//! entity onto a remote class name. Dynamic attribute payloads are validated
//! against it at the store boundary so the rest of the core can trust typed
//! values.

use super::{AttributeMap, AttributeValue};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared type of an entity attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Real,
    /// Boolean.
    Boolean,
    /// Point in time.
    Date,
    /// Opaque binary payload.
    Blob,
}

/// A named relationship to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescription {
    /// Relationship name.
    pub name: String,
    /// Destination entity name.
    pub destination: String,
    /// Whether the relationship is to-many.
    ///
    /// To-many relationships are never traversed eagerly; the access layer
    /// issues a filtered fetch by foreign-key predicate instead.
    pub to_many: bool,
}

/// Description of one entity: attributes, relationships and the remote class
/// it synchronizes with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescription {
    /// Entity name as the access layer knows it.
    pub name: String,
    /// Explicit remote class name; `None` falls back to the entity name.
    pub remote_class: Option<String>,
    /// Attribute name → declared kind.
    pub attributes: BTreeMap<String, AttributeKind>,
    /// Relationship name → description.
    pub relationships: BTreeMap<String, RelationshipDescription>,
}

impl EntityDescription {
    /// Creates an entity description with no attributes or relationships.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote_class: None,
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Sets the remote class name this entity synchronizes with.
    #[must_use]
    pub fn with_remote_class(mut self, class_name: impl Into<String>) -> Self {
        self.remote_class = Some(class_name.into());
        self
    }

    /// Declares an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.insert(name.into(), kind);
        self
    }

    /// Declares a relationship.
    #[must_use]
    pub fn with_relationship(
        mut self,
        name: impl Into<String>,
        destination: impl Into<String>,
        to_many: bool,
    ) -> Self {
        let name = name.into();
        self.relationships.insert(
            name.clone(),
            RelationshipDescription {
                name,
                destination: destination.into(),
                to_many,
            },
        );
        self
    }

    /// Returns the remote class name, falling back to the entity name when
    /// no explicit mapping was configured.
    #[must_use]
    pub fn remote_class(&self) -> &str {
        self.remote_class.as_deref().unwrap_or(&self.name)
    }

    /// Looks up a relationship by name.
    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescription> {
        self.relationships.get(name)
    }

    /// Validates a dynamic attribute payload against this entity.
    ///
    /// Unknown keys and kind mismatches are rejected; `Null` is accepted for
    /// any declared attribute or relationship. Relationship keys must carry
    /// [`AttributeValue::Reference`] values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the offending attribute.
    pub fn validate_values(&self, values: &AttributeMap) -> Result<()> {
        for (name, value) in values {
            if value.is_null() {
                continue;
            }
            if let Some(kind) = self.attributes.get(name) {
                if !kind_matches(*kind, value) {
                    return Err(Error::InvalidInput(format!(
                        "attribute '{name}' of entity '{}' does not accept {value:?}",
                        self.name
                    )));
                }
            } else if self.relationships.contains_key(name) {
                if !matches!(value, AttributeValue::Reference { .. }) {
                    return Err(Error::InvalidInput(format!(
                        "relationship '{name}' of entity '{}' requires a reference value",
                        self.name
                    )));
                }
            } else {
                return Err(Error::InvalidInput(format!(
                    "entity '{}' declares no attribute or relationship '{name}'",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

const fn kind_matches(kind: AttributeKind, value: &AttributeValue) -> bool {
    matches!(
        (kind, value),
        (AttributeKind::Text, AttributeValue::Text(_))
            | (AttributeKind::Integer, AttributeValue::Integer(_))
            | (AttributeKind::Real, AttributeValue::Real(_))
            | (AttributeKind::Boolean, AttributeValue::Boolean(_))
            | (AttributeKind::Date, AttributeValue::Date(_))
            | (AttributeKind::Blob, AttributeValue::Blob(_))
    )
}

/// The full schema: every entity the store manages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    entities: BTreeMap<String, EntityDescription>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity description.
    #[must_use]
    pub fn with_entity(mut self, entity: EntityDescription) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Looks up an entity description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] for entities the schema does not
    /// declare. Detected at the first fetch of the entity.
    pub fn entity(&self, name: &str) -> Result<&EntityDescription> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::SchemaMismatch(format!("unknown entity '{name}'")))
    }

    /// Iterates over all entity descriptions.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDescription> {
        self.entities.values()
    }
}
