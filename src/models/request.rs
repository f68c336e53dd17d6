//! Fetch and save request types consumed from the access layer.

use super::{AttributeMap, AttributeValue, LocalId};
use serde::{Deserialize, Serialize};

/// Comparison operator for a predicate leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// SQL-LIKE pattern match (`*` and `?` glob wildcards).
    Like,
}

/// Filter predicate over an entity's attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Matches every row.
    All,
    /// Compares one attribute against a constant.
    Compare {
        /// Attribute name.
        attribute: String,
        /// Comparison operator.
        op: CompareOp,
        /// Constant operand.
        value: AttributeValue,
    },
    /// All sub-predicates must match.
    And(Vec<Predicate>),
    /// Any sub-predicate must match.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Convenience equality comparison.
    #[must_use]
    pub fn eq(attribute: impl Into<String>, value: AttributeValue) -> Self {
        Self::Compare {
            attribute: attribute.into(),
            op: CompareOp::Eq,
            value,
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::All
    }
}

/// One sort key: attribute and direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Attribute to sort by.
    pub attribute: String,
    /// Ascending when true.
    pub ascending: bool,
}

impl SortKey {
    /// Ascending sort on an attribute.
    #[must_use]
    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ascending: true,
        }
    }

    /// Descending sort on an attribute.
    #[must_use]
    pub fn descending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ascending: false,
        }
    }
}

/// Declared shape of a fetch result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// Materialized objects: runs remotely and merges into the caches.
    Objects,
    /// Identifiers only: answered from the durable cache.
    Identifiers,
    /// Row count: answered from the durable cache.
    Count,
    /// Projected attribute dictionaries: answered from the durable cache.
    Projection(Vec<String>),
}

/// A fetch request: entity, filter, ordering, paging and result shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Entity to fetch.
    pub entity: String,
    /// Filter predicate.
    pub predicate: Predicate,
    /// Sort keys, applied in order.
    pub sort: Vec<SortKey>,
    /// Rows to skip.
    pub offset: usize,
    /// Maximum rows to return; `None` means unbounded.
    pub limit: Option<usize>,
    /// Requested result shape.
    pub shape: ResultShape,
}

impl FetchRequest {
    fn new(entity: impl Into<String>, shape: ResultShape) -> Self {
        Self {
            entity: entity.into(),
            predicate: Predicate::All,
            sort: Vec::new(),
            offset: 0,
            limit: None,
            shape,
        }
    }

    /// An object-returning fetch.
    #[must_use]
    pub fn objects(entity: impl Into<String>) -> Self {
        Self::new(entity, ResultShape::Objects)
    }

    /// An identifier-only fetch, served from the durable cache.
    #[must_use]
    pub fn identifiers(entity: impl Into<String>) -> Self {
        Self::new(entity, ResultShape::Identifiers)
    }

    /// A count fetch, served from the durable cache.
    #[must_use]
    pub fn count(entity: impl Into<String>) -> Self {
        Self::new(entity, ResultShape::Count)
    }

    /// A projection fetch over the named attributes, served from the durable
    /// cache.
    #[must_use]
    pub fn projection<I, S>(entity: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            entity,
            ResultShape::Projection(attributes.into_iter().map(Into::into).collect()),
        )
    }

    /// Sets the filter predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn with_sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    /// Sets the row offset.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the row limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of a fetch, matching the request's declared [`ResultShape`].
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Ordered identifiers of materialized objects.
    Objects(Vec<LocalId>),
    /// Ordered identifiers from the durable cache.
    Identifiers(Vec<LocalId>),
    /// Row count from the durable cache.
    Count(u64),
    /// Projected dictionaries from the durable cache.
    Projection(Vec<AttributeMap>),
}

impl FetchResult {
    /// Returns the identifier list for object or identifier shapes.
    #[must_use]
    pub fn ids(&self) -> Option<&[LocalId]> {
        match self {
            Self::Objects(ids) | Self::Identifiers(ids) => Some(ids),
            _ => None,
        }
    }
}

/// A not-yet-persisted object queued for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewObject {
    /// Entity of the new object.
    pub entity: String,
    /// Its current attribute values.
    pub values: AttributeMap,
}

impl NewObject {
    /// Creates a new-object description.
    #[must_use]
    pub const fn new(entity: String, values: AttributeMap) -> Self {
        Self { entity, values }
    }
}

/// A persisted object with pending attribute changes.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedObject {
    /// Identifier of the object to update.
    pub id: LocalId,
    /// Changed attributes only.
    pub changes: AttributeMap,
}

/// A batch of inserts, updates and deletes.
///
/// The save pipeline applies phases in order: inserts, then updates, then
/// deletes, matching the access layer's dependency ordering for new objects
/// that reference other new objects in the same batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveRequest {
    /// Objects to create remotely.
    pub inserts: Vec<NewObject>,
    /// Objects with attribute deltas to propagate.
    pub updates: Vec<UpdatedObject>,
    /// Objects to delete remotely.
    pub deletes: Vec<LocalId>,
}

impl SaveRequest {
    /// Creates an empty save request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an insert.
    #[must_use]
    pub fn with_insert(mut self, object: NewObject) -> Self {
        self.inserts.push(object);
        self
    }

    /// Queues an update.
    #[must_use]
    pub fn with_update(mut self, id: LocalId, changes: AttributeMap) -> Self {
        self.updates.push(UpdatedObject { id, changes });
        self
    }

    /// Queues a delete.
    #[must_use]
    pub fn with_delete(mut self, id: LocalId) -> Self {
        self.deletes.push(id);
        self
    }

    /// True when the batch contains no work.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Outcome of a completed save batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveResult {
    /// Identifiers assigned to the batch's inserts, in request order.
    pub inserted: Vec<LocalId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_request_builder() {
        let request = FetchRequest::objects("Band")
            .with_predicate(Predicate::eq(
                "name",
                AttributeValue::Text("Pixies".into()),
            ))
            .with_sort(SortKey::ascending("name"))
            .with_offset(0)
            .with_limit(20);

        assert_eq!(request.entity, "Band");
        assert_eq!(request.shape, ResultShape::Objects);
        assert_eq!(request.limit, Some(20));
        assert_eq!(request.sort.len(), 1);
    }

    #[test]
    fn test_save_request_is_empty() {
        assert!(SaveRequest::new().is_empty());

        let request = SaveRequest::new().with_delete(LocalId::new("Band", "a1"));
        assert!(!request.is_empty());
    }

    #[test]
    fn test_fetch_result_ids() {
        let ids = vec![LocalId::new("Band", "a1")];
        assert_eq!(FetchResult::Objects(ids.clone()).ids(), Some(ids.as_slice()));
        assert_eq!(FetchResult::Count(3).ids(), None);
    }
}
