//! Data models for increstore.
//!
//! This module contains the core data structures shared across the store:
//! identifiers, attribute values, schema descriptions and request types.

mod identity;
mod request;
mod schema;
mod value;

pub use identity::{LocalId, RemoteId};
pub use request::{
    CompareOp, FetchRequest, FetchResult, NewObject, Predicate, ResultShape, SaveRequest,
    SaveResult, SortKey, UpdatedObject,
};
pub use schema::{AttributeKind, EntityDescription, RelationshipDescription, Schema};
pub use value::{AttributeMap, AttributeValue, CacheEntry, ValueNode};

/// Reserved bookkeeping attribute names of the augmented cache schema.
///
/// Every durable cache row carries these alongside the entity's own
/// attributes; entity schemas must not redeclare them.
pub mod bookkeeping {
    /// Server-assigned object id.
    pub const OBJECT_ID: &str = "objectId";
    /// Remote creation timestamp.
    pub const CREATED_AT: &str = "createdAt";
    /// Remote last-update timestamp.
    pub const UPDATED_AT: &str = "updatedAt";
}
