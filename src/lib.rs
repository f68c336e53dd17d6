//! # Increstore
//!
//! Incremental persistence backend bridging a remote object store to local,
//! faultable caches.
//!
//! Increstore makes a hosted document/object database reachable only through
//! network queries look like a local, queryable store to an object-graph
//! access layer. Fetches run against the remote tier and merge into two
//! local caches; object values are materialized lazily ("faulting") and a
//! completion notification is published once a partial object finishes
//! loading in the background.
//!
//! ## Architecture
//!
//! - **Identity translation**: stable local identifiers derived
//!   deterministically from remote server ids, no lookup table.
//! - **Row cache**: in-memory, reference-counted cache of materialized
//!   value nodes, bounded by what the access layer holds in active use.
//! - **Durable cache**: `SQLite`-backed mirror with an augmented schema
//!   (`objectId`/`createdAt`/`updatedAt` bookkeeping), answering
//!   identifier/count/projection queries without a round trip.
//! - **Fetch/save pipelines**: remote query → cache merge → ordered local
//!   identifiers; batched inserts/updates/deletes with remote confirmation
//!   before local commit.
//!
//! ## Example
//!
//! ```rust,ignore
//! use increstore::{FetchRequest, IncrementalStore, StoreConfig};
//!
//! let store = IncrementalStore::open(schema, gateway, &StoreConfig::default())?;
//! let result = store.execute_fetch(&FetchRequest::objects("Band").with_limit(20)).await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod events;
pub mod identity;
pub mod models;
pub mod pipeline;
pub mod relationship;
pub mod remote;
pub mod row_cache;
pub mod storage;
pub mod store;

// Re-exports for convenience
pub use config::StoreConfig;
pub use events::{EventBus, StoreEvent};
pub use identity::IdentityTranslator;
pub use models::{
    AttributeKind, AttributeMap, AttributeValue, CacheEntry, CompareOp, EntityDescription,
    FetchRequest, FetchResult, LocalId, NewObject, Predicate, RelationshipDescription, RemoteId,
    ResultShape, SaveRequest, SaveResult, Schema, SortKey, UpdatedObject, ValueNode,
};
pub use remote::{RemoteGateway, RemoteObject, RemoteQuery};
pub use row_cache::RowCache;
pub use storage::{DurableCache, SqliteDurableCache};
pub use store::IncrementalStore;

/// Error type for increstore operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `RemoteUnavailable` | Network/transport failure reaching the remote tier |
/// | `RemoteRejected` | The remote tier rejected a query or mutation (validation, auth) |
/// | `NotFound` | An object referenced by identifier no longer exists remotely |
/// | `CacheCorruption` | The durable cache failed to read or write |
/// | `SchemaMismatch` | An entity lacks a schema description or remote-class mapping |
/// | `InvalidInput` | Malformed request, empty server id, unsupported relationship shape |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The remote tier could not be reached.
    ///
    /// Raised when:
    /// - The transport reports a connection or timeout failure
    /// - An object-returning fetch cannot complete remotely
    ///
    /// Identifier-only, count and projection fetches fall back to the
    /// durable cache instead of surfacing this error.
    #[error("remote tier unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote tier rejected the request.
    ///
    /// Raised when:
    /// - Server-side validation fails for a create or update
    /// - Authentication or authorization is refused
    #[error("remote tier rejected request: {0}")]
    RemoteRejected(String),

    /// An object referenced by identifier no longer exists remotely.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The durable cache failed to read or write.
    ///
    /// Fatal to the affected cache instance, but operations that only touch
    /// the in-memory row cache keep working.
    #[error("durable cache operation '{operation}' failed: {cause}")]
    CacheCorruption {
        /// The cache operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// An entity lacks a schema description or remote-class mapping.
    ///
    /// A configuration error: detected at the first fetch of the entity and
    /// reported rather than retried.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A server id is empty where a persisted object is required
    /// - A to-many relationship is traversed eagerly
    /// - A request references an attribute the schema does not declare
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias using the increstore [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
