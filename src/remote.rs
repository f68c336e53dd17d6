//! Remote gateway contract.
//!
//! The gateway is the thin adapter to the remote object store's query and
//! mutation API. It is an external collaborator: the core only depends on
//! this trait, and tests script it with an in-process mock. All calls are
//! asynchronous; retry policy (backoff, attempt limits) belongs to the
//! gateway implementation or its caller, never to the core.

use crate::models::{AttributeMap, Predicate, SortKey};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Query parameters in the gateway's form, translated from a
/// [`crate::FetchRequest`] by the fetch pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteQuery {
    /// Filter predicate over remote fields.
    pub predicate: Predicate,
    /// Sort keys, applied in order.
    pub sort: Vec<SortKey>,
    /// Rows to skip.
    pub skip: usize,
    /// Maximum rows to return.
    pub limit: Option<usize>,
}

/// One object payload as returned by the remote tier.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    /// Server-assigned object id.
    pub server_id: String,
    /// Remote creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Remote last-update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Attribute values; relationship pointers arrive as
    /// [`crate::AttributeValue::Reference`].
    pub values: AttributeMap,
}

/// Adapter to the remote object store.
///
/// Mutations are idempotent by server id, which is what lets the save
/// pipeline settle for at-least-once semantics when a batch fails partway.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Runs a query against a remote class.
    ///
    /// # Errors
    ///
    /// [`crate::Error::RemoteUnavailable`] on transport failure,
    /// [`crate::Error::RemoteRejected`] when the server refuses the query.
    async fn find(&self, class_name: &str, query: RemoteQuery) -> Result<Vec<RemoteObject>>;

    /// Fetches one object by server id; `Ok(None)` when it no longer
    /// exists remotely.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`RemoteGateway::find`].
    async fn get(&self, class_name: &str, server_id: &str) -> Result<Option<RemoteObject>>;

    /// Creates an object remotely; the remote tier is authoritative for id
    /// assignment, so the returned payload carries the new server id.
    ///
    /// # Errors
    ///
    /// [`crate::Error::RemoteUnavailable`] or
    /// [`crate::Error::RemoteRejected`].
    async fn create(&self, class_name: &str, values: AttributeMap) -> Result<RemoteObject>;

    /// Propagates attribute deltas to an existing object and returns the
    /// refreshed payload.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] when the object was deleted remotely,
    /// otherwise the same failure modes as [`RemoteGateway::create`].
    async fn update(
        &self,
        class_name: &str,
        server_id: &str,
        changes: AttributeMap,
    ) -> Result<RemoteObject>;

    /// Deletes an object remotely. Deleting an already-deleted object is
    /// not an error.
    ///
    /// # Errors
    ///
    /// [`crate::Error::RemoteUnavailable`] or
    /// [`crate::Error::RemoteRejected`].
    async fn delete(&self, class_name: &str, server_id: &str) -> Result<()>;
}
