//! Relationship resolution from cached payloads.
//!
//! To-one relationship pointers arrive embedded in fetched payloads as
//! reference values; resolving one derives the target's local identifier
//! and lazily registers a placeholder node for it, all without a remote
//! call. When the owning payload is still incomplete the resolver reports
//! that instead of blocking, and the store triggers the usual background
//! materialization path.

use crate::identity::IdentityTranslator;
use crate::models::{AttributeValue, LocalId, Schema};
use crate::row_cache::RowCache;
use crate::storage::DurableCache;
use crate::{Error, Result};
use std::sync::Arc;

/// Outcome of a relationship lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The target's local identifier, registered in the row cache.
    Resolved(LocalId),
    /// The owner is materialized and the relationship is empty.
    Empty,
    /// The owner's payload is incomplete; resolution needs a remote fetch.
    OwnerIncomplete,
}

/// Resolves to-one relationships against the cache tiers.
pub struct RelationshipResolver {
    schema: Arc<Schema>,
    translator: IdentityTranslator,
    row_cache: Arc<RowCache>,
    durable: Arc<dyn DurableCache>,
}

impl RelationshipResolver {
    /// Creates a resolver over the shared store components.
    #[must_use]
    pub fn new(
        schema: Arc<Schema>,
        row_cache: Arc<RowCache>,
        durable: Arc<dyn DurableCache>,
    ) -> Self {
        let translator = IdentityTranslator::new(Arc::clone(&schema));
        Self {
            schema,
            translator,
            row_cache,
            durable,
        }
    }

    /// Resolves a named relationship of an owning object from its cached
    /// payload.
    ///
    /// # Errors
    ///
    /// - [`Error::SchemaMismatch`] for undeclared entities or relationships.
    /// - [`Error::InvalidInput`] for to-many relationships, which the access
    ///   layer resolves with a filtered fetch instead.
    pub fn resolve(&self, id: &LocalId, relationship: &str) -> Result<Resolution> {
        let entity = self.schema.entity(id.entity())?;
        let description = entity.relationship(relationship).ok_or_else(|| {
            Error::SchemaMismatch(format!(
                "entity '{}' declares no relationship '{relationship}'",
                entity.name
            ))
        })?;
        if description.to_many {
            return Err(Error::InvalidInput(format!(
                "relationship '{relationship}' is to-many; issue a filtered fetch instead"
            )));
        }

        let values = self.owner_values(id)?;
        let Some(values) = values else {
            return Ok(Resolution::OwnerIncomplete);
        };

        match values.get(relationship) {
            Some(AttributeValue::Reference { server_id, .. }) => {
                let target = self
                    .translator
                    .identifier_for(&description.destination, server_id)?;
                // Newly discovered targets get a placeholder node so the
                // access layer can fault them in later.
                let _ = self.row_cache.node_for(&target);
                tracing::debug!(owner = %id, %target, "resolved relationship");
                Ok(Resolution::Resolved(target))
            },
            _ => Ok(Resolution::Empty),
        }
    }

    /// Returns the owner's materialized values, from the row cache when
    /// complete, otherwise from the durable cache; `None` when neither tier
    /// has the full payload yet.
    fn owner_values(
        &self,
        id: &LocalId,
    ) -> Result<Option<crate::models::AttributeMap>> {
        let node = self.row_cache.node_for(id);
        if node.complete {
            return Ok(Some(node.values));
        }
        let Some(remote_id) = self.translator.remote_id_for(id)? else {
            return Ok(None);
        };
        match self.durable.get(id.entity(), remote_id.server_id()) {
            Ok(Some(entry)) => Ok(Some(entry.values)),
            Ok(None) => Ok(None),
            Err(error) => {
                // A corrupt durable cache must not take down lookups that
                // can still be answered after a remote refresh.
                tracing::warn!(%id, %error, "durable cache read failed during resolution");
                Ok(None)
            },
        }
    }
}
