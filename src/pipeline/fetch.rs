//! Fetch pipeline: remote query → cache merge → materialized result.
//!
//! Object-returning fetches run remotely and merge every returned payload
//! into both cache tiers before handing ordered local identifiers back to
//! the caller. Identifier-only, count and projection fetches skip the
//! remote tier entirely and answer from the durable cache, trading full
//! freshness for latency and for availability when the remote tier is
//! unreachable.

use crate::identity::IdentityTranslator;
use crate::models::{
    bookkeeping, AttributeMap, AttributeValue, CacheEntry, EntityDescription, FetchRequest,
    FetchResult, LocalId, ResultShape, Schema,
};
use crate::remote::{RemoteGateway, RemoteObject, RemoteQuery};
use crate::row_cache::RowCache;
use crate::storage::DurableCache;
use crate::{Error, Result};
use std::sync::Arc;

/// Executes fetch requests against the remote tier and the caches.
pub struct FetchPipeline {
    schema: Arc<Schema>,
    translator: IdentityTranslator,
    gateway: Arc<dyn RemoteGateway>,
    durable: Arc<dyn DurableCache>,
    row_cache: Arc<RowCache>,
}

impl FetchPipeline {
    /// Creates a fetch pipeline over the shared store components.
    #[must_use]
    pub fn new(
        schema: Arc<Schema>,
        gateway: Arc<dyn RemoteGateway>,
        durable: Arc<dyn DurableCache>,
        row_cache: Arc<RowCache>,
    ) -> Self {
        let translator = IdentityTranslator::new(Arc::clone(&schema));
        Self {
            schema,
            translator,
            gateway,
            durable,
            row_cache,
        }
    }

    /// Executes a fetch request, dispatching on its declared result shape.
    ///
    /// # Errors
    ///
    /// - [`Error::SchemaMismatch`] when the entity is not declared.
    /// - [`Error::RemoteUnavailable`] / [`Error::RemoteRejected`] for
    ///   object-returning fetches that fail remotely.
    /// - [`Error::CacheCorruption`] when the durable cache fails.
    pub async fn execute(&self, request: &FetchRequest) -> Result<FetchResult> {
        match &request.shape {
            ResultShape::Objects => self.fetch_objects(request).await.map(FetchResult::Objects),
            ResultShape::Identifiers => self.fetch_identifiers(request).map(FetchResult::Identifiers),
            ResultShape::Count => self
                .durable
                .count(&request.entity, &request.predicate)
                .map(FetchResult::Count),
            ResultShape::Projection(attributes) => self
                .fetch_projection(request, attributes)
                .map(FetchResult::Projection),
        }
    }

    /// Merges one remote payload into both cache tiers and returns its
    /// local identifier. Shared with the save pipeline and background
    /// materialization.
    ///
    /// The durable cache is the last-write-wins arbiter: when it reports
    /// the payload stale (an equal-or-older `updatedAt` than the stored
    /// row), the node is refreshed from the durable row instead, so both
    /// tiers keep serving the newer attribute set whatever the delivery
    /// order.
    ///
    /// # Errors
    ///
    /// [`Error::CacheCorruption`] when the durable upsert fails,
    /// [`Error::InvalidInput`] for payloads without a server id.
    pub fn merge_remote_object(&self, entity: &str, object: &RemoteObject) -> Result<LocalId> {
        let (id, values, written) = self.upsert_durable_only(entity, object)?;
        if written {
            // New identifiers get a placeholder that is immediately
            // completed; already-registered ones are refreshed in place.
            self.row_cache.apply(&id, values);
            return Ok(id);
        }

        metrics::counter!("fetch_stale_merges_total").increment(1);
        match self.durable.get(entity, &object.server_id)? {
            Some(entry) => self.row_cache.apply(&id, entry.values),
            // The row vanished between the probe and this read (concurrent
            // delete); the incoming payload is the best remaining snapshot.
            None => self.row_cache.apply(&id, values),
        }
        Ok(id)
    }

    /// Upserts one remote payload into the durable cache without touching
    /// the row cache; used when the owning identifier was evicted while a
    /// fetch was in flight. The final `bool` is false when the durable
    /// cache skipped the write as stale.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`FetchPipeline::merge_remote_object`].
    pub fn upsert_durable_only(
        &self,
        entity: &str,
        object: &RemoteObject,
    ) -> Result<(LocalId, AttributeMap, bool)> {
        let description = self.schema.entity(entity)?;
        let id = self.translator.identifier_for(entity, &object.server_id)?;
        let values = filter_remote_values(description, &object.values);

        let entry = CacheEntry {
            entity: description.name.clone(),
            server_id: object.server_id.clone(),
            created_at: object.created_at,
            updated_at: object.updated_at,
            values: values.clone(),
        };
        let written = self.durable.upsert(&entry)?;
        Ok((id, values, written))
    }

    async fn fetch_objects(&self, request: &FetchRequest) -> Result<Vec<LocalId>> {
        let class_name = self.translator.remote_class_for(&request.entity)?.to_string();
        let query = RemoteQuery {
            predicate: request.predicate.clone(),
            sort: request.sort.clone(),
            skip: request.offset,
            limit: request.limit,
        };

        tracing::debug!(entity = %request.entity, class = %class_name, "running remote fetch");
        metrics::counter!("fetch_remote_total").increment(1);
        let objects = self.gateway.find(&class_name, query).await?;

        let mut ids = Vec::with_capacity(objects.len());
        for object in &objects {
            ids.push(self.merge_remote_object(&request.entity, object)?);
        }
        tracing::debug!(entity = %request.entity, merged = ids.len(), "remote fetch merged");
        Ok(ids)
    }

    fn fetch_identifiers(&self, request: &FetchRequest) -> Result<Vec<LocalId>> {
        let entries = self.durable.query(
            &request.entity,
            &request.predicate,
            &request.sort,
            request.offset,
            request.limit,
        )?;
        entries
            .iter()
            .map(|entry| {
                self.translator
                    .identifier_for(&request.entity, &entry.server_id)
            })
            .collect()
    }

    fn fetch_projection(
        &self,
        request: &FetchRequest,
        attributes: &[String],
    ) -> Result<Vec<AttributeMap>> {
        let description = self.schema.entity(&request.entity)?;
        for name in attributes {
            let declared = name == bookkeeping::OBJECT_ID
                || name == bookkeeping::CREATED_AT
                || name == bookkeeping::UPDATED_AT
                || description.attributes.contains_key(name)
                || description.relationships.contains_key(name);
            if !declared {
                return Err(Error::InvalidInput(format!(
                    "cannot project undeclared attribute '{name}' of entity '{}'",
                    request.entity
                )));
            }
        }

        let entries = self.durable.query(
            &request.entity,
            &request.predicate,
            &request.sort,
            request.offset,
            request.limit,
        )?;
        Ok(entries
            .into_iter()
            .map(|entry| project_entry(&entry, attributes))
            .collect())
    }
}

/// Keeps only attribute keys the entity declares, dropping unknown keys and
/// kind mismatches with a warning instead of failing the whole merge.
/// Remote payloads are outside the caller's control; save-path input is
/// validated strictly instead.
fn filter_remote_values(entity: &EntityDescription, values: &AttributeMap) -> AttributeMap {
    let mut filtered = AttributeMap::new();
    for (name, value) in values {
        let mut single = AttributeMap::new();
        single.insert(name.clone(), value.clone());
        if entity.validate_values(&single).is_ok() {
            filtered.insert(name.clone(), value.clone());
        } else {
            tracing::warn!(
                entity = %entity.name,
                attribute = %name,
                "dropping remote value the schema does not accept"
            );
            metrics::counter!("fetch_dropped_values_total").increment(1);
        }
    }
    filtered
}

fn project_entry(entry: &CacheEntry, attributes: &[String]) -> AttributeMap {
    let mut projected = AttributeMap::new();
    for name in attributes {
        let value = match name.as_str() {
            bookkeeping::OBJECT_ID => AttributeValue::Text(entry.server_id.clone()),
            bookkeeping::CREATED_AT => AttributeValue::Date(entry.created_at),
            bookkeeping::UPDATED_AT => AttributeValue::Date(entry.updated_at),
            _ => entry
                .values
                .get(name)
                .cloned()
                .unwrap_or(AttributeValue::Null),
        };
        projected.insert(name.clone(), value);
    }
    projected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeKind;

    fn band_entity() -> EntityDescription {
        EntityDescription::new("Band")
            .with_attribute("name", AttributeKind::Text)
            .with_relationship("label", "Label", false)
    }

    #[test]
    fn test_filter_remote_values_drops_unknown() {
        let mut values = AttributeMap::new();
        values.insert("name".to_string(), AttributeValue::Text("Pixies".into()));
        values.insert("genre".to_string(), AttributeValue::Text("rock".into()));
        values.insert("name2".to_string(), AttributeValue::Integer(3));

        let filtered = filter_remote_values(&band_entity(), &values);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("name"));
    }

    #[test]
    fn test_filter_remote_values_drops_kind_mismatch() {
        let mut values = AttributeMap::new();
        values.insert("name".to_string(), AttributeValue::Integer(7));

        let filtered = filter_remote_values(&band_entity(), &values);
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_project_entry_includes_bookkeeping() {
        let entry = CacheEntry {
            entity: "Band".to_string(),
            server_id: "xK91aa".to_string(),
            created_at: chrono::DateTime::from_timestamp_millis(1_000).unwrap(),
            updated_at: chrono::DateTime::from_timestamp_millis(2_000).unwrap(),
            values: AttributeMap::new(),
        };
        let projected = project_entry(
            &entry,
            &["objectId".to_string(), "name".to_string()],
        );
        assert_eq!(
            projected.get("objectId"),
            Some(&AttributeValue::Text("xK91aa".into()))
        );
        assert_eq!(projected.get("name"), Some(&AttributeValue::Null));
    }
}
