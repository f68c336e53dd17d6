//! Save pipeline: propagate a batch remotely, then commit locally.
//!
//! Phases run in order (inserts, updates, deletes) to match the access
//! layer's dependency ordering for new objects referencing other new
//! objects in the same batch. Local cache rows are only written after the
//! remote tier confirms, so a remote failure never leaves an optimistic
//! local commit behind. A failure aborts the batch; work already confirmed
//! in earlier sub-phases stays applied, which is acceptable because remote
//! mutations are idempotent by server id.

use crate::identity::IdentityTranslator;
use crate::models::{
    CacheEntry, LocalId, NewObject, SaveRequest, SaveResult, Schema, UpdatedObject,
};
use crate::remote::RemoteGateway;
use crate::row_cache::RowCache;
use crate::storage::DurableCache;
use crate::{Error, Result};
use std::sync::Arc;

/// Executes save batches against the remote tier and the caches.
pub struct SavePipeline {
    schema: Arc<Schema>,
    translator: IdentityTranslator,
    gateway: Arc<dyn RemoteGateway>,
    durable: Arc<dyn DurableCache>,
    row_cache: Arc<RowCache>,
}

impl SavePipeline {
    /// Creates a save pipeline over the shared store components.
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

    /// Applies a full batch: inserts, then updates, then deletes.
    ///
    /// # Errors
    ///
    /// The first failing item aborts the batch and its error is surfaced;
    /// earlier confirmed items are not rolled back.
    pub async fn execute(&self, request: &SaveRequest) -> Result<SaveResult> {
        let inserted = self.insert_objects(&request.inserts).await?;
        for update in &request.updates {
            self.apply_update(update).await?;
        }
        for id in &request.deletes {
            self.apply_delete(id).await?;
        }
        tracing::debug!(
            inserts = inserted.len(),
            updates = request.updates.len(),
            deletes = request.deletes.len(),
            "save batch confirmed"
        );
        Ok(SaveResult { inserted })
    }

    /// Creates a batch of new objects remotely and commits each confirmed
    /// one to the caches. This is also the permanent-identifier assignment
    /// path: the remote tier is authoritative for id assignment.
    ///
    /// # Errors
    ///
    /// A failing create aborts the remaining inserts and surfaces the
    /// error; nothing is written locally for the failed object.
    pub async fn insert_objects(&self, objects: &[NewObject]) -> Result<Vec<LocalId>> {
        let mut ids = Vec::with_capacity(objects.len());
        for object in objects {
            let entity = self.schema.entity(&object.entity)?;
            entity.validate_values(&object.values)?;

            let class_name = entity.remote_class().to_string();
            let created = self
                .gateway
                .create(&class_name, object.values.clone())
                .await?;
            metrics::counter!("save_inserts_total").increment(1);

            let id = self
                .translator
                .identifier_for(&object.entity, &created.server_id)?;

            // The remote echo may carry server-computed fields; submitted
            // values fill anything the echo omits.
            let mut values = object.values.clone();
            values.extend(created.values.clone());

            let entry = CacheEntry {
                entity: entity.name.clone(),
                server_id: created.server_id.clone(),
                created_at: created.created_at,
                updated_at: created.updated_at,
                values: values.clone(),
            };
            self.durable.upsert(&entry)?;
            self.row_cache.apply(&id, values);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn apply_update(&self, update: &UpdatedObject) -> Result<()> {
        let entity = self.schema.entity(update.id.entity())?;
        entity.validate_values(&update.changes)?;

        let remote_id = self.translator.remote_id_for(&update.id)?.ok_or_else(|| {
            Error::InvalidInput(format!(
                "cannot update '{}': object has no remote identifier",
                update.id
            ))
        })?;

        let refreshed = self
            .gateway
            .update(
                remote_id.class_name(),
                remote_id.server_id(),
                update.changes.clone(),
            )
            .await?;
        metrics::counter!("save_updates_total").increment(1);

        // Merge the delta over the previously cached row; the refreshed
        // updatedAt carries the row through the last-write-wins gate.
        let mut values = self
            .durable
            .get(update.id.entity(), remote_id.server_id())?
            .map(|entry| entry.values)
            .unwrap_or_default();
        values.extend(update.changes.clone());
        values.extend(refreshed.values.clone());

        let entry = CacheEntry {
            entity: entity.name.clone(),
            server_id: remote_id.server_id().to_string(),
            created_at: refreshed.created_at,
            updated_at: refreshed.updated_at,
            values: values.clone(),
        };
        self.durable.upsert(&entry)?;
        self.row_cache.apply(&update.id, values);
        Ok(())
    }

    async fn apply_delete(&self, id: &LocalId) -> Result<()> {
        let Some(remote_id) = self.translator.remote_id_for(id)? else {
            // Never persisted remotely; nothing to propagate.
            self.row_cache.evict(id);
            return Ok(());
        };

        let remote_result = self
            .gateway
            .delete(remote_id.class_name(), remote_id.server_id())
            .await;

        // The local row goes away regardless of the remote outcome so the
        // cache never holds a row the access layer no longer tracks.
        if let Err(error) = self.durable.delete(id.entity(), remote_id.server_id()) {
            tracing::warn!(%id, %error, "durable delete failed after remote delete");
        }
        self.row_cache.evict(id);
        metrics::counter!("save_deletes_total").increment(1);

        remote_result
    }
}
