//! Store facade: the surface exposed to the access layer.
//!
//! One [`IncrementalStore`] owns one row cache, one durable cache, one
//! notification bus and the two pipelines. Nothing here is process-global:
//! multiple stores coexist (and do, in tests). Every public operation is
//! safe to call from any thread without external locking.

use crate::config::StoreConfig;
use crate::events::{EventBus, StoreEvent};
use crate::identity::IdentityTranslator;
use crate::models::{
    FetchRequest, FetchResult, LocalId, NewObject, SaveRequest, SaveResult, Schema, ValueNode,
};
use crate::pipeline::{FetchPipeline, SavePipeline};
use crate::relationship::{RelationshipResolver, Resolution};
use crate::remote::RemoteGateway;
use crate::row_cache::RowCache;
use crate::storage::sqlite::acquire_lock;
use crate::storage::{DurableCache, SqliteDurableCache};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

struct StoreInner {
    translator: IdentityTranslator,
    gateway: Arc<dyn RemoteGateway>,
    durable: Arc<dyn DurableCache>,
    row_cache: Arc<RowCache>,
    fetch: FetchPipeline,
    save: SavePipeline,
    resolver: RelationshipResolver,
    events: EventBus,
    /// Identifiers with a fetch-by-id task currently running, so concurrent
    /// value requests do not fan out duplicate remote calls.
    in_flight: Mutex<HashSet<LocalId>>,
}

/// Incremental persistence backend bridging the remote object store to the
/// local caches.
#[derive(Clone)]
pub struct IncrementalStore {
    inner: Arc<StoreInner>,
}

impl IncrementalStore {
    /// Opens a store over the given schema and remote gateway.
    ///
    /// The durable cache lives at `config.cache_path`, or in memory when
    /// the path is unset.
    ///
    /// # Errors
    ///
    /// - [`Error::SchemaMismatch`] when the schema contains names unusable
    ///   in the durable cache.
    /// - [`Error::CacheCorruption`] when the durable cache cannot be
    ///   created or opened.
    pub fn open(
        schema: Schema,
        gateway: Arc<dyn RemoteGateway>,
        config: &StoreConfig,
    ) -> Result<Self> {
        let schema = Arc::new(schema);
        let durable: Arc<dyn DurableCache> = match &config.cache_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| Error::CacheCorruption {
                        operation: "create_cache_dir".to_string(),
                        cause: e.to_string(),
                    })?;
                }
                Arc::new(SqliteDurableCache::open(path, Arc::clone(&schema))?)
            },
            None => Arc::new(SqliteDurableCache::in_memory(Arc::clone(&schema))?),
        };
        Ok(Self::assemble(
            schema,
            gateway,
            durable,
            config.event_bus_capacity,
        ))
    }

    /// Assembles a store over an existing durable cache implementation.
    ///
    /// Lets tests substitute the durable tier; production callers normally
    /// use [`IncrementalStore::open`].
    #[must_use]
    pub fn with_durable_cache(
        schema: Schema,
        gateway: Arc<dyn RemoteGateway>,
        durable: Arc<dyn DurableCache>,
        config: &StoreConfig,
    ) -> Self {
        Self::assemble(Arc::new(schema), gateway, durable, config.event_bus_capacity)
    }

    fn assemble(
        schema: Arc<Schema>,
        gateway: Arc<dyn RemoteGateway>,
        durable: Arc<dyn DurableCache>,
        event_bus_capacity: usize,
    ) -> Self {
        let row_cache = Arc::new(RowCache::new());
        let translator = IdentityTranslator::new(Arc::clone(&schema));
        let fetch = FetchPipeline::new(
            Arc::clone(&schema),
            Arc::clone(&gateway),
            Arc::clone(&durable),
            Arc::clone(&row_cache),
        );
        let save = SavePipeline::new(
            Arc::clone(&schema),
            Arc::clone(&gateway),
            Arc::clone(&durable),
            Arc::clone(&row_cache),
        );
        let resolver = RelationshipResolver::new(
            Arc::clone(&schema),
            Arc::clone(&row_cache),
            Arc::clone(&durable),
        );
        Self {
            inner: Arc::new(StoreInner {
                translator,
                gateway,
                durable,
                row_cache,
                fetch,
                save,
                resolver,
                events: EventBus::new(event_bus_capacity),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Executes a fetch request; the result matches the request's declared
    /// shape.
    ///
    /// Object-returning fetches run remotely and surface remote failures;
    /// identifier-only, count and projection fetches answer from the
    /// durable cache and succeed with possibly-stale data even when the
    /// remote tier is unreachable.
    ///
    /// # Errors
    ///
    /// See [`FetchPipeline::execute`].
    pub async fn execute_fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        self.inner.fetch.execute(request).await
    }

    /// Executes a save batch and publishes [`StoreEvent::SaveCompleted`] on
    /// success.
    ///
    /// # Errors
    ///
    /// See [`SavePipeline::execute`]; failures abort the batch and are
    /// never silently dropped.
    pub async fn execute_save(&self, request: &SaveRequest) -> Result<SaveResult> {
        let result = self.inner.save.execute(request).await?;
        self.inner.events.publish(StoreEvent::SaveCompleted {
            inserted: result.inserted.clone(),
        });
        Ok(result)
    }

    /// Assigns permanent identifiers to a batch of new objects by creating
    /// them remotely; called once per batch before the save is finalized.
    ///
    /// # Errors
    ///
    /// See [`SavePipeline::insert_objects`].
    pub async fn assign_permanent_ids(&self, objects: &[NewObject]) -> Result<Vec<LocalId>> {
        self.inner.save.insert_objects(objects).await
    }

    /// Returns the (possibly partial) value node for an identifier without
    /// blocking.
    ///
    /// A node whose payload is incomplete is returned as-is while a remote
    /// fetch-by-id runs in the background; observers learn about completion
    /// through [`StoreEvent::MaterializationCompleted`]. When no async
    /// runtime is available the background refresh is skipped and the
    /// partial node still returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] for identifiers naming undeclared
    /// entities.
    pub fn values_for(&self, id: &LocalId) -> Result<ValueNode> {
        let node = self.inner.row_cache.node_for(id);
        if node.complete {
            return Ok(node);
        }

        if let Some(remote_id) = self.inner.translator.remote_id_for(id)? {
            match self.inner.durable.get(id.entity(), remote_id.server_id()) {
                Ok(Some(entry)) => {
                    self.inner.row_cache.apply(id, entry.values);
                    return Ok(self.inner.row_cache.node_for(id));
                },
                Ok(None) => self.spawn_materialization(id.clone()),
                Err(error) => {
                    // A broken durable cache must not break a row-cache
                    // read; fall through to the remote refresh.
                    tracing::warn!(%id, %error, "durable cache read failed, refreshing remotely");
                    self.spawn_materialization(id.clone());
                },
            }
        }
        Ok(node)
    }

    /// Resolves a to-one relationship to the related object's identifier,
    /// or `None` when the relationship is empty or the owner is still
    /// loading (in which case a background refresh is triggered).
    ///
    /// # Errors
    ///
    /// See [`RelationshipResolver::resolve`].
    pub fn related_object(&self, id: &LocalId, relationship: &str) -> Result<Option<LocalId>> {
        match self.inner.resolver.resolve(id, relationship)? {
            Resolution::Resolved(target) => Ok(Some(target)),
            Resolution::Empty => Ok(None),
            Resolution::OwnerIncomplete => {
                self.spawn_materialization(id.clone());
                Ok(None)
            },
        }
    }

    /// Notes that the access layer took an object into active use.
    pub fn register_object(&self, id: &LocalId) {
        self.inner.row_cache.register(id);
    }

    /// Notes that the access layer released an object.
    pub fn unregister_object(&self, id: &LocalId) {
        self.inner.row_cache.unregister(id);
    }

    /// Subscribes to store notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// The store's identity translator.
    #[must_use]
    pub fn identity(&self) -> &IdentityTranslator {
        &self.inner.translator
    }

    /// The store's row cache.
    #[must_use]
    pub fn row_cache(&self) -> &RowCache {
        &self.inner.row_cache
    }

    /// Starts a background fetch-by-id for an incomplete object unless one
    /// is already in flight.
    fn spawn_materialization(&self, id: LocalId) {
        {
            let mut in_flight = acquire_lock(&self.inner.in_flight);
            if !in_flight.insert(id.clone()) {
                return;
            }
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            acquire_lock(&self.inner.in_flight).remove(&id);
            tracing::warn!(%id, "no async runtime, skipping background materialization");
            return;
        };

        metrics::counter!("materializations_started_total").increment(1);
        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            let outcome = inner.fetch_by_id(&id).await;
            acquire_lock(&inner.in_flight).remove(&id);
            match outcome {
                Ok(true) => {
                    inner
                        .events
                        .publish(StoreEvent::MaterializationCompleted { id });
                },
                Ok(false) => {},
                Err(error) => {
                    // No notification on failure; the object stays
                    // incomplete until the next explicit fetch.
                    tracing::warn!(%id, %error, "background materialization failed");
                    metrics::counter!("materializations_failed_total").increment(1);
                },
            }
        });
    }
}

impl StoreInner {
    /// Fetches the full payload for one identifier and merges it into the
    /// caches. Returns `true` when the row cache was updated and a
    /// notification should follow.
    async fn fetch_by_id(&self, id: &LocalId) -> Result<bool> {
        let Some(remote_id) = self.translator.remote_id_for(id)? else {
            return Ok(false);
        };

        let payload = self
            .gateway
            .get(remote_id.class_name(), remote_id.server_id())
            .await?;
        let Some(object) = payload else {
            tracing::warn!(%id, "object no longer exists remotely");
            return Ok(false);
        };

        if self.row_cache.contains(id) {
            self.fetch.merge_remote_object(id.entity(), &object)?;
            Ok(true)
        } else {
            // Evicted while the fetch was in flight: keep the durable row
            // fresh, discard the row-cache side silently.
            let _ = self.fetch.upsert_durable_only(id.entity(), &object)?;
            Ok(false)
        }
    }
}
