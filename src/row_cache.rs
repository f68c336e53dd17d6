//! In-memory, reference-counted cache of materialized value nodes.
//!
//! The access layer registers an identifier when an object enters active use
//! and unregisters it when the object is released; the node is evicted when
//! the count reaches zero. Nodes may exist before any values were fetched
//! (`complete == false` placeholders).
//!
//! Nodes for identifiers not (or no longer) in active use live in a bounded
//! LRU side cache, so a long sequence of fetches that never registers the
//! results cannot grow the resident set without bound. Registering an
//! identifier promotes its node out of the LRU; only registered nodes are
//! pinned.
//!
//! A single mutex guards all three maps, which makes registration
//! linearizable per identifier: two concurrent registrations can never race
//! into duplicate nodes.

use crate::models::{AttributeMap, LocalId, ValueNode};
use crate::storage::sqlite::acquire_lock;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

const DEFAULT_IDLE_NODE_CAPACITY: usize = 1024;

struct Inner {
    /// Nodes pinned by a nonzero reference count.
    nodes: HashMap<LocalId, ValueNode>,
    /// Nodes merged or faulted without an active registration.
    idle: LruCache<LocalId, ValueNode>,
    in_use: HashMap<LocalId, usize>,
}

/// Reference-counted cache of [`ValueNode`]s for objects in active use.
pub struct RowCache {
    inner: Mutex<Inner>,
}

impl RowCache {
    /// Creates an empty row cache.
    #[must_use]
    pub fn new() -> Self {
        Self::with_idle_capacity(DEFAULT_IDLE_NODE_CAPACITY)
    }

    /// Creates an empty row cache retaining at most `capacity` nodes for
    /// identifiers without an active registration. A zero capacity is
    /// clamped to one.
    #[must_use]
    pub fn with_idle_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                nodes: HashMap::new(),
                idle: LruCache::new(capacity),
                in_use: HashMap::new(),
            }),
        }
    }

    /// Marks an identifier as entered into active use.
    ///
    /// Increments the reference count. On first registration the node is
    /// promoted out of the idle cache, or created as an incomplete
    /// placeholder when no values were fetched yet.
    pub fn register(&self, id: &LocalId) {
        let mut inner = acquire_lock(&self.inner);
        *inner.in_use.entry(id.clone()).or_insert(0) += 1;
        if !inner.nodes.contains_key(id) {
            let node = inner.idle.pop(id).unwrap_or_else(|| {
                tracing::debug!(%id, "created placeholder node");
                ValueNode::placeholder(id.clone())
            });
            inner.nodes.insert(id.clone(), node);
        }
        metrics::counter!("row_cache_registrations_total").increment(1);
    }

    /// Marks an identifier as left active use.
    ///
    /// Decrements the reference count and evicts the node when it reaches
    /// zero. An unregister with no matching register signals a registration
    /// discipline bug in the access layer; it is logged and ignored rather
    /// than crashing.
    pub fn unregister(&self, id: &LocalId) {
        let mut inner = acquire_lock(&self.inner);
        let Some(count) = inner.in_use.get_mut(id) else {
            tracing::warn!(%id, "unregister without matching register");
            metrics::counter!("row_cache_unbalanced_unregister_total").increment(1);
            return;
        };
        *count -= 1;
        if *count == 0 {
            inner.in_use.remove(id);
            inner.nodes.remove(id);
            tracing::debug!(%id, "evicted node");
            metrics::counter!("row_cache_evictions_total").increment(1);
        }
    }

    /// Returns the node for an identifier, creating an incomplete
    /// placeholder if none exists.
    ///
    /// Never triggers a remote fetch; on-demand materialization is the
    /// store's responsibility.
    #[must_use]
    pub fn node_for(&self, id: &LocalId) -> ValueNode {
        let mut inner = acquire_lock(&self.inner);
        if let Some(node) = inner.nodes.get(id) {
            return node.clone();
        }
        if let Some(node) = inner.idle.get(id) {
            return node.clone();
        }
        let node = ValueNode::placeholder(id.clone());
        inner.idle.put(id.clone(), node.clone());
        node
    }

    /// Merges a fresh attribute payload into the node for `id`, creating it
    /// if absent, and marks it complete.
    ///
    /// Unregistered identifiers land in the bounded idle cache and may be
    /// dropped under pressure; registered nodes are always updated in place.
    pub fn apply(&self, id: &LocalId, values: AttributeMap) {
        let mut inner = acquire_lock(&self.inner);
        if let Some(node) = inner.nodes.get_mut(id) {
            node.merge(values);
            return;
        }
        let mut node = inner
            .idle
            .pop(id)
            .unwrap_or_else(|| ValueNode::placeholder(id.clone()));
        node.merge(values);
        inner.idle.put(id.clone(), node);
    }

    /// Removes the node and count for an identifier outright.
    ///
    /// Used after a confirmed remote deletion.
    pub fn evict(&self, id: &LocalId) {
        let mut inner = acquire_lock(&self.inner);
        inner.in_use.remove(id);
        let pinned = inner.nodes.remove(id).is_some();
        let idle = inner.idle.pop(id).is_some();
        if pinned || idle {
            metrics::counter!("row_cache_evictions_total").increment(1);
        }
    }

    /// True while the identifier is held in active use.
    #[must_use]
    pub fn is_registered(&self, id: &LocalId) -> bool {
        acquire_lock(&self.inner).in_use.contains_key(id)
    }

    /// Current reference count for an identifier.
    #[must_use]
    pub fn ref_count(&self, id: &LocalId) -> usize {
        acquire_lock(&self.inner)
            .in_use
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    /// True when a node (pinned or idle, placeholder or complete) exists for
    /// the identifier.
    #[must_use]
    pub fn contains(&self, id: &LocalId) -> bool {
        let inner = acquire_lock(&self.inner);
        inner.nodes.contains_key(id) || inner.idle.contains(id)
    }

    /// Number of resident nodes across the pinned and idle tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = acquire_lock(&self.inner);
        inner.nodes.len() + inner.idle.len()
    }

    /// True when no nodes are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RowCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeValue;
    use std::sync::Arc;
    use std::thread;

    fn id() -> LocalId {
        LocalId::new("Band", "xK91aa")
    }

    #[test]
    fn test_register_creates_placeholder() {
        let cache = RowCache::new();
        cache.register(&id());

        assert_eq!(cache.ref_count(&id()), 1);
        let node = cache.node_for(&id());
        assert!(!node.complete);
        assert!(node.values.is_empty());
    }

    #[test]
    fn test_balanced_unregister_evicts() {
        let cache = RowCache::new();
        cache.register(&id());
        cache.register(&id());
        assert_eq!(cache.ref_count(&id()), 2);

        cache.unregister(&id());
        assert!(cache.contains(&id()));

        cache.unregister(&id());
        assert!(!cache.contains(&id()));
        assert_eq!(cache.ref_count(&id()), 0);
    }

    #[test]
    fn test_extra_unregister_does_not_crash() {
        let cache = RowCache::new();
        cache.register(&id());
        cache.unregister(&id());
        // One more than was ever registered.
        cache.unregister(&id());
        assert_eq!(cache.ref_count(&id()), 0);
    }

    #[test]
    fn test_apply_marks_complete() {
        let cache = RowCache::new();
        cache.register(&id());

        let mut values = AttributeMap::new();
        values.insert("name".to_string(), AttributeValue::Text("Pixies".into()));
        cache.apply(&id(), values);

        let node = cache.node_for(&id());
        assert!(node.complete);
        assert_eq!(
            node.values.get("name"),
            Some(&AttributeValue::Text("Pixies".into()))
        );
    }

    #[test]
    fn test_node_for_does_not_register() {
        let cache = RowCache::new();
        let node = cache.node_for(&id());
        assert!(!node.complete);
        assert_eq!(cache.ref_count(&id()), 0);
        assert!(cache.contains(&id()));
    }

    #[test]
    fn test_register_promotes_idle_node() {
        let cache = RowCache::new();
        let mut values = AttributeMap::new();
        values.insert("name".to_string(), AttributeValue::Text("Pixies".into()));
        cache.apply(&id(), values);

        cache.register(&id());
        let node = cache.node_for(&id());
        assert!(node.complete);
        assert_eq!(
            node.values.get("name"),
            Some(&AttributeValue::Text("Pixies".into()))
        );
    }

    #[test]
    fn test_unregistered_nodes_are_bounded() {
        let cache = RowCache::with_idle_capacity(4);
        for i in 0..100 {
            let merged = LocalId::new("Band", format!("id{i}"));
            cache.apply(&merged, AttributeMap::new());
        }

        assert_eq!(cache.len(), 4);
        assert!(!cache.contains(&LocalId::new("Band", "id0")));
        assert!(cache.contains(&LocalId::new("Band", "id99")));
    }

    #[test]
    fn test_registered_node_survives_idle_pressure() {
        let cache = RowCache::with_idle_capacity(2);
        cache.register(&id());
        let mut values = AttributeMap::new();
        values.insert("name".to_string(), AttributeValue::Text("Pixies".into()));
        cache.apply(&id(), values);

        for i in 0..50 {
            let merged = LocalId::new("Band", format!("id{i}"));
            cache.apply(&merged, AttributeMap::new());
        }

        let node = cache.node_for(&id());
        assert!(node.complete);
        assert_eq!(
            node.values.get("name"),
            Some(&AttributeValue::Text("Pixies".into()))
        );
    }

    #[test]
    fn test_concurrent_registration_single_node() {
        let cache = Arc::new(RowCache::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    cache.register(&id());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.ref_count(&id()), 800);
    }
}
