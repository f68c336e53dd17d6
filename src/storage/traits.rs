//! Durable cache trait.

use crate::models::{CacheEntry, Predicate, SortKey};
use crate::Result;

/// Trait for the disk-backed cache tier.
///
/// The durable cache is the authoritative local source for previously-synced
/// data. Every mutation is durable before the call returns, so a process
/// restart loses no confirmed state. Rows are keyed by `(entity, server id)`
/// and merged whole-row by the newer `updatedAt` timestamp.
pub trait DurableCache: Send + Sync {
    /// Inserts a row for an unseen server id, or merges into the existing
    /// row when the incoming `updated_at` is newer.
    ///
    /// Returns `true` when the row was written and `false` when the incoming
    /// payload was stale (or identical) and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::CacheCorruption`] on storage failure.
    fn upsert(&self, entry: &CacheEntry) -> Result<bool>;

    /// Fetches one row by server id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::CacheCorruption`] on storage failure.
    fn get(&self, entity: &str, server_id: &str) -> Result<Option<CacheEntry>>;

    /// Answers a filtered, sorted, paged query without touching the remote
    /// tier.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::CacheCorruption`] on storage failure and
    /// [`crate::Error::InvalidInput`] for undeclared attributes in the
    /// predicate or sort keys.
    fn query(
        &self,
        entity: &str,
        predicate: &Predicate,
        sort: &[SortKey],
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<CacheEntry>>;

    /// Counts rows matching a predicate.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`DurableCache::query`].
    fn count(&self, entity: &str, predicate: &Predicate) -> Result<u64> {
        Ok(self.query(entity, predicate, &[], 0, None)?.len() as u64)
    }

    /// Removes a row; idempotent when the row is already absent.
    ///
    /// Returns `true` when a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::CacheCorruption`] on storage failure.
    fn delete(&self, entity: &str, server_id: &str) -> Result<bool>;
}
