//! Durable cache tier.
//!
//! The durable cache mirrors everything fetched from or confirmed by the
//! remote tier in a local `SQLite` store with the augmented per-entity
//! schema, so identifier/count/projection queries and process restarts
//! never require a round trip.

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteDurableCache;
pub use traits::DurableCache;
