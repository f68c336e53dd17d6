//! `SQLite` implementation of the durable cache.
//!
//! One table per entity, named after the entity, holding the augmented
//! schema: `objectId` (primary key), `createdAt`, `updatedAt`, then the
//! entity's attributes and to-one relationship columns. Writes are
//! serialized behind a mutex-guarded connection; WAL mode keeps reads
//! concurrent with the single writer.

pub mod cache_row;
mod connection;
pub mod sql;

pub use connection::{acquire_lock, configure_connection};
pub use sql::{escape_like_wildcards, glob_to_like_pattern};

use crate::models::{bookkeeping, CacheEntry, Predicate, Schema, SortKey};
use crate::storage::DurableCache;
use crate::{Error, Result};
use cache_row::{column_type, entry_from_row, select_columns, value_to_sql};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Disk-backed durable cache over `SQLite`.
pub struct SqliteDurableCache {
    conn: Mutex<Connection>,
    schema: Arc<Schema>,
}

impl SqliteDurableCache {
    /// Opens (or creates) the durable cache at the given path and ensures a
    /// table exists for every entity in the schema.
    ///
    /// # Errors
    ///
    /// - [`Error::SchemaMismatch`] when an entity, attribute or relationship
    ///   name is not usable as a SQL identifier or collides with a
    ///   bookkeeping field.
    /// - [`Error::CacheCorruption`] when the store cannot be opened or the
    ///   tables cannot be created.
    pub fn open(path: &Path, schema: Arc<Schema>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::CacheCorruption {
            operation: "open".to_string(),
            cause: e.to_string(),
        })?;
        Self::initialize(conn, schema)
    }

    /// Opens an in-memory durable cache, used in tests.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`SqliteDurableCache::open`].
    pub fn in_memory(schema: Arc<Schema>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::CacheCorruption {
            operation: "open".to_string(),
            cause: e.to_string(),
        })?;
        Self::initialize(conn, schema)
    }

    fn initialize(conn: Connection, schema: Arc<Schema>) -> Result<Self> {
        configure_connection(&conn);
        for entity in schema.entities() {
            validate_entity_identifiers(entity)?;
            let ddl = create_table_ddl(entity);
            conn.execute_batch(&ddl).map_err(|e| Error::CacheCorruption {
                operation: "create_table".to_string(),
                cause: e.to_string(),
            })?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            schema,
        })
    }
}

fn validate_entity_identifiers(entity: &crate::models::EntityDescription) -> Result<()> {
    let reserved = [
        bookkeeping::OBJECT_ID,
        bookkeeping::CREATED_AT,
        bookkeeping::UPDATED_AT,
    ];
    let mut names = vec![entity.name.as_str()];
    names.extend(entity.attributes.keys().map(String::as_str));
    names.extend(entity.relationships.keys().map(String::as_str));
    for name in names {
        if !sql::is_safe_identifier(name) {
            return Err(Error::SchemaMismatch(format!(
                "'{name}' is not usable as a SQL identifier"
            )));
        }
    }
    for name in entity.attributes.keys().chain(entity.relationships.keys()) {
        if reserved.contains(&name.as_str()) {
            return Err(Error::SchemaMismatch(format!(
                "entity '{}' redeclares bookkeeping field '{name}'",
                entity.name
            )));
        }
    }
    Ok(())
}

fn create_table_ddl(entity: &crate::models::EntityDescription) -> String {
    let mut columns = vec![
        format!("\"{}\" TEXT PRIMARY KEY", bookkeeping::OBJECT_ID),
        format!("\"{}\" INTEGER NOT NULL", bookkeeping::CREATED_AT),
        format!("\"{}\" INTEGER NOT NULL", bookkeeping::UPDATED_AT),
    ];
    for (name, kind) in &entity.attributes {
        columns.push(format!("\"{name}\" {}", column_type(*kind)));
    }
    for name in entity.relationships.keys() {
        columns.push(format!("\"{name}\" TEXT"));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" ({});",
        entity.name,
        columns.join(", ")
    )
}

impl DurableCache for SqliteDurableCache {
    fn upsert(&self, entry: &CacheEntry) -> Result<bool> {
        let entity = self.schema.entity(&entry.entity)?;
        entity.validate_values(&entry.values)?;

        let conn = acquire_lock(&self.conn);

        // Whole-row last-write-wins: the payload carrying the newer
        // updatedAt replaces the row; an equal or older one is a redelivery
        // and leaves the row untouched.
        let existing_updated: Option<i64> = conn
            .query_row(
                &format!(
                    "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = ?1",
                    bookkeeping::UPDATED_AT,
                    entity.name,
                    bookkeeping::OBJECT_ID
                ),
                params![entry.server_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::CacheCorruption {
                operation: "upsert_probe".to_string(),
                cause: e.to_string(),
            })?;

        let incoming = entry.updated_at.timestamp_millis();
        if let Some(existing) = existing_updated {
            if existing >= incoming {
                tracing::debug!(
                    entity = %entity.name,
                    server_id = %entry.server_id,
                    "skipping stale upsert"
                );
                metrics::counter!("durable_cache_stale_upserts_total").increment(1);
                return Ok(false);
            }
        }

        let columns = select_columns(entity);
        let column_list: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();

        let mut values: Vec<SqlValue> = vec![
            SqlValue::Text(entry.server_id.clone()),
            SqlValue::Integer(entry.created_at.timestamp_millis()),
            SqlValue::Integer(incoming),
        ];
        for name in columns.iter().skip(3) {
            values.push(
                entry
                    .values
                    .get(name)
                    .map_or(SqlValue::Null, value_to_sql),
            );
        }

        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO \"{}\" ({}) VALUES ({})",
                entity.name,
                column_list.join(", "),
                placeholders.join(", ")
            ),
            rusqlite::params_from_iter(values),
        )
        .map_err(|e| Error::CacheCorruption {
            operation: "upsert".to_string(),
            cause: e.to_string(),
        })?;

        metrics::counter!("durable_cache_upserts_total").increment(1);
        Ok(true)
    }

    fn get(&self, entity_name: &str, server_id: &str) -> Result<Option<CacheEntry>> {
        let entity = self.schema.entity(entity_name)?;
        let columns: Vec<String> = select_columns(entity)
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect();

        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM \"{}\" WHERE \"{}\" = ?1",
                columns.join(", "),
                entity.name,
                bookkeeping::OBJECT_ID
            ))
            .map_err(|e| Error::CacheCorruption {
                operation: "prepare_get".to_string(),
                cause: e.to_string(),
            })?;

        let mut rows = stmt
            .query(params![server_id])
            .map_err(|e| Error::CacheCorruption {
                operation: "get".to_string(),
                cause: e.to_string(),
            })?;
        match rows.next().map_err(|e| Error::CacheCorruption {
            operation: "get".to_string(),
            cause: e.to_string(),
        })? {
            Some(row) => Ok(Some(entry_from_row(&self.schema, entity, row)?)),
            None => Ok(None),
        }
    }

    fn query(
        &self,
        entity_name: &str,
        predicate: &Predicate,
        sort: &[SortKey],
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<CacheEntry>> {
        let entity = self.schema.entity(entity_name)?;
        let columns: Vec<String> = select_columns(entity)
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect();
        let (where_clause, params, _) = sql::build_predicate_clause(entity, predicate, 1)?;
        let order_clause = sql::build_order_clause(entity, sort)?;
        let paging_clause = sql::build_paging_clause(offset, limit);

        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM \"{}\" WHERE {where_clause}{order_clause}{paging_clause}",
                columns.join(", "),
                entity.name
            ))
            .map_err(|e| Error::CacheCorruption {
                operation: "prepare_query".to_string(),
                cause: e.to_string(),
            })?;

        let mut rows = stmt
            .query(rusqlite::params_from_iter(params))
            .map_err(|e| Error::CacheCorruption {
                operation: "query".to_string(),
                cause: e.to_string(),
            })?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Error::CacheCorruption {
            operation: "query".to_string(),
            cause: e.to_string(),
        })? {
            entries.push(entry_from_row(&self.schema, entity, row)?);
        }
        Ok(entries)
    }

    fn count(&self, entity_name: &str, predicate: &Predicate) -> Result<u64> {
        let entity = self.schema.entity(entity_name)?;
        let (where_clause, params, _) = sql::build_predicate_clause(entity, predicate, 1)?;

        let conn = acquire_lock(&self.conn);
        conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM \"{}\" WHERE {where_clause}",
                entity.name
            ),
            rusqlite::params_from_iter(params),
            |row| row.get::<_, i64>(0),
        )
        .map(|count| u64::try_from(count).unwrap_or(0))
        .map_err(|e| Error::CacheCorruption {
            operation: "count".to_string(),
            cause: e.to_string(),
        })
    }

    fn delete(&self, entity_name: &str, server_id: &str) -> Result<bool> {
        let entity = self.schema.entity(entity_name)?;
        let conn = acquire_lock(&self.conn);
        let affected = conn
            .execute(
                &format!(
                    "DELETE FROM \"{}\" WHERE \"{}\" = ?1",
                    entity.name,
                    bookkeeping::OBJECT_ID
                ),
                params![server_id],
            )
            .map_err(|e| Error::CacheCorruption {
                operation: "delete".to_string(),
                cause: e.to_string(),
            })?;
        if affected > 0 {
            metrics::counter!("durable_cache_deletes_total").increment(1);
        }
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeKind, AttributeMap, AttributeValue, EntityDescription};
    use chrono::{TimeZone, Utc};

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new()
                .with_entity(
                    EntityDescription::new("Band")
                        .with_remote_class("BandClass")
                        .with_attribute("name", AttributeKind::Text)
                        .with_attribute("formed", AttributeKind::Integer)
                        .with_relationship("label", "Label", false),
                )
                .with_entity(EntityDescription::new("Label")),
        )
    }

    fn entry(server_id: &str, name: &str, updated_at_ms: i64) -> CacheEntry {
        let mut values = AttributeMap::new();
        values.insert("name".to_string(), AttributeValue::Text(name.to_string()));
        values.insert("formed".to_string(), AttributeValue::Integer(1986));
        CacheEntry {
            entity: "Band".to_string(),
            server_id: server_id.to_string(),
            created_at: Utc.timestamp_millis_opt(1_000).unwrap(),
            updated_at: Utc.timestamp_millis_opt(updated_at_ms).unwrap(),
            values,
        }
    }

    #[test]
    fn test_upsert_and_get_round_trip() {
        let cache = SqliteDurableCache::in_memory(schema()).unwrap();
        let entry = entry("xK91aa", "Pixies", 2_000);

        assert!(cache.upsert(&entry).unwrap());
        let fetched = cache.get("Band", "xK91aa").unwrap().unwrap();
        assert_eq!(fetched.values, entry.values);
        assert_eq!(fetched.server_id, "xK91aa");
        assert_eq!(fetched.updated_at, entry.updated_at);
    }

    #[test]
    fn test_upsert_same_timestamp_is_idempotent() {
        let cache = SqliteDurableCache::in_memory(schema()).unwrap();
        let entry = entry("xK91aa", "Pixies", 2_000);

        assert!(cache.upsert(&entry).unwrap());
        // Redelivery of the identical payload is skipped.
        assert!(!cache.upsert(&entry).unwrap());
        assert_eq!(cache.count("Band", &Predicate::All).unwrap(), 1);
    }

    #[test]
    fn test_newer_updated_at_wins_either_order() {
        let older = entry("xK91aa", "Pixies", 1_000);
        let newer = entry("xK91aa", "The Pixies", 2_000);

        for deliveries in [[&older, &newer], [&newer, &older]] {
            let cache = SqliteDurableCache::in_memory(schema()).unwrap();
            for delivery in deliveries {
                let _ = cache.upsert(delivery).unwrap();
            }
            let row = cache.get("Band", "xK91aa").unwrap().unwrap();
            assert_eq!(
                row.values.get("name"),
                Some(&AttributeValue::Text("The Pixies".into()))
            );
            assert_eq!(row.updated_at.timestamp_millis(), 2_000);
        }
    }

    #[test]
    fn test_query_sorted_and_paged() {
        let cache = SqliteDurableCache::in_memory(schema()).unwrap();
        for (i, name) in ["Can", "Air", "Beat"].iter().enumerate() {
            let row = entry(&format!("id{i}"), name, 1_000 + i64::try_from(i).unwrap());
            cache.upsert(&row).unwrap();
        }

        let rows = cache
            .query("Band", &Predicate::All, &[SortKey::ascending("name")], 1, Some(2))
            .unwrap();
        let names: Vec<_> = rows
            .iter()
            .map(|r| r.values.get("name").and_then(AttributeValue::as_text).unwrap())
            .collect();
        assert_eq!(names, vec!["Beat", "Can"]);
    }

    #[test]
    fn test_query_with_predicate() {
        let cache = SqliteDurableCache::in_memory(schema()).unwrap();
        cache.upsert(&entry("a", "Pixies", 1_000)).unwrap();
        cache.upsert(&entry("b", "Can", 1_000)).unwrap();

        let rows = cache
            .query(
                "Band",
                &Predicate::eq("name", AttributeValue::Text("Can".into())),
                &[],
                0,
                None,
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].server_id, "b");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let cache = SqliteDurableCache::in_memory(schema()).unwrap();
        cache.upsert(&entry("a", "Pixies", 1_000)).unwrap();

        assert!(cache.delete("Band", "a").unwrap());
        assert!(!cache.delete("Band", "a").unwrap());
        assert_eq!(cache.count("Band", &Predicate::All).unwrap(), 0);
    }

    #[test]
    fn test_relationship_column_round_trip() {
        let cache = SqliteDurableCache::in_memory(schema()).unwrap();
        let mut row = entry("a", "Pixies", 1_000);
        row.values.insert(
            "label".to_string(),
            AttributeValue::Reference {
                class_name: "Label".to_string(),
                server_id: "L1".to_string(),
            },
        );
        cache.upsert(&row).unwrap();

        let fetched = cache.get("Band", "a").unwrap().unwrap();
        assert_eq!(
            fetched.values.get("label"),
            Some(&AttributeValue::Reference {
                class_name: "Label".to_string(),
                server_id: "L1".to_string(),
            })
        );
    }

    #[test]
    fn test_unsafe_identifier_rejected() {
        let bad = Arc::new(Schema::new().with_entity(
            EntityDescription::new("Band").with_attribute("na me", AttributeKind::Text),
        ));
        assert!(matches!(
            SqliteDurableCache::in_memory(bad),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_bookkeeping_collision_rejected() {
        let bad = Arc::new(Schema::new().with_entity(
            EntityDescription::new("Band").with_attribute("objectId", AttributeKind::Text),
        ));
        assert!(matches!(
            SqliteDurableCache::in_memory(bad),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        {
            let cache = SqliteDurableCache::open(&path, schema()).unwrap();
            cache.upsert(&entry("a", "Pixies", 1_000)).unwrap();
        }

        let cache = SqliteDurableCache::open(&path, schema()).unwrap();
        let row = cache.get("Band", "a").unwrap().unwrap();
        assert_eq!(
            row.values.get("name"),
            Some(&AttributeValue::Text("Pixies".into()))
        );
    }
}
