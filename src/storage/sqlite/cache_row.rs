//! Row conversion between `SQLite` storage and [`CacheEntry`] values.
//!
//! Each entity gets its own table whose columns mirror the augmented schema:
//! the bookkeeping fields (`objectId`, `createdAt`, `updatedAt`) followed by
//! the entity's attributes and to-one relationship columns. Dates are stored
//! as epoch milliseconds, booleans as 0/1 integers, relationship pointers as
//! the destination server id.

use crate::models::{
    bookkeeping, AttributeKind, AttributeMap, AttributeValue, CacheEntry, EntityDescription,
    Schema,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Row;

/// Ordered column list for an entity's table: bookkeeping first, then
/// attributes, then relationships (both in schema iteration order).
#[must_use]
pub fn select_columns(entity: &EntityDescription) -> Vec<String> {
    let mut columns = vec![
        bookkeeping::OBJECT_ID.to_string(),
        bookkeeping::CREATED_AT.to_string(),
        bookkeeping::UPDATED_AT.to_string(),
    ];
    columns.extend(entity.attributes.keys().cloned());
    columns.extend(entity.relationships.keys().cloned());
    columns
}

/// SQL column type affinity for an attribute kind.
#[must_use]
pub const fn column_type(kind: AttributeKind) -> &'static str {
    match kind {
        AttributeKind::Text => "TEXT",
        AttributeKind::Integer | AttributeKind::Boolean | AttributeKind::Date => "INTEGER",
        AttributeKind::Real => "REAL",
        AttributeKind::Blob => "BLOB",
    }
}

/// Converts an attribute value to its `SQLite` representation.
#[must_use]
pub fn value_to_sql(value: &AttributeValue) -> SqlValue {
    match value {
        AttributeValue::Text(s) => SqlValue::Text(s.clone()),
        AttributeValue::Integer(i) => SqlValue::Integer(*i),
        AttributeValue::Real(f) => SqlValue::Real(*f),
        AttributeValue::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        AttributeValue::Date(ts) => SqlValue::Integer(ts.timestamp_millis()),
        AttributeValue::Blob(bytes) => SqlValue::Blob(bytes.clone()),
        AttributeValue::Reference { server_id, .. } => SqlValue::Text(server_id.clone()),
        AttributeValue::Null => SqlValue::Null,
    }
}

/// Converts a stored column value back to a typed attribute value.
///
/// # Errors
///
/// Returns [`Error::CacheCorruption`] when the stored representation does
/// not match the declared kind.
pub fn value_from_sql(kind: AttributeKind, raw: ValueRef<'_>) -> Result<AttributeValue> {
    let corrupt = |detail: &str| Error::CacheCorruption {
        operation: "decode_column".to_string(),
        cause: detail.to_string(),
    };
    if matches!(raw, ValueRef::Null) {
        return Ok(AttributeValue::Null);
    }
    match kind {
        AttributeKind::Text => match raw {
            ValueRef::Text(bytes) => Ok(AttributeValue::Text(
                String::from_utf8_lossy(bytes).into_owned(),
            )),
            _ => Err(corrupt("expected TEXT")),
        },
        AttributeKind::Integer => match raw {
            ValueRef::Integer(i) => Ok(AttributeValue::Integer(i)),
            _ => Err(corrupt("expected INTEGER")),
        },
        AttributeKind::Real => match raw {
            ValueRef::Real(f) => Ok(AttributeValue::Real(f)),
            ValueRef::Integer(i) => {
                #[allow(clippy::cast_precision_loss)]
                Ok(AttributeValue::Real(i as f64))
            },
            _ => Err(corrupt("expected REAL")),
        },
        AttributeKind::Boolean => match raw {
            ValueRef::Integer(i) => Ok(AttributeValue::Boolean(i != 0)),
            _ => Err(corrupt("expected INTEGER boolean")),
        },
        AttributeKind::Date => match raw {
            ValueRef::Integer(ms) => decode_timestamp(ms).map(AttributeValue::Date),
            _ => Err(corrupt("expected INTEGER timestamp")),
        },
        AttributeKind::Blob => match raw {
            ValueRef::Blob(bytes) => Ok(AttributeValue::Blob(bytes.to_vec())),
            _ => Err(corrupt("expected BLOB")),
        },
    }
}

/// Decodes an epoch-milliseconds column into a UTC timestamp.
///
/// # Errors
///
/// Returns [`Error::CacheCorruption`] for out-of-range values.
pub fn decode_timestamp(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| Error::CacheCorruption {
        operation: "decode_timestamp".to_string(),
        cause: format!("timestamp {ms} out of range"),
    })
}

/// Rebuilds a [`CacheEntry`] from a row selected with [`select_columns`].
///
/// # Errors
///
/// Returns [`Error::CacheCorruption`] when any column fails to read or
/// decode against the schema.
pub fn entry_from_row(
    schema: &Schema,
    entity: &EntityDescription,
    row: &Row<'_>,
) -> Result<CacheEntry> {
    let read_failure = |cause: String| Error::CacheCorruption {
        operation: "read_row".to_string(),
        cause,
    };

    let server_id: String = row.get(0).map_err(|e| read_failure(e.to_string()))?;
    let created_ms: i64 = row.get(1).map_err(|e| read_failure(e.to_string()))?;
    let updated_ms: i64 = row.get(2).map_err(|e| read_failure(e.to_string()))?;

    let mut values = AttributeMap::new();
    let mut index = 3;
    for (name, kind) in &entity.attributes {
        let raw = row
            .get_ref(index)
            .map_err(|e| read_failure(e.to_string()))?;
        let value = value_from_sql(*kind, raw)?;
        if !value.is_null() {
            values.insert(name.clone(), value);
        }
        index += 1;
    }
    for (name, relationship) in &entity.relationships {
        let raw = row
            .get_ref(index)
            .map_err(|e| read_failure(e.to_string()))?;
        match raw {
            ValueRef::Null => {},
            ValueRef::Text(bytes) => {
                let destination = schema.entity(&relationship.destination)?;
                values.insert(
                    name.clone(),
                    AttributeValue::Reference {
                        class_name: destination.remote_class().to_string(),
                        server_id: String::from_utf8_lossy(bytes).into_owned(),
                    },
                );
            },
            _ => {
                return Err(read_failure(format!(
                    "relationship column '{name}' holds a non-text value"
                )))
            },
        }
        index += 1;
    }

    Ok(CacheEntry {
        entity: entity.name.clone(),
        server_id,
        created_at: decode_timestamp(created_ms)?,
        updated_at: decode_timestamp(updated_ms)?,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_value_round_trips_through_sql() {
        let ts = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();
        let cases = vec![
            (AttributeKind::Text, AttributeValue::Text("Pixies".into())),
            (AttributeKind::Integer, AttributeValue::Integer(1986)),
            (AttributeKind::Real, AttributeValue::Real(4.5)),
            (AttributeKind::Boolean, AttributeValue::Boolean(true)),
            (AttributeKind::Date, AttributeValue::Date(ts)),
            (AttributeKind::Blob, AttributeValue::Blob(vec![1, 2, 3])),
        ];

        for (kind, value) in cases {
            let sql = value_to_sql(&value);
            let raw = match &sql {
                SqlValue::Text(s) => ValueRef::Text(s.as_bytes()),
                SqlValue::Integer(i) => ValueRef::Integer(*i),
                SqlValue::Real(f) => ValueRef::Real(*f),
                SqlValue::Blob(b) => ValueRef::Blob(b),
                SqlValue::Null => ValueRef::Null,
            };
            let back = value_from_sql(kind, raw).unwrap();
            assert_eq!(back, value, "kind {kind:?} failed to round trip");
        }
    }

    #[test]
    fn test_null_round_trip() {
        assert_eq!(
            value_from_sql(AttributeKind::Text, ValueRef::Null).unwrap(),
            AttributeValue::Null
        );
    }

    #[test]
    fn test_kind_mismatch_is_corruption() {
        let result = value_from_sql(AttributeKind::Integer, ValueRef::Text(b"oops"));
        assert!(matches!(result, Err(Error::CacheCorruption { .. })));
    }

    #[test]
    fn test_decode_timestamp_out_of_range() {
        assert!(decode_timestamp(i64::MAX).is_err());
        assert!(decode_timestamp(0).is_ok());
    }

    #[test]
    fn test_select_columns_order() {
        let entity = EntityDescription::new("Band")
            .with_attribute("formed", AttributeKind::Integer)
            .with_attribute("name", AttributeKind::Text)
            .with_relationship("label", "Label", false);
        assert_eq!(
            select_columns(&entity),
            vec!["objectId", "createdAt", "updatedAt", "formed", "name", "label"]
        );
    }
}
