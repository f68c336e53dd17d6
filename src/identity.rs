//! Bidirectional translation between local and remote identifiers.
//!
//! Reference tokens are derived deterministically from the remote server id,
//! so translation is a pure function over the schema: no lookup table, no
//! side effects, safe to call from any thread. A given remote identifier
//! maps to exactly one local identifier for the lifetime of the process.

use crate::models::{LocalId, RemoteId, Schema};
use crate::{Error, Result};
use std::sync::Arc;

/// Translates between [`LocalId`] and [`RemoteId`] using the schema's
/// entity→remote-class mapping.
#[derive(Debug, Clone)]
pub struct IdentityTranslator {
    schema: Arc<Schema>,
}

impl IdentityTranslator {
    /// Creates a translator over the given schema.
    #[must_use]
    pub const fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    /// Derives the local identifier for a remote object.
    ///
    /// Deterministic: the same `(entity, server_id)` pair always yields the
    /// same identifier, so re-deriving after a restart is idempotent.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if `server_id` is empty (the object has not
    ///   been persisted remotely yet).
    /// - [`Error::SchemaMismatch`] if the entity is not declared.
    pub fn identifier_for(&self, entity: &str, server_id: &str) -> Result<LocalId> {
        if server_id.is_empty() {
            return Err(Error::InvalidInput(format!(
                "cannot derive identifier for unpersisted '{entity}' object (empty server id)"
            )));
        }
        let entity = self.schema.entity(entity)?;
        Ok(LocalId::new(&entity.name, server_id))
    }

    /// Returns the remote identifier backing a local identifier, or `None`
    /// when the object has no server-assigned id yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if the identifier names an entity
    /// the schema does not declare.
    pub fn remote_id_for(&self, id: &LocalId) -> Result<Option<RemoteId>> {
        let entity = self.schema.entity(id.entity())?;
        if id.reference().is_empty() {
            return Ok(None);
        }
        Ok(Some(RemoteId::new(entity.remote_class(), id.reference())))
    }

    /// Returns the remote class name for an entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] for undeclared entities.
    pub fn remote_class_for(&self, entity: &str) -> Result<&str> {
        Ok(self.schema.entity(entity)?.remote_class())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityDescription;

    fn translator() -> IdentityTranslator {
        let schema = Schema::new()
            .with_entity(EntityDescription::new("Band").with_remote_class("BandClass"))
            .with_entity(EntityDescription::new("Label"));
        IdentityTranslator::new(Arc::new(schema))
    }

    #[test]
    fn test_identifier_for_is_deterministic() {
        let translator = translator();
        let a = translator.identifier_for("Band", "xK91aa").unwrap();
        let b = translator.identifier_for("Band", "xK91aa").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.reference(), "xK91aa");
    }

    #[test]
    fn test_identifier_for_rejects_empty_server_id() {
        let translator = translator();
        assert!(matches!(
            translator.identifier_for("Band", ""),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_identifier_for_unknown_entity() {
        let translator = translator();
        assert!(matches!(
            translator.identifier_for("Nope", "xK91aa"),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_remote_id_round_trip() {
        let translator = translator();
        let local = translator.identifier_for("Band", "xK91aa").unwrap();
        let remote = translator.remote_id_for(&local).unwrap().unwrap();
        assert_eq!(remote.class_name(), "BandClass");
        assert_eq!(remote.server_id(), "xK91aa");

        let back = translator
            .identifier_for("Band", remote.server_id())
            .unwrap();
        assert_eq!(back, local);
    }

    #[test]
    fn test_remote_class_fallback_to_entity_name() {
        let translator = translator();
        let local = translator.identifier_for("Label", "L1").unwrap();
        let remote = translator.remote_id_for(&local).unwrap().unwrap();
        assert_eq!(remote.class_name(), "Label");
    }

    #[test]
    fn test_remote_id_for_unpersisted_is_none() {
        let translator = translator();
        let local = LocalId::new("Band", "");
        assert!(translator.remote_id_for(&local).unwrap().is_none());
    }
}
