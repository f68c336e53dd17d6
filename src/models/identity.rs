//! Identifier types for the two storage tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable local identifier naming one logical object to the access layer.
///
/// A `LocalId` pairs an entity name with an opaque reference token. It is
/// immutable once assigned and uniquely names the object across both cache
/// tiers. Two identifiers are equal iff both components are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId {
    entity: String,
    reference: String,
}

impl LocalId {
    /// Creates a local identifier from an entity name and reference token.
    #[must_use]
    pub fn new(entity: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            reference: reference.into(),
        }
    }

    /// Returns the entity name.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the opaque reference token.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.reference)
    }
}

/// Remote identifier: the class name and server-assigned id naming the same
/// object in the remote tier.
///
/// The server id is assigned by the remote tier at creation time; an object
/// that has never been persisted remotely has no `RemoteId` yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteId {
    class_name: String,
    server_id: String,
}

impl RemoteId {
    /// Creates a remote identifier from a class name and server id.
    #[must_use]
    pub fn new(class_name: impl Into<String>, server_id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            server_id: server_id.into(),
        }
    }

    /// Returns the remote class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the server-assigned object id.
    #[must_use]
    pub fn server_id(&self) -> &str {
        &self.server_id
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class_name, self.server_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_id_equality() {
        let a = LocalId::new("Band", "xK91aa");
        let b = LocalId::new("Band", "xK91aa");
        let c = LocalId::new("Band", "other");
        let d = LocalId::new("Album", "xK91aa");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_display() {
        let id = LocalId::new("Band", "xK91aa");
        assert_eq!(id.to_string(), "Band/xK91aa");

        let remote = RemoteId::new("BandClass", "xK91aa");
        assert_eq!(remote.to_string(), "BandClass:xK91aa");
    }
}
