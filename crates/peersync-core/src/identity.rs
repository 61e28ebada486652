//! Peer identity for a sync session.

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Peer identifier.
///
/// Identifies both the sender of a frame and the owner of a remote object.
/// Only unique among the peers active at a given moment; collisions are
/// not detected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Borrow<str> for PeerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identity of the local peer.
///
/// The display name is local metadata and never goes on the wire.
#[derive(Debug, Clone)]
pub struct Identity {
    id: PeerId,
    name: Option<String>,
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl Identity {
    /// Create an identity with a freshly generated id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(PeerId::generate())
    }

    /// Create an identity with a fixed id.
    #[must_use]
    pub const fn with_id(id: PeerId) -> Self {
        Self { id, name: None }
    }

    /// The session's peer id.
    #[must_use]
    pub const fn id(&self) -> &PeerId {
        &self.id
    }

    /// The display name, if one was set.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the display name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_differ() {
        let a = Identity::new();
        let b = Identity::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().as_str().len(), 32);
    }

    #[test]
    fn test_name_is_independent_of_id() {
        let mut identity = Identity::with_id(PeerId::from("a1"));
        assert_eq!(identity.name(), None);

        identity.set_name("alice");
        assert_eq!(identity.name(), Some("alice"));
        assert_eq!(identity.id().as_str(), "a1");
    }

    #[test]
    fn test_peer_id_serializes_as_plain_string() {
        let id = PeerId::from("b2");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"b2\"");
    }
}
