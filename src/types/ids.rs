//! Identifier types for versioned graph entities.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create an id from a UUID.
            pub fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a fresh, never-before-issued id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an id from a UUID string.
            pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

entity_id!(
    /// Identifier of a graph version ("tree").
    VersionId
);

entity_id!(
    /// Identifier of a node. Unique across all versions.
    NodeId
);

entity_id!(
    /// Identifier of an edge. Unique across all versions.
    EdgeId
);

entity_id!(
    /// Identifier of a tag.
    TagId
);
