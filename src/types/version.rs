//! Graph versions ("trees").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{TagId, VersionId};

/// A named, append-only directed graph instance.
///
/// `lineage` points at the tag this version was cloned from. It is a
/// provenance pointer only: the version owns its own copies of every node and
/// edge and shares nothing with the tag's source version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Unique version identifier.
    pub id: VersionId,
    /// Human-readable name.
    pub name: String,
    /// Tag this version was cloned from, if any.
    pub lineage: Option<TagId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Version {
    /// Create a fresh, empty root version (no lineage).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: VersionId::generate(),
            name: name.into(),
            lineage: None,
            created_at: Utc::now(),
        }
    }

    /// Create a fresh version cloned from the given tag.
    pub fn cloned_from(name: impl Into<String>, tag: TagId) -> Self {
        Self {
            lineage: Some(tag),
            ..Self::new(name)
        }
    }

    /// Whether this version was produced by cloning a tag.
    pub fn is_clone(&self) -> bool {
        self.lineage.is_some()
    }
}
