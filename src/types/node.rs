//! Graph nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{NodeId, VersionId};
use super::payload::Payload;

/// A node owned by exactly one version.
///
/// Nodes are append-only: the payload is fixed at creation and nodes are
/// never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier.
    pub id: NodeId,
    /// Owning version.
    pub version_id: VersionId,
    /// Opaque structured payload.
    pub payload: Payload,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// Create a new node with a fresh id.
    pub fn new(version_id: VersionId, payload: Payload) -> Self {
        Self {
            id: NodeId::generate(),
            version_id,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Copy this node into another version under a fresh id.
    pub fn copy_into(&self, version_id: VersionId) -> Self {
        Self::new(version_id, self.payload.clone())
    }
}
