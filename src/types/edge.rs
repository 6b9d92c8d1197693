//! Edge types for versioned graphs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::ids::{EdgeId, NodeId, VersionId};
use super::payload::Payload;

/// Directed edge between two nodes of the same version.
///
/// Any number of edges may enter or leave a node, so a version is a general
/// directed graph. Edges are append-only like nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge identifier.
    pub id: EdgeId,
    /// Owning version.
    pub version_id: VersionId,
    /// Source node.
    pub source: NodeId,
    /// Target node.
    pub target: NodeId,
    /// Opaque structured payload.
    pub payload: Payload,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// Create a new edge with a fresh id.
    pub fn new(version_id: VersionId, source: NodeId, target: NodeId, payload: Payload) -> Self {
        Self {
            id: EdgeId::generate(),
            version_id,
            source,
            target,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Whether `node` is either endpoint.
    pub fn touches(&self, node: &NodeId) -> bool {
        self.source == *node || self.target == *node
    }

    /// Canonical ordering: source, then target, then id.
    ///
    /// Payloads are not part of the order, so `Edge` deliberately has no
    /// `Ord` impl; sort with this instead.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.source
            .cmp(&other.source)
            .then_with(|| self.target.cmp(&other.target))
            .then_with(|| self.id.cmp(&other.id))
    }
}
