//! Tags: immutable named snapshots of a version.
//!
//! ## Invariants
//!
//! 1. **Global names**: a tag name is unique across the whole store and is
//!    never reused.
//! 2. **Frozen membership**: the manifest is the exact node/edge id set of the
//!    source version at tagging time and never changes, however much the
//!    source version grows afterwards.

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::edge::Edge;
use super::ids::{EdgeId, NodeId, TagId, VersionId};
use super::node::Node;
use crate::canonical::canonical_hash_hex;

/// Pattern every tag name must match when validation is enabled.
pub const TAG_NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._/\-]*$";

/// Check a tag name against [`TAG_NAME_PATTERN`].
pub fn is_valid_tag_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(TAG_NAME_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// The frozen membership of a tag.
///
/// Sets are ordered so iteration and the fingerprint are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// Node ids present in the source version when tagged.
    pub node_ids: BTreeSet<NodeId>,
    /// Edge ids present in the source version when tagged.
    pub edge_ids: BTreeSet<EdgeId>,
}

impl SnapshotManifest {
    /// Build a manifest from id iterators.
    pub fn new(
        node_ids: impl IntoIterator<Item = NodeId>,
        edge_ids: impl IntoIterator<Item = EdgeId>,
    ) -> Self {
        Self {
            node_ids: node_ids.into_iter().collect(),
            edge_ids: edge_ids.into_iter().collect(),
        }
    }

    /// Number of nodes in the snapshot.
    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    /// Number of edges in the snapshot.
    pub fn edge_count(&self) -> usize {
        self.edge_ids.len()
    }

    /// Whether the snapshot contains no entities at all.
    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty() && self.edge_ids.is_empty()
    }

    /// Deterministic xxh64 fingerprint of the membership.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(self)
    }
}

/// A named snapshot of a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique tag identifier.
    pub id: TagId,
    /// Globally unique name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Version the snapshot was taken from.
    pub version_id: VersionId,
    /// Frozen membership.
    pub manifest: SnapshotManifest,
    /// Tagging time.
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Create a new tag over a manifest.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        version_id: VersionId,
        manifest: SnapshotManifest,
    ) -> Self {
        Self {
            id: TagId::generate(),
            name: name.into(),
            description: description.into(),
            version_id,
            manifest,
            created_at: Utc::now(),
        }
    }

    /// Fingerprint of the tag's manifest.
    pub fn fingerprint(&self) -> String {
        self.manifest.fingerprint()
    }
}

/// Materialized state of a tag: the tag plus its resolved nodes and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagState {
    /// The resolved tag.
    pub tag: Tag,
    /// Nodes in the snapshot, ordered by id.
    pub nodes: Vec<Node>,
    /// Edges in the snapshot, ordered by id.
    pub edges: Vec<Edge>,
}

impl TagState {
    /// Time the snapshot was taken.
    pub fn tag_time(&self) -> DateTime<Utc> {
        self.tag.created_at
    }

    /// Number of materialized nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of materialized edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether the snapshot contains `node`.
    pub fn contains_node(&self, node: &NodeId) -> bool {
        self.tag.manifest.node_ids.contains(node)
    }

    /// Whether the materialized entities match the manifest exactly.
    pub fn is_complete(&self) -> bool {
        let nodes: BTreeSet<NodeId> = self.nodes.iter().map(|n| n.id).collect();
        let edges: BTreeSet<EdgeId> = self.edges.iter().map(|e| e.id).collect();
        nodes == self.tag.manifest.node_ids && edges == self.tag.manifest.edge_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_tag_name_validation() {
        assert!(is_valid_tag_name("v1.0"));
        assert!(is_valid_tag_name("main-v1.0"));
        assert!(is_valid_tag_name("feature-ui-v1"));
        assert!(is_valid_tag_name("release/2024_01"));
        assert!(!is_valid_tag_name(""));
        assert!(!is_valid_tag_name("-leading-dash"));
        assert!(!is_valid_tag_name("has space"));
    }

    #[test]
    fn test_tag_name_pattern_compiles() {
        assert!(Regex::new(TAG_NAME_PATTERN).is_ok());
    }

    #[test]
    fn test_fingerprint_order_independent() {
        let a = NodeId::new(Uuid::from_u128(1));
        let b = NodeId::new(Uuid::from_u128(2));
        let e = EdgeId::new(Uuid::from_u128(3));

        let m1 = SnapshotManifest::new([a, b], [e]);
        let m2 = SnapshotManifest::new([b, a], [e]);
        assert_eq!(m1.fingerprint(), m2.fingerprint());

        let m3 = SnapshotManifest::new([a], [e]);
        assert_ne!(m1.fingerprint(), m3.fingerprint());
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = SnapshotManifest::default();
        assert!(manifest.is_empty());
        assert_eq!(manifest.node_count(), 0);
        assert_eq!(manifest.edge_count(), 0);
    }
}
