//! Version cloner: full-copy branching and rollback from a tag.
//!
//! ## Algorithm
//!
//! 1. Resolve the tag and record it as the new version's lineage
//! 2. Copy every manifest node under a fresh id, building an old -> new map
//! 3. Copy every manifest edge with both endpoints remapped through the map
//!
//! All writes go through the caller's scope, so a failure at any step leaves
//! no partial version behind once the scope is dropped. The source version is
//! only read.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::error::{Result, VersioningError};
use crate::mutator::get_version;
use crate::store::StoreTransaction;
use crate::tags::get_state_at_tag;
use crate::types::{Edge, EdgeId, NodeId, Version};

/// Why a clone is being made. Only affects the generated version name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneIntent {
    /// A new line of development branched from the tag.
    Branch,
    /// A rollback: the clone becomes the new current line.
    Restore,
}

impl CloneIntent {
    fn version_name(&self, source: &str, tag: &str) -> String {
        match self {
            Self::Branch => format!("{}_from_{}", source, tag),
            Self::Restore => format!("{}_restored_from_{}", source, tag),
        }
    }
}

/// Result of cloning a tag snapshot into a new version.
#[derive(Debug, Clone)]
pub struct ClonedVersion {
    /// The newly created version.
    pub version: Version,
    /// Source node id -> cloned node id.
    pub node_map: BTreeMap<NodeId, NodeId>,
    /// Source edge id -> cloned edge id.
    pub edge_map: BTreeMap<EdgeId, EdgeId>,
}

impl ClonedVersion {
    /// Id of the copy of `source` in the new version.
    pub fn cloned_node(&self, source: &NodeId) -> Option<NodeId> {
        self.node_map.get(source).copied()
    }

    /// Id of the copy of `source` in the new version.
    pub fn cloned_edge(&self, source: &EdgeId) -> Option<EdgeId> {
        self.edge_map.get(source).copied()
    }
}

/// Branch a new version from the snapshot of tag `name`.
///
/// The version is named `"{source}_from_{tag}"`.
pub async fn create_new_version_from_tag<T: StoreTransaction>(
    tx: &mut T,
    name: &str,
) -> Result<Version> {
    Ok(clone_from_tag(tx, name, CloneIntent::Branch, None).await?.version)
}

/// Roll back to the snapshot of tag `name` by cloning it into a new version.
///
/// Same mechanism as [`create_new_version_from_tag`]; the version is named
/// `"{source}_restored_from_{tag}"`.
pub async fn restore_from_tag<T: StoreTransaction>(tx: &mut T, name: &str) -> Result<Version> {
    Ok(clone_from_tag(tx, name, CloneIntent::Restore, None).await?.version)
}

/// Branch from tag `name` into a version called `version_name`.
pub async fn branch_from_tag<T: StoreTransaction>(
    tx: &mut T,
    name: &str,
    version_name: &str,
) -> Result<ClonedVersion> {
    clone_from_tag(tx, name, CloneIntent::Branch, Some(version_name)).await
}

/// Clone the snapshot of tag `name`, returning the id maps along with the
/// new version.
pub async fn clone_from_tag<T: StoreTransaction>(
    tx: &mut T,
    name: &str,
    intent: CloneIntent,
    version_name: Option<&str>,
) -> Result<ClonedVersion> {
    let start = Instant::now();
    let state = get_state_at_tag(tx, name).await?;
    let source = get_version(tx, state.tag.version_id).await?;

    let version_name = version_name
        .map(str::to_string)
        .unwrap_or_else(|| intent.version_name(&source.name, name));
    let version = Version::cloned_from(version_name, state.tag.id);
    tx.insert_version(&version).await?;

    let mut node_map = BTreeMap::new();
    for node in &state.nodes {
        let copy = node.copy_into(version.id);
        tx.insert_node(&copy).await?;
        node_map.insert(node.id, copy.id);
    }

    let mut edge_map = BTreeMap::new();
    for edge in &state.edges {
        let (source_node, target) = match (node_map.get(&edge.source), node_map.get(&edge.target)) {
            (Some(s), Some(t)) => (*s, *t),
            // A manifest edge always has manifest endpoints; anything else is corrupt.
            (None, _) => {
                return Err(VersioningError::InvalidEndpoint {
                    version: version.id,
                    node: edge.source,
                })
            }
            (_, None) => {
                return Err(VersioningError::InvalidEndpoint {
                    version: version.id,
                    node: edge.target,
                })
            }
        };
        let copy = Edge::new(version.id, source_node, target, edge.payload.clone());
        tx.insert_edge(&copy).await?;
        edge_map.insert(edge.id, copy.id);
    }

    tracing::info!(
        tag = %name,
        intent = ?intent,
        source_version_id = %source.id,
        version_id = %version.id,
        node_count = node_map.len(),
        edge_count = edge_map.len(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Version cloned from tag"
    );

    Ok(ClonedVersion {
        version,
        node_map,
        edge_map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::{add_edge, add_node, create_version};
    use crate::store::{GraphStore, InMemoryGraphStore};
    use crate::tags::create_tag;
    use crate::types::Payload;
    use serde_json::json;

    #[tokio::test]
    async fn test_clone_copies_snapshot_with_new_ids() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let version = create_version(&mut tx, "version_test").await.unwrap();
        let root = add_node(&mut tx, version.id, json!({"version": "1.0"}).into()).await.unwrap();
        let child = add_node(&mut tx, version.id, json!({"setting": "initial"}).into()).await.unwrap();
        let edge = add_edge(&mut tx, version.id, root.id, child.id, json!({"w": 1}).into())
            .await
            .unwrap();
        let tag = create_tag(&mut tx, version.id, "v1.0", "Initial version").await.unwrap();

        let cloned = clone_from_tag(&mut tx, "v1.0", CloneIntent::Branch, None).await.unwrap();

        assert_eq!(cloned.version.name, "version_test_from_v1.0");
        assert_eq!(cloned.version.lineage, Some(tag.id));
        assert_eq!(cloned.node_map.len(), 2);
        assert_eq!(cloned.edge_map.len(), 1);

        let new_root = cloned.cloned_node(&root.id).unwrap();
        let new_child = cloned.cloned_node(&child.id).unwrap();
        assert_ne!(new_root, root.id);

        let new_edge = tx.get_edge(&cloned.cloned_edge(&edge.id).unwrap()).await.unwrap().unwrap();
        assert_eq!(new_edge.source, new_root);
        assert_eq!(new_edge.target, new_child);
        assert_eq!(new_edge.version_id, cloned.version.id);
        assert_eq!(new_edge.payload, edge.payload);
    }

    #[tokio::test]
    async fn test_clone_excludes_post_tag_entities() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let version = create_version(&mut tx, "stable_system").await.unwrap();
        let stable = add_node(&mut tx, version.id, json!({"status": "stable"}).into()).await.unwrap();
        create_tag(&mut tx, version.id, "stable-v1", "Known good state").await.unwrap();

        let experimental = add_node(&mut tx, version.id, json!({"experimental": true}).into())
            .await
            .unwrap();
        add_edge(&mut tx, version.id, stable.id, experimental.id, json!({"type": "experimental"}).into())
            .await
            .unwrap();

        let rollback = restore_from_tag(&mut tx, "stable-v1").await.unwrap();
        assert_eq!(rollback.name, "stable_system_restored_from_stable-v1");

        let nodes = tx.nodes_in_version(&rollback.id).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].payload.get("status").and_then(Payload::as_str), Some("stable"));
        assert!(tx.edges_in_version(&rollback.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clone_missing_tag() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = create_new_version_from_tag(&mut tx, "ghost").await.unwrap_err();
        assert!(matches!(err, VersioningError::TagNotFound(_)));
    }

    #[tokio::test]
    async fn test_branch_with_explicit_name() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let main = create_version(&mut tx, "main").await.unwrap();
        add_node(&mut tx, main.id, json!({"main_setting": "default"}).into()).await.unwrap();
        create_tag(&mut tx, main.id, "main-v1", "Main version").await.unwrap();

        let feature = branch_from_tag(&mut tx, "main-v1", "feature_branch").await.unwrap();
        assert_eq!(feature.version.name, "feature_branch");
    }

    #[tokio::test]
    async fn test_failed_clone_leaves_nothing_behind() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let version = create_version(&mut tx, "src").await.unwrap();
        let a = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        let b = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        add_edge(&mut tx, version.id, a.id, b.id, Payload::empty()).await.unwrap();
        create_tag(&mut tx, version.id, "v1", "").await.unwrap();
        tx.commit().await.unwrap();

        let (versions, nodes, edges) = (store.num_versions(), store.num_nodes(), store.num_edges());

        // Version + first node succeed, second node fails mid-clone.
        store.fail_after_writes(2);
        let mut tx = store.begin().await.unwrap();
        let err = create_new_version_from_tag(&mut tx, "v1").await.unwrap_err();
        assert!(err.is_storage());
        drop(tx);
        store.clear_write_failures();

        assert_eq!(store.num_versions(), versions);
        assert_eq!(store.num_nodes(), nodes);
        assert_eq!(store.num_edges(), edges);
    }
}
