//! Graph mutator: validated growth of a version.
//!
//! Every function takes the transaction scope explicitly. Nothing here
//! commits; the caller decides the scope boundary, so a failure anywhere in
//! a multi-step operation rolls back all of it.

use std::collections::BTreeSet;

use crate::error::{Result, VersioningError};
use crate::store::StoreTransaction;
use crate::tags;
use crate::types::{Edge, EdgeId, Node, NodeId, Payload, Tag, Version, VersionId};

/// Create a new, empty root version.
pub async fn create_version<T: StoreTransaction>(tx: &mut T, name: &str) -> Result<Version> {
    let version = Version::new(name);
    tx.insert_version(&version).await?;
    tracing::info!(version_id = %version.id, name = %version.name, "Version created");
    Ok(version)
}

/// Fetch a version or fail with `VersionNotFound`.
pub async fn get_version<T: StoreTransaction>(tx: &mut T, id: VersionId) -> Result<Version> {
    tx.get_version(&id)
        .await?
        .ok_or(VersioningError::VersionNotFound(id))
}

/// Every version in the store, ordered by id.
pub async fn list_versions<T: StoreTransaction>(tx: &mut T) -> Result<Vec<Version>> {
    Ok(tx.list_versions().await?)
}

/// Fetch a node or fail with `NodeNotFound`.
pub async fn get_node<T: StoreTransaction>(tx: &mut T, id: NodeId) -> Result<Node> {
    tx.get_node(&id).await?.ok_or(VersioningError::NodeNotFound(id))
}

/// Fetch an edge or fail with `EdgeNotFound`.
pub async fn get_edge<T: StoreTransaction>(tx: &mut T, id: EdgeId) -> Result<Edge> {
    tx.get_edge(&id).await?.ok_or(VersioningError::EdgeNotFound(id))
}

/// Add a node to `version`.
pub async fn add_node<T: StoreTransaction>(
    tx: &mut T,
    version: VersionId,
    payload: Payload,
) -> Result<Node> {
    get_version(tx, version).await?;

    let node = Node::new(version, payload);
    tx.insert_node(&node).await?;
    tracing::debug!(version_id = %version, node_id = %node.id, "Node added");
    Ok(node)
}

/// Add a directed edge `source -> target` to `version`.
///
/// Both endpoints must already be nodes of `version`. Cycles are allowed;
/// use [`add_edge_acyclic`] to reject them.
pub async fn add_edge<T: StoreTransaction>(
    tx: &mut T,
    version: VersionId,
    source: NodeId,
    target: NodeId,
    payload: Payload,
) -> Result<Edge> {
    get_version(tx, version).await?;
    check_endpoint(tx, version, source).await?;
    check_endpoint(tx, version, target).await?;

    let edge = Edge::new(version, source, target, payload);
    tx.insert_edge(&edge).await?;
    tracing::debug!(
        version_id = %version,
        edge_id = %edge.id,
        source = %source,
        target = %target,
        "Edge added"
    );
    Ok(edge)
}

/// Like [`add_edge`], but fails with `CycleDetected` when the new edge would
/// close a directed cycle (including a self-loop).
pub async fn add_edge_acyclic<T: StoreTransaction>(
    tx: &mut T,
    version: VersionId,
    source: NodeId,
    target: NodeId,
    payload: Payload,
) -> Result<Edge> {
    get_version(tx, version).await?;
    check_endpoint(tx, version, source).await?;
    check_endpoint(tx, version, target).await?;

    if would_create_cycle(tx, version, source, target).await? {
        return Err(VersioningError::CycleDetected {
            source_node: source,
            target,
        });
    }
    add_edge(tx, version, source, target, payload).await
}

/// Whether adding `source -> target` would close a directed cycle, i.e.
/// whether `source` is reachable from `target` (or they are the same node).
pub async fn would_create_cycle<T: StoreTransaction>(
    tx: &mut T,
    version: VersionId,
    source: NodeId,
    target: NodeId,
) -> Result<bool> {
    if source == target {
        return Ok(true);
    }

    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut stack = vec![target];
    visited.insert(target);

    while let Some(current) = stack.pop() {
        for edge in tx.outgoing_edges(&current).await? {
            if edge.version_id != version {
                continue;
            }
            if edge.target == source {
                return Ok(true);
            }
            if visited.insert(edge.target) {
                stack.push(edge.target);
            }
        }
    }
    Ok(false)
}

async fn check_endpoint<T: StoreTransaction>(
    tx: &mut T,
    version: VersionId,
    node: NodeId,
) -> Result<()> {
    match tx.get_node(&node).await? {
        Some(found) if found.version_id == version => Ok(()),
        _ => Err(VersioningError::InvalidEndpoint { version, node }),
    }
}

/// A freshly bootstrapped version.
#[derive(Debug, Clone)]
pub struct InitialVersion {
    /// The new version.
    pub version: Version,
    /// Its single root node.
    pub root: Node,
    /// The initial tag, when one was requested.
    pub tag: Option<Tag>,
}

/// Create a version holding a single root node, optionally tagging it.
///
/// The tag, if any, gets the description `"Initial version of {name}"`.
pub async fn create_initial_version<T: StoreTransaction>(
    tx: &mut T,
    name: &str,
    root_payload: Payload,
    initial_tag: Option<&str>,
) -> Result<InitialVersion> {
    bootstrap_version(tx, name, root_payload, initial_tag, false).await
}

pub(crate) async fn bootstrap_version<T: StoreTransaction>(
    tx: &mut T,
    name: &str,
    root_payload: Payload,
    initial_tag: Option<&str>,
    validate_tag_name: bool,
) -> Result<InitialVersion> {
    let version = create_version(tx, name).await?;
    let root = add_node(tx, version.id, root_payload).await?;
    let tag = match initial_tag {
        Some(tag_name) => {
            let description = format!("Initial version of {}", name);
            Some(
                tags::snapshot_version(tx, version.id, tag_name, &description, validate_tag_name)
                    .await?,
            )
        }
        None => None,
    };
    Ok(InitialVersion { version, root, tag })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GraphStore, InMemoryGraphStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_add_node_sets_owner() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let version = create_version(&mut tx, "config").await.unwrap();

        let node = add_node(&mut tx, version.id, json!({"type": "database"}).into())
            .await
            .unwrap();

        assert_eq!(node.version_id, version.id);
        assert_eq!(get_node(&mut tx, node.id).await.unwrap(), node);
    }

    #[tokio::test]
    async fn test_add_node_unknown_version() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let missing = VersionId::generate();

        let err = add_node(&mut tx, missing, Payload::empty()).await.unwrap_err();
        assert!(matches!(err, VersioningError::VersionNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_add_edge_rejects_foreign_endpoint() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let v1 = create_version(&mut tx, "one").await.unwrap();
        let v2 = create_version(&mut tx, "two").await.unwrap();
        let a = add_node(&mut tx, v1.id, Payload::empty()).await.unwrap();
        let b = add_node(&mut tx, v2.id, Payload::empty()).await.unwrap();

        let err = add_edge(&mut tx, v1.id, a.id, b.id, Payload::empty())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VersioningError::InvalidEndpoint { version, node } if version == v1.id && node == b.id
        ));
    }

    #[tokio::test]
    async fn test_add_edge_rejects_missing_endpoint() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let version = create_version(&mut tx, "one").await.unwrap();
        let a = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        let ghost = NodeId::generate();

        let err = add_edge(&mut tx, version.id, ghost, a.id, Payload::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, VersioningError::InvalidEndpoint { node, .. } if node == ghost));
    }

    #[tokio::test]
    async fn test_cycles_allowed_by_default() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let version = create_version(&mut tx, "cyclic").await.unwrap();
        let a = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        let b = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();

        add_edge(&mut tx, version.id, a.id, b.id, Payload::empty()).await.unwrap();
        add_edge(&mut tx, version.id, b.id, a.id, Payload::empty()).await.unwrap();
        assert_eq!(tx.edges_in_version(&version.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_acyclic_insert_rejects_cycle() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let version = create_version(&mut tx, "dag").await.unwrap();
        let a = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        let b = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        let c = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();

        add_edge_acyclic(&mut tx, version.id, a.id, b.id, Payload::empty()).await.unwrap();
        add_edge_acyclic(&mut tx, version.id, b.id, c.id, Payload::empty()).await.unwrap();

        assert!(would_create_cycle(&mut tx, version.id, c.id, a.id).await.unwrap());
        assert!(!would_create_cycle(&mut tx, version.id, a.id, c.id).await.unwrap());

        let err = add_edge_acyclic(&mut tx, version.id, c.id, a.id, Payload::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, VersioningError::CycleDetected { .. }));

        let err = add_edge_acyclic(&mut tx, version.id, b.id, b.id, Payload::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, VersioningError::CycleDetected { .. }));
    }

    #[tokio::test]
    async fn test_create_initial_version_with_tag() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();

        let initial = create_initial_version(
            &mut tx,
            "main_config",
            json!({"type": "root"}).into(),
            Some("v1.0"),
        )
        .await
        .unwrap();

        let tag = initial.tag.unwrap();
        assert_eq!(tag.description, "Initial version of main_config");
        assert_eq!(tag.manifest.node_count(), 1);
        assert!(tag.manifest.node_ids.contains(&initial.root.id));
    }

    #[tokio::test]
    async fn test_create_initial_version_without_tag() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();

        let initial = create_initial_version(&mut tx, "bare", Payload::empty(), None)
            .await
            .unwrap();
        assert!(initial.tag.is_none());
        assert!(list_versions(&mut tx).await.unwrap().contains(&initial.version));
    }
}
