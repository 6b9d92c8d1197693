//! Tag index: immutable snapshots of a version, looked up by name.
//!
//! A tag freezes the id set of its source version at tagging time. Because
//! nodes and edges are append-only, resolving those ids later always yields
//! exactly the entities that were present when the tag was taken, however
//! much the source version has grown since.

use crate::error::{Result, VersioningError};
use crate::mutator::get_version;
use crate::store::StoreTransaction;
use crate::types::{is_valid_tag_name, SnapshotManifest, Tag, TagState, Version, VersionId};

/// Tag the current state of `version` under a globally unique `name`.
///
/// Any string is accepted as a name. Fails with `DuplicateTagName` if the
/// name is taken anywhere in the store.
pub async fn create_tag<T: StoreTransaction>(
    tx: &mut T,
    version: VersionId,
    name: &str,
    description: &str,
) -> Result<Tag> {
    snapshot_version(tx, version, name, description, false).await
}

/// Snapshot `version` under `name`. With `validate_name` set, names that do
/// not match [`TAG_NAME_PATTERN`](crate::types::TAG_NAME_PATTERN) fail with
/// `InvalidTagName`.
pub(crate) async fn snapshot_version<T: StoreTransaction>(
    tx: &mut T,
    version: VersionId,
    name: &str,
    description: &str,
    validate_name: bool,
) -> Result<Tag> {
    if validate_name && !is_valid_tag_name(name) {
        return Err(VersioningError::InvalidTagName(name.to_string()));
    }
    get_version(tx, version).await?;

    if tx.get_tag_by_name(name).await?.is_some() {
        return Err(VersioningError::DuplicateTagName(name.to_string()));
    }

    let nodes = tx.nodes_in_version(&version).await?;
    let edges = tx.edges_in_version(&version).await?;
    let manifest = SnapshotManifest::new(
        nodes.iter().map(|n| n.id),
        edges.iter().map(|e| e.id),
    );

    let tag = Tag::new(name, description, version, manifest);
    // The store's unique index is the final arbiter for concurrent creators.
    tx.insert_tag(&tag).await?;

    tracing::info!(
        tag = %tag.name,
        tag_id = %tag.id,
        version_id = %version,
        node_count = tag.manifest.node_count(),
        edge_count = tag.manifest.edge_count(),
        fingerprint = %tag.fingerprint(),
        "Tag created"
    );
    Ok(tag)
}

/// Look up a tag by name or fail with `TagNotFound`.
pub async fn resolve_tag<T: StoreTransaction>(tx: &mut T, name: &str) -> Result<Tag> {
    tx.get_tag_by_name(name)
        .await?
        .ok_or_else(|| VersioningError::TagNotFound(name.to_string()))
}

/// Materialize the nodes and edges frozen by the tag `name`.
pub async fn get_state_at_tag<T: StoreTransaction>(tx: &mut T, name: &str) -> Result<TagState> {
    let tag = resolve_tag(tx, name).await?;

    let node_ids: Vec<_> = tag.manifest.node_ids.iter().copied().collect();
    let edge_ids: Vec<_> = tag.manifest.edge_ids.iter().copied().collect();
    let nodes = tx.get_nodes(&node_ids).await?;
    let edges = tx.get_edges(&edge_ids).await?;

    let state = TagState { tag, nodes, edges };
    if !state.is_complete() {
        // Entities are never deleted, so this means the backend lost data.
        tracing::warn!(
            tag = %state.tag.name,
            expected_nodes = state.tag.manifest.node_count(),
            resolved_nodes = state.node_count(),
            expected_edges = state.tag.manifest.edge_count(),
            resolved_edges = state.edge_count(),
            "Tag snapshot resolved incompletely"
        );
    }
    Ok(state)
}

/// The version a tag was taken from.
pub async fn get_version_by_tag<T: StoreTransaction>(tx: &mut T, name: &str) -> Result<Version> {
    let tag = resolve_tag(tx, name).await?;
    get_version(tx, tag.version_id).await
}

/// Every tag in the store, oldest first.
pub async fn list_tags<T: StoreTransaction>(tx: &mut T) -> Result<Vec<Tag>> {
    Ok(tx.list_tags().await?)
}

/// Tags taken from `version`, oldest first.
pub async fn tags_for_version<T: StoreTransaction>(
    tx: &mut T,
    version: VersionId,
) -> Result<Vec<Tag>> {
    get_version(tx, version).await?;
    Ok(tx
        .list_tags()
        .await?
        .into_iter()
        .filter(|t| t.version_id == version)
        .collect())
}
