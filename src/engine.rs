//! Versioning engine: one transactional scope per operation.
//!
//! [`VersioningEngine`] owns the store handle and wraps every free function of
//! the mutator, tag, cloner and traversal modules in its own scope: the scope
//! commits when the operation succeeds and is rolled back when it fails, so
//! a failed operation never leaves partial state. Callers that need several
//! operations to be atomic together can open a scope with
//! [`VersioningEngine::begin`] and call the free functions directly.

use std::sync::Arc;

use crate::cloner::{self, CloneIntent, ClonedVersion};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::mutator::{self, InitialVersion};
use crate::store::{GraphStore, StoreError, StoreTransaction};
use crate::tags;
use crate::traversal::{self, GraphView, Path};
use crate::types::{Edge, EdgeId, Node, NodeId, Payload, Tag, TagState, Version, VersionId};

/// Versioning engine over a [`GraphStore`].
pub struct VersioningEngine<S: GraphStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: GraphStore> Clone for VersioningEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: GraphStore> VersioningEngine<S> {
    /// Open an engine over `store`.
    pub fn open(store: S, config: EngineConfig) -> Result<Self> {
        Self::from_shared(Arc::new(store), config)
    }

    /// Open an engine over a store handle shared with other owners.
    pub fn from_shared(store: Arc<S>, config: EngineConfig) -> Result<Self> {
        if store.is_closed() {
            return Err(StoreError::Closed.into());
        }
        tracing::info!(
            validate_tag_names = config.validate_tag_names,
            "Versioning engine opened"
        );
        Ok(Self { store, config })
    }

    /// Close the underlying store. Later operations fail with a storage error.
    pub async fn close(&self) {
        self.store.close().await;
        tracing::info!("Versioning engine closed");
    }

    /// Whether the underlying store has been closed.
    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open a scope for multi-operation atomicity.
    pub async fn begin(&self) -> Result<S::Transaction> {
        Ok(self.store.begin().await?)
    }

    /// Commit on success, roll back on failure.
    async fn finish<R>(
        &self,
        tx: S::Transaction,
        operation: &'static str,
        result: Result<R>,
    ) -> Result<R> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if err.is_not_found() {
                    tracing::debug!(operation, error = %err, "Operation failed, rolling back");
                } else {
                    tracing::warn!(operation, error = %err, "Operation failed, rolling back");
                }
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(operation, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    // ─── Graph mutator ──────────────────────────────────────────────────

    /// See [`mutator::create_version`].
    pub async fn create_version(&self, name: &str) -> Result<Version> {
        let mut tx = self.begin().await?;
        let result = mutator::create_version(&mut tx, name).await;
        self.finish(tx, "create_version", result).await
    }

    /// See [`mutator::create_initial_version`]. The tag name is validated
    /// according to the engine configuration.
    pub async fn create_initial_version(
        &self,
        name: &str,
        root_payload: Payload,
        initial_tag: Option<&str>,
    ) -> Result<InitialVersion> {
        let mut tx = self.begin().await?;
        let result = mutator::bootstrap_version(
            &mut tx,
            name,
            root_payload,
            initial_tag,
            self.config.validate_tag_names,
        )
        .await;
        self.finish(tx, "create_initial_version", result).await
    }

    /// See [`mutator::get_version`].
    pub async fn get_version(&self, id: VersionId) -> Result<Version> {
        let mut tx = self.begin().await?;
        let result = mutator::get_version(&mut tx, id).await;
        self.finish(tx, "get_version", result).await
    }

    /// See [`mutator::list_versions`].
    pub async fn list_versions(&self) -> Result<Vec<Version>> {
        let mut tx = self.begin().await?;
        let result = mutator::list_versions(&mut tx).await;
        self.finish(tx, "list_versions", result).await
    }

    /// See [`mutator::get_node`].
    pub async fn get_node(&self, id: NodeId) -> Result<Node> {
        let mut tx = self.begin().await?;
        let result = mutator::get_node(&mut tx, id).await;
        self.finish(tx, "get_node", result).await
    }

    /// See [`mutator::get_edge`].
    pub async fn get_edge(&self, id: EdgeId) -> Result<Edge> {
        let mut tx = self.begin().await?;
        let result = mutator::get_edge(&mut tx, id).await;
        self.finish(tx, "get_edge", result).await
    }

    /// See [`mutator::add_node`].
    pub async fn add_node(&self, version: VersionId, payload: Payload) -> Result<Node> {
        let mut tx = self.begin().await?;
        let result = mutator::add_node(&mut tx, version, payload).await;
        self.finish(tx, "add_node", result).await
    }

    /// See [`mutator::add_edge`].
    pub async fn add_edge(
        &self,
        version: VersionId,
        source: NodeId,
        target: NodeId,
        payload: Payload,
    ) -> Result<Edge> {
        let mut tx = self.begin().await?;
        let result = mutator::add_edge(&mut tx, version, source, target, payload).await;
        self.finish(tx, "add_edge", result).await
    }

    /// See [`mutator::add_edge_acyclic`].
    pub async fn add_edge_acyclic(
        &self,
        version: VersionId,
        source: NodeId,
        target: NodeId,
        payload: Payload,
    ) -> Result<Edge> {
        let mut tx = self.begin().await?;
        let result = mutator::add_edge_acyclic(&mut tx, version, source, target, payload).await;
        self.finish(tx, "add_edge_acyclic", result).await
    }

    /// See [`mutator::would_create_cycle`].
    pub async fn would_create_cycle(
        &self,
        version: VersionId,
        source: NodeId,
        target: NodeId,
    ) -> Result<bool> {
        let mut tx = self.begin().await?;
        let result = mutator::would_create_cycle(&mut tx, version, source, target).await;
        self.finish(tx, "would_create_cycle", result).await
    }

    // ─── Tag index ──────────────────────────────────────────────────────

    /// See [`tags::create_tag`]. Name validation follows the engine
    /// configuration.
    pub async fn create_tag(&self, version: VersionId, name: &str, description: &str) -> Result<Tag> {
        let mut tx = self.begin().await?;
        let result = tags::snapshot_version(
            &mut tx,
            version,
            name,
            description,
            self.config.validate_tag_names,
        )
        .await;
        // A concurrent creator winning the unique index at commit surfaces
        // as DuplicateTagName through the StoreError conversion.
        self.finish(tx, "create_tag", result).await
    }

    /// See [`tags::resolve_tag`].
    pub async fn resolve_tag(&self, name: &str) -> Result<Tag> {
        let mut tx = self.begin().await?;
        let result = tags::resolve_tag(&mut tx, name).await;
        self.finish(tx, "resolve_tag", result).await
    }

    /// See [`tags::get_state_at_tag`].
    pub async fn get_state_at_tag(&self, name: &str) -> Result<TagState> {
        let mut tx = self.begin().await?;
        let result = tags::get_state_at_tag(&mut tx, name).await;
        self.finish(tx, "get_state_at_tag", result).await
    }

    /// See [`tags::get_version_by_tag`].
    pub async fn get_version_by_tag(&self, name: &str) -> Result<Version> {
        let mut tx = self.begin().await?;
        let result = tags::get_version_by_tag(&mut tx, name).await;
        self.finish(tx, "get_version_by_tag", result).await
    }

    /// See [`tags::list_tags`].
    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        let mut tx = self.begin().await?;
        let result = tags::list_tags(&mut tx).await;
        self.finish(tx, "list_tags", result).await
    }

    /// See [`tags::tags_for_version`].
    pub async fn tags_for_version(&self, version: VersionId) -> Result<Vec<Tag>> {
        let mut tx = self.begin().await?;
        let result = tags::tags_for_version(&mut tx, version).await;
        self.finish(tx, "tags_for_version", result).await
    }

    // ─── Version cloner ─────────────────────────────────────────────────

    /// See [`cloner::create_new_version_from_tag`].
    pub async fn create_new_version_from_tag(&self, name: &str) -> Result<Version> {
        let mut tx = self.begin().await?;
        let result = cloner::create_new_version_from_tag(&mut tx, name).await;
        self.finish(tx, "create_new_version_from_tag", result).await
    }

    /// See [`cloner::restore_from_tag`].
    pub async fn restore_from_tag(&self, name: &str) -> Result<Version> {
        let mut tx = self.begin().await?;
        let result = cloner::restore_from_tag(&mut tx, name).await;
        self.finish(tx, "restore_from_tag", result).await
    }

    /// See [`cloner::branch_from_tag`].
    pub async fn branch_from_tag(&self, name: &str, version_name: &str) -> Result<ClonedVersion> {
        let mut tx = self.begin().await?;
        let result = cloner::branch_from_tag(&mut tx, name, version_name).await;
        self.finish(tx, "branch_from_tag", result).await
    }

    /// See [`cloner::clone_from_tag`].
    pub async fn clone_from_tag(
        &self,
        name: &str,
        intent: CloneIntent,
        version_name: Option<&str>,
    ) -> Result<ClonedVersion> {
        let mut tx = self.begin().await?;
        let result = cloner::clone_from_tag(&mut tx, name, intent, version_name).await;
        self.finish(tx, "clone_from_tag", result).await
    }

    // ─── Traversal ──────────────────────────────────────────────────────

    /// Load the current state of `version` for repeated in-memory queries.
    pub async fn view(&self, version: VersionId) -> Result<GraphView> {
        let mut tx = self.begin().await?;
        let result = GraphView::of_version(&mut tx, version).await;
        self.finish(tx, "view", result).await
    }

    /// Load the snapshot of tag `name` for repeated in-memory queries.
    pub async fn view_at_tag(&self, name: &str) -> Result<GraphView> {
        let mut tx = self.begin().await?;
        let result = GraphView::at_tag(&mut tx, name).await;
        self.finish(tx, "view_at_tag", result).await
    }

    /// See [`traversal::get_root_nodes`].
    pub async fn get_root_nodes(&self, version: VersionId) -> Result<Vec<Node>> {
        let mut tx = self.begin().await?;
        let result = traversal::get_root_nodes(&mut tx, version).await;
        self.finish(tx, "get_root_nodes", result).await
    }

    /// See [`traversal::get_root_node`].
    pub async fn get_root_node(&self, version: VersionId) -> Result<Node> {
        let mut tx = self.begin().await?;
        let result = traversal::get_root_node(&mut tx, version).await;
        self.finish(tx, "get_root_node", result).await
    }

    /// See [`traversal::get_child_nodes`].
    pub async fn get_child_nodes(&self, node: NodeId) -> Result<Vec<Node>> {
        let mut tx = self.begin().await?;
        let result = traversal::get_child_nodes(&mut tx, node).await;
        self.finish(tx, "get_child_nodes", result).await
    }

    /// See [`traversal::get_parent_nodes`].
    pub async fn get_parent_nodes(&self, node: NodeId) -> Result<Vec<Node>> {
        let mut tx = self.begin().await?;
        let result = traversal::get_parent_nodes(&mut tx, node).await;
        self.finish(tx, "get_parent_nodes", result).await
    }

    /// See [`traversal::get_node_edges`].
    pub async fn get_node_edges(&self, node: NodeId) -> Result<Vec<Edge>> {
        let mut tx = self.begin().await?;
        let result = traversal::get_node_edges(&mut tx, node).await;
        self.finish(tx, "get_node_edges", result).await
    }

    /// See [`traversal::get_nodes_at_depth`].
    pub async fn get_nodes_at_depth(&self, version: VersionId, depth: usize) -> Result<Vec<Node>> {
        let mut tx = self.begin().await?;
        let result = traversal::get_nodes_at_depth(&mut tx, version, depth).await;
        self.finish(tx, "get_nodes_at_depth", result).await
    }

    /// See [`traversal::find_path`].
    pub async fn find_path(&self, from: NodeId, to: NodeId) -> Result<Path> {
        let mut tx = self.begin().await?;
        let result = traversal::find_path(&mut tx, from, to).await;
        self.finish(tx, "find_path", result).await
    }

    /// See [`traversal::get_root_nodes_at_tag`].
    pub async fn get_root_nodes_at_tag(&self, name: &str) -> Result<Vec<Node>> {
        let mut tx = self.begin().await?;
        let result = traversal::get_root_nodes_at_tag(&mut tx, name).await;
        self.finish(tx, "get_root_nodes_at_tag", result).await
    }

    /// See [`traversal::get_nodes_at_depth_at_tag`].
    pub async fn get_nodes_at_depth_at_tag(&self, name: &str, depth: usize) -> Result<Vec<Node>> {
        let mut tx = self.begin().await?;
        let result = traversal::get_nodes_at_depth_at_tag(&mut tx, name, depth).await;
        self.finish(tx, "get_nodes_at_depth_at_tag", result).await
    }

    /// See [`traversal::find_path_at_tag`].
    pub async fn find_path_at_tag(&self, name: &str, from: NodeId, to: NodeId) -> Result<Path> {
        let mut tx = self.begin().await?;
        let result = traversal::find_path_at_tag(&mut tx, name, from, to).await;
        self.finish(tx, "find_path_at_tag", result).await
    }
}
