//! In-memory graph store.
//!
//! Committed state lives behind a shared `RwLock`. A transaction buffers its
//! writes in a private overlay and applies them in one step on commit, after
//! re-checking the tag-name uniqueness and referential constraints against
//! whatever other scopes committed in the meantime. Dropping a transaction
//! simply discards the overlay.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{GraphStore, StoreError, StoreTransaction};
use crate::types::{Edge, EdgeId, Node, NodeId, Tag, TagId, Version, VersionId};

const UNLIMITED_WRITES: usize = usize::MAX;

/// Entity tables plus the secondary indexes the traversal queries need.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    versions: BTreeMap<VersionId, Version>,
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    tags: BTreeMap<TagId, Tag>,
    /// Unique index on tag name.
    tag_names: BTreeMap<String, TagId>,
    version_nodes: BTreeMap<VersionId, BTreeSet<NodeId>>,
    version_edges: BTreeMap<VersionId, BTreeSet<EdgeId>>,
    /// Source node -> edges.
    outgoing: BTreeMap<NodeId, BTreeSet<EdgeId>>,
    /// Target node -> edges.
    incoming: BTreeMap<NodeId, BTreeSet<EdgeId>>,
}

impl MemoryState {
    fn put_version(&mut self, version: Version) {
        self.versions.insert(version.id, version);
    }

    fn put_node(&mut self, node: Node) {
        self.version_nodes
            .entry(node.version_id)
            .or_default()
            .insert(node.id);
        self.nodes.insert(node.id, node);
    }

    fn put_edge(&mut self, edge: Edge) {
        self.version_edges
            .entry(edge.version_id)
            .or_default()
            .insert(edge.id);
        self.outgoing.entry(edge.source).or_default().insert(edge.id);
        self.incoming.entry(edge.target).or_default().insert(edge.id);
        self.edges.insert(edge.id, edge);
    }

    fn put_tag(&mut self, tag: Tag) {
        self.tag_names.insert(tag.name.clone(), tag.id);
        self.tags.insert(tag.id, tag);
    }

    fn tag_by_name(&self, name: &str) -> Option<&Tag> {
        self.tag_names.get(name).and_then(|id| self.tags.get(id))
    }
}

/// Look up in the overlay first, then in committed state.
fn layered<'a, K: Ord, V>(
    overlay: &'a BTreeMap<K, V>,
    committed: &'a BTreeMap<K, V>,
    key: &K,
) -> Option<&'a V> {
    overlay.get(key).or_else(|| committed.get(key))
}

fn check_node(node: &Node, overlay: &MemoryState, committed: &MemoryState) -> Result<(), StoreError> {
    if layered(&overlay.versions, &committed.versions, &node.version_id).is_none() {
        return Err(StoreError::ReferentialViolation(format!(
            "node {} references missing version {}",
            node.id, node.version_id
        )));
    }
    Ok(())
}

fn check_edge(edge: &Edge, overlay: &MemoryState, committed: &MemoryState) -> Result<(), StoreError> {
    for endpoint in [edge.source, edge.target] {
        match layered(&overlay.nodes, &committed.nodes, &endpoint) {
            Some(node) if node.version_id == edge.version_id => {}
            _ => {
                return Err(StoreError::ReferentialViolation(format!(
                    "edge {} endpoint {} is not a node of version {}",
                    edge.id, endpoint, edge.version_id
                )))
            }
        }
    }
    Ok(())
}

/// In-memory graph store.
///
/// Cheap to clone; clones share the same state and lifecycle.
#[derive(Debug, Clone)]
pub struct InMemoryGraphStore {
    state: Arc<RwLock<MemoryState>>,
    closed: Arc<AtomicBool>,
    /// Remaining inserts before an injected failure (`UNLIMITED_WRITES` = off).
    write_budget: Arc<AtomicUsize>,
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGraphStore {
    /// Open a new empty store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            closed: Arc::new(AtomicBool::new(false)),
            write_budget: Arc::new(AtomicUsize::new(UNLIMITED_WRITES)),
        }
    }

    /// Number of committed versions.
    pub fn num_versions(&self) -> usize {
        self.state.read().versions.len()
    }

    /// Number of committed nodes.
    pub fn num_nodes(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Number of committed edges.
    pub fn num_edges(&self) -> usize {
        self.state.read().edges.len()
    }

    /// Number of committed tags.
    pub fn num_tags(&self) -> usize {
        self.state.read().tags.len()
    }

    /// Make the store fail every insert after the next `writes` successful
    /// ones, across all transactions.
    #[cfg(any(test, feature = "fault_injection"))]
    pub fn fail_after_writes(&self, writes: usize) {
        self.write_budget.store(writes, Ordering::SeqCst);
    }

    /// Remove any injected write failure.
    #[cfg(any(test, feature = "fault_injection"))]
    pub fn clear_write_failures(&self) {
        self.write_budget.store(UNLIMITED_WRITES, Ordering::SeqCst);
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Transaction, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(InMemoryTransaction {
            shared: Arc::clone(&self.state),
            closed: Arc::clone(&self.closed),
            write_budget: Arc::clone(&self.write_budget),
            overlay: MemoryState::default(),
            writes: 0,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Transaction scope over an [`InMemoryGraphStore`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    shared: Arc<RwLock<MemoryState>>,
    closed: Arc<AtomicBool>,
    write_budget: Arc<AtomicUsize>,
    /// Uncommitted writes of this scope.
    overlay: MemoryState,
    writes: usize,
}

impl InMemoryTransaction {
    fn charge_write(&mut self) -> Result<(), StoreError> {
        let previous = self.write_budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |budget| {
            match budget {
                UNLIMITED_WRITES | 0 => None,
                n => Some(n - 1),
            }
        });
        if previous == Err(0) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        self.writes += 1;
        Ok(())
    }

    fn merged_edges(&self, committed: &MemoryState, ids: BTreeSet<EdgeId>) -> Vec<Edge> {
        ids.iter()
            .filter_map(|id| layered(&self.overlay.edges, &committed.edges, id).cloned())
            .collect()
    }

    fn adjacent(&self, node: &NodeId, outgoing: bool) -> Vec<Edge> {
        let committed = self.shared.read();
        let index = |state: &MemoryState| {
            let map = if outgoing { &state.outgoing } else { &state.incoming };
            map.get(node).cloned().unwrap_or_default()
        };
        let mut ids = index(&*committed);
        ids.extend(index(&self.overlay));
        self.merged_edges(&committed, ids)
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn insert_version(&mut self, version: &Version) -> Result<(), StoreError> {
        self.charge_write()?;
        self.overlay.put_version(version.clone());
        Ok(())
    }

    async fn insert_node(&mut self, node: &Node) -> Result<(), StoreError> {
        self.charge_write()?;
        check_node(node, &self.overlay, &self.shared.read())?;
        self.overlay.put_node(node.clone());
        Ok(())
    }

    async fn insert_edge(&mut self, edge: &Edge) -> Result<(), StoreError> {
        self.charge_write()?;
        check_edge(edge, &self.overlay, &self.shared.read())?;
        self.overlay.put_edge(edge.clone());
        Ok(())
    }

    async fn insert_tag(&mut self, tag: &Tag) -> Result<(), StoreError> {
        self.charge_write()?;
        let taken = self.overlay.tag_names.contains_key(&tag.name)
            || self.shared.read().tag_names.contains_key(&tag.name);
        if taken {
            return Err(StoreError::DuplicateTagName(tag.name.clone()));
        }
        self.overlay.put_tag(tag.clone());
        Ok(())
    }

    async fn get_version(&mut self, id: &VersionId) -> Result<Option<Version>, StoreError> {
        let committed = self.shared.read();
        Ok(layered(&self.overlay.versions, &committed.versions, id).cloned())
    }

    async fn list_versions(&mut self) -> Result<Vec<Version>, StoreError> {
        let committed = self.shared.read();
        let mut all = committed.versions.clone();
        all.extend(self.overlay.versions.clone());
        Ok(all.into_values().collect())
    }

    async fn get_node(&mut self, id: &NodeId) -> Result<Option<Node>, StoreError> {
        let committed = self.shared.read();
        Ok(layered(&self.overlay.nodes, &committed.nodes, id).cloned())
    }

    async fn get_nodes(&mut self, ids: &[NodeId]) -> Result<Vec<Node>, StoreError> {
        let committed = self.shared.read();
        let ordered: BTreeSet<&NodeId> = ids.iter().collect();
        Ok(ordered
            .into_iter()
            .filter_map(|id| layered(&self.overlay.nodes, &committed.nodes, id).cloned())
            .collect())
    }

    async fn get_edge(&mut self, id: &EdgeId) -> Result<Option<Edge>, StoreError> {
        let committed = self.shared.read();
        Ok(layered(&self.overlay.edges, &committed.edges, id).cloned())
    }

    async fn get_edges(&mut self, ids: &[EdgeId]) -> Result<Vec<Edge>, StoreError> {
        let committed = self.shared.read();
        Ok(self.merged_edges(&committed, ids.iter().copied().collect()))
    }

    async fn nodes_in_version(&mut self, version: &VersionId) -> Result<Vec<Node>, StoreError> {
        let committed = self.shared.read();
        let mut ids = committed.version_nodes.get(version).cloned().unwrap_or_default();
        ids.extend(self.overlay.version_nodes.get(version).into_iter().flatten().copied());
        Ok(ids
            .iter()
            .filter_map(|id| layered(&self.overlay.nodes, &committed.nodes, id).cloned())
            .collect())
    }

    async fn edges_in_version(&mut self, version: &VersionId) -> Result<Vec<Edge>, StoreError> {
        let committed = self.shared.read();
        let mut ids = committed.version_edges.get(version).cloned().unwrap_or_default();
        ids.extend(self.overlay.version_edges.get(version).into_iter().flatten().copied());
        Ok(self.merged_edges(&committed, ids))
    }

    async fn outgoing_edges(&mut self, node: &NodeId) -> Result<Vec<Edge>, StoreError> {
        Ok(self.adjacent(node, true))
    }

    async fn incoming_edges(&mut self, node: &NodeId) -> Result<Vec<Edge>, StoreError> {
        Ok(self.adjacent(node, false))
    }

    async fn get_tag_by_name(&mut self, name: &str) -> Result<Option<Tag>, StoreError> {
        if let Some(tag) = self.overlay.tag_by_name(name) {
            return Ok(Some(tag.clone()));
        }
        Ok(self.shared.read().tag_by_name(name).cloned())
    }

    async fn list_tags(&mut self) -> Result<Vec<Tag>, StoreError> {
        let committed = self.shared.read();
        let mut tags: Vec<Tag> = committed
            .tags
            .values()
            .chain(self.overlay.tags.values())
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tags)
    }

    async fn commit(self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }

        let mut committed = self.shared.write();

        // Re-validate against scopes that committed after our writes were
        // staged; nothing is applied unless everything passes.
        for name in self.overlay.tag_names.keys() {
            if committed.tag_names.contains_key(name) {
                return Err(StoreError::DuplicateTagName(name.clone()));
            }
        }
        for node in self.overlay.nodes.values() {
            check_node(node, &self.overlay, &committed)?;
        }
        for edge in self.overlay.edges.values() {
            check_edge(edge, &self.overlay, &committed)?;
        }

        let overlay = self.overlay;
        let (versions, nodes, edges, tags) = (
            overlay.versions.len(),
            overlay.nodes.len(),
            overlay.edges.len(),
            overlay.tags.len(),
        );
        overlay.versions.into_values().for_each(|v| committed.put_version(v));
        overlay.nodes.into_values().for_each(|n| committed.put_node(n));
        overlay.edges.into_values().for_each(|e| committed.put_edge(e));
        overlay.tags.into_values().for_each(|t| committed.put_tag(t));

        tracing::trace!(
            writes = self.writes,
            versions,
            nodes,
            edges,
            tags,
            "In-memory transaction committed"
        );
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        tracing::trace!(discarded_writes = self.writes, "In-memory transaction rolled back");
        Ok(())
    }
}
