//! Traversal engine: roots, depths, neighbours and shortest paths.
//!
//! Queries run either against a version's current entity set or against a
//! tag's frozen snapshot. Whole-graph queries (roots, depth, paths) load a
//! [`GraphView`] once and walk it in memory; neighbour lookups go straight to
//! the store's adjacency indexes.
//!
//! Every walk keeps a visited set, so cyclic graphs terminate. Results are
//! deduplicated and ordered by id; BFS expands edges in
//! [`Edge::canonical_cmp`] order so the path chosen among equally short
//! candidates is stable.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{Result, VersioningError};
use crate::mutator::{get_node, get_version};
use crate::store::StoreTransaction;
use crate::tags::get_state_at_tag;
use crate::types::{Edge, EdgeId, Node, NodeId, VersionId};

/// A path from the first node to the last. Each entry carries the edge
/// linking it to the previous entry; the first entry has none.
pub type Path = Vec<(Node, Option<Edge>)>;

/// An in-memory, read-only view of one graph: a version's current state or
/// a tag snapshot.
#[derive(Debug, Clone, Default)]
pub struct GraphView {
    nodes: BTreeMap<NodeId, Node>,
    outgoing: BTreeMap<NodeId, Vec<Edge>>,
    incoming: BTreeMap<NodeId, Vec<Edge>>,
    edge_count: usize,
}

impl GraphView {
    /// Build a view. Edges with an endpoint outside `nodes` are ignored.
    pub fn new(
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> Self {
        let nodes: BTreeMap<NodeId, Node> = nodes.into_iter().map(|n| (n.id, n)).collect();
        let mut outgoing: BTreeMap<NodeId, Vec<Edge>> = BTreeMap::new();
        let mut incoming: BTreeMap<NodeId, Vec<Edge>> = BTreeMap::new();
        let mut edge_count = 0;

        for edge in edges {
            if !nodes.contains_key(&edge.source) || !nodes.contains_key(&edge.target) {
                continue;
            }
            edge_count += 1;
            incoming.entry(edge.target).or_default().push(edge.clone());
            outgoing.entry(edge.source).or_default().push(edge);
        }
        for list in outgoing.values_mut().chain(incoming.values_mut()) {
            list.sort_by(Edge::canonical_cmp);
        }

        Self {
            nodes,
            outgoing,
            incoming,
            edge_count,
        }
    }

    /// Load the current state of `version`.
    pub async fn of_version<T: StoreTransaction>(tx: &mut T, version: VersionId) -> Result<Self> {
        get_version(tx, version).await?;
        let nodes = tx.nodes_in_version(&version).await?;
        let edges = tx.edges_in_version(&version).await?;
        Ok(Self::new(nodes, edges))
    }

    /// Load the snapshot frozen by tag `name`.
    pub async fn at_tag<T: StoreTransaction>(tx: &mut T, name: &str) -> Result<Self> {
        let state = get_state_at_tag(tx, name).await?;
        Ok(Self::new(state.nodes, state.edges))
    }

    /// Number of nodes in the view.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges in the view.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Look up a node.
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes with no incoming edge.
    pub fn roots(&self) -> Vec<Node> {
        self.nodes
            .values()
            .filter(|n| !self.incoming.contains_key(&n.id))
            .cloned()
            .collect()
    }

    /// Distinct targets of `node`'s outgoing edges.
    pub fn children(&self, node: &NodeId) -> Vec<Node> {
        self.resolve(self.out_edges(node).iter().map(|e| e.target))
    }

    /// Distinct sources of `node`'s incoming edges.
    pub fn parents(&self, node: &NodeId) -> Vec<Node> {
        self.resolve(self.in_edges(node).iter().map(|e| e.source))
    }

    /// Every edge with `node` as source or target.
    pub fn edges_of(&self, node: &NodeId) -> Vec<Edge> {
        let mut by_id: BTreeMap<EdgeId, Edge> = BTreeMap::new();
        for edge in self.out_edges(node).iter().chain(self.in_edges(node)) {
            by_id.entry(edge.id).or_insert_with(|| edge.clone());
        }
        by_id.into_values().collect()
    }

    /// Shortest hop distance from the nearest root for every reachable node.
    pub fn depths(&self) -> BTreeMap<NodeId, usize> {
        let mut depth: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();

        for root in self.roots() {
            depth.insert(root.id, 0);
            queue.push_back((root.id, 0));
        }

        while let Some((current, d)) = queue.pop_front() {
            for edge in self.out_edges(&current) {
                if !depth.contains_key(&edge.target) {
                    depth.insert(edge.target, d + 1);
                    queue.push_back((edge.target, d + 1));
                }
            }
        }
        depth
    }

    /// Nodes whose depth is exactly `depth`. Nodes unreachable from any root
    /// are never returned.
    pub fn nodes_at_depth(&self, depth: usize) -> Vec<Node> {
        self.resolve(
            self.depths()
                .into_iter()
                .filter(|(_, d)| *d == depth)
                .map(|(id, _)| id),
        )
    }

    /// Breadth-first shortest directed path from `from` to `to`.
    pub fn find_path(&self, from: NodeId, to: NodeId) -> Result<Path> {
        let start = self
            .nodes
            .get(&from)
            .ok_or(VersioningError::NodeNotFound(from))?;
        if !self.nodes.contains_key(&to) {
            return Err(VersioningError::NodeNotFound(to));
        }

        // node -> edge used to reach it
        let mut via: BTreeMap<NodeId, Option<&Edge>> = BTreeMap::new();
        let mut queue = VecDeque::new();
        via.insert(from, None);
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            if current == to {
                break;
            }
            for edge in self.out_edges(&current) {
                if !via.contains_key(&edge.target) {
                    via.insert(edge.target, Some(edge));
                    queue.push_back(edge.target);
                }
            }
        }

        if !via.contains_key(&to) {
            return Err(VersioningError::NoPathFound { from, to });
        }

        let mut path = Vec::new();
        let mut cursor = to;
        while let Some(Some(edge)) = via.get(&cursor) {
            if let Some(node) = self.nodes.get(&cursor) {
                path.push((node.clone(), Some((*edge).clone())));
            }
            cursor = edge.source;
        }
        path.push((start.clone(), None));
        path.reverse();
        Ok(path)
    }

    fn out_edges(&self, node: &NodeId) -> &[Edge] {
        self.outgoing.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    fn in_edges(&self, node: &NodeId) -> &[Edge] {
        self.incoming.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    fn resolve(&self, ids: impl Iterator<Item = NodeId>) -> Vec<Node> {
        ids.collect::<BTreeSet<_>>()
            .iter()
            .filter_map(|id| self.nodes.get(id).cloned())
            .collect()
    }
}

/// Nodes of `version` with no incoming edge.
pub async fn get_root_nodes<T: StoreTransaction>(tx: &mut T, version: VersionId) -> Result<Vec<Node>> {
    let roots = GraphView::of_version(tx, version).await?.roots();
    tracing::debug!(version_id = %version, root_count = roots.len(), "Root nodes resolved");
    Ok(roots)
}

/// The single root of `version`.
///
/// Fails with `NoRoot` when there is none and `AmbiguousRoot` when several
/// nodes qualify.
pub async fn get_root_node<T: StoreTransaction>(tx: &mut T, version: VersionId) -> Result<Node> {
    let mut roots = get_root_nodes(tx, version).await?;
    match roots.len() {
        0 => Err(VersioningError::NoRoot(version)),
        1 => Ok(roots.remove(0)),
        count => Err(VersioningError::AmbiguousRoot { version, count }),
    }
}

/// Targets of the edges leaving `node`.
pub async fn get_child_nodes<T: StoreTransaction>(tx: &mut T, node: NodeId) -> Result<Vec<Node>> {
    get_node(tx, node).await?;
    let ids: Vec<NodeId> = tx
        .outgoing_edges(&node)
        .await?
        .into_iter()
        .map(|e| e.target)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    Ok(tx.get_nodes(&ids).await?)
}

/// Sources of the edges entering `node`.
pub async fn get_parent_nodes<T: StoreTransaction>(tx: &mut T, node: NodeId) -> Result<Vec<Node>> {
    get_node(tx, node).await?;
    let ids: Vec<NodeId> = tx
        .incoming_edges(&node)
        .await?
        .into_iter()
        .map(|e| e.source)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    Ok(tx.get_nodes(&ids).await?)
}

/// Every edge with `node` as source or target. A self-loop appears once.
pub async fn get_node_edges<T: StoreTransaction>(tx: &mut T, node: NodeId) -> Result<Vec<Edge>> {
    get_node(tx, node).await?;
    let mut by_id: BTreeMap<EdgeId, Edge> = BTreeMap::new();
    for edge in tx.outgoing_edges(&node).await? {
        by_id.insert(edge.id, edge);
    }
    for edge in tx.incoming_edges(&node).await? {
        by_id.entry(edge.id).or_insert(edge);
    }
    Ok(by_id.into_values().collect())
}

/// Nodes of `version` exactly `depth` hops from the nearest root.
pub async fn get_nodes_at_depth<T: StoreTransaction>(
    tx: &mut T,
    version: VersionId,
    depth: usize,
) -> Result<Vec<Node>> {
    let nodes = GraphView::of_version(tx, version).await?.nodes_at_depth(depth);
    tracing::debug!(version_id = %version, depth, node_count = nodes.len(), "Depth query");
    Ok(nodes)
}

/// Shortest directed path from `from` to `to` within their version.
///
/// Fails with `NoPathFound` when `to` is unreachable, including when the two
/// nodes belong to different versions.
pub async fn find_path<T: StoreTransaction>(tx: &mut T, from: NodeId, to: NodeId) -> Result<Path> {
    let source = get_node(tx, from).await?;
    let target = get_node(tx, to).await?;
    if source.version_id != target.version_id {
        return Err(VersioningError::NoPathFound { from, to });
    }

    let path = GraphView::of_version(tx, source.version_id)
        .await?
        .find_path(from, to)?;
    tracing::debug!(from = %from, to = %to, hops = path.len() - 1, "Path found");
    Ok(path)
}

/// Roots of the snapshot frozen by tag `name`.
pub async fn get_root_nodes_at_tag<T: StoreTransaction>(tx: &mut T, name: &str) -> Result<Vec<Node>> {
    Ok(GraphView::at_tag(tx, name).await?.roots())
}

/// Nodes `depth` hops from the nearest root in the snapshot of tag `name`.
pub async fn get_nodes_at_depth_at_tag<T: StoreTransaction>(
    tx: &mut T,
    name: &str,
    depth: usize,
) -> Result<Vec<Node>> {
    Ok(GraphView::at_tag(tx, name).await?.nodes_at_depth(depth))
}

/// Shortest path between two snapshot nodes of tag `name`.
pub async fn find_path_at_tag<T: StoreTransaction>(
    tx: &mut T,
    name: &str,
    from: NodeId,
    to: NodeId,
) -> Result<Path> {
    GraphView::at_tag(tx, name).await?.find_path(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::{add_edge, add_node, create_version};
    use crate::store::{GraphStore, InMemoryGraphStore, InMemoryTransaction};
    use crate::tags::create_tag;
    use crate::types::Payload;

    fn ids(nodes: &[Node]) -> BTreeSet<NodeId> {
        nodes.iter().map(|n| n.id).collect()
    }

    /// root -> {a, b} -> c, plus c -> a closing a cycle.
    async fn diamond(tx: &mut InMemoryTransaction) -> (VersionId, [Node; 4]) {
        let version = create_version(tx, "diamond").await.unwrap();
        let mut nodes = Vec::new();
        for name in ["root", "a", "b", "c"] {
            nodes.push(
                add_node(tx, version.id, Payload::from_pairs([("name", name)]))
                    .await
                    .unwrap(),
            );
        }
        let [root, a, b, c]: [Node; 4] = nodes.try_into().unwrap();
        for (s, t) in [(&root, &a), (&root, &b), (&a, &c), (&b, &c), (&c, &a)] {
            add_edge(tx, version.id, s.id, t.id, Payload::empty()).await.unwrap();
        }
        (version.id, [root, a, b, c])
    }

    #[tokio::test]
    async fn test_roots_and_depth_zero_agree() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let (version, [root, ..]) = diamond(&mut tx).await;

        let roots = get_root_nodes(&mut tx, version).await.unwrap();
        assert_eq!(ids(&roots), BTreeSet::from([root.id]));
        assert_eq!(get_nodes_at_depth(&mut tx, version, 0).await.unwrap(), roots);
        assert_eq!(get_root_node(&mut tx, version).await.unwrap(), root);
    }

    #[tokio::test]
    async fn test_depth_is_shortest_distance_despite_cycle() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let (version, [_, a, b, c]) = diamond(&mut tx).await;

        let depth1 = get_nodes_at_depth(&mut tx, version, 1).await.unwrap();
        assert_eq!(ids(&depth1), BTreeSet::from([a.id, b.id]));
        let depth2 = get_nodes_at_depth(&mut tx, version, 2).await.unwrap();
        assert_eq!(ids(&depth2), BTreeSet::from([c.id]));
        assert!(get_nodes_at_depth(&mut tx, version, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_cycle_has_no_depth() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let version = create_version(&mut tx, "loop").await.unwrap();
        let x = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        let y = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        add_edge(&mut tx, version.id, x.id, y.id, Payload::empty()).await.unwrap();
        add_edge(&mut tx, version.id, y.id, x.id, Payload::empty()).await.unwrap();

        assert!(get_root_nodes(&mut tx, version.id).await.unwrap().is_empty());
        assert!(get_nodes_at_depth(&mut tx, version.id, 0).await.unwrap().is_empty());
        let err = get_root_node(&mut tx, version.id).await.unwrap_err();
        assert!(matches!(err, VersioningError::NoRoot(_)));
    }

    #[tokio::test]
    async fn test_multiple_roots_are_ambiguous() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let version = create_version(&mut tx, "forest").await.unwrap();
        add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        add_node(&mut tx, version.id, Payload::empty()).await.unwrap();

        let err = get_root_node(&mut tx, version.id).await.unwrap_err();
        assert!(matches!(err, VersioningError::AmbiguousRoot { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_neighbours() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let (_, [root, a, b, c]) = diamond(&mut tx).await;

        let children = get_child_nodes(&mut tx, root.id).await.unwrap();
        assert_eq!(ids(&children), BTreeSet::from([a.id, b.id]));

        let parents = get_parent_nodes(&mut tx, a.id).await.unwrap();
        assert_eq!(ids(&parents), BTreeSet::from([root.id, c.id]));

        let edges = get_node_edges(&mut tx, c.id).await.unwrap();
        assert_eq!(edges.len(), 3);
        assert!(edges.iter().all(|e| e.touches(&c.id)));
    }

    #[tokio::test]
    async fn test_self_loop_listed_once() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let version = create_version(&mut tx, "self").await.unwrap();
        let n = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        add_edge(&mut tx, version.id, n.id, n.id, Payload::empty()).await.unwrap();

        assert_eq!(get_node_edges(&mut tx, n.id).await.unwrap().len(), 1);
        assert_eq!(get_child_nodes(&mut tx, n.id).await.unwrap(), vec![n]);
    }

    #[tokio::test]
    async fn test_neighbours_of_missing_node() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = get_child_nodes(&mut tx, NodeId::generate()).await.unwrap_err();
        assert!(matches!(err, VersioningError::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_find_path_is_shortest_and_connected() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let (version, [root, _, _, c]) = diamond(&mut tx).await;

        let path = find_path(&mut tx, root.id, c.id).await.unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].0, root);
        assert!(path[0].1.is_none());
        assert_eq!(path[2].0, c);
        for pair in path.windows(2) {
            let edge = pair[1].1.as_ref().unwrap();
            assert_eq!(edge.source, pair[0].0.id);
            assert_eq!(edge.target, pair[1].0.id);
            assert_eq!(edge.version_id, version);
        }
    }

    #[tokio::test]
    async fn test_find_path_to_self() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let (_, [root, ..]) = diamond(&mut tx).await;

        let path = find_path(&mut tx, root.id, root.id).await.unwrap();
        assert_eq!(path, vec![(root, None)]);
    }

    #[tokio::test]
    async fn test_find_path_follows_direction() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let (_, [root, _, _, c]) = diamond(&mut tx).await;

        let err = find_path(&mut tx, c.id, root.id).await.unwrap_err();
        assert!(matches!(err, VersioningError::NoPathFound { from, to } if from == c.id && to == root.id));
    }

    #[tokio::test]
    async fn test_find_path_across_versions() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let v1 = create_version(&mut tx, "one").await.unwrap();
        let v2 = create_version(&mut tx, "two").await.unwrap();
        let a = add_node(&mut tx, v1.id, Payload::empty()).await.unwrap();
        let b = add_node(&mut tx, v2.id, Payload::empty()).await.unwrap();

        let err = find_path(&mut tx, a.id, b.id).await.unwrap_err();
        assert!(matches!(err, VersioningError::NoPathFound { .. }));
    }

    #[tokio::test]
    async fn test_tag_scoped_queries_use_snapshot() {
        let store = InMemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let version = create_version(&mut tx, "grow").await.unwrap();
        let root = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        let mid = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        add_edge(&mut tx, version.id, root.id, mid.id, Payload::empty()).await.unwrap();
        create_tag(&mut tx, version.id, "snap", "").await.unwrap();

        let leaf = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        add_edge(&mut tx, version.id, mid.id, leaf.id, Payload::empty()).await.unwrap();
        // A new parent for root makes it a non-root in the live version.
        let above = add_node(&mut tx, version.id, Payload::empty()).await.unwrap();
        add_edge(&mut tx, version.id, above.id, root.id, Payload::empty()).await.unwrap();

        let roots = get_root_nodes_at_tag(&mut tx, "snap").await.unwrap();
        assert_eq!(ids(&roots), BTreeSet::from([root.id]));
        assert_eq!(ids(&get_root_nodes(&mut tx, version.id).await.unwrap()), BTreeSet::from([above.id]));

        assert!(get_nodes_at_depth_at_tag(&mut tx, "snap", 2).await.unwrap().is_empty());
        let err = find_path_at_tag(&mut tx, "snap", root.id, leaf.id).await.unwrap_err();
        assert!(matches!(err, VersioningError::NodeNotFound(id) if id == leaf.id));
        assert_eq!(find_path_at_tag(&mut tx, "snap", root.id, mid.id).await.unwrap().len(), 2);
    }

    #[test]
    fn test_view_drops_dangling_edges() {
        let version = VersionId::generate();
        let a = Node::new(version, Payload::empty());
        let b = Node::new(version, Payload::empty());
        let dangling = Edge::new(version, a.id, NodeId::generate(), Payload::empty());
        let ok = Edge::new(version, a.id, b.id, Payload::empty());

        let view = GraphView::new([a.clone(), b], [dangling, ok]);
        assert_eq!(view.node_count(), 2);
        assert_eq!(view.edge_count(), 1);
        assert_eq!(view.roots(), vec![a]);
    }
}
