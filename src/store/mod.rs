//! Graph storage backends.
//!
//! The engine only talks to storage through a [`StoreTransaction`]: every
//! operation, read or write, runs inside a scope opened with
//! [`GraphStore::begin`]. A scope becomes durable on
//! [`StoreTransaction::commit`]; rolling it back or simply dropping it
//! discards every write made in it and releases the underlying connection.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::types::{Edge, EdgeId, Node, NodeId, Tag, Version, VersionId};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unique constraint on tag name violated.
    #[error("Duplicate tag name: {0}")]
    DuplicateTagName(String),
    /// Foreign-key style check failed (edge endpoint, owning version).
    #[error("Referential constraint violated: {0}")]
    ReferentialViolation(String),
    /// The store handle has been closed.
    #[error("Store is closed")]
    Closed,
    /// Any other backend failure.
    #[error("Backend error: {0}")]
    Backend(String),
    /// Database error.
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Create a backend error from any error type.
    pub fn from_backend<E: std::error::Error>(e: E) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Trait for graph storage backends.
///
/// A store is a process-wide handle with an explicit lifecycle: it is open
/// once constructed and refuses new scopes after [`GraphStore::close`].
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Transaction scope type.
    type Transaction: StoreTransaction;

    /// Open a new transactional scope.
    async fn begin(&self) -> Result<Self::Transaction, StoreError>;

    /// Close the store. Open scopes fail to commit afterwards.
    async fn close(&self);

    /// Whether [`GraphStore::close`] has been called.
    fn is_closed(&self) -> bool;
}

/// A transactional scope over the store.
///
/// Reads observe the scope's own uncommitted writes. All listings are
/// ordered by id for determinism.
#[async_trait]
pub trait StoreTransaction: Send + Sized {
    /// Persist a new version.
    async fn insert_version(&mut self, version: &Version) -> Result<(), StoreError>;

    /// Persist a new node. Its version must exist.
    async fn insert_node(&mut self, node: &Node) -> Result<(), StoreError>;

    /// Persist a new edge. Both endpoints must exist in the edge's version.
    async fn insert_edge(&mut self, edge: &Edge) -> Result<(), StoreError>;

    /// Persist a new tag. Fails with [`StoreError::DuplicateTagName`] when
    /// the name is taken.
    async fn insert_tag(&mut self, tag: &Tag) -> Result<(), StoreError>;

    /// Fetch a version by id.
    async fn get_version(&mut self, id: &VersionId) -> Result<Option<Version>, StoreError>;

    /// Fetch every version.
    async fn list_versions(&mut self) -> Result<Vec<Version>, StoreError>;

    /// Fetch a node by id.
    async fn get_node(&mut self, id: &NodeId) -> Result<Option<Node>, StoreError>;

    /// Fetch multiple nodes by id. Missing ids are skipped.
    async fn get_nodes(&mut self, ids: &[NodeId]) -> Result<Vec<Node>, StoreError>;

    /// Fetch an edge by id.
    async fn get_edge(&mut self, id: &EdgeId) -> Result<Option<Edge>, StoreError>;

    /// Fetch multiple edges by id. Missing ids are skipped.
    async fn get_edges(&mut self, ids: &[EdgeId]) -> Result<Vec<Edge>, StoreError>;

    /// All nodes owned by a version.
    async fn nodes_in_version(&mut self, version: &VersionId) -> Result<Vec<Node>, StoreError>;

    /// All edges owned by a version.
    async fn edges_in_version(&mut self, version: &VersionId) -> Result<Vec<Edge>, StoreError>;

    /// Edges whose source is `node`.
    async fn outgoing_edges(&mut self, node: &NodeId) -> Result<Vec<Edge>, StoreError>;

    /// Edges whose target is `node`.
    async fn incoming_edges(&mut self, node: &NodeId) -> Result<Vec<Edge>, StoreError>;

    /// Fetch a tag by its unique name.
    async fn get_tag_by_name(&mut self, name: &str) -> Result<Option<Tag>, StoreError>;

    /// Fetch every tag, ordered by creation time then id.
    async fn list_tags(&mut self) -> Result<Vec<Tag>, StoreError>;

    /// Make every write in this scope durable, atomically.
    async fn commit(self) -> Result<(), StoreError>;

    /// Discard every write in this scope.
    async fn rollback(self) -> Result<(), StoreError>;
}

pub use memory::{InMemoryGraphStore, InMemoryTransaction};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresGraphStore};
