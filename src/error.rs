//! Error type for versioning operations.

use crate::store::StoreError;
use crate::types::{EdgeId, NodeId, VersionId};

/// Errors returned by the versioning engine.
///
/// Every failure is surfaced to the caller; nothing is retried. When one of
/// these is returned from a mutating operation the enclosing transaction is
/// rolled back, so no partial state survives.
#[derive(Debug, thiserror::Error)]
pub enum VersioningError {
    /// Version does not exist.
    #[error("Version not found: {0}")]
    VersionNotFound(VersionId),
    /// Node does not exist.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    /// Edge does not exist.
    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),
    /// No tag with this name.
    #[error("Tag not found: {0}")]
    TagNotFound(String),
    /// Edge endpoint is missing or belongs to another version.
    #[error("Invalid edge endpoint {node} for version {version}")]
    InvalidEndpoint {
        /// Version the edge was being added to.
        version: VersionId,
        /// Offending endpoint.
        node: NodeId,
    },
    /// Tag name is already taken somewhere in the store.
    #[error("Tag name already exists: {0}")]
    DuplicateTagName(String),
    /// Tag name fails the opt-in pattern check.
    #[error("Invalid tag name: {0:?}")]
    InvalidTagName(String),
    /// Target is unreachable from the start node over directed edges.
    #[error("No path found from {from} to {to}")]
    NoPathFound {
        /// Start node.
        from: NodeId,
        /// Destination node.
        to: NodeId,
    },
    /// Inserting the edge would close a cycle (acyclic insert only).
    #[error("Edge {source_node} -> {target} would create a cycle")]
    CycleDetected {
        /// Proposed source.
        source_node: NodeId,
        /// Proposed target.
        target: NodeId,
    },
    /// A single root was requested but the version has several.
    #[error("Version {version} has {count} root nodes")]
    AmbiguousRoot {
        /// Version queried.
        version: VersionId,
        /// Number of roots found.
        count: usize,
    },
    /// A single root was requested but the version has none.
    #[error("Version {0} has no root node")]
    NoRoot(VersionId),
    /// Persistence backend failure.
    #[error("Storage failure: {0}")]
    Storage(StoreError),
}

impl VersioningError {
    /// Whether this is one of the not-found kinds.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::VersionNotFound(_)
                | Self::NodeNotFound(_)
                | Self::EdgeNotFound(_)
                | Self::TagNotFound(_)
        )
    }

    /// Whether this failure came from the storage layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<StoreError> for VersioningError {
    fn from(err: StoreError) -> Self {
        match err {
            // Uniqueness races surface with the same kind as the pre-check.
            StoreError::DuplicateTagName(name) => Self::DuplicateTagName(name),
            other => Self::Storage(other),
        }
    }
}

/// Result alias for versioning operations.
pub type Result<T> = std::result::Result<T, VersioningError>;
