//! # tree-versioning
//!
//! Versioned directed graphs with immutable tags, full-copy branching and
//! rollback.
//!
//! A **version** is an append-only directed graph of nodes and edges carrying
//! opaque structured payloads. A **tag** freezes the exact node/edge id set of
//! a version under a globally unique name. New versions are branched from a
//! tag by copying its snapshot under fresh ids; a rollback is the same copy,
//! named as a restore.
//!
//! ## Architecture
//!
//! ```text
//! Graph Mutator ──grow──▶ Version ──tag──▶ Tag Index ──clone──▶ Version Cloner
//!                            │                 │
//!                            └──── Traversal Engine (current or tagged) ────┘
//!                                          ↓
//!                         GraphStore (Postgres or Memory)
//! ```
//!
//! ## Transactional scopes
//!
//! Every operation runs inside a [`StoreTransaction`]. The free functions in
//! [`mutator`], [`tags`], [`cloner`] and [`traversal`] take that scope
//! explicitly; [`VersioningEngine`] opens and finishes one per call. A scope
//! that is dropped without commit discards all of its writes, so no failed
//! operation leaves partial state.
//!
//! ## Determinism Guarantees
//!
//! - Listings are ordered by id
//! - Tag manifests are ordered sets; their fingerprint is a canonical hash
//! - Shortest-path ties are broken by canonical edge order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod cloner;
pub mod config;
pub mod engine;
pub mod error;
pub mod mutator;
pub mod store;
pub mod tags;
pub mod traversal;
pub mod types;

// Re-exports
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use cloner::{CloneIntent, ClonedVersion};
pub use config::EngineConfig;
pub use engine::VersioningEngine;
pub use error::{Result, VersioningError};
pub use mutator::InitialVersion;
pub use store::{GraphStore, InMemoryGraphStore, StoreError, StoreTransaction};
#[cfg(feature = "postgres")]
pub use store::{PostgresConfig, PostgresGraphStore};
pub use traversal::{GraphView, Path};
pub use types::{
    is_valid_tag_name, Edge, EdgeId, Node, NodeId, NonFiniteFloat, Payload, SnapshotManifest,
    Tag, TagId, TagState, Version, VersionId, TAG_NAME_PATTERN,
};

/// Version of the persisted table layout and the manifest fingerprint
/// encoding.
pub const SCHEMA_VERSION: &str = "1";
