//! Core types for the versioning engine.

pub mod ids;
pub mod payload;
pub mod version;
pub mod node;
pub mod edge;
pub mod tag;

pub use ids::{VersionId, NodeId, EdgeId, TagId};
pub use payload::{NonFiniteFloat, Payload};
pub use version::Version;
pub use node::Node;
pub use edge::Edge;
pub use tag::{Tag, TagState, SnapshotManifest, TAG_NAME_PATTERN, is_valid_tag_name};
