//! Viewer snapshots handed to render workers, and their content hashing.

/// Content hashes of snapshot subgraphs.
pub mod fingerprint;
/// Compiled viewer snapshots.
pub mod snapshot;

pub use fingerprint::{ContentHash, content_hash};
pub use snapshot::{CompiledGraph, ROOT};
