//! Disk frame cache and cache namespaces.

/// Cache namespace identifiers.
pub mod cache_id;
/// Content-addressed frame files and the time-to-hash table.
pub mod frame_cache;

pub use cache_id::generate_cache_id;
pub use frame_cache::FrameCache;
