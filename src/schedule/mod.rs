//! Which cache points to render, and in what order.

/// Time-base aligned points of a range.
pub mod points;
/// Playhead-weighted queue of pending cache points.
pub mod queue;

pub use points::{AlignedPoints, aligned_points};
pub use queue::{CacheQueue, weighted_distance};
