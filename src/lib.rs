//! Kinema is the render-and-cache core of a node-graph video compositor.
//!
//! A [`NodeGraph`] holds the live graph and records change events. A [`RenderBackend`] attached to
//! one viewer node turns those events into invalidated time ranges, orders the resulting cache
//! points around the playhead and renders them on a pool of low-priority worker threads into a
//! content-addressed disk [`FrameCache`].
//!
//! - Build a graph directly or load a [`Project`]
//! - Create a [`RenderBackend`] from a [`BackendConfig`] and `init` it
//! - Attach the viewer, `invalidate` ranges (or `sync` graph events) and `request_frame`
#![deny(unsafe_code)]
#![deny(missing_docs)]

pub mod cache;
pub mod compile;
/// Backend configuration.
pub mod config;
pub mod foundation;
pub mod graph;
pub mod nodes;
pub mod render;
pub mod schedule;

pub use crate::cache::FrameCache;
pub use crate::compile::{CompiledGraph, ContentHash};
pub use crate::config::BackendConfig;
pub use crate::foundation::error::{KinemaError, KinemaResult};
pub use crate::foundation::time::{Time, TimeRange};
pub use crate::graph::project::Project;
pub use crate::graph::{GraphEvent, GraphEventKind, NodeGraph, NodeId, NodeOp, Value};
pub use crate::render::{
    AudioParams, BackendStats, PixelFormat, RenderBackend, RenderOutcome, RenderParams,
};
pub use crate::schedule::CacheQueue;
