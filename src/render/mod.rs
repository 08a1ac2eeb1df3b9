//! Render parameters, the worker pool and the coordinating backend.

pub mod backend;
/// Render parameters and pixel formats.
pub mod params;
pub(crate) mod priority;
pub(crate) mod worker;

pub use backend::{BackendStats, RenderBackend};
pub use params::{AudioParams, PixelFormat, RenderParams};
pub use worker::RenderOutcome;
