//! Built-in node operations.

use std::sync::Arc;

use crate::graph::NodeOp;

mod composite;
mod generate;
/// Evaluation root and the sequence parameters it carries.
pub mod viewer;

pub use composite::{MergeOp, OpacityOp};
pub use generate::{RampOp, SolidOp, ToneOp};
pub use viewer::{VideoParams, ViewerOp};

/// Ids accepted by [`op_by_id`].
pub const BUILTIN_OPS: [&str; 6] = ["viewer", "solid", "ramp", "tone", "opacity", "merge"];

/// Instantiate a built-in op by its stable id.
pub fn op_by_id(id: &str) -> Option<Arc<dyn NodeOp>> {
    let op: Arc<dyn NodeOp> = match id {
        "viewer" => Arc::new(ViewerOp),
        "solid" => Arc::new(SolidOp),
        "ramp" => Arc::new(RampOp),
        "tone" => Arc::new(ToneOp),
        "opacity" => Arc::new(OpacityOp),
        "merge" => Arc::new(MergeOp),
        _ => return None,
    };
    Some(op)
}

#[cfg(test)]
#[path = "../../tests/unit/nodes/nodes.rs"]
mod tests;
