use crate::foundation::error::{KinemaError, KinemaResult};
use crate::foundation::time::Time;
use crate::graph::{
    AudioContext, ChangeKind, EvalContext, InputSpec, InputValues, NodeGraph, NodeId, NodeOp,
    Value, ValueKind,
};

/// Image input rendered by the viewer.
pub const TEXTURE: &str = "texture";
/// Audio input played with the sequence.
pub const AUDIO: &str = "audio";
/// Sequence length.
pub const LENGTH: &str = "length";
/// Output width in pixels.
pub const WIDTH: &str = "width";
/// Output height in pixels.
pub const HEIGHT: &str = "height";
/// Frame duration.
pub const TIME_BASE: &str = "timebase";

/// Video parameters a viewer publishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoParams {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Duration of one frame.
    pub time_base: Time,
}

/// Evaluation root: passes its texture and audio inputs through and carries the sequence
/// parameters.
#[derive(Debug, Default)]
pub struct ViewerOp;

impl NodeOp for ViewerOp {
    fn id(&self) -> &'static str {
        "viewer"
    }

    fn inputs(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::new(TEXTURE, ValueKind::Texture, Value::None),
            InputSpec::new(AUDIO, ValueKind::Samples, Value::None),
            InputSpec::new(LENGTH, ValueKind::Time, Value::Time(Time::ZERO)),
            InputSpec::new(WIDTH, ValueKind::Int, Value::Int(1920)),
            InputSpec::new(HEIGHT, ValueKind::Int, Value::Int(1080)),
            InputSpec::new(
                TIME_BASE,
                ValueKind::Time,
                Value::Time(Time::frame_duration(24)),
            ),
        ]
    }

    fn value(&self, inputs: &InputValues, _ctx: &EvalContext) -> KinemaResult<Value> {
        Ok(inputs.get(TEXTURE).clone())
    }

    fn samples(&self, inputs: &InputValues, _ctx: &AudioContext) -> KinemaResult<Value> {
        Ok(inputs.get(AUDIO).clone())
    }

    fn is_viewer(&self) -> bool {
        true
    }

    fn classify_change(&self, input: &str) -> ChangeKind {
        match input {
            LENGTH => ChangeKind::Length,
            WIDTH | HEIGHT | TIME_BASE => ChangeKind::VideoParams,
            _ => ChangeKind::Content,
        }
    }
}

fn viewer_value(graph: &NodeGraph, viewer: NodeId, input: &str) -> KinemaResult<Value> {
    let node = graph
        .node(viewer)
        .ok_or_else(|| KinemaError::graph(format!("unknown viewer {viewer}")))?;
    if !node.op().is_viewer() {
        return Err(KinemaError::graph(format!(
            "node '{}' is not a viewer",
            node.name()
        )));
    }
    node.stored_value(input, Time::ZERO)
        .ok_or_else(|| KinemaError::graph(format!("viewer has no '{input}' input")))
}

/// Read width, height and time base from a viewer node.
pub fn video_params(graph: &NodeGraph, viewer: NodeId) -> KinemaResult<VideoParams> {
    let dim = |input: &str| -> KinemaResult<u32> {
        viewer_value(graph, viewer, input)?
            .as_i64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| KinemaError::graph(format!("viewer '{input}' is not a valid size")))
    };
    let time_base = viewer_value(graph, viewer, TIME_BASE)?
        .as_time()
        .ok_or_else(|| KinemaError::graph("viewer time base is not a time"))?;
    Ok(VideoParams {
        width: dim(WIDTH)?,
        height: dim(HEIGHT)?,
        time_base,
    })
}

/// Sequence length of a viewer, zero when unreadable.
pub fn sequence_length(graph: &NodeGraph, viewer: NodeId) -> Time {
    viewer_value(graph, viewer, LENGTH)
        .ok()
        .and_then(|v| v.as_time())
        .unwrap_or(Time::ZERO)
}

/// Return `true` when something feeds the viewer's audio input.
pub fn has_audio(graph: &NodeGraph, viewer: NodeId) -> bool {
    graph
        .node(viewer)
        .and_then(|n| n.input(AUDIO))
        .is_some_and(|i| i.edge.is_some())
}
