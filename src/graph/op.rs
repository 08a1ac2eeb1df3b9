use std::fmt;

use crate::foundation::error::{KinemaError, KinemaResult};
use crate::foundation::time::{Time, TimeRange};
use crate::graph::value::{Value, ValueKind};

/// Declared input of a node operation.
#[derive(Clone, Debug)]
pub struct InputSpec {
    /// Stable input identifier.
    pub id: &'static str,
    /// Value kind this input accepts.
    pub kind: ValueKind,
    /// Value used until the user sets one.
    pub default: Value,
}

impl InputSpec {
    /// Shorthand constructor.
    pub fn new(id: &'static str, kind: ValueKind, default: Value) -> Self {
        Self { id, kind, default }
    }
}

/// How a change to an input should be reported beyond plain content invalidation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Output pixels change over the affected range.
    Content,
    /// The sequence length changed.
    Length,
    /// Output resolution or time base changed.
    VideoParams,
}

/// Per-evaluation context handed to [`NodeOp::value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvalContext {
    /// Time being evaluated.
    pub time: Time,
    /// Effective output width in pixels.
    pub width: u32,
    /// Effective output height in pixels.
    pub height: u32,
}

/// Per-evaluation context handed to [`NodeOp::samples`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioContext {
    /// Half-open block `[in, out)` being rendered.
    pub range: TimeRange,
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
}

impl AudioContext {
    /// Sample frames covering the block.
    pub fn frames(&self) -> usize {
        let n = (self.range.length() * i64::from(self.sample_rate)).div_floor(Time::from_secs(1));
        usize::try_from(n).unwrap_or(0)
    }

    /// Time in seconds of sample frame `i`.
    pub fn frame_time(&self, i: usize) -> f64 {
        self.range.in_point().as_f64() + i as f64 / f64::from(self.sample_rate.max(1))
    }
}

/// Resolved input values of one node at one time, in declaration order.
#[derive(Debug, Default)]
pub struct InputValues {
    values: Vec<(&'static str, Value)>,
}

impl InputValues {
    pub(crate) fn with_capacity(n: usize) -> Self {
        Self {
            values: Vec::with_capacity(n),
        }
    }

    pub(crate) fn push(&mut self, id: &'static str, value: Value) {
        self.values.push((id, value));
    }

    /// Value of input `id`, or [`Value::None`] when absent.
    pub fn get(&self, id: &str) -> &Value {
        self.values
            .iter()
            .find(|(k, _)| *k == id)
            .map(|(_, v)| v)
            .unwrap_or(&Value::None)
    }

    /// Numeric input, failing when absent or mistyped.
    pub fn float(&self, id: &str) -> KinemaResult<f64> {
        self.get(id)
            .as_f64()
            .ok_or_else(|| KinemaError::evaluation(format!("input '{id}' is not numeric")))
    }

    /// Color input, failing when absent or mistyped.
    pub fn color(&self, id: &str) -> KinemaResult<[f32; 4]> {
        match self.get(id) {
            Value::Color(c) => Ok(*c),
            _ => Err(KinemaError::evaluation(format!(
                "input '{id}' is not a color"
            ))),
        }
    }
}

/// Opaque per-node computation.
///
/// Implementations are stateless: per-time results are cached by the compiled graph, not by the
/// op, so one `Arc<dyn NodeOp>` can be shared between the live graph and its snapshots.
pub trait NodeOp: Send + Sync + fmt::Debug {
    /// Stable op identifier (also used by project files and content hashing).
    fn id(&self) -> &'static str;

    /// Declared inputs in a stable order.
    fn inputs(&self) -> Vec<InputSpec>;

    /// Compute the node output from already-resolved inputs.
    fn value(&self, inputs: &InputValues, ctx: &EvalContext) -> KinemaResult<Value>;

    /// Compute the audio output over `ctx.range`. Ops without audio produce nothing.
    fn samples(&self, _inputs: &InputValues, _ctx: &AudioContext) -> KinemaResult<Value> {
        Ok(Value::None)
    }

    /// Whether the output depends on the evaluation time itself (not just on input values).
    fn is_time_variant(&self) -> bool {
        false
    }

    /// Whether this node is an evaluation root that receives graph events.
    fn is_viewer(&self) -> bool {
        false
    }

    /// Classify a change on `input`.
    fn classify_change(&self, _input: &str) -> ChangeKind {
        ChangeKind::Content
    }
}
