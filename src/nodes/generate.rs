use std::sync::Arc;

use crate::foundation::error::KinemaResult;
use crate::graph::{
    AudioContext, EvalContext, ImageBuffer, InputSpec, InputValues, NodeOp, SampleBuffer, Value,
    ValueKind,
};

fn premultiply([r, g, b, a]: [f32; 4]) -> [f32; 4] {
    let a = a.clamp(0.0, 1.0);
    [r * a, g * a, b * a, a]
}

/// Fills the frame with one color.
#[derive(Debug, Default)]
pub struct SolidOp;

impl NodeOp for SolidOp {
    fn id(&self) -> &'static str {
        "solid"
    }

    fn inputs(&self) -> Vec<InputSpec> {
        vec![InputSpec::new(
            "color",
            ValueKind::Color,
            Value::Color([0.0, 0.0, 0.0, 1.0]),
        )]
    }

    fn value(&self, inputs: &InputValues, ctx: &EvalContext) -> KinemaResult<Value> {
        let px = premultiply(inputs.color("color")?);
        Ok(Value::Image(Arc::new(ImageBuffer::filled(
            ctx.width, ctx.height, px,
        ))))
    }
}

/// Gray level that sweeps from black to white once per `period` seconds.
///
/// Output depends on the evaluation time directly, so content hashes include it.
#[derive(Debug, Default)]
pub struct RampOp;

impl NodeOp for RampOp {
    fn id(&self) -> &'static str {
        "ramp"
    }

    fn inputs(&self) -> Vec<InputSpec> {
        vec![InputSpec::new("period", ValueKind::Float, Value::Float(1.0))]
    }

    fn value(&self, inputs: &InputValues, ctx: &EvalContext) -> KinemaResult<Value> {
        let period = inputs.float("period")?.max(f64::EPSILON);
        let level = (ctx.time.as_f64() / period).rem_euclid(1.0) as f32;
        Ok(Value::Image(Arc::new(ImageBuffer::filled(
            ctx.width,
            ctx.height,
            [level, level, level, 1.0],
        ))))
    }

    fn is_time_variant(&self) -> bool {
        true
    }
}

/// Sine tone on every channel. Produces no image.
#[derive(Debug, Default)]
pub struct ToneOp;

impl NodeOp for ToneOp {
    fn id(&self) -> &'static str {
        "tone"
    }

    fn inputs(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::new("frequency", ValueKind::Float, Value::Float(440.0)),
            InputSpec::new("gain", ValueKind::Float, Value::Float(0.5)),
        ]
    }

    fn value(&self, _inputs: &InputValues, _ctx: &EvalContext) -> KinemaResult<Value> {
        Ok(Value::None)
    }

    fn samples(&self, inputs: &InputValues, ctx: &AudioContext) -> KinemaResult<Value> {
        let freq = inputs.float("frequency")?;
        let gain = inputs.float("gain")? as f32;
        let channels = usize::from(ctx.channels.max(1));
        let mut buf = SampleBuffer::silent(ctx.sample_rate, ctx.channels.max(1), ctx.frames());
        for (i, frame) in buf.data_mut().chunks_mut(channels).enumerate() {
            let phase = std::f64::consts::TAU * freq * ctx.frame_time(i);
            frame.fill(gain * phase.sin() as f32);
        }
        Ok(Value::Samples(Arc::new(buf)))
    }

    fn is_time_variant(&self) -> bool {
        true
    }
}
