use std::sync::Arc;

use crate::foundation::error::KinemaResult;
use crate::graph::{EvalContext, ImageBuffer, InputSpec, InputValues, NodeOp, Value, ValueKind};

/// Scales an image by a percentage opacity.
#[derive(Debug, Default)]
pub struct OpacityOp;

impl NodeOp for OpacityOp {
    fn id(&self) -> &'static str {
        "opacity"
    }

    fn inputs(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::new("texture", ValueKind::Texture, Value::None),
            InputSpec::new("opacity", ValueKind::Float, Value::Float(100.0)),
        ]
    }

    fn value(&self, inputs: &InputValues, _ctx: &EvalContext) -> KinemaResult<Value> {
        let Some(src) = inputs.get("texture").as_image() else {
            return Ok(Value::None);
        };
        let k = (inputs.float("opacity")? * 0.01).clamp(0.0, 1.0) as f32;
        if k >= 1.0 {
            return Ok(Value::Image(Arc::clone(src)));
        }
        let mut out = ImageBuffer::clone(src);
        for px in out.pixels_mut() {
            for c in px.iter_mut() {
                *c *= k;
            }
        }
        Ok(Value::Image(Arc::new(out)))
    }
}

/// Source-over composite of `blend` onto `base`.
#[derive(Debug, Default)]
pub struct MergeOp;

impl NodeOp for MergeOp {
    fn id(&self) -> &'static str {
        "merge"
    }

    fn inputs(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::new("base", ValueKind::Texture, Value::None),
            InputSpec::new("blend", ValueKind::Texture, Value::None),
        ]
    }

    fn value(&self, inputs: &InputValues, ctx: &EvalContext) -> KinemaResult<Value> {
        let base = inputs.get("base").as_image();
        let blend = inputs.get("blend").as_image();
        let (base, blend) = match (base, blend) {
            (None, None) => return Ok(Value::None),
            (Some(img), None) | (None, Some(img)) => return Ok(Value::Image(Arc::clone(img))),
            (Some(a), Some(b)) => (a, b),
        };

        let mut out = ImageBuffer::transparent(ctx.width, ctx.height);
        let w = ctx.width as usize;
        for y in 0..ctx.height as usize {
            for x in 0..w {
                let dst = sample(base, x, y);
                let src = sample(blend, x, y);
                let inv = 1.0 - src[3];
                out.pixels_mut()[y * w + x] = [
                    src[0] + dst[0] * inv,
                    src[1] + dst[1] * inv,
                    src[2] + dst[2] * inv,
                    src[3] + dst[3] * inv,
                ];
            }
        }
        Ok(Value::Image(Arc::new(out)))
    }
}

fn sample(img: &ImageBuffer, x: usize, y: usize) -> [f32; 4] {
    if x >= img.width() as usize || y >= img.height() as usize {
        return [0.0; 4];
    }
    img.pixels()[y * img.width() as usize + x]
}
