use std::sync::Arc;

use crate::foundation::time::Time;

/// Premultiplied RGBA pixels in `f32`, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

impl ImageBuffer {
    /// Fully transparent image.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0.0; 4])
    }

    /// Image filled with one premultiplied pixel value.
    pub fn filled(width: u32, height: u32, px: [f32; 4]) -> Self {
        let n = (width as usize).saturating_mul(height as usize);
        Self {
            width,
            height,
            pixels: vec![px; n],
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel slice, row-major.
    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    /// Mutable pixel slice, row-major.
    pub fn pixels_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.pixels
    }
}

/// Interleaved `f32` audio samples.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: u16,
    data: Vec<f32>,
}

impl SampleBuffer {
    /// Silent buffer holding `frames` sample frames.
    pub fn silent(sample_rate: u32, channels: u16, frames: usize) -> Self {
        Self {
            sample_rate,
            channels,
            data: vec![0.0; frames.saturating_mul(usize::from(channels))],
        }
    }

    /// Samples per second per channel.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (one sample per channel each).
    pub fn frames(&self) -> usize {
        self.data.len() / usize::from(self.channels.max(1))
    }

    /// Interleaved samples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable interleaved samples.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

/// Value types an input can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// `Value::Bool`
    Bool,
    /// `Value::Int`
    Int,
    /// `Value::Float`
    Float,
    /// `Value::Color`
    Color,
    /// `Value::Time`
    Time,
    /// Image produced by an upstream node; only meaningful through a connection.
    Texture,
    /// Audio produced by an upstream node; only meaningful through a connection.
    Samples,
}

/// Typed value flowing along graph edges or stored in an input.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Nothing connected / nothing produced.
    None,
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point scalar.
    Float(f64),
    /// Straight-alpha RGBA color.
    Color([f32; 4]),
    /// Exact time.
    Time(Time),
    /// Image buffer handle.
    Image(Arc<ImageBuffer>),
    /// Audio buffer handle.
    Samples(Arc<SampleBuffer>),
}

impl Value {
    /// Kind tag of this value, `None` for [`Value::None`].
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::None => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Color(_) => Some(ValueKind::Color),
            Value::Time(_) => Some(ValueKind::Time),
            Value::Image(_) => Some(ValueKind::Texture),
            Value::Samples(_) => Some(ValueKind::Samples),
        }
    }

    /// Numeric view of `Int` and `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Time view of `Time`.
    pub fn as_time(&self) -> Option<Time> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Image view of `Image`.
    pub fn as_image(&self) -> Option<&Arc<ImageBuffer>> {
        match self {
            Value::Image(img) => Some(img),
            _ => None,
        }
    }

    /// Audio view of `Samples`.
    pub fn as_samples(&self) -> Option<&Arc<SampleBuffer>> {
        match self {
            Value::Samples(buf) => Some(buf),
            _ => None,
        }
    }
}
