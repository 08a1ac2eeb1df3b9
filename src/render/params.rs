use crate::foundation::time::{Time, TimeRange};
use crate::graph::{AudioContext, ImageBuffer};
use crate::nodes::VideoParams;

/// Pixel layout of cached frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit unsigned per channel.
    #[default]
    Rgba8,
    /// 16-bit unsigned per channel, little endian.
    Rgba16,
    /// 32-bit float per channel, little endian.
    Rgba32f,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgba16 => 8,
            PixelFormat::Rgba32f => 16,
        }
    }

    /// Stable tag used in cache identifiers.
    pub fn tag(self) -> &'static str {
        match self {
            PixelFormat::Rgba8 => "rgba8",
            PixelFormat::Rgba16 => "rgba16",
            PixelFormat::Rgba32f => "rgba32f",
        }
    }

    /// Convert premultiplied float pixels into this layout, appending to `out`.
    pub fn encode(self, img: &ImageBuffer, out: &mut Vec<u8>) {
        out.reserve(img.pixels().len() * self.bytes_per_pixel());
        for px in img.pixels() {
            for c in px {
                match self {
                    PixelFormat::Rgba8 => out.push((c.clamp(0.0, 1.0) * 255.0).round() as u8),
                    PixelFormat::Rgba16 => out.extend_from_slice(
                        &((c.clamp(0.0, 1.0) * 65535.0).round() as u16).to_le_bytes(),
                    ),
                    PixelFormat::Rgba32f => out.extend_from_slice(&c.to_le_bytes()),
                }
            }
        }
    }
}

/// Audio parameters that participate in the cache identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AudioParams {
    /// Samples per second.
    pub sample_rate: u32,
    /// Channel layout bit mask.
    pub channel_layout: u64,
}

impl AudioParams {
    /// Channels in the layout, at least one.
    pub fn channels(self) -> u16 {
        (self.channel_layout.count_ones() as u16).max(1)
    }

    /// Bytes of one cached block covering `range` (little-endian `f32` samples).
    pub fn block_size(self, range: TimeRange) -> usize {
        let ctx = AudioContext {
            range,
            sample_rate: self.sample_rate,
            channels: self.channels(),
        };
        ctx.frames() * usize::from(ctx.channels) * 4
    }
}

/// Output format every cached frame of one cache namespace shares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderParams {
    /// Full-resolution width.
    pub width: u32,
    /// Full-resolution height.
    pub height: u32,
    /// Pixel layout of cached frames.
    pub format: PixelFormat,
    /// Resolution divider (1 = full resolution).
    pub divider: u32,
    /// Frame duration; cache points are multiples of it.
    pub time_base: Time,
    /// Audio parameters when the sequence has audio.
    pub audio: Option<AudioParams>,
}

impl Default for RenderParams {
    /// Invalid until a viewer supplies real dimensions.
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            format: PixelFormat::default(),
            divider: 1,
            time_base: Time::ZERO,
            audio: None,
        }
    }
}

impl RenderParams {
    /// Combine a viewer's video parameters with the configured format and divider.
    pub fn from_video(video: VideoParams, format: PixelFormat, divider: u32) -> Self {
        Self {
            width: video.width,
            height: video.height,
            format,
            divider,
            time_base: video.time_base,
            audio: None,
        }
    }

    /// Width after applying the divider.
    pub fn effective_width(&self) -> u32 {
        self.width / self.divider.max(1)
    }

    /// Height after applying the divider.
    pub fn effective_height(&self) -> u32 {
        self.height / self.divider.max(1)
    }

    /// Positive effective size, positive divider and positive time base.
    pub fn is_valid(&self) -> bool {
        self.divider > 0
            && self.effective_width() > 0
            && self.effective_height() > 0
            && self.time_base.is_positive()
    }

    /// Bytes in one encoded frame.
    pub fn buffer_size(&self) -> usize {
        self.effective_width() as usize * self.effective_height() as usize
            * self.format.bytes_per_pixel()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/params.rs"]
mod tests;
