use std::path::Path;

use anyhow::{Context, Result};
use compositor::{Size, VideoFrame};
use image::{Rgba, RgbaImage};

/// Produces camera frames for the demo.
pub enum FrameSource {
    /// Colour bars with a sweeping marker so motion is visible.
    Synthetic { size: Size, index: u32 },
    Still(VideoFrame),
}

impl FrameSource {
    pub fn synthetic(size: Size) -> Self {
        Self::Synthetic { size, index: 0 }
    }

    pub fn image(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to open source image {}", path.display()))?
            .to_rgba8();
        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "loaded still source"
        );
        Ok(Self::Still(image))
    }

    pub fn next_frame(&mut self) -> VideoFrame {
        match self {
            Self::Synthetic { size, index } => {
                let frame = color_bars(*size, *index);
                *index = index.wrapping_add(1);
                frame
            }
            Self::Still(image) => image.clone(),
        }
    }
}

const BARS: [[u8; 3]; 7] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
];

fn color_bars(size: Size, index: u32) -> VideoFrame {
    let width = size.width.max(1);
    let height = size.height.max(1);
    let marker = index.wrapping_mul(4) % width;
    RgbaImage::from_fn(width, height, |x, y| {
        if x.abs_diff(marker) < 2 || (y < height / 8 && x < width / 8) {
            return Rgba([255, 255, 255, 255]);
        }
        let bar = (x as usize * BARS.len()) / width as usize;
        let [r, g, b] = BARS[bar.min(BARS.len() - 1)];
        Rgba([r, g, b, 255])
    })
}
