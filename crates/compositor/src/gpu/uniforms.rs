use bytemuck::{Pod, Zeroable};

use crate::orientation::{ScreenTransform, Viewport};
use crate::types::Size;

/// Per-draw uniforms for the blit shader.
///
/// `inverse` maps viewport space back to source space (row-major 2x2),
/// `crop` maps the clipped viewport onto the full, possibly off-target,
/// viewport (`xy` offset, `zw` scale), `options.x` is 1.0 for a blank draw.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct BlitUniforms {
    pub inverse: [f32; 4],
    pub crop: [f32; 4],
    pub options: [f32; 4],
}

impl BlitUniforms {
    pub fn identity() -> Self {
        Self {
            inverse: [1.0, 0.0, 0.0, 1.0],
            crop: [0.0, 0.0, 1.0, 1.0],
            options: [0.0; 4],
        }
    }

    pub fn blank() -> Self {
        Self {
            options: [1.0, 0.0, 0.0, 0.0],
            ..Self::identity()
        }
    }

    pub fn for_draw(transform: &ScreenTransform, viewport: &Viewport, clipped: &Viewport) -> Self {
        Self {
            inverse: inverse_matrix(transform),
            crop: crop_rect(viewport, clipped),
            options: [0.0; 4],
        }
    }
}

/// Per-pass uniforms visible to filter functions as `frame`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct FrameUniforms {
    pub resolution: [f32; 2],
    pub texel: [f32; 2],
}

impl FrameUniforms {
    pub fn new(size: Size) -> Self {
        let width = size.width.max(1) as f32;
        let height = size.height.max(1) as f32;
        Self {
            resolution: [width, height],
            texel: [1.0 / width, 1.0 / height],
        }
    }
}

/// Transform matrices are signed permutations, so the inverse is the transpose.
pub(crate) fn inverse_matrix(transform: &ScreenTransform) -> [f32; 4] {
    let [a, b, c, d] = transform.matrix();
    [a, c, b, d]
}

/// Intersects `viewport` with a `target` sized attachment.
pub(crate) fn clip_viewport(viewport: &Viewport, target: Size) -> Option<Viewport> {
    let left = i64::from(viewport.x).max(0);
    let top = i64::from(viewport.y).max(0);
    let right = (i64::from(viewport.x) + i64::from(viewport.width)).min(i64::from(target.width));
    let bottom =
        (i64::from(viewport.y) + i64::from(viewport.height)).min(i64::from(target.height));
    if right <= left || bottom <= top {
        return None;
    }
    Some(Viewport {
        x: left as i32,
        y: top as i32,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    })
}

fn crop_rect(full: &Viewport, clipped: &Viewport) -> [f32; 4] {
    if full.width == 0 || full.height == 0 {
        return [0.0, 0.0, 1.0, 1.0];
    }
    let width = full.width as f32;
    let height = full.height as f32;
    let left = 2.0 * (clipped.x - full.x) as f32 / width - 1.0;
    let right = 2.0 * (clipped.x - full.x + clipped.width as i32) as f32 / width - 1.0;
    let top = 1.0 - 2.0 * (clipped.y - full.y) as f32 / height;
    let bottom = 1.0 - 2.0 * (clipped.y - full.y + clipped.height as i32) as f32 / height;
    [
        (left + right) / 2.0,
        (top + bottom) / 2.0,
        (right - left) / 2.0,
        (top - bottom) / 2.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Flip;

    #[test]
    fn inverse_undoes_rotation() {
        let transform = ScreenTransform::new(90, Flip::default());
        let [a, b, c, d] = transform.matrix();
        let [ia, ib, ic, id] = inverse_matrix(&transform);
        // M * M^-1 == I
        assert_eq!(
            [
                a * ia + b * ic,
                a * ib + b * id,
                c * ia + d * ic,
                c * ib + d * id
            ],
            [1.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn viewport_inside_target_is_not_cropped() {
        let viewport = Viewport {
            x: 0,
            y: 219,
            width: 1000,
            height: 563,
        };
        let clipped = clip_viewport(&viewport, Size::new(1000, 1000)).expect("visible");
        assert_eq!(clipped, viewport);
        let uniforms = BlitUniforms::for_draw(&ScreenTransform::default(), &viewport, &clipped);
        assert_eq!(uniforms.crop, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn overflowing_viewport_is_clipped_and_cropped() {
        let viewport = Viewport {
            x: -500,
            y: 0,
            width: 2000,
            height: 1000,
        };
        let clipped = clip_viewport(&viewport, Size::new(1000, 1000)).expect("visible");
        assert_eq!(clipped, Viewport::full(Size::new(1000, 1000)));
        let crop = crop_rect(&viewport, &clipped);
        // Only the middle half of the frame is visible horizontally.
        assert_eq!(crop, [0.0, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn viewport_outside_target_is_dropped() {
        let viewport = Viewport {
            x: 1200,
            y: 0,
            width: 100,
            height: 100,
        };
        assert!(clip_viewport(&viewport, Size::new(1000, 1000)).is_none());
    }
}
