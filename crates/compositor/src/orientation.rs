//! Per-destination geometry: forced orientation, rotation, flips, aspect fit.
//!
//! Everything here is pure math over a [`FrameSettings`] snapshot so the draw
//! tick can build a [`ScreenDraw`] for each destination without touching the
//! GPU. Backends turn the result into a viewport plus a 2x2 clip-space
//! transform.

use crate::settings::{FrameSettings, Flip};
use crate::types::{AspectRatioMode, OrientationForced, Size};

/// Axis-aligned region of the destination the composed frame is drawn into.
///
/// Offsets may be negative when [`AspectRatioMode::Fill`] crops the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn full(size: Size) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.width,
            height: size.height,
        }
    }
}

/// Rotation (clockwise degrees, multiple of 90) followed by mirroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenTransform {
    pub rotation: u32,
    pub flip: Flip,
}

impl ScreenTransform {
    pub fn new(rotation: u32, flip: Flip) -> Self {
        Self {
            rotation: rotation % 360,
            flip,
        }
    }

    /// Row-major 2x2 matrix `[a, b, c, d]` mapping clip-space `(x, y)` to
    /// `(a*x + b*y, c*x + d*y)`.
    pub fn matrix(&self) -> [f32; 4] {
        let [mut a, mut b, mut c, mut d] = match self.rotation {
            90 => [0.0, 1.0, -1.0, 0.0],
            180 => [-1.0, 0.0, 0.0, -1.0],
            270 => [0.0, -1.0, 1.0, 0.0],
            _ => [1.0, 0.0, 0.0, 1.0],
        };
        if self.flip.horizontal {
            a = -a;
            b = -b;
        }
        if self.flip.vertical {
            c = -c;
            d = -d;
        }
        [a, b, c, d]
    }

    pub fn swaps_axes(&self) -> bool {
        self.rotation == 90 || self.rotation == 270
    }
}

/// Everything a backend needs to blit the composed frame into one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenDraw {
    /// Destination size. Zero means "clear to an opaque blank frame".
    pub size: Size,
    pub viewport: Viewport,
    pub transform: ScreenTransform,
    /// Orientation the frame was laid out for after forced-orientation resolution.
    pub portrait: bool,
    pub aspect_ratio: AspectRatioMode,
}

impl ScreenDraw {
    pub fn is_blank(&self) -> bool {
        self.size.is_empty()
    }
}

/// Rounds any angle to the nearest quarter turn in `0..360`.
pub fn normalize_rotation(degrees: i32) -> u32 {
    let wrapped = degrees.rem_euclid(360) as u32;
    ((wrapped + 45) / 90 * 90) % 360
}

pub fn resolve_portrait(forced: OrientationForced, sensed_portrait: bool) -> bool {
    match forced {
        OrientationForced::Portrait => true,
        OrientationForced::Landscape => false,
        OrientationForced::None => sensed_portrait,
    }
}

/// Lays the stream frame out for the resolved orientation and rotation.
pub fn content_size(stream: Size, portrait: bool, transform: &ScreenTransform) -> Size {
    let oriented = if stream.width != stream.height && stream.is_portrait() != portrait {
        stream.transposed()
    } else {
        stream
    };
    if transform.swaps_axes() {
        oriented.transposed()
    } else {
        oriented
    }
}

pub fn fit_viewport(mode: AspectRatioMode, target: Size, content: Size) -> Viewport {
    if target.is_empty() || content.is_empty() || matches!(mode, AspectRatioMode::None) {
        return Viewport::full(target);
    }

    let target_w = target.width as f64;
    let target_h = target.height as f64;
    let scale_x = target_w / content.width as f64;
    let scale_y = target_h / content.height as f64;
    let scale = match mode {
        AspectRatioMode::Adjust => scale_x.min(scale_y),
        AspectRatioMode::Fill => scale_x.max(scale_y),
        AspectRatioMode::None => unreachable!("stretch handled above"),
    };

    let width = (content.width as f64 * scale).round();
    let height = (content.height as f64 * scale).round();
    Viewport {
        x: ((target_w - width) / 2.0).round() as i32,
        y: ((target_h - height) / 2.0).round() as i32,
        width: width as u32,
        height: height as u32,
    }
}

/// Encoder draw: stream transform, blank while video is muted.
pub fn encoder_draw(settings: &FrameSettings) -> ScreenDraw {
    let size = if settings.muted {
        Size::ZERO
    } else {
        settings.encoder_size
    };
    stream_draw(settings, size)
}

/// Photo draw: same policy as the encoder but never blanked by mute.
pub fn photo_draw(settings: &FrameSettings) -> ScreenDraw {
    stream_draw(settings, settings.encoder_size)
}

pub fn preview_draw(settings: &FrameSettings) -> ScreenDraw {
    let size = settings.effective_preview_size();
    let portrait = resolve_portrait(settings.forced_orientation, settings.sensed_portrait);
    let transform = ScreenTransform::new(settings.preview_rotation, settings.preview_flip);
    let content = content_size(settings.encoder_size, portrait, &transform);
    ScreenDraw {
        size,
        viewport: fit_viewport(settings.aspect_ratio, size, content),
        transform,
        portrait,
        aspect_ratio: settings.aspect_ratio,
    }
}

/// Stream destinations are always letterboxed: the resolved orientation and
/// stream rotation decide the content shape, which is fitted into the
/// encoder frame without cropping.
fn stream_draw(settings: &FrameSettings, size: Size) -> ScreenDraw {
    let portrait = resolve_portrait(settings.forced_orientation, settings.sensed_portrait);
    let transform = ScreenTransform::new(settings.stream_rotation, settings.stream_flip);
    let content = content_size(settings.encoder_size, portrait, &transform);
    ScreenDraw {
        size,
        viewport: fit_viewport(AspectRatioMode::Adjust, size, content),
        transform,
        portrait,
        aspect_ratio: AspectRatioMode::Adjust,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_is_normalized_to_quarter_turns() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(90), 90);
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(44), 0);
        assert_eq!(normalize_rotation(46), 90);
        assert_eq!(normalize_rotation(359), 0);
    }

    #[test]
    fn forced_orientation_overrides_sensor() {
        assert!(resolve_portrait(OrientationForced::Portrait, false));
        assert!(!resolve_portrait(OrientationForced::Landscape, true));
        assert!(resolve_portrait(OrientationForced::None, true));
        assert!(!resolve_portrait(OrientationForced::None, false));
    }

    #[test]
    fn matrix_applies_flip_after_rotation() {
        let identity = ScreenTransform::default();
        assert_eq!(identity.matrix(), [1.0, 0.0, 0.0, 1.0]);

        let flipped = ScreenTransform::new(
            0,
            Flip {
                horizontal: true,
                vertical: false,
            },
        );
        assert_eq!(flipped.matrix(), [-1.0, 0.0, 0.0, 1.0]);

        let quarter = ScreenTransform::new(90, Flip::default());
        let [a, b, c, d] = quarter.matrix();
        // (1, 0) rotates clockwise onto (0, -1).
        assert_eq!((a * 1.0 + b * 0.0, c * 1.0 + d * 0.0), (0.0, -1.0));
        assert!(quarter.swaps_axes());
    }

    #[test]
    fn adjust_letterboxes_and_fill_crops() {
        let target = Size::new(1000, 1000);
        let content = Size::new(1600, 900);

        let adjust = fit_viewport(AspectRatioMode::Adjust, target, content);
        assert_eq!(adjust.width, 1000);
        assert_eq!(adjust.height, 563);
        assert_eq!(adjust.x, 0);
        assert_eq!(adjust.y, 219);

        let fill = fit_viewport(AspectRatioMode::Fill, target, content);
        assert_eq!(fill.height, 1000);
        assert_eq!(fill.width, 1778);
        assert_eq!(fill.x, -389);
        assert_eq!(fill.y, 0);

        let stretch = fit_viewport(AspectRatioMode::None, target, content);
        assert_eq!(stretch, Viewport::full(target));
    }

    #[test]
    fn muted_encoder_draw_is_blank_but_photo_is_not() {
        let settings = FrameSettings {
            encoder_size: Size::new(1280, 720),
            muted: true,
            ..FrameSettings::default()
        };
        let encoder = encoder_draw(&settings);
        assert!(encoder.is_blank());
        assert_eq!(encoder.size, Size::ZERO);
        let photo = photo_draw(&settings);
        assert_eq!(photo.size, Size::new(1280, 720));
        assert!(!photo.is_blank());
    }

    #[test]
    fn preview_uses_its_own_transform_and_aspect() {
        let settings = FrameSettings {
            encoder_size: Size::new(1280, 720),
            preview_size: Size::new(720, 1280),
            forced_orientation: OrientationForced::Portrait,
            stream_rotation: 90,
            preview_rotation: 0,
            preview_flip: Flip {
                horizontal: true,
                vertical: false,
            },
            aspect_ratio: AspectRatioMode::Adjust,
            ..FrameSettings::default()
        };
        let preview = preview_draw(&settings);
        assert!(preview.portrait);
        assert_eq!(preview.transform.rotation, 0);
        assert!(preview.transform.flip.horizontal);
        // Portrait layout of a 1280x720 stream fills a 720x1280 preview exactly.
        assert_eq!(preview.viewport, Viewport::full(Size::new(720, 1280)));

        let encoder = encoder_draw(&settings);
        assert_eq!(encoder.transform.rotation, 90);
        assert!(!encoder.transform.flip.horizontal);
        assert_eq!(encoder.aspect_ratio, AspectRatioMode::Adjust);
    }

    #[test]
    fn forced_orientation_reshapes_the_stream_frame() {
        let landscape = FrameSettings {
            encoder_size: Size::new(1280, 720),
            forced_orientation: OrientationForced::Landscape,
            sensed_portrait: true,
            ..FrameSettings::default()
        };
        let encoder = encoder_draw(&landscape);
        assert!(!encoder.portrait);
        assert_eq!(encoder.viewport, Viewport::full(Size::new(1280, 720)));

        let portrait = FrameSettings {
            forced_orientation: OrientationForced::Portrait,
            sensed_portrait: false,
            ..landscape
        };
        // A portrait layout of 720x1280 is pillarboxed into the landscape encoder.
        let expected = Viewport {
            x: 438,
            y: 0,
            width: 405,
            height: 720,
        };
        assert_eq!(encoder_draw(&portrait).viewport, expected);
        assert_eq!(photo_draw(&portrait).viewport, expected);

        let sensed = FrameSettings {
            forced_orientation: OrientationForced::None,
            sensed_portrait: true,
            ..landscape
        };
        assert_eq!(encoder_draw(&sensed).viewport, expected);
    }

    #[test]
    fn quarter_turn_stream_rotation_keeps_the_full_frame_visible() {
        let settings = FrameSettings {
            encoder_size: Size::new(1280, 720),
            stream_rotation: 90,
            ..FrameSettings::default()
        };
        let draw = encoder_draw(&settings);
        assert_eq!(draw.viewport.height, 720);
        assert_eq!(draw.viewport.width, 405);
    }
}
