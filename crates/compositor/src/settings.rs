use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::orientation::normalize_rotation;
use crate::types::{AspectRatioMode, OrientationForced, Size};

/// Horizontal/vertical mirroring for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flip {
    pub horizontal: bool,
    pub vertical: bool,
}

/// Plain copy of every tunable read by a draw tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSettings {
    pub encoder_size: Size,
    /// Zero dimensions fall back to the encoder size.
    pub preview_size: Size,
    pub fps: u32,
    pub muted: bool,
    pub forced_orientation: OrientationForced,
    pub sensed_portrait: bool,
    pub stream_rotation: u32,
    pub preview_rotation: u32,
    pub camera_rotation: u32,
    pub stream_flip: Flip,
    pub preview_flip: Flip,
    pub aspect_ratio: AspectRatioMode,
    pub antialiasing: bool,
    pub force_render: bool,
}

impl FrameSettings {
    pub fn effective_preview_size(&self) -> Size {
        Size::new(
            if self.preview_size.width == 0 {
                self.encoder_size.width
            } else {
                self.preview_size.width
            },
            if self.preview_size.height == 0 {
                self.encoder_size.height
            } else {
                self.preview_size.height
            },
        )
    }
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            encoder_size: Size::new(640, 480),
            preview_size: Size::ZERO,
            fps: 0,
            muted: false,
            forced_orientation: OrientationForced::None,
            sensed_portrait: false,
            stream_rotation: 0,
            preview_rotation: 0,
            camera_rotation: 0,
            stream_flip: Flip::default(),
            preview_flip: Flip::default(),
            aspect_ratio: AspectRatioMode::Adjust,
            antialiasing: false,
            force_render: false,
        }
    }
}

/// Lock-free field store written by the facade and read by the render worker.
///
/// Each field is an independent relaxed atomic: writers never block the draw
/// path, and a tick may observe a mix of old and new values when setters race
/// with it.
#[derive(Debug)]
pub(crate) struct SharedSettings {
    encoder_width: AtomicU32,
    encoder_height: AtomicU32,
    preview_width: AtomicU32,
    preview_height: AtomicU32,
    fps: AtomicU32,
    muted: AtomicBool,
    forced_orientation: AtomicU8,
    sensed_portrait: AtomicBool,
    stream_rotation: AtomicU32,
    preview_rotation: AtomicU32,
    camera_rotation: AtomicU32,
    stream_flip_horizontal: AtomicBool,
    stream_flip_vertical: AtomicBool,
    preview_flip_horizontal: AtomicBool,
    preview_flip_vertical: AtomicBool,
    aspect_ratio: AtomicU8,
    antialiasing: AtomicBool,
    force_render: AtomicBool,
}

impl SharedSettings {
    pub fn new(initial: FrameSettings) -> Self {
        Self {
            encoder_width: AtomicU32::new(initial.encoder_size.width),
            encoder_height: AtomicU32::new(initial.encoder_size.height),
            preview_width: AtomicU32::new(initial.preview_size.width),
            preview_height: AtomicU32::new(initial.preview_size.height),
            fps: AtomicU32::new(initial.fps),
            muted: AtomicBool::new(initial.muted),
            forced_orientation: AtomicU8::new(initial.forced_orientation.to_raw()),
            sensed_portrait: AtomicBool::new(initial.sensed_portrait),
            stream_rotation: AtomicU32::new(initial.stream_rotation),
            preview_rotation: AtomicU32::new(initial.preview_rotation),
            camera_rotation: AtomicU32::new(initial.camera_rotation),
            stream_flip_horizontal: AtomicBool::new(initial.stream_flip.horizontal),
            stream_flip_vertical: AtomicBool::new(initial.stream_flip.vertical),
            preview_flip_horizontal: AtomicBool::new(initial.preview_flip.horizontal),
            preview_flip_vertical: AtomicBool::new(initial.preview_flip.vertical),
            aspect_ratio: AtomicU8::new(initial.aspect_ratio.to_raw()),
            antialiasing: AtomicBool::new(initial.antialiasing),
            force_render: AtomicBool::new(initial.force_render),
        }
    }

    pub fn snapshot(&self) -> FrameSettings {
        FrameSettings {
            encoder_size: self.encoder_size(),
            preview_size: Size::new(
                self.preview_width.load(Ordering::Relaxed),
                self.preview_height.load(Ordering::Relaxed),
            ),
            fps: self.fps(),
            muted: self.muted(),
            forced_orientation: OrientationForced::from_raw(
                self.forced_orientation.load(Ordering::Relaxed),
            ),
            sensed_portrait: self.sensed_portrait.load(Ordering::Relaxed),
            stream_rotation: self.stream_rotation.load(Ordering::Relaxed),
            preview_rotation: self.preview_rotation.load(Ordering::Relaxed),
            camera_rotation: self.camera_rotation.load(Ordering::Relaxed),
            stream_flip: Flip {
                horizontal: self.stream_flip_horizontal.load(Ordering::Relaxed),
                vertical: self.stream_flip_vertical.load(Ordering::Relaxed),
            },
            preview_flip: Flip {
                horizontal: self.preview_flip_horizontal.load(Ordering::Relaxed),
                vertical: self.preview_flip_vertical.load(Ordering::Relaxed),
            },
            aspect_ratio: AspectRatioMode::from_raw(self.aspect_ratio.load(Ordering::Relaxed)),
            antialiasing: self.antialiasing(),
            force_render: self.force_render(),
        }
    }

    pub fn encoder_size(&self) -> Size {
        Size::new(
            self.encoder_width.load(Ordering::Relaxed),
            self.encoder_height.load(Ordering::Relaxed),
        )
    }

    pub fn set_encoder_size(&self, size: Size) {
        self.encoder_width.store(size.width, Ordering::Relaxed);
        self.encoder_height.store(size.height, Ordering::Relaxed);
    }

    pub fn set_preview_size(&self, size: Size) {
        self.preview_width.store(size.width, Ordering::Relaxed);
        self.preview_height.store(size.height, Ordering::Relaxed);
    }

    pub fn fps(&self) -> u32 {
        self.fps.load(Ordering::Relaxed)
    }

    pub fn set_fps(&self, fps: u32) {
        self.fps.store(fps, Ordering::Relaxed);
    }

    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn set_forced_orientation(&self, forced: OrientationForced) {
        self.forced_orientation
            .store(forced.to_raw(), Ordering::Relaxed);
    }

    pub fn set_sensed_portrait(&self, portrait: bool) {
        self.sensed_portrait.store(portrait, Ordering::Relaxed);
    }

    pub fn set_stream_rotation(&self, degrees: i32) {
        self.stream_rotation
            .store(normalize_rotation(degrees), Ordering::Relaxed);
    }

    pub fn set_preview_rotation(&self, degrees: i32) {
        self.preview_rotation
            .store(normalize_rotation(degrees), Ordering::Relaxed);
    }

    pub fn set_camera_rotation(&self, degrees: i32) {
        self.camera_rotation
            .store(normalize_rotation(degrees), Ordering::Relaxed);
    }

    pub fn set_stream_flip_horizontal(&self, flip: bool) {
        self.stream_flip_horizontal.store(flip, Ordering::Relaxed);
    }

    pub fn set_stream_flip_vertical(&self, flip: bool) {
        self.stream_flip_vertical.store(flip, Ordering::Relaxed);
    }

    pub fn set_preview_flip_horizontal(&self, flip: bool) {
        self.preview_flip_horizontal.store(flip, Ordering::Relaxed);
    }

    pub fn set_preview_flip_vertical(&self, flip: bool) {
        self.preview_flip_vertical.store(flip, Ordering::Relaxed);
    }

    pub fn set_aspect_ratio(&self, mode: AspectRatioMode) {
        self.aspect_ratio.store(mode.to_raw(), Ordering::Relaxed);
    }

    pub fn antialiasing(&self) -> bool {
        self.antialiasing.load(Ordering::Relaxed)
    }

    pub fn set_antialiasing(&self, enabled: bool) {
        self.antialiasing.store(enabled, Ordering::Relaxed);
    }

    pub fn force_render(&self) -> bool {
        self.force_render.load(Ordering::Relaxed)
    }

    pub fn set_force_render(&self, enabled: bool) {
        self.force_render.store(enabled, Ordering::Relaxed);
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self::new(FrameSettings::default())
    }
}
