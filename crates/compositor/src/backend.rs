use image::RgbaImage;

use crate::filters::FilterHandle;
use crate::frame::VideoFrame;
use crate::orientation::ScreenDraw;
use crate::types::Size;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to create rendering context: {0}")]
    Context(String),
    #[error("failed to create render surface: {0}")]
    Surface(String),
    #[error("render target was released")]
    Released,
    #[error("composition buffer is not initialised")]
    Uninitialised,
    #[error("draw failed: {0}")]
    Draw(String),
    #[error("pixel readback failed: {0}")]
    Readback(String),
}

/// Per-tick inputs for drawing into the composition buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffscreenPass {
    /// Clockwise rotation applied to the camera frame, in degrees.
    pub camera_rotation: u32,
    pub antialiasing: bool,
}

/// Everything the compositor needs from a GPU API.
///
/// Implementations are driven exclusively from the render worker thread. The
/// main target owns the shared device/context; every other target is created
/// from it and must be released before it.
pub trait GpuBackend: Send + 'static {
    /// Caller-supplied drawable (window, encoder input, ...).
    type Surface: Send + 'static;
    /// A context plus drawable that can be made current and presented.
    type Target: Send + 'static;

    fn create_main(&mut self, size: Size) -> Result<Self::Target, BackendError>;

    fn create_surface_target(
        &mut self,
        main: &Self::Target,
        surface: Self::Surface,
    ) -> Result<Self::Target, BackendError>;

    fn create_offscreen_target(
        &mut self,
        main: &Self::Target,
        size: Size,
    ) -> Result<Self::Target, BackendError>;

    fn release_target(&mut self, target: Self::Target);

    fn make_current(&mut self, target: &mut Self::Target) -> Result<(), BackendError>;

    fn swap_buffers(&mut self, target: &mut Self::Target) -> Result<(), BackendError>;

    /// (Re)creates the off-screen composition buffer.
    fn init_composition(&mut self, main: &Self::Target, size: Size) -> Result<(), BackendError>;

    /// Uploads the newest camera frame; `None` keeps the previous contents.
    fn update_frame(&mut self, frame: Option<VideoFrame>) -> Result<(), BackendError>;

    /// Draws the input into the composition buffer and runs the filter chain.
    fn draw_offscreen(
        &mut self,
        filters: &[FilterHandle],
        pass: &OffscreenPass,
    ) -> Result<(), BackendError>;

    /// Blits the composed frame into `target`.
    fn draw_screen(
        &mut self,
        target: &mut Self::Target,
        draw: &ScreenDraw,
    ) -> Result<(), BackendError>;

    /// Reads back what was last drawn into `target`. Fails with
    /// [`BackendError::Readback`] when `size` is not the size of that draw.
    fn read_pixels(
        &mut self,
        target: &mut Self::Target,
        size: Size,
    ) -> Result<RgbaImage, BackendError>;
}
