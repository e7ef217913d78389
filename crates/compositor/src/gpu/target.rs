use std::fmt;
use std::sync::{Arc, Weak};

use image::RgbaImage;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::backend::BackendError;
use crate::types::Size;

use super::device::GpuDevice;
use super::pipeline::COMPOSITION_FORMAT;

/// A native window the preview (or an encoder input surface) can present to.
pub trait WindowTarget: HasWindowHandle + HasDisplayHandle + Send + Sync {}

impl<T> WindowTarget for T where T: HasWindowHandle + HasDisplayHandle + Send + Sync {}

/// Receives every frame presented to a sink target, e.g. an encoder input.
/// Runs on the render worker, like photo callbacks.
pub trait FrameSink: Send {
    fn on_frame(&mut self, frame: RgbaImage);
}

impl<F> FrameSink for F
where
    F: FnMut(RgbaImage) + Send,
{
    fn on_frame(&mut self, frame: RgbaImage) {
        self(frame)
    }
}

/// Caller-supplied drawable for the encoder or preview destination.
pub enum WgpuSurface {
    Window(Arc<dyn WindowTarget>),
    /// Off-screen target read back on every present and handed to the sink.
    Sink(Box<dyn FrameSink>),
}

impl WgpuSurface {
    pub fn window(window: Arc<dyn WindowTarget>) -> Self {
        Self::Window(window)
    }

    pub fn sink(sink: impl FrameSink + 'static) -> Self {
        Self::Sink(Box::new(sink))
    }
}

impl fmt::Debug for WgpuSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Window(_) => f.write_str("WgpuSurface::Window"),
            Self::Sink(_) => f.write_str("WgpuSurface::Sink"),
        }
    }
}

/// A render target of the wgpu backend.
///
/// The main target owns the device. Every other target keeps a weak
/// reference and refuses to draw once the main target is gone.
pub struct WgpuTarget {
    pub(crate) kind: TargetKind,
}

impl fmt::Debug for WgpuTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            TargetKind::Main(_) => "main",
            TargetKind::Dependent(dependent) => match dependent.output {
                Output::Window(_) => "window",
                Output::Sink { .. } => "sink",
                Output::Offscreen(_) => "offscreen",
            },
        };
        f.debug_struct("WgpuTarget").field("kind", &kind).finish()
    }
}

pub(crate) enum TargetKind {
    Main(Arc<GpuDevice>),
    Dependent(DependentTarget),
}

pub(crate) struct DependentTarget {
    pub device: Weak<GpuDevice>,
    pub output: Output,
}

impl DependentTarget {
    pub fn device(&self) -> Result<Arc<GpuDevice>, BackendError> {
        self.device.upgrade().ok_or(BackendError::Released)
    }
}

pub(crate) enum Output {
    Window(WindowOutput),
    Sink {
        texture: OffscreenTexture,
        sink: Box<dyn FrameSink>,
    },
    Offscreen(OffscreenTexture),
}

impl WgpuTarget {
    pub(crate) fn main(device: Arc<GpuDevice>) -> Self {
        Self {
            kind: TargetKind::Main(device),
        }
    }

    pub(crate) fn dependent(device: &Arc<GpuDevice>, output: Output) -> Self {
        Self {
            kind: TargetKind::Dependent(DependentTarget {
                device: Arc::downgrade(device),
                output,
            }),
        }
    }

    /// Device this target draws with, if it is still alive.
    pub(crate) fn device(&self) -> Result<Arc<GpuDevice>, BackendError> {
        match &self.kind {
            TargetKind::Main(device) => Ok(Arc::clone(device)),
            TargetKind::Dependent(dependent) => dependent.device(),
        }
    }
}

/// Presentable window surface plus the frame acquired for the current draw.
pub(crate) struct WindowOutput {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
    pub pending: Option<wgpu::SurfaceTexture>,
    _window: Arc<dyn WindowTarget>,
}

impl WindowOutput {
    pub fn new(gpu: &GpuDevice, window: Arc<dyn WindowTarget>, size: Size) -> Result<Self, BackendError> {
        let window_handle = window
            .window_handle()
            .map_err(|err| BackendError::Surface(format!("failed to acquire window handle: {err}")))?;
        let display_handle = window
            .display_handle()
            .map_err(|err| BackendError::Surface(format!("failed to acquire display handle: {err}")))?;

        // The window is kept alive by `_window` for as long as the surface exists.
        let surface = unsafe {
            gpu.instance
                .create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                    raw_display_handle: display_handle.as_raw(),
                    raw_window_handle: window_handle.as_raw(),
                })
        }
        .map_err(|err| BackendError::Surface(err.to_string()))?;

        let caps = surface.get_capabilities(&gpu.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| BackendError::Surface("surface is incompatible with the adapter".into()))?;
        let present_mode = caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| caps.present_modes.first().copied())
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);
        tracing::debug!(?format, ?present_mode, %size, "configured window surface");

        Ok(Self {
            surface,
            config,
            pending: None,
            _window: window,
        })
    }

    pub fn size(&self) -> Size {
        Size::new(self.config.width, self.config.height)
    }

    /// Reconfigures the surface when the requested draw size changed.
    pub fn resize(&mut self, gpu: &GpuDevice, size: Size) -> Result<(), BackendError> {
        if size.is_empty() || size == self.size() {
            return Ok(());
        }
        gpu.check_size(size, "window surface")?;
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&gpu.device, &self.config);
        Ok(())
    }

    pub fn acquire(&mut self, gpu: &GpuDevice) -> Result<&wgpu::SurfaceTexture, BackendError> {
        if self.pending.is_none() {
            let frame = match self.surface.get_current_texture() {
                Ok(frame) => frame,
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    self.surface.configure(&gpu.device, &self.config);
                    self.surface
                        .get_current_texture()
                        .map_err(|err| BackendError::Draw(err.to_string()))?
                }
                Err(err) => return Err(BackendError::Draw(err.to_string())),
            };
            self.pending = Some(frame);
        }
        self.pending
            .as_ref()
            .ok_or_else(|| BackendError::Draw("no surface frame acquired".into()))
    }

    pub fn present(&mut self) {
        if let Some(frame) = self.pending.take() {
            frame.present();
        }
    }
}

/// Off-screen color texture that can be rendered to and read back.
pub(crate) struct OffscreenTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: Size,
}

impl OffscreenTexture {
    pub fn new(device: &wgpu::Device, size: Size, label: &str) -> Self {
        let size = Size::new(size.width.max(1), size.height.max(1));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COMPOSITION_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
        }
    }

    /// Recreates the texture when a draw asks for a different size. The old
    /// texture is kept when the new size is beyond the device limit.
    pub fn ensure_size(&mut self, gpu: &GpuDevice, size: Size, label: &str) -> Result<(), BackendError> {
        if size.is_empty() || size == self.size {
            return Ok(());
        }
        gpu.check_size(size, label)?;
        *self = Self::new(&gpu.device, size, label);
        Ok(())
    }

    /// Copies the texture into CPU memory.
    pub fn read_back(&self, gpu: &GpuDevice) -> Result<RgbaImage, BackendError> {
        let Size { width, height } = self.size;
        let unpadded = width as usize * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback buffer"),
            size: (padded * height as usize) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        gpu.wait_idle()?;
        rx.recv()
            .map_err(|err| BackendError::Readback(format!("map callback dropped: {err}")))?
            .map_err(|err| BackendError::Readback(err.to_string()))?;

        let mut pixels = Vec::with_capacity(unpadded * height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded) {
                pixels.extend_from_slice(&row[..unpadded]);
            }
        }
        buffer.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| BackendError::Readback("readback size mismatch".into()))
    }
}
