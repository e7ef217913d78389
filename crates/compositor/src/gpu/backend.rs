use std::sync::{Arc, Weak};

use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::backend::{BackendError, GpuBackend, OffscreenPass};
use crate::filters::FilterHandle;
use crate::frame::VideoFrame;
use crate::orientation::{ScreenDraw, ScreenTransform, Viewport};
use crate::settings::Flip;
use crate::types::Size;

use super::device::{GpuDevice, GpuOptions};
use super::pipeline::{PipelineCache, COMPOSITION_FORMAT};
use super::target::{Output, OffscreenTexture, TargetKind, WgpuSurface, WgpuTarget, WindowOutput};
use super::uniforms::{clip_viewport, inverse_matrix, BlitUniforms, FrameUniforms};

/// Ping-pong buffers the input and the filter chain are drawn through.
struct Composition {
    buffers: [OffscreenTexture; 2],
    output: usize,
    size: Size,
}

impl Composition {
    fn new(gpu: &GpuDevice, size: Size) -> Result<Self, BackendError> {
        gpu.check_size(size, "composition")?;
        Ok(Self {
            buffers: [
                OffscreenTexture::new(&gpu.device, size, "composition a"),
                OffscreenTexture::new(&gpu.device, size, "composition b"),
            ],
            output: 0,
            size,
        })
    }

    fn output_view(&self) -> &wgpu::TextureView {
        &self.buffers[self.output].view
    }
}

/// GPU objects tied to the device owned by the current main target.
struct DeviceResources {
    pipelines: PipelineCache,
    input: OffscreenTexture,
    composition: Option<Composition>,
}

impl DeviceResources {
    fn new(gpu: &GpuDevice) -> Self {
        let input = OffscreenTexture::new(&gpu.device, Size::new(1, 1), "input frame");
        write_pixels(gpu, &input, &[0, 0, 0, 255]);
        Self {
            pipelines: PipelineCache::new(&gpu.device),
            input,
            composition: None,
        }
    }
}

/// [`GpuBackend`] implemented on `wgpu`.
///
/// The device is created headless when the main target is built; window
/// surfaces are created against the same instance when attached.
pub struct WgpuBackend {
    options: GpuOptions,
    current: Weak<GpuDevice>,
    resources: Option<DeviceResources>,
}

impl WgpuBackend {
    pub fn new(options: GpuOptions) -> Self {
        Self {
            options,
            current: Weak::new(),
            resources: None,
        }
    }

    fn current(&self) -> Result<Arc<GpuDevice>, BackendError> {
        self.current.upgrade().ok_or(BackendError::Released)
    }
}

impl Default for WgpuBackend {
    fn default() -> Self {
        Self::new(GpuOptions::default())
    }
}

impl GpuBackend for WgpuBackend {
    type Surface = WgpuSurface;
    type Target = WgpuTarget;

    fn create_main(&mut self, size: Size) -> Result<WgpuTarget, BackendError> {
        let gpu = Arc::new(GpuDevice::new(&self.options)?);
        let max_dimension = gpu.max_dimension();
        if size.is_empty() || size.width > max_dimension || size.height > max_dimension {
            return Err(BackendError::Context(format!(
                "encoder size {size} is outside 1..={max_dimension}"
            )));
        }
        self.resources = Some(DeviceResources::new(&gpu));
        self.current = Arc::downgrade(&gpu);
        tracing::info!(adapter = %gpu.adapter_name, "GPU device ready");
        Ok(WgpuTarget::main(gpu))
    }

    fn create_surface_target(
        &mut self,
        main: &WgpuTarget,
        surface: WgpuSurface,
    ) -> Result<WgpuTarget, BackendError> {
        let gpu = main.device()?;
        let size = self
            .resources
            .as_ref()
            .and_then(|resources| resources.composition.as_ref())
            .map_or(Size::new(1, 1), |composition| composition.size);
        let output = match surface {
            WgpuSurface::Window(window) => Output::Window(WindowOutput::new(&gpu, window, size)?),
            WgpuSurface::Sink(sink) => Output::Sink {
                texture: OffscreenTexture::new(&gpu.device, size, "sink target"),
                sink,
            },
        };
        Ok(WgpuTarget::dependent(&gpu, output))
    }

    fn create_offscreen_target(
        &mut self,
        main: &WgpuTarget,
        size: Size,
    ) -> Result<WgpuTarget, BackendError> {
        let gpu = main.device()?;
        gpu.check_size(size, "offscreen target")?;
        let texture = OffscreenTexture::new(&gpu.device, size, "offscreen target");
        Ok(WgpuTarget::dependent(&gpu, Output::Offscreen(texture)))
    }

    fn release_target(&mut self, target: WgpuTarget) {
        if let TargetKind::Main(_) = target.kind {
            // Everything cached was built on the device about to be dropped.
            self.resources = None;
            self.current = Weak::new();
        }
        drop(target);
    }

    fn make_current(&mut self, target: &mut WgpuTarget) -> Result<(), BackendError> {
        let gpu = target.device()?;
        self.current = Arc::downgrade(&gpu);
        Ok(())
    }

    fn swap_buffers(&mut self, target: &mut WgpuTarget) -> Result<(), BackendError> {
        let gpu = target.device()?;
        let TargetKind::Dependent(dependent) = &mut target.kind else {
            return Ok(());
        };
        match &mut dependent.output {
            Output::Window(window) => window.present(),
            Output::Sink { texture, sink } => {
                let frame = gpu.validated(|| texture.read_back(&gpu))?;
                sink.on_frame(frame);
            }
            Output::Offscreen(_) => {}
        }
        Ok(())
    }

    fn init_composition(&mut self, main: &WgpuTarget, size: Size) -> Result<(), BackendError> {
        let gpu = main.device()?;
        let resources = self.resources.as_mut().ok_or(BackendError::Uninitialised)?;
        resources.composition = Some(Composition::new(&gpu, size)?);
        tracing::debug!(%size, "composition buffer ready");
        Ok(())
    }

    fn update_frame(&mut self, frame: Option<VideoFrame>) -> Result<(), BackendError> {
        let Some(frame) = frame else {
            return Ok(());
        };
        let size = Size::new(frame.width(), frame.height());
        if size.is_empty() {
            return Ok(());
        }
        let gpu = self.current()?;
        let resources = self.resources.as_mut().ok_or(BackendError::Uninitialised)?;
        gpu.validated(|| {
            resources.input.ensure_size(&gpu, size, "input frame")?;
            write_pixels(&gpu, &resources.input, frame.as_raw());
            Ok(())
        })
    }

    fn draw_offscreen(
        &mut self,
        filters: &[FilterHandle],
        pass: &OffscreenPass,
    ) -> Result<(), BackendError> {
        let gpu = self.current()?;
        let DeviceResources {
            pipelines,
            input,
            composition,
        } = self.resources.as_mut().ok_or(BackendError::Uninitialised)?;
        let composition = composition.as_mut().ok_or(BackendError::Uninitialised)?;
        pipelines.retain_filters(filters);

        gpu.validated(|| compose(&gpu, pipelines, input, composition, filters, pass))
    }

    fn draw_screen(
        &mut self,
        target: &mut WgpuTarget,
        draw: &ScreenDraw,
    ) -> Result<(), BackendError> {
        let gpu = target.device()?;
        let resources = self.resources.as_mut().ok_or(BackendError::Uninitialised)?;
        let TargetKind::Dependent(dependent) = &mut target.kind else {
            return Err(BackendError::Draw("the main target is not a blit destination".into()));
        };
        gpu.validated(|| blit(&gpu, resources, &mut dependent.output, draw))
    }

    fn read_pixels(
        &mut self,
        target: &mut WgpuTarget,
        size: Size,
    ) -> Result<RgbaImage, BackendError> {
        let gpu = target.device()?;
        let TargetKind::Dependent(dependent) = &target.kind else {
            return Err(BackendError::Readback("main target has no pixels of its own".into()));
        };
        match &dependent.output {
            Output::Sink { texture, .. } | Output::Offscreen(texture) => {
                if texture.size != size {
                    return Err(BackendError::Readback(format!(
                        "requested {size} but the target holds {}",
                        texture.size
                    )));
                }
                gpu.validated(|| texture.read_back(&gpu))
            }
            Output::Window(_) => Err(BackendError::Readback(
                "window surfaces cannot be read back".into(),
            )),
        }
    }
}

/// Draws the input frame and every filter stage through the ping-pong buffers.
fn compose(
    gpu: &GpuDevice,
    pipelines: &mut PipelineCache,
    input: &OffscreenTexture,
    composition: &mut Composition,
    filters: &[FilterHandle],
    pass: &OffscreenPass,
) -> Result<(), BackendError> {
    let device = &gpu.device;
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("composition encoder"),
    });

    let camera = BlitUniforms {
        inverse: inverse_matrix(&ScreenTransform::new(pass.camera_rotation, Flip::default())),
        ..BlitUniforms::identity()
    };
    let buffer = uniform_buffer(device, bytemuck::bytes_of(&camera));
    let bind_group = pipelines.layout().bind_group(device, &input.view, &buffer);
    let blit = pipelines.blit(device, COMPOSITION_FORMAT).clone();
    run_pass(
        &mut encoder,
        &composition.buffers[0].view,
        &blit,
        &bind_group,
        None,
        "input pass",
    );

    let frame = FrameUniforms::new(composition.size);
    let frame_buffer = uniform_buffer(device, bytemuck::bytes_of(&frame));
    let mut current = 0;
    let mut stages: Vec<(wgpu::RenderPipeline, &str)> = Vec::with_capacity(filters.len() + 1);
    for filter in filters {
        if let Some(pipeline) = pipelines.filter(device, filter) {
            stages.push((pipeline.clone(), filter.label()));
        }
    }
    if pass.antialiasing {
        if let Some(pipeline) = pipelines.antialias(device) {
            stages.push((pipeline.clone(), "antialias"));
        }
    }
    for (pipeline, label) in &stages {
        let next = 1 - current;
        let bind_group = pipelines.layout().bind_group(
            device,
            &composition.buffers[current].view,
            &frame_buffer,
        );
        run_pass(
            &mut encoder,
            &composition.buffers[next].view,
            pipeline,
            &bind_group,
            None,
            label,
        );
        current = next;
    }
    composition.output = current;

    gpu.queue.submit(Some(encoder.finish()));
    Ok(())
}

/// Blits the composed frame into one destination with its screen transform.
fn blit(
    gpu: &GpuDevice,
    resources: &mut DeviceResources,
    output: &mut Output,
    draw: &ScreenDraw,
) -> Result<(), BackendError> {
    let composition = resources
        .composition
        .as_ref()
        .ok_or(BackendError::Uninitialised)?;
    let (view, format, target_size) = match output {
        Output::Window(window) => {
            window.resize(gpu, draw.size)?;
            let format = window.config.format;
            let size = window.size();
            let frame = window.acquire(gpu)?;
            let view = frame
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            (view, format, size)
        }
        Output::Sink { texture, .. } | Output::Offscreen(texture) => {
            texture.ensure_size(gpu, draw.size, "destination target")?;
            (texture.view.clone(), COMPOSITION_FORMAT, texture.size)
        }
    };

    let (uniforms, viewport) = if draw.is_blank() {
        (BlitUniforms::blank(), Some(Viewport::full(target_size)))
    } else {
        match clip_viewport(&draw.viewport, target_size) {
            Some(clipped) => (
                BlitUniforms::for_draw(&draw.transform, &draw.viewport, &clipped),
                Some(clipped),
            ),
            None => (BlitUniforms::blank(), None),
        }
    };

    let device = &gpu.device;
    let buffer = uniform_buffer(device, bytemuck::bytes_of(&uniforms));
    let bind_group = resources
        .pipelines
        .layout()
        .bind_group(device, composition.output_view(), &buffer);
    let pipeline = resources.pipelines.blit(device, format).clone();

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("destination encoder"),
    });
    match viewport {
        Some(viewport) => run_pass(
            &mut encoder,
            &view,
            &pipeline,
            &bind_group,
            Some(&viewport),
            "destination pass",
        ),
        None => clear_pass(&mut encoder, &view),
    }
    gpu.queue.submit(Some(encoder.finish()));
    Ok(())
}

fn uniform_buffer(device: &wgpu::Device, contents: &[u8]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("draw uniforms"),
        contents,
        usage: wgpu::BufferUsages::UNIFORM,
    })
}

fn write_pixels(gpu: &GpuDevice, texture: &OffscreenTexture, pixels: &[u8]) {
    gpu.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(texture.size.width * 4),
            rows_per_image: Some(texture.size.height),
        },
        wgpu::Extent3d {
            width: texture.size.width,
            height: texture.size.height,
            depth_or_array_layers: 1,
        },
    );
}

fn color_attachment(view: &wgpu::TextureView) -> wgpu::RenderPassColorAttachment<'_> {
    wgpu::RenderPassColorAttachment {
        view,
        depth_slice: None,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            store: wgpu::StoreOp::Store,
        },
    }
}

fn run_pass(
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    viewport: Option<&Viewport>,
    label: &str,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(color_attachment(view))],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    if let Some(viewport) = viewport {
        pass.set_viewport(
            viewport.x as f32,
            viewport.y as f32,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
    }
    pass.draw(0..3, 0..1);
}

fn clear_pass(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("clear pass"),
        color_attachments: &[Some(color_attachment(view))],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    });
}
