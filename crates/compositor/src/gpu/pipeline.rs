use std::borrow::Cow;
use std::collections::HashMap;

use crate::filters::{FilterHandle, FilterId};

use super::shaders::{wrap_filter_source, ANTIALIAS_FILTER, BLIT_SHADER};

/// Format of the composition buffer and of every off-screen target.
pub(crate) const COMPOSITION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Layout shared by the blit and filter pipelines: source texture, sampler,
/// uniform block.
pub(crate) struct SourceLayout {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
    pub sampler: wgpu::Sampler,
}

impl SourceLayout {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("source layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("source pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("source sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            bind_group_layout,
            pipeline_layout,
            sampler,
        }
    }

    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        source: &wgpu::TextureView,
        uniforms: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("source bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        })
    }
}

/// Compiled pipelines for one device. Dropped together with the device.
pub(crate) struct PipelineCache {
    layout: SourceLayout,
    blit_module: wgpu::ShaderModule,
    blits: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    /// `None` marks a filter that failed to compile; it is skipped, not retried.
    filters: HashMap<FilterId, Option<wgpu::RenderPipeline>>,
    antialias: Option<wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new(device: &wgpu::Device) -> Self {
        let blit_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(BLIT_SHADER)),
        });
        Self {
            layout: SourceLayout::new(device),
            blit_module,
            blits: HashMap::new(),
            filters: HashMap::new(),
            antialias: None,
        }
    }

    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    pub fn blit(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        let layout = &self.layout.pipeline_layout;
        let module = &self.blit_module;
        self.blits.entry(format).or_insert_with(|| {
            tracing::debug!(?format, "building blit pipeline");
            build_pipeline(device, layout, module, format, "blit pipeline")
        })
    }

    /// Returns the pipeline for `filter`, compiling it on first use.
    pub fn filter(&mut self, device: &wgpu::Device, filter: &FilterHandle) -> Option<&wgpu::RenderPipeline> {
        let layout = &self.layout.pipeline_layout;
        self.filters
            .entry(filter.id())
            .or_insert_with(|| {
                match compile_filter(device, layout, filter.label(), &filter.shader_source()) {
                    Ok(pipeline) => {
                        tracing::debug!(filter = filter.label(), "compiled filter");
                        Some(pipeline)
                    }
                    Err(error) => {
                        tracing::warn!(filter = filter.label(), %error, "filter failed to compile; skipping");
                        None
                    }
                }
            })
            .as_ref()
    }

    pub fn antialias(&mut self, device: &wgpu::Device) -> Option<&wgpu::RenderPipeline> {
        if self.antialias.is_none() {
            match compile_filter(device, &self.layout.pipeline_layout, "antialias", ANTIALIAS_FILTER) {
                Ok(pipeline) => self.antialias = Some(pipeline),
                Err(error) => {
                    tracing::warn!(%error, "anti-aliasing pass failed to compile");
                    return None;
                }
            }
        }
        self.antialias.as_ref()
    }

    /// Drops pipelines of filters no longer in the chain.
    pub fn retain_filters(&mut self, active: &[FilterHandle]) {
        self.filters
            .retain(|id, _| active.iter().any(|filter| filter.id() == *id));
    }
}

fn compile_filter(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    label: &str,
    body: &str,
) -> Result<wgpu::RenderPipeline, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Owned(wrap_filter_source(body))),
    });
    let pipeline = build_pipeline(device, layout, &module, COMPOSITION_FORMAT, label);
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(error.to_string()),
        None => Ok(pipeline),
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}
