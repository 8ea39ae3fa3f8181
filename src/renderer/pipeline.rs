use std::collections::HashMap;

use crate::renderer::backend::PrimitiveType;
use crate::renderer::vertex::Vertex;
use crate::sprites::sprite::BlendMode;

/// Shader, bind group layouts and one render pipeline per
/// (primitive, blend mode) pair, built on first use.
///
/// Bind groups:
/// 0. projection uniform
/// 1. palette texture + colour-shift texture (read with `textureLoad`)
/// 2. sheet texture + sampler
pub struct SpritePipelines {
    shader: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    surface_format: wgpu::TextureFormat,
    pub projection_bind_group_layout: wgpu::BindGroupLayout,
    pub palette_bind_group_layout: wgpu::BindGroupLayout,
    pub sheet_bind_group_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<(PrimitiveType, BlendMode), wgpu::RenderPipeline>,
}

impl SpritePipelines {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/sprite.wgsl").into()),
        });

        let projection_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("projection_bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let palette_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("palette_bgl"),
                entries: &[unfiltered_texture_entry(0), unfiltered_texture_entry(1)],
            });

        let sheet_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("sheet_bgl"),
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
                ],
            });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite_pipeline_layout"),
            bind_group_layouts: &[
                &projection_bind_group_layout,
                &palette_bind_group_layout,
                &sheet_bind_group_layout,
            ],
            ..Default::default()
        });

        Self {
            shader,
            layout,
            surface_format,
            projection_bind_group_layout,
            palette_bind_group_layout,
            sheet_bind_group_layout,
            pipelines: HashMap::new(),
        }
    }

    /// The pipeline for `primitive` drawn with `blend`, created on first
    /// request.
    pub fn get(
        &mut self,
        device: &wgpu::Device,
        primitive: PrimitiveType,
        blend: BlendMode,
    ) -> &wgpu::RenderPipeline {
        self.pipelines.entry((primitive, blend)).or_insert_with(|| {
            tracing::debug!(?primitive, ?blend, "creating sprite pipeline");
            create_pipeline(device, &self.shader, &self.layout, self.surface_format, primitive, blend)
        })
    }
}

fn unfiltered_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    surface_format: wgpu::TextureFormat,
    primitive: PrimitiveType,
    blend: BlendMode,
) -> wgpu::RenderPipeline {
    let topology = match primitive {
        PrimitiveType::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveType::LineList => wgpu::PrimitiveTopology::LineList,
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("sprite_pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: blend_state(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

/// Fixed-function blending for `mode`.  Colours reaching the blender are
/// premultiplied.
pub fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    use wgpu::BlendFactor as F;

    let (src, dst, operation) = match mode {
        BlendMode::None => return None,
        BlendMode::Alpha => (F::One, F::OneMinusSrcAlpha, wgpu::BlendOperation::Add),
        BlendMode::Additive => (F::One, F::One, wgpu::BlendOperation::Add),
        BlendMode::Subtractive => (F::One, F::One, wgpu::BlendOperation::ReverseSubtract),
        BlendMode::Multiply => (F::Dst, F::OneMinusSrcAlpha, wgpu::BlendOperation::Add),
        BlendMode::Multiplicative => (F::Zero, F::Src, wgpu::BlendOperation::Add),
        BlendMode::DoubleMultiplicative => (F::Dst, F::Src, wgpu::BlendOperation::Add),
        BlendMode::LowAdditive => (F::Dst, F::One, wgpu::BlendOperation::Add),
        BlendMode::Screen => (F::One, F::OneMinusSrc, wgpu::BlendOperation::Add),
        BlendMode::Translucent => (F::Dst, F::OneMinusDst, wgpu::BlendOperation::Add),
    };

    let component = wgpu::BlendComponent { src_factor: src, dst_factor: dst, operation };
    Some(wgpu::BlendState { color: component, alpha: component })
}

/// Orthographic projection matrix (column-major) mapping pixel coords to clip space.
pub fn orthographic_projection(width: f32, height: f32) -> [f32; 16] {
    [
        2.0 / width, 0.0,           0.0, 0.0,
        0.0,         -2.0 / height, 0.0, 0.0,
        0.0,         0.0,           1.0, 0.0,
        -1.0,        1.0,           0.0, 1.0,
    ]
}
