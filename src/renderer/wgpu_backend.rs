//! [`GraphicsBackend`] on top of wgpu, drawing into a winit window surface.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::geometry::Size;
use crate::renderer::backend::{
    DrawBatch, GraphicsBackend, PrimitiveType, TextureFormat, TextureId, VertexBufferId,
};
use crate::renderer::pipeline::{SpritePipelines, orthographic_projection};
use crate::renderer::vertex::{Vertex, quad_indices};
use crate::sprites::sprite::BlendMode;

#[derive(Debug, Error)]
pub enum WgpuBackendError {
    #[error("failed to create window surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter found: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: Size,
    format: TextureFormat,
    /// Set for BGRA textures, which can be drawn from as sheets.
    sheet_bind_group: Option<wgpu::BindGroup>,
}

struct GpuVertexBuffer {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

struct Frame {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
    cleared: bool,
    recorded: bool,
}

pub struct WgpuBackend {
    pub window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipelines: SpritePipelines,
    projection_buffer: wgpu::Buffer,
    projection_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    palette_bind_group: wgpu::BindGroup,
    /// 1x1 white sheet bound for flat-colour batches.
    blank_sheet: TextureId,
    textures: HashMap<TextureId, GpuTexture>,
    vertex_buffers: HashMap<VertexBufferId, GpuVertexBuffer>,
    next_id: u32,
    frame: Option<Frame>,
    pub clear_color: wgpu::Color,
}

impl WgpuBackend {
    pub async fn new(window: Arc<Window>) -> Result<Self, WgpuBackendError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                compatible_surface: Some(&surface),
                ..Default::default()
            })
            .await?;

        let (device, queue) = adapter.request_device(&wgpu::DeviceDescriptor::default()).await?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps.formats[0];

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        tracing::debug!(?format, width = config.width, height = config.height, "surface configured");

        let pipelines = SpritePipelines::new(&device, format);

        let proj = orthographic_projection(config.width as f32, config.height as f32);
        let projection_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("projection_buffer"),
            contents: bytemuck::cast_slice(&proj),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let projection_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("projection_bg"),
            layout: &pipelines.projection_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: projection_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        // Placeholders until the first bind_palette.
        let blank_palette = blank_texture(&device, &queue, wgpu::TextureFormat::Bgra8Unorm, &[0; 4]);
        let blank_shifts = blank_texture(&device, &queue, wgpu::TextureFormat::Rgba32Float, &[0; 16]);
        let palette_bind_group = create_palette_bind_group(
            &device,
            &pipelines.palette_bind_group_layout,
            &blank_palette.create_view(&wgpu::TextureViewDescriptor::default()),
            &blank_shifts.create_view(&wgpu::TextureViewDescriptor::default()),
        );

        let mut backend = Self {
            window,
            surface,
            device,
            queue,
            config,
            pipelines,
            projection_buffer,
            projection_bind_group,
            sampler,
            palette_bind_group,
            blank_sheet: TextureId(0),
            textures: HashMap::new(),
            vertex_buffers: HashMap::new(),
            next_id: 1,
            frame: None,
            clear_color: wgpu::Color::BLACK,
        };

        backend.blank_sheet = backend.create_texture(Size::square(1), TextureFormat::Bgra8);
        backend.upload_texture(backend.blank_sheet, &[0xFF; 4]);
        Ok(backend)
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);

        let proj = orthographic_projection(new_size.width as f32, new_size.height as f32);
        self.queue.write_buffer(&self.projection_buffer, 0, bytemuck::cast_slice(&proj));
    }

    pub fn surface_size(&self) -> Size {
        Size::new(self.config.width, self.config.height)
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert_texture(&mut self, size: Size, format: TextureFormat, render_target: bool) -> TextureId {
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sheet"),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sheet_bind_group = (format == TextureFormat::Bgra8).then(|| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("sheet_bg"),
                layout: &self.pipelines.sheet_bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            })
        });

        let id = TextureId(self.next_id());
        tracing::debug!(?id, width = size.width, height = size.height, ?format, "texture allocated");
        self.textures.insert(id, GpuTexture { texture, view, size, format, sheet_bind_group });
        id
    }

    /// Submit what the current frame has recorded so far.
    ///
    /// Queue writes land before the next submission, so draws recorded
    /// before a texture or buffer update have to be submitted first to see
    /// the old contents.
    fn submit_recorded(&mut self) {
        let Some(frame) = self.frame.as_mut() else { return };
        if !frame.recorded {
            return;
        }
        let encoder = std::mem::replace(
            &mut frame.encoder,
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame_encoder") }),
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.recorded = false;
    }

    fn draw_indexed(
        &mut self,
        primitive: PrimitiveType,
        blend: BlendMode,
        sheet: Option<TextureId>,
        vertices: &wgpu::Buffer,
        indices: &wgpu::Buffer,
        range: Range<u32>,
    ) {
        let Some(frame) = self.frame.as_mut() else {
            tracing::trace!("draw outside a frame ignored");
            return;
        };
        let sheet = sheet.unwrap_or(self.blank_sheet);
        let Some(sheet_bind_group) = self.textures.get(&sheet).and_then(|t| t.sheet_bind_group.as_ref()) else {
            tracing::warn!(?sheet, "draw references a texture that cannot be sampled as a sheet");
            return;
        };
        let pipeline = self.pipelines.get(&self.device, primitive, blend);

        let load = if frame.cleared {
            wgpu::LoadOp::Load
        } else {
            wgpu::LoadOp::Clear(self.clear_color)
        };
        frame.cleared = true;
        frame.recorded = true;

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("sprite_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations { load, store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.projection_bind_group, &[]);
        pass.set_bind_group(1, &self.palette_bind_group, &[]);
        pass.set_bind_group(2, sheet_bind_group, &[]);
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(range, 0, 0..1);
    }
}

impl GraphicsBackend for WgpuBackend {
    fn create_texture(&mut self, size: Size, format: TextureFormat) -> TextureId {
        self.insert_texture(size, format, false)
    }

    fn create_render_target(&mut self, size: Size) -> TextureId {
        self.insert_texture(size, TextureFormat::Bgra8, true)
    }

    fn upload_texture(&mut self, texture: TextureId, data: &[u8]) {
        self.submit_recorded();
        let Some(gpu) = self.textures.get(&texture) else {
            tracing::warn!(?texture, "upload to unknown texture");
            return;
        };
        let bytes_per_texel = gpu.format.bytes_per_texel();
        let expected = gpu.size.area() * bytes_per_texel;
        if data.len() != expected {
            tracing::warn!(?texture, expected, actual = data.len(), "texture upload size mismatch");
            return;
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(gpu.size.width * bytes_per_texel as u32),
                rows_per_image: Some(gpu.size.height),
            },
            extent(gpu.size),
        );
    }

    fn read_texture(&mut self, texture: TextureId) -> Vec<u8> {
        self.submit_recorded();
        let Some(gpu) = self.textures.get(&texture) else {
            tracing::warn!(?texture, "read from unknown texture");
            return Vec::new();
        };

        let bytes_per_texel = gpu.format.bytes_per_texel() as u32;
        let (width, height) = (gpu.size.width, gpu.size.height);
        let unpadded_bytes_per_row = width * bytes_per_texel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback_encoder") });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            extent(gpu.size),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        if let Err(err) = self.device.poll(wgpu::PollType::wait_indefinitely()) {
            tracing::error!(%err, "device poll failed during texture readback");
            return Vec::new();
        }
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(%err, "failed to map readback buffer");
                return Vec::new();
            }
            Err(_) => return Vec::new(),
        }

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        for row in 0..height {
            let start = (row * padded_bytes_per_row) as usize;
            pixels.extend_from_slice(&mapped[start..start + unpadded_bytes_per_row as usize]);
        }
        drop(mapped);
        staging.unmap();
        pixels
    }

    fn release_texture(&mut self, texture: TextureId) {
        if let Some(gpu) = self.textures.remove(&texture) {
            gpu.texture.destroy();
        }
    }

    fn bind_palette(&mut self, palette: TextureId, color_shifts: TextureId) {
        let (Some(palette), Some(shifts)) = (self.textures.get(&palette), self.textures.get(&color_shifts)) else {
            tracing::warn!(?palette, ?color_shifts, "bind of unknown palette textures");
            return;
        };
        self.palette_bind_group = create_palette_bind_group(
            &self.device,
            &self.pipelines.palette_bind_group_layout,
            &palette.view,
            &shifts.view,
        );
    }

    fn draw_batch(&mut self, batch: &DrawBatch<'_>) {
        if batch.indices.is_empty() {
            return;
        }
        let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("batch_vertices"),
            contents: bytemuck::cast_slice(batch.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("batch_indices"),
            contents: bytemuck::cast_slice(batch.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.draw_indexed(
            batch.primitive,
            batch.blend,
            batch.sheet,
            &vertices,
            &indices,
            0..batch.indices.len() as u32,
        );
    }

    fn create_vertex_buffer(&mut self, capacity: usize) -> VertexBufferId {
        let vertices = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("persistent_vertices"),
            size: (capacity.max(1) * std::mem::size_of::<Vertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let quad_pattern: Vec<u32> = (0..capacity as u32 / 4).flat_map(|q| quad_indices(4 * q)).collect();
        let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("persistent_indices"),
            contents: bytemuck::cast_slice(&quad_pattern),
            usage: wgpu::BufferUsages::INDEX,
        });

        let id = VertexBufferId(self.next_id());
        tracing::debug!(?id, capacity, "vertex buffer allocated");
        self.vertex_buffers.insert(id, GpuVertexBuffer { vertices, indices });
        id
    }

    fn update_vertex_buffer(&mut self, buffer: VertexBufferId, first: usize, vertices: &[Vertex]) {
        self.submit_recorded();
        let Some(gpu) = self.vertex_buffers.get(&buffer) else {
            tracing::warn!(?buffer, "update of unknown vertex buffer");
            return;
        };
        let offset = (first * std::mem::size_of::<Vertex>()) as u64;
        self.queue.write_buffer(&gpu.vertices, offset, bytemuck::cast_slice(vertices));
    }

    fn draw_quad_buffer(
        &mut self,
        buffer: VertexBufferId,
        quads: Range<usize>,
        sheet: TextureId,
        blend: BlendMode,
    ) {
        if quads.is_empty() {
            return;
        }
        let Some(gpu) = self.vertex_buffers.remove(&buffer) else {
            tracing::warn!(?buffer, "draw of unknown vertex buffer");
            return;
        };
        let range = (quads.start * 6) as u32..(quads.end * 6) as u32;
        self.draw_indexed(PrimitiveType::TriangleList, blend, Some(sheet), &gpu.vertices, &gpu.indices, range);
        self.vertex_buffers.insert(buffer, gpu);
    }

    fn release_vertex_buffer(&mut self, buffer: VertexBufferId) {
        if let Some(gpu) = self.vertex_buffers.remove(&buffer) {
            gpu.vertices.destroy();
            gpu.indices.destroy();
        }
    }

    fn begin_frame(&mut self) {
        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                tracing::debug!("surface reconfigured; skipping frame");
                return;
            }
            Err(err) => {
                tracing::warn!(%err, "failed to acquire surface texture");
                return;
            }
        };
        let view = surface_texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame_encoder") });
        self.frame = Some(Frame { surface_texture, view, encoder, cleared: false, recorded: false });
    }

    fn end_frame(&mut self) {
        let Some(mut frame) = self.frame.take() else { return };
        if !frame.cleared {
            frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        self.window.pre_present_notify();
        frame.surface_texture.present();
    }
}

fn extent(size: Size) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.width,
        height: size.height,
        depth_or_array_layers: 1,
    }
}

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

fn blank_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    format: wgpu::TextureFormat,
    texel: &[u8],
) -> wgpu::Texture {
    device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("blank"),
            size: extent(Size::square(1)),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        texel,
    )
}

fn create_palette_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    palette: &wgpu::TextureView,
    color_shifts: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("palette_bg"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(palette),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(color_shifts),
            },
        ],
    })
}
