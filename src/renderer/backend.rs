//! The seam between batching and the GPU.
//!
//! Everything above this trait is plain CPU work.  [`HeadlessBackend`]
//! records calls instead of drawing, which makes it the mock GPU for tests
//! and the target for tools that pack sheets without a window.

use std::collections::HashMap;
use std::ops::Range;

use crate::geometry::Size;
use crate::renderer::vertex::Vertex;
use crate::sprites::sprite::BlendMode;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexBufferId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit B, G, R, A.  Sheets and the palette texture.
    Bgra8,
    /// 32-bit float R, G, B, A.  Palette colour shifts.
    Rgba32Float,
}

impl TextureFormat {
    pub const fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::Bgra8 => 4,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    TriangleList,
    LineList,
}

/// One flushed batch.
#[derive(Clone, Copy, Debug)]
pub struct DrawBatch<'a> {
    pub primitive: PrimitiveType,
    pub blend: BlendMode,
    /// Sheet texture sampled by the batch; `None` for flat-colour geometry.
    pub sheet: Option<TextureId>,
    pub vertices: &'a [Vertex],
    pub indices: &'a [u32],
}

// ── GraphicsBackend ──────────────────────────────────────────────────────────

pub trait GraphicsBackend {
    fn create_texture(&mut self, size: Size, format: TextureFormat) -> TextureId;

    /// A BGRA texture the GPU can also render into.
    fn create_render_target(&mut self, size: Size) -> TextureId;

    /// Replace the whole contents of `texture`.
    fn upload_texture(&mut self, texture: TextureId, data: &[u8]);

    /// Copy the contents of `texture` back to the CPU.
    fn read_texture(&mut self, texture: TextureId) -> Vec<u8>;

    fn release_texture(&mut self, texture: TextureId);

    /// Bind the palette and colour-shift textures for subsequent draws.
    fn bind_palette(&mut self, palette: TextureId, color_shifts: TextureId);

    fn draw_batch(&mut self, batch: &DrawBatch<'_>);

    /// Persistent vertex storage for quads that change rarely.
    fn create_vertex_buffer(&mut self, capacity: usize) -> VertexBufferId;

    fn update_vertex_buffer(&mut self, buffer: VertexBufferId, first: usize, vertices: &[Vertex]);

    /// Draw `quads` (quad indices, four vertices each) of a persistent buffer.
    fn draw_quad_buffer(
        &mut self,
        buffer: VertexBufferId,
        quads: Range<usize>,
        sheet: TextureId,
        blend: BlendMode,
    );

    fn release_vertex_buffer(&mut self, buffer: VertexBufferId);

    fn begin_frame(&mut self);

    fn end_frame(&mut self);
}

// ── HeadlessBackend ──────────────────────────────────────────────────────────

/// A draw as seen by [`HeadlessBackend`].
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub primitive: PrimitiveType,
    pub blend: BlendMode,
    pub sheet: Option<TextureId>,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    CreateTexture { id: TextureId, size: Size, format: TextureFormat },
    CreateRenderTarget { id: TextureId, size: Size },
    UploadTexture { id: TextureId, bytes: usize },
    ReadTexture(TextureId),
    ReleaseTexture(TextureId),
    BindPalette { palette: TextureId, color_shifts: TextureId },
    Draw(DrawRecord),
    CreateVertexBuffer { id: VertexBufferId, capacity: usize },
    UpdateVertexBuffer { id: VertexBufferId, first: usize, count: usize },
    DrawQuadBuffer { id: VertexBufferId, quads: Range<usize>, sheet: TextureId, blend: BlendMode },
    ReleaseVertexBuffer(VertexBufferId),
    BeginFrame,
    EndFrame,
}

struct HeadlessTexture {
    size: Size,
    format: TextureFormat,
    data: Vec<u8>,
}

/// Records every call in order and keeps texture and buffer contents in
/// memory.
#[derive(Default)]
pub struct HeadlessBackend {
    calls: Vec<BackendCall>,
    textures: HashMap<TextureId, HeadlessTexture>,
    vertex_buffers: HashMap<VertexBufferId, Vec<Vertex>>,
    next_id: u32,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Recorded draws of both kinds, in submission order.
    pub fn draws(&self) -> impl Iterator<Item = &BackendCall> {
        self.calls
            .iter()
            .filter(|c| matches!(c, BackendCall::Draw(_) | BackendCall::DrawQuadBuffer { .. }))
    }

    /// Recorded batch draws only.
    pub fn batches(&self) -> impl Iterator<Item = &DrawRecord> {
        self.calls.iter().filter_map(|c| match c {
            BackendCall::Draw(record) => Some(record),
            _ => None,
        })
    }

    pub fn texture_data(&self, id: TextureId) -> Option<&[u8]> {
        self.textures.get(&id).map(|t| t.data.as_slice())
    }

    pub fn texture_size(&self, id: TextureId) -> Option<Size> {
        self.textures.get(&id).map(|t| t.size)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn vertex_buffer(&self, id: VertexBufferId) -> Option<&[Vertex]> {
        self.vertex_buffers.get(&id).map(Vec::as_slice)
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_texture(&mut self, size: Size, format: TextureFormat) -> TextureId {
        let id = TextureId(self.next());
        let data = vec![0; size.area() * format.bytes_per_texel()];
        self.textures.insert(id, HeadlessTexture { size, format, data });
        id
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn create_texture(&mut self, size: Size, format: TextureFormat) -> TextureId {
        let id = self.insert_texture(size, format);
        self.calls.push(BackendCall::CreateTexture { id, size, format });
        id
    }

    fn create_render_target(&mut self, size: Size) -> TextureId {
        let id = self.insert_texture(size, TextureFormat::Bgra8);
        self.calls.push(BackendCall::CreateRenderTarget { id, size });
        id
    }

    fn upload_texture(&mut self, texture: TextureId, data: &[u8]) {
        if let Some(t) = self.textures.get_mut(&texture) {
            debug_assert_eq!(data.len(), t.size.area() * t.format.bytes_per_texel());
            t.data.clear();
            t.data.extend_from_slice(data);
        }
        self.calls.push(BackendCall::UploadTexture { id: texture, bytes: data.len() });
    }

    fn read_texture(&mut self, texture: TextureId) -> Vec<u8> {
        self.calls.push(BackendCall::ReadTexture(texture));
        self.textures.get(&texture).map(|t| t.data.clone()).unwrap_or_default()
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.calls.push(BackendCall::ReleaseTexture(texture));
    }

    fn bind_palette(&mut self, palette: TextureId, color_shifts: TextureId) {
        self.calls.push(BackendCall::BindPalette { palette, color_shifts });
    }

    fn draw_batch(&mut self, batch: &DrawBatch<'_>) {
        self.calls.push(BackendCall::Draw(DrawRecord {
            primitive: batch.primitive,
            blend: batch.blend,
            sheet: batch.sheet,
            vertices: batch.vertices.to_vec(),
            indices: batch.indices.to_vec(),
        }));
    }

    fn create_vertex_buffer(&mut self, capacity: usize) -> VertexBufferId {
        let id = VertexBufferId(self.next());
        self.vertex_buffers.insert(id, vec![Vertex::default(); capacity]);
        self.calls.push(BackendCall::CreateVertexBuffer { id, capacity });
        id
    }

    fn update_vertex_buffer(&mut self, buffer: VertexBufferId, first: usize, vertices: &[Vertex]) {
        if let Some(stored) = self.vertex_buffers.get_mut(&buffer) {
            stored[first..first + vertices.len()].copy_from_slice(vertices);
        }
        self.calls.push(BackendCall::UpdateVertexBuffer { id: buffer, first, count: vertices.len() });
    }

    fn draw_quad_buffer(
        &mut self,
        buffer: VertexBufferId,
        quads: Range<usize>,
        sheet: TextureId,
        blend: BlendMode,
    ) {
        self.calls.push(BackendCall::DrawQuadBuffer { id: buffer, quads, sheet, blend });
    }

    fn release_vertex_buffer(&mut self, buffer: VertexBufferId) {
        self.vertex_buffers.remove(&buffer);
        self.calls.push(BackendCall::ReleaseVertexBuffer(buffer));
    }

    fn begin_frame(&mut self) {
        self.calls.push(BackendCall::BeginFrame);
    }

    fn end_frame(&mut self) {
        self.calls.push(BackendCall::EndFrame);
    }
}
