pub mod backend;
mod batch;
pub mod line_renderer;
pub mod pipeline;
pub mod quad_renderer;
pub mod sprite_renderer;
pub mod terrain_layer;
pub mod vertex;
pub mod wgpu_backend;

use std::rc::Rc;

use glam::Vec3;
use thiserror::Error;

use crate::config::RenderConfig;
use crate::palette::{HardwarePalette, PaletteReference};
use crate::sprites::sheet::Sheet;
use crate::sprites::sprite::{BlendMode, Sprite, TextureChannel};

use backend::{GraphicsBackend, TextureId};
use line_renderer::LineRenderer;
use quad_renderer::QuadRenderer;
use sprite_renderer::SpriteRenderer;
use terrain_layer::TerrainSpriteLayer;
use vertex::{Vertex, rect_corners, rotate_corners, sprite_quad};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("begin_frame called while a frame is already in progress")]
    FrameInProgress,

    #[error("end_frame called without a matching begin_frame")]
    NoFrame,

    #[error("cell ({column}, {row}) is outside the {columns}x{rows} layer")]
    CellOutOfRange { column: usize, row: usize, columns: usize, rows: usize },

    #[error("sprite lives on a different sheet than the rest of the layer")]
    SheetMismatch,

    #[error("sprite blend mode {actual:?} does not match the layer's {expected:?}")]
    BlendMismatch { expected: BlendMode, actual: BlendMode },

    #[error("{vertices} vertices / {indices} indices exceed the batch size of {vertex_capacity} / {index_capacity}")]
    BatchTooLarge { vertices: usize, indices: usize, vertex_capacity: usize, index_capacity: usize },
}

/// Which batching renderer last accepted geometry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BatchKind {
    Sprite,
    Quad,
    Line,
}

// ── Renderer ─────────────────────────────────────────────────────────────────

/// Front end over the three batching renderers.
///
/// Only one renderer holds unflushed geometry at a time: a draw through
/// another renderer flushes the current one first, so the GPU sees batches
/// in the order they were submitted.
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    sprites: SpriteRenderer,
    quads: QuadRenderer,
    lines: LineRenderer,
    current: Option<BatchKind>,
    bound_palette: Option<(TextureId, TextureId)>,
    /// Palette rows with an active colour shift, from the last `set_palette`.
    shifted_rows: Vec<bool>,
    in_frame: bool,
    batches_this_frame: usize,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(backend: B, config: &RenderConfig) -> Self {
        let vertices = config.temp_vertex_buffer_size();
        let indices = config.temp_index_buffer_size();
        Self {
            backend,
            sprites: SpriteRenderer::new(vertices, indices),
            quads: QuadRenderer::new(vertices, indices),
            lines: LineRenderer::new(vertices),
            current: None,
            bound_palette: None,
            shifted_rows: Vec::new(),
            in_frame: false,
            batches_this_frame: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// The renderer holding unflushed geometry, if any.
    pub fn current_batch(&self) -> Option<BatchKind> {
        self.current
    }

    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    pub fn begin_frame(&mut self) -> Result<(), RenderError> {
        if self.in_frame {
            return Err(RenderError::FrameInProgress);
        }
        self.in_frame = true;
        self.batches_this_frame = 0;
        self.backend.begin_frame();
        Ok(())
    }

    /// Flush whatever is pending and present.
    pub fn end_frame(&mut self) -> Result<(), RenderError> {
        if !self.in_frame {
            return Err(RenderError::NoFrame);
        }
        self.flush();
        self.backend.end_frame();
        self.in_frame = false;
        tracing::trace!(batches = self.batches_this_frame, "frame finished");
        Ok(())
    }

    /// Flush the current batch renderer.
    pub fn flush(&mut self) {
        if let Some(kind) = self.current.take() {
            self.flush_kind(kind);
        }
    }

    fn flush_kind(&mut self, kind: BatchKind) {
        let drew = match kind {
            BatchKind::Sprite => self.sprites.flush(&mut self.backend),
            BatchKind::Quad => self.quads.flush(&mut self.backend),
            BatchKind::Line => self.lines.flush(&mut self.backend),
        };
        if drew {
            self.batches_this_frame += 1;
        }
    }

    fn activate(&mut self, kind: BatchKind) {
        if let Some(previous) = self.current.filter(|&c| c != kind) {
            self.flush_kind(previous);
        }
        self.current = Some(kind);
    }

    // ── Palette ──────────────────────────────────────────────────────────────

    /// Upload pending palette changes and bind the palette textures.
    ///
    /// Geometry already batched was built against the old palette contents,
    /// so it is flushed before anything changes on the GPU.
    pub fn set_palette(&mut self, palette: &mut HardwarePalette) {
        if palette.is_dirty() || palette.textures() != self.bound_palette {
            self.flush();
        }

        let textures = palette.upload(&mut self.backend);
        if self.bound_palette != Some(textures) {
            tracing::debug!(palette = ?textures.0, color_shifts = ?textures.1, "binding palette textures");
            self.backend.bind_palette(textures.0, textures.1);
            self.bound_palette = Some(textures);
        }

        self.shifted_rows.clear();
        self.shifted_rows.extend((0..palette.capacity()).map(|row| palette.row_has_color_shift(row)));
    }

    fn palette_row(&self, sprite: &Sprite, palette: Option<&PaletteReference>) -> u32 {
        let Some(palette) = palette else { return 0 };
        match sprite.channel() {
            TextureChannel::Rgba if !self.shifted_rows.get(palette.index()).copied().unwrap_or(false) => 0,
            _ => palette.index() as u32,
        }
    }

    // ── Sprites ──────────────────────────────────────────────────────────────

    /// Draw `sprite` with its origin at `location`.
    pub fn draw_sprite(
        &mut self,
        sprite: &Sprite,
        palette: Option<&PaletteReference>,
        location: Vec3,
        scale: f32,
    ) {
        self.draw_sprite_tinted(sprite, palette, location, scale, Vec3::ONE, 1.0);
    }

    pub fn draw_sprite_tinted(
        &mut self,
        sprite: &Sprite,
        palette: Option<&PaletteReference>,
        location: Vec3,
        scale: f32,
        tint: Vec3,
        alpha: f32,
    ) {
        let corners = rect_corners(location + scale * sprite.offset(), scale * sprite.size());
        self.draw_sprite_quad(sprite, palette, corners, tint, alpha);
    }

    /// Draw `sprite` rotated about its centre.
    pub fn draw_sprite_rotated(
        &mut self,
        sprite: &Sprite,
        palette: Option<&PaletteReference>,
        location: Vec3,
        scale: f32,
        radians: f32,
    ) {
        let corners = rect_corners(location + scale * sprite.offset(), scale * sprite.size());
        self.draw_sprite_quad(sprite, palette, rotate_corners(corners, radians), Vec3::ONE, 1.0);
    }

    /// Draw `sprite` stretched over arbitrary corners (clockwise from
    /// top-left).
    pub fn draw_sprite_quad(
        &mut self,
        sprite: &Sprite,
        palette: Option<&PaletteReference>,
        corners: [Vec3; 4],
        tint: Vec3,
        alpha: f32,
    ) {
        if sprite.is_empty() {
            return;
        }
        let quad = sprite_quad(corners, sprite, self.palette_row(sprite, palette), tint, alpha);
        self.activate(BatchKind::Sprite);
        self.sprites.draw_quad(&mut self.backend, sprite.sheet(), sprite.blend_mode(), &quad);
    }

    /// Submit caller-built textured geometry.  Fails with
    /// [`RenderError::BatchTooLarge`] before flushing anything when the
    /// geometry cannot fit in one batch.
    pub fn draw_sprite_vertices(
        &mut self,
        sheet: &Rc<Sheet>,
        blend: BlendMode,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<(), RenderError> {
        self.sprites.check_capacity(vertices.len(), indices.len())?;
        self.activate(BatchKind::Sprite);
        self.sprites.draw_vertices(&mut self.backend, sheet, blend, vertices, indices)
    }

    // ── Flat colour ──────────────────────────────────────────────────────────

    pub fn fill_rect(&mut self, top_left: Vec3, bottom_right: Vec3, color: [f32; 4]) {
        self.activate(BatchKind::Quad);
        self.quads.fill_rect(&mut self.backend, top_left, bottom_right, color);
    }

    /// Fill a rectangle blending from `top` to `bottom`.
    pub fn fill_rect_gradient(&mut self, top_left: Vec3, bottom_right: Vec3, top: [f32; 4], bottom: [f32; 4]) {
        let corners = rect_corners(top_left, bottom_right - top_left);
        self.fill_quad(corners, [top, top, bottom, bottom], BlendMode::Alpha);
    }

    pub fn fill_quad(&mut self, corners: [Vec3; 4], colors: [[f32; 4]; 4], blend: BlendMode) {
        self.activate(BatchKind::Quad);
        self.quads.fill_quad(&mut self.backend, corners, colors, blend);
    }

    // ── Lines ────────────────────────────────────────────────────────────────

    pub fn draw_line(&mut self, start: Vec3, end: Vec3, color: [f32; 4]) {
        self.draw_line_gradient(start, end, color, color);
    }

    pub fn draw_line_gradient(&mut self, start: Vec3, end: Vec3, start_color: [f32; 4], end_color: [f32; 4]) {
        self.activate(BatchKind::Line);
        self.lines.draw_line(&mut self.backend, start, end, start_color, end_color);
    }

    /// Outline an axis-aligned rectangle.
    pub fn draw_rect(&mut self, top_left: Vec3, bottom_right: Vec3, color: [f32; 4]) {
        let corners = rect_corners(top_left, bottom_right - top_left);
        self.draw_polyline(&corners, color, true);
    }

    pub fn draw_polyline(&mut self, points: &[Vec3], color: [f32; 4], closed: bool) {
        self.activate(BatchKind::Line);
        self.lines.draw_polyline(&mut self.backend, points, color, closed);
    }

    // ── Terrain ──────────────────────────────────────────────────────────────

    /// Draw a terrain layer after everything submitted before it.
    pub fn draw_terrain_layer(&mut self, layer: &mut TerrainSpriteLayer) {
        self.flush();
        layer.draw(&mut self.backend);
        self.batches_this_frame += 1;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
