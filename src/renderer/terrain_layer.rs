use std::rc::Rc;

use glam::Vec3;

use crate::palette::PaletteReference;
use crate::renderer::RenderError;
use crate::renderer::backend::{GraphicsBackend, VertexBufferId};
use crate::renderer::vertex::{Vertex, rect_corners, sprite_quad};
use crate::sprites::sheet::Sheet;
use crate::sprites::sprite::{BlendMode, Sprite, TextureChannel};

/// A grid of sprites kept in a persistent GPU vertex buffer.
///
/// Cells change rarely, so the layer keeps its vertices between frames and
/// uploads only the rows touched since the last draw.  All cells share one
/// sheet and one blend mode.
pub struct TerrainSpriteLayer {
    columns: usize,
    rows: usize,
    blend: BlendMode,
    sheet: Option<Rc<Sheet>>,
    vertices: Vec<Vertex>,
    dirty_rows: Vec<bool>,
    buffer: Option<VertexBufferId>,
}

impl TerrainSpriteLayer {
    pub fn new(columns: usize, rows: usize, blend: BlendMode) -> Self {
        Self {
            columns,
            rows,
            blend,
            sheet: None,
            vertices: vec![Vertex::default(); 4 * columns * rows],
            dirty_rows: vec![false; rows],
            buffer: None,
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    pub fn sheet(&self) -> Option<&Rc<Sheet>> {
        self.sheet.as_ref()
    }

    /// Rows waiting to be uploaded.
    pub fn dirty_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.dirty_rows.iter().enumerate().filter(|(_, d)| **d).map(|(i, _)| i)
    }

    /// Place `sprite` in a cell with its origin at `location`, or empty the
    /// cell with `None`.
    pub fn update(
        &mut self,
        column: usize,
        row: usize,
        sprite: Option<&Sprite>,
        palette: Option<&PaletteReference>,
        location: Vec3,
        scale: f32,
    ) -> Result<(), RenderError> {
        let cell = self.cell(column, row)?;

        let quad = match sprite {
            Some(sprite) if !sprite.is_empty() => {
                if sprite.blend_mode() != self.blend {
                    return Err(RenderError::BlendMismatch { expected: self.blend, actual: sprite.blend_mode() });
                }
                match &self.sheet {
                    Some(sheet) if !Rc::ptr_eq(sheet, sprite.sheet()) => {
                        return Err(RenderError::SheetMismatch);
                    }
                    Some(_) => {}
                    None => self.sheet = Some(sprite.sheet().clone()),
                }

                let palette_row = match sprite.channel() {
                    TextureChannel::Rgba => 0,
                    _ => palette.map_or(0, |p| p.index() as u32),
                };
                let corners = rect_corners(location + scale * sprite.offset(), scale * sprite.size());
                sprite_quad(corners, sprite, palette_row, Vec3::ONE, 1.0)
            }
            _ => [Vertex::default(); 4],
        };

        self.vertices[4 * cell..4 * cell + 4].copy_from_slice(&quad);
        self.dirty_rows[row] = true;
        Ok(())
    }

    pub fn clear(&mut self, column: usize, row: usize) -> Result<(), RenderError> {
        self.update(column, row, None, None, Vec3::ZERO, 1.0)
    }

    fn cell(&self, column: usize, row: usize) -> Result<usize, RenderError> {
        if column >= self.columns || row >= self.rows {
            return Err(RenderError::CellOutOfRange {
                column,
                row,
                columns: self.columns,
                rows: self.rows,
            });
        }
        Ok(row * self.columns + column)
    }

    /// Upload dirty rows and draw every cell.
    pub fn draw(&mut self, backend: &mut dyn GraphicsBackend) {
        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => {
                let buffer = backend.create_vertex_buffer(self.vertices.len());
                self.buffer = Some(buffer);
                self.dirty_rows.fill(true);
                buffer
            }
        };

        let row_len = 4 * self.columns;
        let mut row = 0;
        while row < self.rows {
            if !self.dirty_rows[row] {
                row += 1;
                continue;
            }
            let start = row;
            while row < self.rows && self.dirty_rows[row] {
                self.dirty_rows[row] = false;
                row += 1;
            }
            backend.update_vertex_buffer(buffer, start * row_len, &self.vertices[start * row_len..row * row_len]);
        }

        if let Some(sheet) = &self.sheet {
            let texture = sheet.texture(backend);
            backend.draw_quad_buffer(buffer, 0..self.columns * self.rows, texture, self.blend);
        }
    }

    pub fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(buffer) = self.buffer.take() {
            backend.release_vertex_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Rect, Size};
    use crate::renderer::backend::{BackendCall, HeadlessBackend};
    use crate::sprites::sheet::SheetType;

    fn sprite_on(sheet: &Rc<Sheet>) -> Sprite {
        Sprite::new(sheet.clone(), Rect::new(0, 0, 8, 8), TextureChannel::Red)
    }

    #[test]
    fn only_dirty_rows_are_uploaded() {
        let mut backend = HeadlessBackend::new();
        let sheet = Rc::new(Sheet::new(SheetType::Indexed, Size::square(16)));
        let mut layer = TerrainSpriteLayer::new(4, 4, BlendMode::Alpha);

        layer.draw(&mut backend);
        backend.clear_calls();

        layer.update(1, 2, Some(&sprite_on(&sheet)), None, Vec3::new(8.0, 16.0, 0.0), 1.0).unwrap();
        assert_eq!(layer.dirty_rows().collect::<Vec<_>>(), vec![2]);
        layer.draw(&mut backend);

        let updates: Vec<_> = backend
            .calls()
            .iter()
            .filter_map(|c| match c {
                BackendCall::UpdateVertexBuffer { first, count, .. } => Some((*first, *count)),
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec![(32, 16)]);
        assert!(layer.dirty_rows().next().is_none());
        assert!(matches!(backend.calls().last(), Some(BackendCall::DrawQuadBuffer { quads, .. }) if *quads == (0..16)));
    }

    #[test]
    fn other_sheet_is_rejected() {
        let a = Rc::new(Sheet::new(SheetType::Indexed, Size::square(16)));
        let b = Rc::new(Sheet::new(SheetType::Indexed, Size::square(16)));
        let mut layer = TerrainSpriteLayer::new(2, 2, BlendMode::Alpha);
        layer.update(0, 0, Some(&sprite_on(&a)), None, Vec3::ZERO, 1.0).unwrap();
        assert!(matches!(
            layer.update(1, 0, Some(&sprite_on(&b)), None, Vec3::ZERO, 1.0),
            Err(RenderError::SheetMismatch)
        ));
    }

    #[test]
    fn rejected_blend_does_not_claim_the_sheet() {
        let a = Rc::new(Sheet::new(SheetType::Indexed, Size::square(16)));
        let b = Rc::new(Sheet::new(SheetType::Indexed, Size::square(16)));
        let additive = Sprite::with_params(
            a.clone(),
            Rect::new(0, 0, 8, 8),
            0.0,
            Vec3::ZERO,
            TextureChannel::Red,
            BlendMode::Additive,
            1.0,
        );
        let mut layer = TerrainSpriteLayer::new(2, 2, BlendMode::Alpha);

        assert!(matches!(
            layer.update(0, 0, Some(&additive), None, Vec3::ZERO, 1.0),
            Err(RenderError::BlendMismatch { expected: BlendMode::Alpha, actual: BlendMode::Additive })
        ));
        assert!(layer.sheet().is_none());
        assert!(layer.dirty_rows().next().is_none());
        layer.update(0, 0, Some(&sprite_on(&b)), None, Vec3::ZERO, 1.0).unwrap();
        assert!(Rc::ptr_eq(layer.sheet().unwrap(), &b));
    }

    #[test]
    fn out_of_grid_cell_is_rejected() {
        let mut layer = TerrainSpriteLayer::new(2, 2, BlendMode::Alpha);
        assert!(matches!(layer.clear(2, 0), Err(RenderError::CellOutOfRange { .. })));
    }

    #[test]
    fn palette_row_is_written_into_vertices() {
        let sheet = Rc::new(Sheet::new(SheetType::Indexed, Size::square(16)));
        let mut layer = TerrainSpriteLayer::new(1, 1, BlendMode::Alpha);
        let pal = PaletteReference::new("terrain", 3);
        layer.update(0, 0, Some(&sprite_on(&sheet)), Some(&pal), Vec3::ZERO, 1.0).unwrap();

        let mut backend = HeadlessBackend::new();
        layer.draw(&mut backend);
        let id = layer.buffer.unwrap();
        assert_eq!(backend.vertex_buffer(id).unwrap()[0].palette_row(), 3);
    }
}
