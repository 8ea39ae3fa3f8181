use std::rc::Rc;

use crate::renderer::RenderError;
use crate::renderer::backend::{DrawBatch, GraphicsBackend, PrimitiveType};
use crate::renderer::batch::BatchBuffer;
use crate::renderer::vertex::{Vertex, quad_indices};
use crate::sprites::sheet::Sheet;
use crate::sprites::sprite::BlendMode;

/// Batches textured triangles that share one sheet and blend mode.
///
/// A draw from another sheet, with another blend mode, or one that would
/// overflow the buffers flushes what has been collected so far.  Capacity is
/// at least one quad.
pub struct SpriteRenderer {
    batch: BatchBuffer,
    sheet: Option<Rc<Sheet>>,
    blend: BlendMode,
}

impl SpriteRenderer {
    pub(crate) fn new(vertex_capacity: usize, index_capacity: usize) -> Self {
        Self {
            batch: BatchBuffer::new(vertex_capacity.max(4), index_capacity.max(6)),
            sheet: None,
            blend: BlendMode::Alpha,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Sheet of the batch being collected.
    pub fn current_sheet(&self) -> Option<&Rc<Sheet>> {
        self.sheet.as_ref()
    }

    pub fn pending_vertices(&self) -> usize {
        self.batch.vertex_count()
    }

    /// Append one textured quad.
    pub fn draw_quad(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        sheet: &Rc<Sheet>,
        blend: BlendMode,
        quad: &[Vertex; 4],
    ) {
        self.append(backend, sheet, blend, quad, &quad_indices(0));
    }

    /// Append caller-built geometry.  `indices` are relative to the first of
    /// `vertices`.  Geometry larger than the whole batch is rejected without
    /// touching the pending batch.
    pub fn draw_vertices(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        sheet: &Rc<Sheet>,
        blend: BlendMode,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<(), RenderError> {
        self.check_capacity(vertices.len(), indices.len())?;
        self.append(backend, sheet, blend, vertices, indices);
        Ok(())
    }

    pub fn check_capacity(&self, vertices: usize, indices: usize) -> Result<(), RenderError> {
        if self.batch.can_ever_fit(vertices, indices) {
            return Ok(());
        }
        Err(RenderError::BatchTooLarge {
            vertices,
            indices,
            vertex_capacity: self.batch.vertex_capacity(),
            index_capacity: self.batch.index_capacity(),
        })
    }

    fn append(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        sheet: &Rc<Sheet>,
        blend: BlendMode,
        vertices: &[Vertex],
        indices: &[u32],
    ) {
        let sheet_changed = self.sheet.as_ref().is_some_and(|s| !Rc::ptr_eq(s, sheet));
        let blend_changed = !self.batch.is_empty() && blend != self.blend;
        if sheet_changed || blend_changed || !self.batch.fits(vertices.len(), indices.len()) {
            self.flush(backend);
        }

        self.sheet = Some(sheet.clone());
        self.blend = blend;
        self.batch.push(vertices, indices);
    }

    /// Submit the collected batch.  Returns whether a draw was issued.
    pub fn flush(&mut self, backend: &mut dyn GraphicsBackend) -> bool {
        let sheet = self.sheet.take();
        let Some(sheet) = sheet.filter(|_| !self.batch.is_empty()) else {
            self.batch.clear();
            return false;
        };

        let texture = sheet.texture(backend);
        backend.draw_batch(&DrawBatch {
            primitive: PrimitiveType::TriangleList,
            blend: self.blend,
            sheet: Some(texture),
            vertices: self.batch.vertices(),
            indices: self.batch.indices(),
        });
        self.batch.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::renderer::backend::HeadlessBackend;
    use crate::sprites::sheet::SheetType;

    fn sheet() -> Rc<Sheet> {
        Rc::new(Sheet::new(SheetType::Bgra, Size::square(4)))
    }

    #[test]
    fn same_sheet_accumulates() {
        let mut backend = HeadlessBackend::new();
        let mut r = SpriteRenderer::new(16, 24);
        let s = sheet();
        for _ in 0..3 {
            r.draw_quad(&mut backend, &s, BlendMode::Alpha, &[Vertex::default(); 4]);
        }
        assert_eq!(backend.batches().count(), 0);
        assert!(r.flush(&mut backend));
        let batch = backend.batches().next().unwrap();
        assert_eq!(batch.indices.len(), 18);
        assert!(!r.flush(&mut backend), "second flush has nothing to draw");
    }

    #[test]
    fn sheet_change_flushes() {
        let mut backend = HeadlessBackend::new();
        let mut r = SpriteRenderer::new(16, 24);
        let (a, b) = (sheet(), sheet());
        r.draw_quad(&mut backend, &a, BlendMode::Alpha, &[Vertex::default(); 4]);
        r.draw_quad(&mut backend, &b, BlendMode::Alpha, &[Vertex::default(); 4]);
        assert_eq!(backend.batches().count(), 1);
        assert!(Rc::ptr_eq(r.current_sheet().unwrap(), &b));
    }

    #[test]
    fn blend_change_flushes() {
        let mut backend = HeadlessBackend::new();
        let mut r = SpriteRenderer::new(16, 24);
        let s = sheet();
        r.draw_quad(&mut backend, &s, BlendMode::Alpha, &[Vertex::default(); 4]);
        r.draw_quad(&mut backend, &s, BlendMode::Additive, &[Vertex::default(); 4]);
        r.flush(&mut backend);
        let blends: Vec<_> = backend.batches().map(|b| b.blend).collect();
        assert_eq!(blends, vec![BlendMode::Alpha, BlendMode::Additive]);
    }

    #[test]
    fn full_buffer_flushes_before_append() {
        let mut backend = HeadlessBackend::new();
        let mut r = SpriteRenderer::new(8, 12);
        let s = sheet();
        for _ in 0..3 {
            r.draw_quad(&mut backend, &s, BlendMode::Alpha, &[Vertex::default(); 4]);
        }
        assert_eq!(backend.batches().count(), 1);
        assert_eq!(r.pending_vertices(), 4);
    }

    #[test]
    fn oversized_geometry_is_rejected_and_pending_batch_kept() {
        let mut backend = HeadlessBackend::new();
        let mut r = SpriteRenderer::new(8, 12);
        let s = sheet();
        r.draw_quad(&mut backend, &s, BlendMode::Alpha, &[Vertex::default(); 4]);

        let fan = [Vertex::default(); 12];
        let err = r.draw_vertices(&mut backend, &s, BlendMode::Alpha, &fan, &[0; 18]).unwrap_err();
        assert!(matches!(
            err,
            RenderError::BatchTooLarge { vertices: 12, indices: 18, vertex_capacity: 8, index_capacity: 12 }
        ));
        assert_eq!(backend.batches().count(), 0);
        assert_eq!(r.pending_vertices(), 4);
    }
}
