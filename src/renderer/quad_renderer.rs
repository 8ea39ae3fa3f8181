use glam::Vec3;

use crate::renderer::backend::{DrawBatch, GraphicsBackend, PrimitiveType};
use crate::renderer::batch::BatchBuffer;
use crate::renderer::vertex::{color_quad, quad_indices, rect_corners};
use crate::sprites::sprite::BlendMode;

/// Batches flat-coloured quads.
pub struct QuadRenderer {
    batch: BatchBuffer,
    blend: BlendMode,
}

impl QuadRenderer {
    pub(crate) fn new(vertex_capacity: usize, index_capacity: usize) -> Self {
        Self { batch: BatchBuffer::new(vertex_capacity, index_capacity), blend: BlendMode::Alpha }
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Fill the quad `corners` (clockwise from top-left), one colour per
    /// corner.
    pub fn fill_quad(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        corners: [Vec3; 4],
        colors: [[f32; 4]; 4],
        blend: BlendMode,
    ) {
        if (!self.batch.is_empty() && blend != self.blend) || !self.batch.fits(4, 6) {
            self.flush(backend);
        }
        self.blend = blend;
        self.batch.push(&color_quad(corners, colors), &quad_indices(0));
    }

    /// Fill the axis-aligned rectangle from `top_left` to `bottom_right`.
    pub fn fill_rect(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        top_left: Vec3,
        bottom_right: Vec3,
        color: [f32; 4],
    ) {
        let corners = rect_corners(top_left, bottom_right - top_left);
        self.fill_quad(backend, corners, [color; 4], BlendMode::Alpha);
    }

    pub fn flush(&mut self, backend: &mut dyn GraphicsBackend) -> bool {
        if self.batch.is_empty() {
            return false;
        }
        backend.draw_batch(&DrawBatch {
            primitive: PrimitiveType::TriangleList,
            blend: self.blend,
            sheet: None,
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
    use crate::renderer::backend::HeadlessBackend;

    #[test]
    fn rect_becomes_one_untextured_quad() {
        let mut backend = HeadlessBackend::new();
        let mut r = QuadRenderer::new(8, 12);
        r.fill_rect(&mut backend, Vec3::ZERO, Vec3::new(4.0, 2.0, 0.0), [1.0, 0.0, 0.0, 1.0]);
        r.flush(&mut backend);

        let batch = backend.batches().next().unwrap();
        assert_eq!(batch.sheet, None);
        assert_eq!(batch.vertices[2].position, [4.0, 2.0, 0.0]);
        assert_eq!(batch.vertices[0].tint, [1.0, 0.0, 0.0, 1.0]);
    }
}
