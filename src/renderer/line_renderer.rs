use glam::Vec3;

use crate::renderer::backend::{DrawBatch, GraphicsBackend, PrimitiveType};
use crate::renderer::batch::BatchBuffer;
use crate::renderer::vertex::line_vertices;
use crate::sprites::sprite::BlendMode;

/// Batches one-pixel lines, two vertices and two indices each.
pub struct LineRenderer {
    batch: BatchBuffer,
}

impl LineRenderer {
    pub(crate) fn new(vertex_capacity: usize) -> Self {
        Self { batch: BatchBuffer::new(vertex_capacity, vertex_capacity) }
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn draw_line(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        start: Vec3,
        end: Vec3,
        start_color: [f32; 4],
        end_color: [f32; 4],
    ) {
        if !self.batch.fits(2, 2) {
            self.flush(backend);
        }
        self.batch.push(&line_vertices(start, end, start_color, end_color), &[0, 1]);
    }

    /// Connect consecutive points, and the last back to the first when
    /// `closed`.
    pub fn draw_polyline(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        points: &[Vec3],
        color: [f32; 4],
        closed: bool,
    ) {
        for pair in points.windows(2) {
            self.draw_line(backend, pair[0], pair[1], color, color);
        }
        if closed && points.len() > 2 {
            self.draw_line(backend, points[points.len() - 1], points[0], color, color);
        }
    }

    pub fn flush(&mut self, backend: &mut dyn GraphicsBackend) -> bool {
        if self.batch.is_empty() {
            return false;
        }
        backend.draw_batch(&DrawBatch {
            primitive: PrimitiveType::LineList,
            blend: BlendMode::Alpha,
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
    fn closed_polyline_has_one_segment_per_point() {
        let mut backend = HeadlessBackend::new();
        let mut r = LineRenderer::new(64);
        let square = [
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        r.draw_polyline(&mut backend, &square, [1.0; 4], true);
        r.flush(&mut backend);

        let batch = backend.batches().next().unwrap();
        assert_eq!(batch.primitive, PrimitiveType::LineList);
        assert_eq!(batch.indices, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(batch.vertices[7].position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn overflow_splits_into_batches() {
        let mut backend = HeadlessBackend::new();
        let mut r = LineRenderer::new(4);
        for _ in 0..3 {
            r.draw_line(&mut backend, Vec3::ZERO, Vec3::ONE, [1.0; 4], [1.0; 4]);
        }
        r.flush(&mut backend);
        assert_eq!(backend.batches().count(), 2);
    }
}
