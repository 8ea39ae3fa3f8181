use crate::renderer::vertex::Vertex;

/// Fixed-capacity CPU staging for one batching renderer.
///
/// Capacity never grows: callers check [`BatchBuffer::fits`] and flush
/// first when it says no.
pub(crate) struct BatchBuffer {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    vertex_capacity: usize,
    index_capacity: usize,
}

impl BatchBuffer {
    pub(crate) fn new(vertex_capacity: usize, index_capacity: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_capacity),
            indices: Vec::with_capacity(index_capacity),
            vertex_capacity,
            index_capacity,
        }
    }

    pub(crate) fn fits(&self, vertices: usize, indices: usize) -> bool {
        self.vertices.len() + vertices <= self.vertex_capacity
            && self.indices.len() + indices <= self.index_capacity
    }

    /// Append geometry; `indices` are relative to the first new vertex.
    pub(crate) fn push(&mut self, vertices: &[Vertex], indices: &[u32]) {
        debug_assert!(self.fits(vertices.len(), indices.len()));
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(vertices);
        self.indices.extend(indices.iter().map(|i| base + i));
    }

    pub(crate) fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub(crate) fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether `vertices` and `indices` fit in an empty buffer.
    pub(crate) fn can_ever_fit(&self, vertices: usize, indices: usize) -> bool {
        vertices <= self.vertex_capacity && indices <= self.index_capacity
    }

    pub(crate) fn vertex_capacity(&self) -> usize {
        self.vertex_capacity
    }

    pub(crate) fn index_capacity(&self) -> usize {
        self.index_capacity
    }

    pub(crate) fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub(crate) fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }
}
