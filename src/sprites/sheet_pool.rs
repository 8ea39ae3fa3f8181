use std::cell::RefCell;
use std::rc::Rc;

use crate::geometry::Size;
use crate::renderer::backend::GraphicsBackend;
use crate::sprites::sheet::{Sheet, SheetType};
use crate::sprites::sheet_builder::SheetAllocator;

/// Render-target sheets recycled from frame to frame.
///
/// Sheets handed out during a frame stay mapped until the next
/// [`SheetPool::begin_frame`], which returns them all to the free stack.
/// Allocation pops the most recently freed sheet before creating a new one.
pub struct SheetPool {
    size: Size,
    mapped: Vec<Rc<Sheet>>,
    unmapped: Vec<Rc<Sheet>>,
}

impl SheetPool {
    pub fn new(size: Size) -> Self {
        Self { size, mapped: Vec::new(), unmapped: Vec::new() }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn mapped(&self) -> usize {
        self.mapped.len()
    }

    pub fn unmapped(&self) -> usize {
        self.unmapped.len()
    }

    /// Free every sheet handed out last frame.
    pub fn begin_frame(&mut self) {
        self.unmapped.append(&mut self.mapped);
    }

    pub fn allocate(&mut self) -> Rc<Sheet> {
        let sheet = self
            .unmapped
            .pop()
            .unwrap_or_else(|| Rc::new(Sheet::render_target(SheetType::Bgra, self.size)));
        self.mapped.push(sheet.clone());
        sheet
    }

    /// Release the GPU textures of every pooled sheet.
    pub fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        for sheet in self.mapped.drain(..).chain(self.unmapped.drain(..)) {
            sheet.dispose(backend);
        }
    }
}

/// A [`SheetAllocator`] drawing from a shared [`SheetPool`].
#[derive(Clone)]
pub struct PooledSheetAllocator {
    pool: Rc<RefCell<SheetPool>>,
}

impl PooledSheetAllocator {
    pub fn new(pool: Rc<RefCell<SheetPool>>) -> Self {
        Self { pool }
    }
}

impl SheetAllocator for PooledSheetAllocator {
    fn allocate_sheet(&mut self, _kind: SheetType) -> Rc<Sheet> {
        self.pool.borrow_mut().allocate()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::renderer::backend::HeadlessBackend;
    use crate::sprites::sheet_builder::SheetBuilder;

    #[test]
    fn sheets_are_reused_after_begin_frame() {
        let mut pool = SheetPool::new(Size::square(64));
        let a = pool.allocate();
        let b = pool.allocate();
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(pool.mapped(), 2);

        pool.begin_frame();
        assert_eq!((pool.mapped(), pool.unmapped()), (0, 2));

        // Last freed comes back first.
        let c = pool.allocate();
        assert!(Rc::ptr_eq(&c, &b));
        assert!(c.is_render_target());
    }

    #[test]
    fn builder_packs_into_pooled_render_targets() {
        let pool = Rc::new(RefCell::new(SheetPool::new(Size::square(32))));
        let alloc = PooledSheetAllocator::new(pool.clone());
        let mut builder = SheetBuilder::with_allocator(SheetType::Bgra, Box::new(alloc), 0);

        builder.allocate(Size::square(32), 0.0, Vec3::ZERO).unwrap();
        builder.allocate(Size::square(32), 0.0, Vec3::ZERO).unwrap();
        assert_eq!(pool.borrow().mapped(), 2);

        let mut backend = HeadlessBackend::new();
        pool.borrow_mut().dispose(&mut backend);
        assert_eq!(pool.borrow().mapped(), 0);
    }
}
