// =============================================================================
// GEOMETRY.RS — Pixel-space primitives for sheets and sprites
//
// Integer sizes and rectangles used by the sheet packer, plus the small
// power-of-two helpers that atlas and palette texture sizing rely on.
// =============================================================================

/// Integer pixel dimensions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Self = Self { width: 0, height: 0 };

    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A square `n × n` size.
    #[inline]
    pub const fn square(n: u32) -> Self {
        Self { width: n, height: n }
    }

    /// True when either dimension is zero (nothing to pack or draw).
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered (`width * height`).
    #[inline]
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Both dimensions rounded up to the next power of two.
    pub fn next_power_of_two(&self) -> Self {
        Self {
            width: self.width.next_power_of_two(),
            height: self.height.next_power_of_two(),
        }
    }
}

// =============================================================================
// RECT
// =============================================================================

/// Axis-aligned pixel rectangle; `x`/`y` is the top-left corner.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const EMPTY: Self = Self { x: 0, y: 0, width: 0, height: 0 };

    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub const fn left(&self) -> u32 {
        self.x
    }

    #[inline]
    pub const fn top(&self) -> u32 {
        self.y
    }

    #[inline]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    #[inline]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    #[inline]
    pub const fn size(&self) -> Size {
        Size { width: self.width, height: self.height }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when `self` lies completely inside a `size`-sized area at the origin.
    pub fn fits_within(&self, size: Size) -> bool {
        self.right() <= size.width && self.bottom() <= size.height
    }

    /// True when the two rectangles share at least one pixel.
    /// Empty rectangles never intersect anything.
    pub fn intersects(&self, other: &Rect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

// =============================================================================
// TESTS
// =============================================================================
