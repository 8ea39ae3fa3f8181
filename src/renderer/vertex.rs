use glam::{Vec2, Vec3};

use crate::sprites::sprite::{Sprite, TextureChannel};

/// Vertex shared by every batch.  `attrib` packs how the fragment shader
/// should colour the pixel; see the `ATTRIB_*` constants.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub secondary_uv: [f32; 2],
    /// RGB multiplier and alpha for sprites; the colour itself for flat
    /// geometry.
    pub tint: [f32; 4],
    pub attrib: u32,
}

// Bits 0-1: sampling mode.
pub const ATTRIB_MODE_COLOR: u32 = 0;
pub const ATTRIB_MODE_RGBA: u32 = 1;
pub const ATTRIB_MODE_INDEXED: u32 = 2;
pub const ATTRIB_MODE_MASK: u32 = 0b11;
// Bits 2-3: primary channel for indexed sprites.
pub const ATTRIB_CHANNEL_SHIFT: u32 = 2;
// Bit 4 flags a secondary plane; bits 5-6 hold its channel.
pub const ATTRIB_HAS_SECONDARY: u32 = 1 << 4;
pub const ATTRIB_SECONDARY_SHIFT: u32 = 5;
// Bits 16-31: palette row.
pub const ATTRIB_PALETTE_SHIFT: u32 = 16;

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x3,  // position
        1 => Float32x2,  // uv
        2 => Float32x2,  // secondary_uv
        3 => Float32x4,  // tint
        4 => Uint32,     // attrib
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }

    pub fn mode(&self) -> u32 {
        self.attrib & ATTRIB_MODE_MASK
    }

    pub fn palette_row(&self) -> u32 {
        self.attrib >> ATTRIB_PALETTE_SHIFT
    }
}

/// Pack the sampling attributes for `sprite` drawn with palette `row`.
pub fn sprite_attrib(sprite: &Sprite, palette_row: u32) -> u32 {
    let mut attrib = palette_row << ATTRIB_PALETTE_SHIFT;
    match sprite.channel() {
        TextureChannel::Rgba => attrib |= ATTRIB_MODE_RGBA,
        channel => attrib |= ATTRIB_MODE_INDEXED | (channel as u32) << ATTRIB_CHANNEL_SHIFT,
    }
    if let Some(secondary) = sprite.secondary() {
        attrib |= ATTRIB_HAS_SECONDARY | (secondary.channel as u32 & 0b11) << ATTRIB_SECONDARY_SHIFT;
    }
    attrib
}

/// Index pattern of one quad whose first vertex is `base`.
pub fn quad_indices(base: u32) -> [u32; 6] {
    [base, base + 1, base + 2, base + 2, base + 3, base]
}

/// Corners of an axis-aligned `size` box at `location`, clockwise from the
/// top-left.  Depth follows the box's z extent down the quad.
pub fn rect_corners(location: Vec3, size: Vec3) -> [Vec3; 4] {
    [
        location,
        location + Vec3::new(size.x, 0.0, 0.0),
        location + size,
        location + Vec3::new(0.0, size.y, size.z),
    ]
}

/// Rotate corners about their centre by `radians` in the screen plane.
pub fn rotate_corners(corners: [Vec3; 4], radians: f32) -> [Vec3; 4] {
    if radians == 0.0 {
        return corners;
    }
    let centre = (corners[0] + corners[2]) * 0.5;
    let rot = Vec2::from_angle(radians);
    corners.map(|c| {
        let d = rot.rotate(Vec2::new(c.x - centre.x, c.y - centre.y));
        Vec3::new(centre.x + d.x, centre.y + d.y, c.z)
    })
}

/// Textured quad for `sprite` with the given corners (top-left, top-right,
/// bottom-right, bottom-left).
pub fn sprite_quad(
    corners: [Vec3; 4],
    sprite: &Sprite,
    palette_row: u32,
    tint: Vec3,
    alpha: f32,
) -> [Vertex; 4] {
    let uv = sprite.uv();
    let suv = sprite.secondary().map(|s| s.uv).unwrap_or(uv);
    let attrib = sprite_attrib(sprite, palette_row);
    let tint = [tint.x, tint.y, tint.z, alpha];

    let texcoords = [
        ([uv.left, uv.top], [suv.left, suv.top]),
        ([uv.right, uv.top], [suv.right, suv.top]),
        ([uv.right, uv.bottom], [suv.right, suv.bottom]),
        ([uv.left, uv.bottom], [suv.left, suv.bottom]),
    ];

    std::array::from_fn(|i| Vertex {
        position: corners[i].to_array(),
        uv: texcoords[i].0,
        secondary_uv: texcoords[i].1,
        tint,
        attrib,
    })
}

/// Untextured quad, one colour per corner.
pub fn color_quad(corners: [Vec3; 4], colors: [[f32; 4]; 4]) -> [Vertex; 4] {
    std::array::from_fn(|i| Vertex {
        position: corners[i].to_array(),
        tint: colors[i],
        attrib: ATTRIB_MODE_COLOR,
        ..Vertex::default()
    })
}

pub fn line_vertices(start: Vec3, end: Vec3, start_color: [f32; 4], end_color: [f32; 4]) -> [Vertex; 2] {
    [
        Vertex { position: start.to_array(), tint: start_color, ..Vertex::default() },
        Vertex { position: end.to_array(), tint: end_color, ..Vertex::default() },
    ]
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::geometry::{Rect, Size};
    use crate::sprites::sheet::{Sheet, SheetType};

    #[test]
    fn vertex_has_no_padding() {
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
    }

    #[test]
    fn attrib_packs_channel_and_palette_row() {
        let sheet = Rc::new(Sheet::new(SheetType::DualIndexed, Size::square(16)));
        let s = Sprite::new(sheet, Rect::new(0, 0, 4, 4), TextureChannel::Blue)
            .with_secondary(Rect::new(0, 0, 4, 4), TextureChannel::Alpha);
        let a = sprite_attrib(&s, 5);
        assert_eq!(a & ATTRIB_MODE_MASK, ATTRIB_MODE_INDEXED);
        assert_eq!((a >> ATTRIB_CHANNEL_SHIFT) & 0b11, 2);
        assert_ne!(a & ATTRIB_HAS_SECONDARY, 0);
        assert_eq!((a >> ATTRIB_SECONDARY_SHIFT) & 0b11, 3);
        assert_eq!(a >> ATTRIB_PALETTE_SHIFT, 5);
    }

    #[test]
    fn sprite_quad_maps_uv_corners() {
        let sheet = Rc::new(Sheet::new(SheetType::Bgra, Size::square(4)));
        let s = Sprite::new(sheet, Rect::new(0, 0, 2, 4), TextureChannel::Rgba);
        let corners = rect_corners(Vec3::new(10.0, 20.0, 0.0), s.size());
        let q = sprite_quad(corners, &s, 0, Vec3::ONE, 1.0);

        assert_eq!(q[0].position, [10.0, 20.0, 0.0]);
        assert_eq!(q[2].position, [12.0, 24.0, 0.0]);
        assert_eq!(q[1].uv, [0.5, 0.0]);
        assert_eq!(q[3].uv, [0.0, 1.0]);
        assert_eq!(q[0].mode(), ATTRIB_MODE_RGBA);
    }

    #[test]
    fn half_turn_swaps_opposite_corners() {
        let corners = rect_corners(Vec3::ZERO, Vec3::new(2.0, 2.0, 0.0));
        let r = rotate_corners(corners, std::f32::consts::PI);
        assert!((r[0] - corners[2]).length() < 1e-5);
        assert!((r[1] - corners[3]).length() < 1e-5);
    }

    #[test]
    fn quad_indices_form_two_triangles() {
        assert_eq!(quad_indices(4), [4, 5, 6, 6, 7, 4]);
    }
}
