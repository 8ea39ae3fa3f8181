use std::rc::Rc;

use crate::palette::hardware::HardwarePalette;

/// A named palette and the texture row it occupies.
///
/// Cheap to clone; draw calls take a reference instead of palette data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PaletteReference {
    name: Rc<str>,
    index: usize,
}

impl PaletteReference {
    pub fn new(name: &str, index: usize) -> Self {
        Self { name: Rc::from(name), index }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Row of the palette texture.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Row as a fraction of the palette texture height.
    pub fn texture_index(&self, palette: &HardwarePalette) -> f32 {
        self.index as f32 / palette.capacity() as f32
    }

    /// Like [`PaletteReference::texture_index`] but pointing at the centre of
    /// the row, for samplers that filter.
    pub fn texture_mid_index(&self, palette: &HardwarePalette) -> f32 {
        (self.index as f32 + 0.5) / palette.capacity() as f32
    }

    pub fn has_color_shift(&self, palette: &HardwarePalette) -> bool {
        palette.row_has_color_shift(self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{PALETTE_SIZE, Palette};

    #[test]
    fn texture_coordinates_are_normalised_by_capacity() {
        let mut hw = HardwarePalette::new(8);
        hw.add_palette("a", Palette::new([0; PALETTE_SIZE]), false).unwrap();
        hw.add_palette("b", Palette::new([0; PALETTE_SIZE]), false).unwrap();

        let b = hw.palette_reference("b").unwrap();
        assert_eq!(b.name(), "b");
        assert_eq!(b.index(), 2);
        assert_eq!(b.texture_index(&hw), 0.25);
        assert_eq!(b.texture_mid_index(&hw), 0.3125);

        assert!(!b.has_color_shift(&hw));
        hw.set_color_shift("b", 0.1, 0.0, 1.0, 0.0, 1.0).unwrap();
        assert!(b.has_color_shift(&hw));
    }
}
