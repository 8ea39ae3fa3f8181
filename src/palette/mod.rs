//! 256-colour palettes and the GPU palette bank.
//!
//! Colours are packed ARGB `u32`s; stored little-endian they read as
//! B, G, R, A bytes, which is the layout of a `Bgra8` texture row.

pub mod hardware;
pub mod modifiers;
pub mod reference;

use thiserror::Error;

pub use hardware::HardwarePalette;
pub use modifiers::{PaletteModifier, RotationModifier, TintModifier};
pub use reference::PaletteReference;

/// Number of entries in every palette.
pub const PALETTE_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("palette `{0}` does not exist")]
    NotFound(String),

    #[error("palette `{0}` has already been defined")]
    AlreadyDefined(String),

    #[error("cannot add palette `{name}`: all {capacity} rows are in use (row 0 is reserved)")]
    CapacityExceeded { name: String, capacity: usize },

    #[error("palette data must be {expected} bytes, got {actual}")]
    InvalidData { expected: usize, actual: usize },
}

// ── Colours ──────────────────────────────────────────────────────────────────

#[inline]
pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// Split a packed colour into `(a, r, g, b)`.
#[inline]
pub const fn components(color: u32) -> (u8, u8, u8, u8) {
    ((color >> 24) as u8, (color >> 16) as u8, (color >> 8) as u8, color as u8)
}

/// The colour with its RGB scaled by its alpha, as the GPU expects.
pub fn premultiply(color: u32) -> u32 {
    let (a, r, g, b) = components(color);
    if a == 255 {
        return color;
    }
    let scale = |c: u8| ((c as u32 * a as u32 + 127) / 255) as u8;
    argb(a, scale(r), scale(g), scale(b))
}

// ── Palette ──────────────────────────────────────────────────────────────────

/// An immutable palette definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: [u32; PALETTE_SIZE],
}

impl Palette {
    pub fn new(colors: [u32; PALETTE_SIZE]) -> Self {
        Self { colors }
    }

    /// Decode a 768-byte VGA palette (6-bit R, G, B triples).  Colours are
    /// opaque except `transparent`, which gets alpha 0.
    pub fn from_vga_bytes(data: &[u8], transparent: Option<u8>) -> Result<Self, PaletteError> {
        let expected = 3 * PALETTE_SIZE;
        if data.len() < expected {
            return Err(PaletteError::InvalidData { expected, actual: data.len() });
        }

        let mut colors = [0u32; PALETTE_SIZE];
        for (i, rgb) in data[..expected].chunks_exact(3).enumerate() {
            colors[i] = argb(255, rgb[0] << 2, rgb[1] << 2, rgb[2] << 2);
        }
        if let Some(t) = transparent {
            colors[t as usize] = 0;
        }
        Ok(Self { colors })
    }

    pub fn get(&self, index: usize) -> u32 {
        self.colors[index]
    }

    pub fn colors(&self) -> &[u32; PALETTE_SIZE] {
        &self.colors
    }
}

impl From<&MutablePalette> for Palette {
    fn from(p: &MutablePalette) -> Self {
        Self { colors: p.colors }
    }
}

// ── MutablePalette ───────────────────────────────────────────────────────────

/// A working copy that palette modifiers may rewrite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutablePalette {
    colors: [u32; PALETTE_SIZE],
}

impl MutablePalette {
    pub fn get(&self, index: usize) -> u32 {
        self.colors[index]
    }

    pub fn set(&mut self, index: usize, color: u32) {
        self.colors[index] = color;
    }

    pub fn colors(&self) -> &[u32; PALETTE_SIZE] {
        &self.colors
    }

    pub fn colors_mut(&mut self) -> &mut [u32; PALETTE_SIZE] {
        &mut self.colors
    }

    pub fn set_from_palette(&mut self, palette: &Palette) {
        self.colors = palette.colors;
    }
}

impl From<&Palette> for MutablePalette {
    fn from(p: &Palette) -> Self {
        Self { colors: p.colors }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argb_round_trips_components() {
        let c = argb(0x80, 0x10, 0x20, 0x30);
        assert_eq!(c, 0x8010_2030);
        assert_eq!(components(c), (0x80, 0x10, 0x20, 0x30));
        assert_eq!(c.to_le_bytes(), [0x30, 0x20, 0x10, 0x80]);
    }

    #[test]
    fn premultiply_scales_rgb_only() {
        assert_eq!(premultiply(argb(255, 9, 9, 9)), argb(255, 9, 9, 9));
        assert_eq!(premultiply(argb(128, 200, 100, 0)), argb(128, 100, 50, 0));
        assert_eq!(premultiply(argb(0, 200, 100, 50)), 0);
    }

    #[test]
    fn vga_palette_expands_six_bit_components() {
        let mut data = vec![0u8; 768];
        data[3..6].copy_from_slice(&[63, 32, 1]);
        let p = Palette::from_vga_bytes(&data, Some(0)).unwrap();
        assert_eq!(p.get(0), 0);
        assert_eq!(p.get(1), argb(255, 252, 128, 4));
    }

    #[test]
    fn short_vga_data_is_rejected() {
        assert!(matches!(
            Palette::from_vga_bytes(&[0; 10], None),
            Err(PaletteError::InvalidData { expected: 768, actual: 10 })
        ));
    }
}
