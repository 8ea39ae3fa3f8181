use std::collections::HashMap;

use crate::geometry::Size;
use crate::palette::modifiers::PaletteModifier;
use crate::palette::reference::PaletteReference;
use crate::palette::{MutablePalette, PALETTE_SIZE, Palette, PaletteError, premultiply};
use crate::renderer::backend::{GraphicsBackend, TextureFormat, TextureId};

/// Floats stored per palette row in the colour-shift table.
pub const COLOR_SHIFT_STRIDE: usize = 8;

const SHIFT_MIN_HUE: usize = 0;
const SHIFT_MAX_HUE: usize = 1;
const SHIFT_HUE_OFFSET: usize = 4;
const SHIFT_SAT_OFFSET: usize = 5;
const SHIFT_VALUE_MODIFIER: usize = 6;
const SHIFT_ENABLED: usize = 7;

/// The GPU palette bank: one texture row per named palette.
///
/// Row 0 is reserved for true-colour sprites that need no palette, so the
/// first palette lands on row 1 and `capacity - 1` palettes fit.
///
/// Palettes registered with `allow_modifiers` are rebuilt from their base
/// definition on every [`HardwarePalette::apply_modifiers`]; modifiers only
/// ever see those working copies, never the definitions.
pub struct HardwarePalette {
    capacity: usize,
    base: HashMap<String, Palette>,
    working: HashMap<String, MutablePalette>,
    indices: HashMap<String, usize>,
    /// Names by registration order (row `i + 1`).
    order: Vec<String>,
    buffer: Vec<u8>,
    color_shifts: Vec<f32>,
    texture: Option<TextureId>,
    color_shift_texture: Option<TextureId>,
    dirty: bool,
    generation: u64,
}

impl HardwarePalette {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            base: HashMap::new(),
            working: HashMap::new(),
            indices: HashMap::new(),
            order: Vec::new(),
            buffer: vec![0; capacity * PALETTE_SIZE * 4],
            color_shifts: vec![0.0; capacity * COLOR_SHIFT_STRIDE],
            texture: None,
            color_shift_texture: None,
            dirty: true,
            generation: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of registered palettes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// Registered names, in row order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// The base definition of `name`.
    pub fn palette(&self, name: &str) -> Result<&Palette, PaletteError> {
        self.base.get(name).ok_or_else(|| PaletteError::NotFound(name.to_string()))
    }

    pub fn is_modifiable(&self, name: &str) -> bool {
        self.working.contains_key(name)
    }

    pub fn get_palette_index(&self, name: &str) -> Result<usize, PaletteError> {
        self.indices.get(name).copied().ok_or_else(|| PaletteError::NotFound(name.to_string()))
    }

    pub fn palette_reference(&self, name: &str) -> Result<PaletteReference, PaletteError> {
        Ok(PaletteReference::new(name, self.get_palette_index(name)?))
    }

    /// Register `palette` under `name` and return its row.
    pub fn add_palette(&mut self, name: &str, palette: Palette, allow_modifiers: bool) -> Result<usize, PaletteError> {
        if self.indices.contains_key(name) {
            return Err(PaletteError::AlreadyDefined(name.to_string()));
        }
        let index = self.order.len() + 1;
        if index >= self.capacity {
            return Err(PaletteError::CapacityExceeded { name: name.to_string(), capacity: self.capacity });
        }

        self.indices.insert(name.to_string(), index);
        self.order.push(name.to_string());
        if allow_modifiers {
            self.working.insert(name.to_string(), MutablePalette::from(&palette));
        }
        self.write_row(index, palette.colors());
        self.base.insert(name.to_string(), palette);
        Ok(index)
    }

    /// Swap the definition of an existing palette, keeping its row.
    pub fn replace_palette(&mut self, name: &str, palette: Palette) -> Result<(), PaletteError> {
        let index = self.get_palette_index(name)?;
        if let Some(working) = self.working.get_mut(name) {
            working.set_from_palette(&palette);
        }
        self.write_row(index, palette.colors());
        self.base.insert(name.to_string(), palette);
        Ok(())
    }

    /// Set the HSV shift applied to true-colour sprites drawn with `name`.
    /// Hues are in `[0, 1]`.
    pub fn set_color_shift(
        &mut self,
        name: &str,
        hue_offset: f32,
        sat_offset: f32,
        value_modifier: f32,
        min_hue: f32,
        max_hue: f32,
    ) -> Result<(), PaletteError> {
        let base = COLOR_SHIFT_STRIDE * self.get_palette_index(name)?;
        let row = &mut self.color_shifts[base..base + COLOR_SHIFT_STRIDE];
        row[SHIFT_MIN_HUE] = min_hue;
        row[SHIFT_MAX_HUE] = max_hue;
        row[SHIFT_HUE_OFFSET] = hue_offset;
        row[SHIFT_SAT_OFFSET] = sat_offset;
        row[SHIFT_VALUE_MODIFIER] = value_modifier;
        row[SHIFT_ENABLED] = 1.0;
        self.dirty = true;
        Ok(())
    }

    pub fn clear_color_shift(&mut self, name: &str) -> Result<(), PaletteError> {
        let base = COLOR_SHIFT_STRIDE * self.get_palette_index(name)?;
        self.color_shifts[base..base + COLOR_SHIFT_STRIDE].fill(0.0);
        self.dirty = true;
        Ok(())
    }

    pub fn has_color_shift(&self, name: &str) -> Result<bool, PaletteError> {
        Ok(self.row_has_color_shift(self.get_palette_index(name)?))
    }

    pub(crate) fn row_has_color_shift(&self, index: usize) -> bool {
        self.color_shifts
            .get(COLOR_SHIFT_STRIDE * index + SHIFT_ENABLED)
            .is_some_and(|&v| v != 0.0)
    }

    /// Rebuild every modifiable palette from its definition, run the
    /// modifiers over the copies in order and write the results to the
    /// CPU buffer.
    pub fn apply_modifiers(&mut self, modifiers: &[&dyn PaletteModifier]) {
        for (name, working) in self.working.iter_mut() {
            if let Some(base) = self.base.get(name) {
                working.set_from_palette(base);
            }
        }

        for modifier in modifiers {
            modifier.adjust_palettes(&mut self.working);
        }

        for name in &self.order {
            let (Some(working), Some(&index)) = (self.working.get(name), self.indices.get(name)) else {
                continue;
            };
            write_row(&mut self.buffer, index, working.colors());
        }
        self.dirty = true;
    }

    /// Apply `modifiers` and upload the result.
    pub fn update(&mut self, backend: &mut dyn GraphicsBackend, modifiers: &[&dyn PaletteModifier]) {
        self.apply_modifiers(modifiers);
        self.upload(backend);
    }

    /// Create the palette textures on first use and upload pending changes.
    /// Returns `(palette, color_shifts)`.
    pub fn upload(&mut self, backend: &mut dyn GraphicsBackend) -> (TextureId, TextureId) {
        let rows = self.capacity as u32;
        let texture = *self
            .texture
            .get_or_insert_with(|| backend.create_texture(Size::new(PALETTE_SIZE as u32, rows), TextureFormat::Bgra8));
        let shifts = *self.color_shift_texture.get_or_insert_with(|| {
            backend.create_texture(Size::new((COLOR_SHIFT_STRIDE / 4) as u32, rows), TextureFormat::Rgba32Float)
        });

        if self.dirty {
            backend.upload_texture(texture, &self.buffer);
            backend.upload_texture(shifts, bytemuck::cast_slice(&self.color_shifts));
            self.dirty = false;
            self.generation += 1;
        }
        (texture, shifts)
    }

    /// Textures from the last [`HardwarePalette::upload`], if any.
    pub fn textures(&self) -> Option<(TextureId, TextureId)> {
        self.texture.zip(self.color_shift_texture)
    }

    /// Whether the CPU tables hold changes not yet uploaded.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bumped on every upload that changed texture contents.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The CPU copy of the palette texture (premultiplied BGRA rows).
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn color_shift_data(&self) -> &[f32] {
        &self.color_shifts
    }

    pub fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        for texture in [self.texture.take(), self.color_shift_texture.take()].into_iter().flatten() {
            backend.release_texture(texture);
        }
        self.dirty = true;
    }

    fn write_row(&mut self, index: usize, colors: &[u32; PALETTE_SIZE]) {
        write_row(&mut self.buffer, index, colors);
        self.dirty = true;
    }
}

fn write_row(buffer: &mut [u8], index: usize, colors: &[u32; PALETTE_SIZE]) {
    let start = index * PALETTE_SIZE * 4;
    let row = &mut buffer[start..start + PALETTE_SIZE * 4];
    for (texel, &color) in row.chunks_exact_mut(4).zip(colors.iter()) {
        texel.copy_from_slice(&premultiply(color).to_le_bytes());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
