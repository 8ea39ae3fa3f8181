use std::collections::HashMap;

use crate::palette::{MutablePalette, argb, components};

/// Per-frame palette effect.  Receives fresh working copies of every
/// modifiable palette, keyed by name; changes last until the next update.
pub trait PaletteModifier {
    fn adjust_palettes(&self, palettes: &mut HashMap<String, MutablePalette>);
}

// ── RotationModifier ─────────────────────────────────────────────────────────

/// Cycles a contiguous index range, e.g. animated water or lights.
#[derive(Clone, Debug)]
pub struct RotationModifier {
    /// Palettes to touch; empty means every modifiable palette.
    pub palettes: Vec<String>,
    pub start: usize,
    pub length: usize,
    pub step: usize,
}

impl RotationModifier {
    pub fn new(start: usize, length: usize) -> Self {
        Self { palettes: Vec::new(), start, length, step: 0 }
    }

    pub fn for_palettes(mut self, names: &[&str]) -> Self {
        self.palettes = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Advance the rotation by one entry.
    pub fn tick(&mut self) {
        if self.length > 0 {
            self.step = (self.step + 1) % self.length;
        }
    }

    fn applies_to(&self, name: &str) -> bool {
        self.palettes.is_empty() || self.palettes.iter().any(|p| p == name)
    }
}

impl PaletteModifier for RotationModifier {
    fn adjust_palettes(&self, palettes: &mut HashMap<String, MutablePalette>) {
        if self.length == 0 {
            return;
        }
        for (name, palette) in palettes.iter_mut() {
            if !self.applies_to(name) {
                continue;
            }
            let len = palette.colors().len();
            if self.start >= len {
                continue;
            }
            let end = (self.start + self.length).min(len);
            palette.colors_mut()[self.start..end].rotate_right(self.step % (end - self.start));
        }
    }
}

// ── TintModifier ─────────────────────────────────────────────────────────────

/// Scales RGB of every entry, for global lighting.  Alpha is untouched.
#[derive(Clone, Debug)]
pub struct TintModifier {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    /// Palettes left alone (e.g. the UI palette).
    pub exclude: Vec<String>,
}

impl TintModifier {
    pub fn new(red: f32, green: f32, blue: f32) -> Self {
        Self { red, green, blue, exclude: Vec::new() }
    }
}

impl PaletteModifier for TintModifier {
    fn adjust_palettes(&self, palettes: &mut HashMap<String, MutablePalette>) {
        let scale = |c: u8, k: f32| (c as f32 * k).round().clamp(0.0, 255.0) as u8;
        for (name, palette) in palettes.iter_mut() {
            if self.exclude.iter().any(|e| e == name) {
                continue;
            }
            for color in palette.colors_mut().iter_mut() {
                let (a, r, g, b) = components(*color);
                *color = argb(a, scale(r, self.red), scale(g, self.green), scale(b, self.blue));
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{PALETTE_SIZE, Palette};

    fn ramp() -> MutablePalette {
        let mut colors = [0u32; PALETTE_SIZE];
        for (i, c) in colors.iter_mut().enumerate() {
            *c = i as u32;
        }
        MutablePalette::from(&Palette::new(colors))
    }

    #[test]
    fn rotation_cycles_only_its_range() {
        let mut map = HashMap::from([("water".to_string(), ramp())]);
        let mut rot = RotationModifier::new(10, 4);
        rot.tick();
        rot.adjust_palettes(&mut map);

        let p = &map["water"];
        assert_eq!(&p.colors()[9..15], &[9, 13, 10, 11, 12, 14]);
    }

    #[test]
    fn rotation_past_the_last_entry_leaves_palettes_alone() {
        let mut map = HashMap::from([("water".to_string(), ramp())]);
        let mut rot = RotationModifier::new(300, 8);
        rot.tick();
        rot.adjust_palettes(&mut map);
        assert_eq!(map["water"], ramp());

        let mut tail = RotationModifier::new(254, 8);
        tail.tick();
        tail.adjust_palettes(&mut map);
        assert_eq!(&map["water"].colors()[253..], &[253, 255, 254]);
    }

    #[test]
    fn rotation_skips_unlisted_palettes() {
        let mut map = HashMap::from([("terrain".to_string(), ramp())]);
        let mut rot = RotationModifier::new(0, 8).for_palettes(&["water"]);
        rot.tick();
        rot.adjust_palettes(&mut map);
        assert_eq!(map["terrain"], ramp());
    }

    #[test]
    fn tint_scales_rgb_and_keeps_alpha() {
        let mut p = ramp();
        p.set(1, argb(128, 100, 200, 50));
        let mut map = HashMap::from([("units".to_string(), p)]);

        TintModifier::new(0.5, 1.5, 1.0).adjust_palettes(&mut map);
        assert_eq!(map["units"].get(1), argb(128, 50, 255, 50));
    }
}
