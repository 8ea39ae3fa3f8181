use std::rc::Rc;

use glam::Vec3;

use crate::geometry::Rect;
use crate::sprites::sheet::Sheet;

// ── TextureChannel ───────────────────────────────────────────────────────────

/// Which part of a sheet texel a sprite's pixels live in.
///
/// Indexed sprites occupy one 8-bit channel; true-colour sprites use all four
/// (`Rgba`).  The discriminants are the packing order and must not change.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TextureChannel {
    Red = 0,
    Green = 1,
    Blue = 2,
    Alpha = 3,
    Rgba = 4,
}

impl TextureChannel {
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Red),
            1 => Some(Self::Green),
            2 => Some(Self::Blue),
            3 => Some(Self::Alpha),
            4 => Some(Self::Rgba),
            _ => None,
        }
    }

    /// The channel `step` places after this one, or `None` once the
    /// single-channel planes (Red..Alpha) are used up.
    pub fn next(self, step: u8) -> Option<Self> {
        let next = self as u8 + step;
        if next > Self::Alpha as u8 {
            return None;
        }
        Self::from_index(next)
    }

    /// Byte offset of this channel inside a BGRA texel.
    ///
    /// Sheets store texels as B, G, R, A, so red is byte 2.  `None` for
    /// [`TextureChannel::Rgba`], which covers the whole texel.
    pub const fn byte_offset(self) -> Option<usize> {
        match self {
            Self::Red => Some(2),
            Self::Green => Some(1),
            Self::Blue => Some(0),
            Self::Alpha => Some(3),
            Self::Rgba => None,
        }
    }
}

// ── BlendMode ────────────────────────────────────────────────────────────────

/// How a batch is composited onto the target.  Part of the batch key: a
/// change of blend mode forces a flush.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    None,
    #[default]
    Alpha,
    Additive,
    Subtractive,
    Multiply,
    Multiplicative,
    DoubleMultiplicative,
    LowAdditive,
    Screen,
    Translucent,
}

// ── UvRect ───────────────────────────────────────────────────────────────────

/// Normalised texture coordinates of a sprite inside its sheet.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct UvRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl UvRect {
    fn from_bounds(bounds: Rect, sheet: &Sheet) -> Self {
        let size = sheet.size();
        let w = size.width.max(1) as f32;
        let h = size.height.max(1) as f32;
        Self {
            left: bounds.left() as f32 / w,
            top: bounds.top() as f32 / h,
            right: bounds.right() as f32 / w,
            bottom: bounds.bottom() as f32 / h,
        }
    }
}

// ── Secondary data ───────────────────────────────────────────────────────────

/// Second image plane of a dual-indexed sprite (e.g. colour + normals).
/// Always shares the primary sheet so a single batch can sample both.
#[derive(Clone, Debug, PartialEq)]
pub struct SecondaryData {
    pub bounds: Rect,
    pub channel: TextureChannel,
    pub uv: UvRect,
}

// ── Sprite ───────────────────────────────────────────────────────────────────

/// An immutable region of a [`Sheet`].
///
/// Sprites are produced by a `SheetBuilder` and handed out behind `Rc` so the
/// same region can be shared by every consumer that asked for it.
#[derive(Clone, Debug)]
pub struct Sprite {
    sheet: Rc<Sheet>,
    bounds: Rect,
    channel: TextureChannel,
    blend_mode: BlendMode,
    z_ramp: f32,
    /// Offset of the sprite centre relative to its logical origin.
    offset: Vec3,
    /// Drawn size: `scale * (width, height, height * z_ramp)`.
    size: Vec3,
    /// `offset` expressed as a fraction of `size`.
    fractional_offset: Vec3,
    uv: UvRect,
    secondary: Option<SecondaryData>,
}

impl Sprite {
    /// A sprite covering `bounds` of `sheet` with no offset, ramp or scale.
    pub fn new(sheet: Rc<Sheet>, bounds: Rect, channel: TextureChannel) -> Self {
        Self::with_params(sheet, bounds, 0.0, Vec3::ZERO, channel, BlendMode::Alpha, 1.0)
    }

    pub fn with_params(
        sheet: Rc<Sheet>,
        bounds: Rect,
        z_ramp: f32,
        offset: Vec3,
        channel: TextureChannel,
        blend_mode: BlendMode,
        scale: f32,
    ) -> Self {
        debug_assert!(
            bounds.fits_within(sheet.size()),
            "sprite bounds {bounds:?} exceed sheet size {:?}",
            sheet.size()
        );

        let size = scale
            * Vec3::new(
                bounds.width as f32,
                bounds.height as f32,
                bounds.height as f32 * z_ramp,
            );

        let ratio = |o: f32, s: f32| if s != 0.0 { o / s } else { 0.0 };
        let fractional_offset = Vec3::new(
            ratio(offset.x, size.x),
            ratio(offset.y, size.y),
            ratio(offset.z, size.z),
        );

        let uv = UvRect::from_bounds(bounds, &sheet);
        Self {
            sheet,
            bounds,
            channel,
            blend_mode,
            z_ramp,
            offset,
            size,
            fractional_offset,
            uv,
            secondary: None,
        }
    }

    /// Attach a second image plane living on the same sheet.
    pub fn with_secondary(mut self, bounds: Rect, channel: TextureChannel) -> Self {
        let uv = UvRect::from_bounds(bounds, &self.sheet);
        self.secondary = Some(SecondaryData { bounds, channel, uv });
        self
    }

    pub fn sheet(&self) -> &Rc<Sheet> {
        &self.sheet
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn channel(&self) -> TextureChannel {
        self.channel
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn z_ramp(&self) -> f32 {
        self.z_ramp
    }

    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    pub fn size(&self) -> Vec3 {
        self.size
    }

    pub fn fractional_offset(&self) -> Vec3 {
        self.fractional_offset
    }

    pub fn uv(&self) -> UvRect {
        self.uv
    }

    pub fn secondary(&self) -> Option<&SecondaryData> {
        self.secondary.as_ref()
    }

    /// True when the sprite covers no pixels (e.g. an empty frame).
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::sprites::sheet::SheetType;

    fn sheet(size: u32) -> Rc<Sheet> {
        Rc::new(Sheet::new(SheetType::Indexed, Size::square(size)))
    }

    #[test]
    fn channel_cycle_stops_after_alpha() {
        assert_eq!(TextureChannel::Red.next(1), Some(TextureChannel::Green));
        assert_eq!(TextureChannel::Blue.next(1), Some(TextureChannel::Alpha));
        assert_eq!(TextureChannel::Alpha.next(1), None);
        assert_eq!(TextureChannel::Red.next(2), Some(TextureChannel::Blue));
        assert_eq!(TextureChannel::Blue.next(2), None);
        assert_eq!(TextureChannel::Rgba.next(4), None);
    }

    #[test]
    fn red_is_byte_two_of_bgra() {
        assert_eq!(TextureChannel::Red.byte_offset(), Some(2));
        assert_eq!(TextureChannel::Blue.byte_offset(), Some(0));
        assert_eq!(TextureChannel::Rgba.byte_offset(), None);
    }

    #[test]
    fn uv_is_bounds_over_sheet_size() {
        let s = Sprite::new(sheet(256), Rect::new(64, 128, 32, 64), TextureChannel::Red);
        let uv = s.uv();
        assert_eq!(uv.left, 0.25);
        assert_eq!(uv.top, 0.5);
        assert_eq!(uv.right, 0.375);
        assert_eq!(uv.bottom, 0.75);
    }

    #[test]
    fn size_and_fractional_offset_follow_scale_and_ramp() {
        let s = Sprite::with_params(
            sheet(256),
            Rect::new(0, 0, 20, 10),
            0.5,
            Vec3::new(5.0, -2.0, 0.0),
            TextureChannel::Rgba,
            BlendMode::Additive,
            2.0,
        );
        assert_eq!(s.size(), Vec3::new(40.0, 20.0, 10.0));
        assert_eq!(s.fractional_offset(), Vec3::new(0.125, -0.1, 0.0));
        assert_eq!(s.blend_mode(), BlendMode::Additive);
    }

    #[test]
    fn empty_sprite_has_zero_fractional_offset() {
        let s = Sprite::with_params(
            sheet(64),
            Rect::EMPTY,
            0.0,
            Vec3::new(3.0, 3.0, 0.0),
            TextureChannel::Red,
            BlendMode::Alpha,
            1.0,
        );
        assert!(s.is_empty());
        assert_eq!(s.fractional_offset(), Vec3::ZERO);
    }

    #[test]
    fn secondary_shares_sheet_and_bounds() {
        let bounds = Rect::new(1, 1, 8, 8);
        let s = Sprite::new(sheet(64), bounds, TextureChannel::Red)
            .with_secondary(bounds, TextureChannel::Green);
        let sec = s.secondary().unwrap();
        assert_eq!(sec.channel, TextureChannel::Green);
        assert_eq!(sec.uv, s.uv());
    }
}
