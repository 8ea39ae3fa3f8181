//! Decoding sprite files into frames.
//!
//! A [`SpriteLoader`] recognises one file format.  The cache tries each
//! registered loader in turn and keeps the first result, so loaders must
//! reject data they do not understand by returning `None` rather than
//! guessing.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use glam::Vec2;

use crate::geometry::Size;

// ── SpriteFrameType ──────────────────────────────────────────────────────────

/// Pixel layout of decoded frame data.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpriteFrameType {
    /// One byte per pixel: a palette index.
    Indexed8,
    Bgra32,
    Rgba32,
    Bgr24,
    Rgb24,
}

impl SpriteFrameType {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Indexed8 => 1,
            Self::Bgra32 | Self::Rgba32 => 4,
            Self::Bgr24 | Self::Rgb24 => 3,
        }
    }
}

// ── SpriteFrame ──────────────────────────────────────────────────────────────

/// One decoded image of a sprite file.
pub trait SpriteFrame {
    fn frame_type(&self) -> SpriteFrameType;

    /// Size of the stored pixel data.
    fn size(&self) -> Size;

    /// Size of the logical frame the data sits in.  Formats that trim empty
    /// borders report the untrimmed size here.
    fn frame_size(&self) -> Size {
        self.size()
    }

    /// Offset of the stored data's centre from the frame centre.
    fn offset(&self) -> Vec2;

    /// Row-major pixel data, `size.area() * bytes_per_pixel` bytes.
    fn data(&self) -> &[u8];

    /// True if `data` is already premultiplied by alpha.
    fn premultiplied(&self) -> bool {
        false
    }
}

/// Plain owned frame, suitable for most loaders.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub frame_type: SpriteFrameType,
    pub size: Size,
    pub frame_size: Size,
    pub offset: Vec2,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

impl Frame {
    pub fn new(frame_type: SpriteFrameType, size: Size, data: Vec<u8>) -> Self {
        Self {
            frame_type,
            size,
            frame_size: size,
            offset: Vec2::ZERO,
            data,
            premultiplied: false,
        }
    }

    pub fn indexed(size: Size, data: Vec<u8>) -> Self {
        Self::new(SpriteFrameType::Indexed8, size, data)
    }

    pub fn with_offset(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_frame_size(mut self, frame_size: Size) -> Self {
        self.frame_size = frame_size;
        self
    }
}

impl SpriteFrame for Frame {
    fn frame_type(&self) -> SpriteFrameType {
        self.frame_type
    }

    fn size(&self) -> Size {
        self.size
    }

    fn frame_size(&self) -> Size {
        self.frame_size
    }

    fn offset(&self) -> Vec2 {
        self.offset
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn premultiplied(&self) -> bool {
        self.premultiplied
    }
}

// ── ParsedSprite ─────────────────────────────────────────────────────────────

/// Free-form key/value metadata a loader found alongside the frames.
pub type SpriteMetadata = HashMap<String, String>;

/// Everything a loader extracted from one file.
#[derive(Clone, Default)]
pub struct ParsedSprite {
    pub frames: Vec<Rc<dyn SpriteFrame>>,
    pub metadata: SpriteMetadata,
}

impl fmt::Debug for ParsedSprite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedSprite")
            .field("frames", &self.frames.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

pub trait SpriteLoader {
    /// Decode `data` if this loader understands its format.
    fn try_parse_sprite(&self, data: &[u8], filename: &str) -> Option<ParsedSprite>;
}

// ── PngSpriteLoader ──────────────────────────────────────────────────────────

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

/// Loads a PNG as true-colour frames: the whole image, or equal tiles when
/// built with [`PngSpriteLoader::with_frame_size`].
#[derive(Clone, Debug, Default)]
pub struct PngSpriteLoader {
    frame_size: Option<Size>,
}

impl PngSpriteLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut every image into `frame_size` tiles, left-to-right, top-to-bottom.
    pub fn with_frame_size(frame_size: Size) -> Self {
        Self { frame_size: Some(frame_size) }
    }
}

impl SpriteLoader for PngSpriteLoader {
    fn try_parse_sprite(&self, data: &[u8], _filename: &str) -> Option<ParsedSprite> {
        if !data.starts_with(&PNG_SIGNATURE) {
            return None;
        }

        let img = image::load_from_memory_with_format(data, image::ImageFormat::Png)
            .ok()?
            .to_rgba8();
        let (width, height) = img.dimensions();
        let tile = self.frame_size.unwrap_or(Size::new(width, height));

        let mut metadata = SpriteMetadata::new();
        metadata.insert("width".into(), width.to_string());
        metadata.insert("height".into(), height.to_string());

        if tile.is_empty() || tile.width > width || tile.height > height {
            return Some(ParsedSprite { frames: Vec::new(), metadata });
        }

        let mut frames: Vec<Rc<dyn SpriteFrame>> = Vec::new();
        for ty in 0..height / tile.height {
            for tx in 0..width / tile.width {
                let view = image::imageops::crop_imm(
                    &img,
                    tx * tile.width,
                    ty * tile.height,
                    tile.width,
                    tile.height,
                );
                let pixels = view.to_image().into_raw();
                frames.push(Rc::new(Frame::new(SpriteFrameType::Rgba32, tile, pixels)));
            }
        }

        Some(ParsedSprite { frames, metadata })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([x as u8, y as u8, 0, 255])
        });
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn non_png_is_rejected() {
        assert!(PngSpriteLoader::new().try_parse_sprite(b"SHP\0....", "a.shp").is_none());
    }

    #[test]
    fn png_becomes_one_rgba_frame() {
        let parsed = PngSpriteLoader::new().try_parse_sprite(&png_bytes(3, 2), "a.png").unwrap();
        assert_eq!(parsed.frames.len(), 1);

        let frame = &parsed.frames[0];
        assert_eq!(frame.frame_type(), SpriteFrameType::Rgba32);
        assert_eq!(frame.size(), Size::new(3, 2));
        assert_eq!(frame.data().len(), 24);
        // pixel (2, 1)
        assert_eq!(&frame.data()[20..24], &[2, 1, 0, 255]);
        assert_eq!(parsed.metadata.get("width").map(String::as_str), Some("3"));
    }

    #[test]
    fn png_can_be_cut_into_tiles() {
        let loader = PngSpriteLoader::with_frame_size(Size::new(2, 2));
        let parsed = loader.try_parse_sprite(&png_bytes(4, 4), "strip.png").unwrap();
        assert_eq!(parsed.frames.len(), 4);
        // second tile starts at x = 2
        assert_eq!(&parsed.frames[1].data()[0..4], &[2, 0, 0, 255]);
        // third tile starts at y = 2
        assert_eq!(&parsed.frames[2].data()[0..4], &[0, 2, 0, 255]);
    }

    #[test]
    fn bytes_per_pixel() {
        assert_eq!(SpriteFrameType::Indexed8.bytes_per_pixel(), 1);
        assert_eq!(SpriteFrameType::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(SpriteFrameType::Bgra32.bytes_per_pixel(), 4);
    }
}
