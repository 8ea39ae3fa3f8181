//! Writing decoded frame pixels into a sheet's BGRA buffer.

use crate::geometry::{Rect, Size};
use crate::sprites::SheetError;
use crate::sprites::loader::SpriteFrameType;
use crate::sprites::sprite::TextureChannel;

/// Premultiply one colour component by alpha with rounding.
#[inline]
fn premultiply(component: u8, alpha: u8) -> u8 {
    ((component as u32 * alpha as u32 + 127) / 255) as u8
}

fn check_len(frame_type: SpriteFrameType, bounds: Rect, src: &[u8]) -> Result<(), SheetError> {
    let expected = bounds.size().area() * frame_type.bytes_per_pixel();
    if src.len() < expected {
        return Err(SheetError::DataLength { expected, actual: src.len() });
    }
    Ok(())
}

/// Copy 8-bit palette indices into one channel of `dest`, leaving the other
/// three channels of each texel untouched.
pub fn copy_indexed(
    dest: &mut [u8],
    dest_size: Size,
    bounds: Rect,
    channel: TextureChannel,
    frame_type: SpriteFrameType,
    src: &[u8],
) -> Result<(), SheetError> {
    if frame_type != SpriteFrameType::Indexed8 {
        return Err(SheetError::FrameTypeMismatch { frame_type, channel });
    }
    let offset = channel
        .byte_offset()
        .ok_or(SheetError::FrameTypeMismatch { frame_type, channel })?;
    check_len(frame_type, bounds, src)?;
    if bounds.is_empty() {
        return Ok(());
    }

    let stride = 4 * dest_size.width as usize;
    let width = bounds.width as usize;
    for (row, src_row) in src.chunks_exact(width).take(bounds.height as usize).enumerate() {
        let start = (bounds.y as usize + row) * stride + 4 * bounds.x as usize + offset;
        for (i, &index) in src_row.iter().enumerate() {
            dest[start + 4 * i] = index;
        }
    }
    Ok(())
}

/// Convert true-colour pixels to premultiplied BGRA and write them into
/// `dest`.  Already-premultiplied input is only reordered.
pub fn copy_rgba(
    dest: &mut [u8],
    dest_size: Size,
    bounds: Rect,
    frame_type: SpriteFrameType,
    src: &[u8],
    premultiplied: bool,
) -> Result<(), SheetError> {
    if frame_type == SpriteFrameType::Indexed8 {
        return Err(SheetError::FrameTypeMismatch { frame_type, channel: TextureChannel::Rgba });
    }
    check_len(frame_type, bounds, src)?;

    let bpp = frame_type.bytes_per_pixel();
    let stride = 4 * dest_size.width as usize;
    let width = bounds.width as usize;

    for row in 0..bounds.height as usize {
        let src_row = &src[row * width * bpp..(row + 1) * width * bpp];
        let start = (bounds.y as usize + row) * stride + 4 * bounds.x as usize;
        let dest_row = &mut dest[start..start + 4 * width];

        for (px, out) in src_row.chunks_exact(bpp).zip(dest_row.chunks_exact_mut(4)) {
            let (r, g, b, a) = match frame_type {
                SpriteFrameType::Bgra32 => (px[2], px[1], px[0], px[3]),
                SpriteFrameType::Rgba32 => (px[0], px[1], px[2], px[3]),
                SpriteFrameType::Bgr24 => (px[2], px[1], px[0], 255),
                SpriteFrameType::Rgb24 => (px[0], px[1], px[2], 255),
                SpriteFrameType::Indexed8 => unreachable!(),
            };
            if premultiplied || a == 255 {
                out.copy_from_slice(&[b, g, r, a]);
            } else {
                out.copy_from_slice(&[
                    premultiply(b, a),
                    premultiply(g, a),
                    premultiply(r, a),
                    a,
                ]);
            }
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_copy_touches_only_its_channel() {
        let size = Size::new(4, 2);
        let mut dest = vec![0xAAu8; size.area() * 4];
        copy_indexed(
            &mut dest,
            size,
            Rect::new(1, 1, 2, 1),
            TextureChannel::Green,
            SpriteFrameType::Indexed8,
            &[5, 6],
        )
        .unwrap();

        // texel (1, 1) starts at byte 4 * (4 + 1) = 20; green is byte 1.
        assert_eq!(&dest[20..24], &[0xAA, 5, 0xAA, 0xAA]);
        assert_eq!(&dest[24..28], &[0xAA, 6, 0xAA, 0xAA]);
        assert_eq!(dest[..20].iter().filter(|&&b| b != 0xAA).count(), 0);
    }

    #[test]
    fn indexed_copy_rejects_true_colour() {
        let mut dest = vec![0; 16];
        let err = copy_indexed(
            &mut dest,
            Size::square(2),
            Rect::new(0, 0, 1, 1),
            TextureChannel::Red,
            SpriteFrameType::Rgba32,
            &[0; 4],
        )
        .unwrap_err();
        assert!(matches!(err, SheetError::FrameTypeMismatch { .. }));
    }

    #[test]
    fn rgba_copy_reorders_and_premultiplies() {
        let mut dest = vec![0; 8];
        copy_rgba(
            &mut dest,
            Size::new(2, 1),
            Rect::new(0, 0, 2, 1),
            SpriteFrameType::Rgba32,
            &[200, 100, 50, 255, 200, 100, 50, 128],
            false,
        )
        .unwrap();
        assert_eq!(&dest[0..4], &[50, 100, 200, 255]);
        // (c * 128 + 127) / 255
        assert_eq!(&dest[4..8], &[25, 50, 100, 128]);
    }

    #[test]
    fn rgb24_gets_opaque_alpha() {
        let mut dest = vec![0; 4];
        copy_rgba(
            &mut dest,
            Size::new(1, 1),
            Rect::new(0, 0, 1, 1),
            SpriteFrameType::Rgb24,
            &[1, 2, 3],
            false,
        )
        .unwrap();
        assert_eq!(dest, vec![3, 2, 1, 255]);
    }

    #[test]
    fn short_data_is_an_error() {
        let mut dest = vec![0; 16];
        let err = copy_rgba(
            &mut dest,
            Size::square(2),
            Rect::new(0, 0, 2, 2),
            SpriteFrameType::Bgra32,
            &[0; 8],
            true,
        )
        .unwrap_err();
        assert!(matches!(err, SheetError::DataLength { expected: 16, actual: 8 }));
    }
}
