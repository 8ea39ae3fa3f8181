use std::cell::{Ref, RefCell};
use std::fmt;

use image::{Rgba, RgbaImage};

use crate::geometry::Size;
use crate::palette::Palette;
use crate::renderer::backend::{GraphicsBackend, TextureFormat, TextureId};
use crate::sprites::SheetError;
use crate::sprites::loader::SpriteFrameType;
use crate::sprites::sprite::TextureChannel;

// ── SheetType ────────────────────────────────────────────────────────────────

/// What a sheet's texels hold.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SheetType {
    /// Four independent 8-bit palette-index planes, one per channel.
    Indexed,
    /// Two planes per sprite (colour + secondary data), packed as channel
    /// pairs: Red+Green, then Blue+Alpha.
    DualIndexed,
    /// True colour, premultiplied BGRA.
    Bgra,
}

impl SheetType {
    /// How many channels one allocation advances the channel cursor by.
    pub const fn channel_step(self) -> u8 {
        match self {
            SheetType::Indexed => 1,
            SheetType::DualIndexed => 2,
            SheetType::Bgra => 4,
        }
    }

    /// Channel a fresh sheet of this type starts packing into.
    pub const fn first_channel(self) -> TextureChannel {
        match self {
            SheetType::Bgra => TextureChannel::Rgba,
            _ => TextureChannel::Red,
        }
    }

    /// The sheet type a decoded frame of `frame_type` must be packed into.
    pub const fn for_frame_type(frame_type: SpriteFrameType) -> SheetType {
        match frame_type {
            SpriteFrameType::Indexed8 => SheetType::Indexed,
            _ => SheetType::Bgra,
        }
    }
}

// ── Sheet ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SheetState {
    /// CPU copy of the texels (4 bytes each, BGRA order).  `None` when the
    /// buffer has been released after upload or was never opened.
    data: Option<Vec<u8>>,
    texture: Option<TextureId>,
    /// CPU data changed since the last upload.
    dirty: bool,
    /// Drop `data` once the next upload has happened.
    release_on_commit: bool,
}

/// A fixed-size texture that sprites are packed into.
///
/// Writes go to a CPU buffer; the GPU texture is created lazily by
/// [`Sheet::texture`] and receives the buffer whenever it is dirty.  After
/// [`Sheet::release_buffer`] the next upload drops the CPU copy, leaving the
/// GPU texture as the only copy until the buffer is explicitly reopened.
pub struct Sheet {
    kind: SheetType,
    size: Size,
    /// Render-target sheets are drawn into by the GPU and never hold CPU data.
    render_target: bool,
    state: RefCell<SheetState>,
}

impl Sheet {
    /// A buffered sheet; its CPU buffer is allocated on first write.
    pub fn new(kind: SheetType, size: Size) -> Self {
        Self { kind, size, render_target: false, state: RefCell::new(SheetState::default()) }
    }

    /// An unbuffered sheet backed by a GPU render target.
    pub fn render_target(kind: SheetType, size: Size) -> Self {
        Self { kind, size, render_target: true, state: RefCell::new(SheetState::default()) }
    }

    /// An unbuffered sheet wrapping a texture that already exists.
    pub fn from_texture(kind: SheetType, size: Size, texture: TextureId) -> Self {
        let state = SheetState { texture: Some(texture), ..SheetState::default() };
        Self { kind, size, render_target: false, state: RefCell::new(state) }
    }

    pub fn kind(&self) -> SheetType {
        self.kind
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn is_render_target(&self) -> bool {
        self.render_target
    }

    /// True while CPU writes are possible without a GPU readback: either the
    /// buffer is open, or nothing has been uploaded yet.
    pub fn is_buffered(&self) -> bool {
        let state = self.state.borrow();
        state.data.is_some() || (state.texture.is_none() && !self.render_target)
    }

    /// True when the CPU buffer is currently allocated.
    pub fn has_buffer(&self) -> bool {
        self.state.borrow().data.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.state.borrow().dirty
    }

    /// The GPU texture, if [`Sheet::texture`] has created it.
    pub fn texture_id(&self) -> Option<TextureId> {
        self.state.borrow().texture
    }

    /// Open the CPU buffer for writing.
    ///
    /// Free for sheets that were never uploaded.  Fails with
    /// [`SheetError::Sealed`] when the GPU holds the only copy; use
    /// [`Sheet::reopen_buffer`] for that case.
    pub fn create_buffer(&self) -> Result<(), SheetError> {
        if self.render_target {
            return Err(SheetError::Unbuffered);
        }
        let mut state = self.state.borrow_mut();
        if state.data.is_none() {
            if state.texture.is_some() {
                return Err(SheetError::Sealed);
            }
            state.data = Some(vec![0; 4 * self.size.area()]);
        }
        state.release_on_commit = false;
        Ok(())
    }

    /// Reopen the CPU buffer of an uploaded sheet by reading the texture back.
    pub fn reopen_buffer(&self, backend: &mut dyn GraphicsBackend) -> Result<(), SheetError> {
        if self.render_target {
            return Err(SheetError::Unbuffered);
        }
        let mut state = self.state.borrow_mut();
        if state.data.is_none() {
            let data = match state.texture {
                Some(texture) => backend.read_texture(texture),
                None => vec![0; 4 * self.size.area()],
            };
            state.data = Some(data);
        }
        state.release_on_commit = false;
        Ok(())
    }

    /// Read-only view of the CPU buffer, if open.
    pub fn data(&self) -> Option<Ref<'_, [u8]>> {
        Ref::filter_map(self.state.borrow(), |s| s.data.as_deref()).ok()
    }

    /// Run `f` over the CPU buffer, opening it first if needed, and mark the
    /// sheet dirty.
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R, SheetError> {
        self.create_buffer()?;
        let mut state = self.state.borrow_mut();
        state.dirty = true;
        let data = state.data.as_deref_mut().ok_or(SheetError::Unbuffered)?;
        Ok(f(data))
    }

    /// Flag buffered data for upload on the next [`Sheet::texture`] call.
    pub fn commit_buffered_data(&self) -> Result<(), SheetError> {
        if !self.is_buffered() {
            return Err(SheetError::Unbuffered);
        }
        self.state.borrow_mut().dirty = true;
        Ok(())
    }

    /// Seal the sheet: the next upload commits the buffer and frees it.
    pub fn release_buffer(&self) {
        if !self.is_buffered() {
            return;
        }
        let mut state = self.state.borrow_mut();
        state.dirty = true;
        state.release_on_commit = true;
    }

    /// The sheet's GPU texture, creating it and uploading pending CPU data
    /// as needed.
    pub fn texture(&self, backend: &mut dyn GraphicsBackend) -> TextureId {
        let mut state = self.state.borrow_mut();
        let texture = match state.texture {
            Some(texture) => texture,
            None => {
                let texture = if self.render_target {
                    backend.create_render_target(self.size)
                } else {
                    backend.create_texture(self.size, TextureFormat::Bgra8)
                };
                state.texture = Some(texture);
                state.dirty = true;
                texture
            }
        };

        if state.dirty {
            if let Some(data) = state.data.as_deref() {
                backend.upload_texture(texture, data);
            }
            state.dirty = false;
            if state.release_on_commit {
                state.data = None;
                state.release_on_commit = false;
            }
        }
        texture
    }

    /// Free the GPU texture.  CPU data, if any, is kept.
    pub fn dispose(&self, backend: &mut dyn GraphicsBackend) {
        if let Some(texture) = self.state.borrow_mut().texture.take() {
            backend.release_texture(texture);
        }
    }

    /// Render one channel (or the whole BGRA texel) of the CPU buffer as an
    /// RGBA image.  Indexed channels are looked up in `palette`, or shown as
    /// greyscale indices without one.  `None` if the buffer is not open.
    pub fn to_image(&self, channel: TextureChannel, palette: Option<&Palette>) -> Option<RgbaImage> {
        let data = self.data()?;
        let mut img = RgbaImage::new(self.size.width, self.size.height);

        for (i, pixel) in img.pixels_mut().enumerate() {
            let texel = &data[4 * i..4 * i + 4];
            *pixel = match channel.byte_offset() {
                None => Rgba([texel[2], texel[1], texel[0], texel[3]]),
                Some(offset) => {
                    let index = texel[offset];
                    match palette {
                        Some(p) => {
                            let [b, g, r, a] = p.get(index as usize).to_le_bytes();
                            Rgba([r, g, b, a])
                        }
                        None => Rgba([index, index, index, 255]),
                    }
                }
            };
        }
        Some(img)
    }
}

impl fmt::Debug for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Sheet")
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("render_target", &self.render_target)
            .field("buffered", &state.data.is_some())
            .field("texture", &state.texture)
            .field("dirty", &state.dirty)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::{BackendCall, HeadlessBackend};

    #[test]
    fn buffer_is_allocated_on_first_write() {
        let sheet = Sheet::new(SheetType::Indexed, Size::square(4));
        assert!(!sheet.has_buffer());
        assert!(sheet.is_buffered());

        sheet.with_data_mut(|d| d[0] = 7).unwrap();
        assert!(sheet.has_buffer());
        assert!(sheet.is_dirty());
        assert_eq!(sheet.data().unwrap().len(), 64);
    }

    #[test]
    fn texture_is_created_lazily_and_uploaded_once() {
        let mut backend = HeadlessBackend::new();
        let sheet = Sheet::new(SheetType::Bgra, Size::square(2));
        sheet.with_data_mut(|d| d.fill(9)).unwrap();

        let a = sheet.texture(&mut backend);
        let b = sheet.texture(&mut backend);
        assert_eq!(a, b);

        let uploads = backend
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::UploadTexture { .. }))
            .count();
        assert_eq!(uploads, 1);
        assert_eq!(backend.texture_data(a), Some(&[9u8; 16][..]));
    }

    #[test]
    fn release_buffer_drops_cpu_copy_after_upload() {
        let mut backend = HeadlessBackend::new();
        let sheet = Sheet::new(SheetType::Indexed, Size::square(2));
        sheet.create_buffer().unwrap();
        sheet.release_buffer();
        assert!(sheet.has_buffer(), "data is kept until the upload happens");

        sheet.texture(&mut backend);
        assert!(!sheet.has_buffer());
        assert!(!sheet.is_buffered());
        assert!(matches!(sheet.create_buffer(), Err(SheetError::Sealed)));
        assert!(matches!(sheet.commit_buffered_data(), Err(SheetError::Unbuffered)));
    }

    #[test]
    fn reopen_reads_the_texture_back() {
        let mut backend = HeadlessBackend::new();
        let sheet = Sheet::new(SheetType::Indexed, Size::square(1));
        sheet.with_data_mut(|d| d.copy_from_slice(&[1, 2, 3, 4])).unwrap();
        sheet.release_buffer();
        sheet.texture(&mut backend);

        sheet.reopen_buffer(&mut backend).unwrap();
        assert_eq!(&*sheet.data().unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn render_target_is_never_buffered() {
        let mut backend = HeadlessBackend::new();
        let sheet = Sheet::render_target(SheetType::Bgra, Size::square(8));
        assert!(!sheet.is_buffered());
        assert!(matches!(sheet.create_buffer(), Err(SheetError::Unbuffered)));
        sheet.texture(&mut backend);
        assert!(matches!(backend.calls()[0], BackendCall::CreateRenderTarget { .. }));
    }

    #[test]
    fn to_image_decodes_red_channel_through_palette() {
        let sheet = Sheet::new(SheetType::Indexed, Size::new(1, 1));
        // Red is byte 2 of BGRA.
        sheet.with_data_mut(|d| d[2] = 1).unwrap();

        let mut colors = [0u32; 256];
        colors[1] = 0xFF10_2030;
        let palette = Palette::new(colors);

        let img = sheet.to_image(TextureChannel::Red, Some(&palette)).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgba([0x10, 0x20, 0x30, 0xFF]));

        let grey = sheet.to_image(TextureChannel::Green, None).unwrap();
        assert_eq!(grey.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }
}
