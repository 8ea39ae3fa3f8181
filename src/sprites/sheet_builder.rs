use std::rc::Rc;

use glam::Vec3;

use crate::geometry::{Rect, Size};
use crate::sprites::copy::{copy_indexed, copy_rgba};
use crate::sprites::loader::{SpriteFrame, SpriteFrameType};
use crate::sprites::sheet::{Sheet, SheetType};
use crate::sprites::sprite::{BlendMode, Sprite, TextureChannel};
use crate::sprites::SheetError;

// ── SheetAllocator ───────────────────────────────────────────────────────────

/// Where a builder gets its next sheet from.
pub trait SheetAllocator {
    fn allocate_sheet(&mut self, kind: SheetType) -> Rc<Sheet>;
}

/// Fresh buffered sheets of one fixed size.
#[derive(Clone, Copy, Debug)]
pub struct FixedSizeAllocator {
    pub size: Size,
}

impl SheetAllocator for FixedSizeAllocator {
    fn allocate_sheet(&mut self, kind: SheetType) -> Rc<Sheet> {
        Rc::new(Sheet::new(kind, self.size))
    }
}

// ── Shelf packing ────────────────────────────────────────────────────────────

/// Packs rectangles into sheets row by row.
///
/// Rectangles are placed left to right; a rectangle that would cross the
/// right edge starts a new row below the tallest rectangle of the current
/// row.  One that would cross the bottom edge moves the cursor to the next
/// free channel of the sheet (Red → Green → Blue → Alpha for indexed data),
/// or to a brand new sheet once the channels are used up.
///
/// Every rectangle is preceded by `margin` empty pixels on its left and top.
pub struct SheetBuilder {
    kind: SheetType,
    allocator: Box<dyn SheetAllocator>,
    margin: u32,
    sheets: Vec<Rc<Sheet>>,
    current: Rc<Sheet>,
    channel: TextureChannel,
    cursor_x: u32,
    cursor_y: u32,
    row_height: u32,
}

impl SheetBuilder {
    pub fn new(kind: SheetType, size: Size, margin: u32) -> Self {
        Self::with_allocator(kind, Box::new(FixedSizeAllocator { size }), margin)
    }

    pub fn with_allocator(kind: SheetType, mut allocator: Box<dyn SheetAllocator>, margin: u32) -> Self {
        let current = allocator.allocate_sheet(kind);
        Self {
            kind,
            allocator,
            margin,
            sheets: vec![current.clone()],
            current,
            channel: kind.first_channel(),
            cursor_x: 0,
            cursor_y: 0,
            row_height: 0,
        }
    }

    pub fn kind(&self) -> SheetType {
        self.kind
    }

    pub fn margin(&self) -> u32 {
        self.margin
    }

    /// The sheet new rectangles are currently packed into.
    pub fn current(&self) -> &Rc<Sheet> {
        &self.current
    }

    pub fn current_channel(&self) -> TextureChannel {
        self.channel
    }

    /// Every sheet this builder has produced, oldest first.
    pub fn sheets(&self) -> &[Rc<Sheet>] {
        &self.sheets
    }

    /// Reserve a `size` rectangle and return the sprite covering it.
    pub fn allocate(&mut self, size: Size, z_ramp: f32, offset: Vec3) -> Result<Sprite, SheetError> {
        let sheet_size = self.current.size();
        if size.width + self.margin > sheet_size.width || size.height + self.margin > sheet_size.height {
            return Err(SheetError::Overflow { size, margin: self.margin, sheet: sheet_size });
        }

        if size.width + self.cursor_x + self.margin > sheet_size.width {
            self.cursor_x = 0;
            self.cursor_y += self.row_height + self.margin;
            self.row_height = 0;
        }

        self.row_height = self.row_height.max(size.height);

        if size.height + self.cursor_y + self.margin > sheet_size.height {
            match self.channel.next(self.kind.channel_step()) {
                Some(next) => self.channel = next,
                None => self.begin_new_sheet(),
            }
            self.row_height = size.height;
            self.cursor_x = 0;
            self.cursor_y = 0;
        }

        let bounds = Rect::new(
            self.cursor_x + self.margin,
            self.cursor_y + self.margin,
            size.width,
            size.height,
        );
        self.cursor_x += size.width + self.margin;

        if self.current.is_buffered() {
            self.current.commit_buffered_data()?;
        }

        Ok(self.sprite_at(bounds, z_ramp, offset))
    }

    /// Pack a decoded frame and copy its pixels into the sheet.
    pub fn add(&mut self, frame: &dyn SpriteFrame) -> Result<Sprite, SheetError> {
        let offset = Vec3::new(frame.offset().x, frame.offset().y, 0.0);
        self.add_data(
            frame.data(),
            frame.frame_type(),
            frame.size(),
            0.0,
            offset,
            frame.premultiplied(),
        )
    }

    pub fn add_data(
        &mut self,
        data: &[u8],
        frame_type: SpriteFrameType,
        size: Size,
        z_ramp: f32,
        offset: Vec3,
        premultiplied: bool,
    ) -> Result<Sprite, SheetError> {
        // Empty frames take no space; they only need a sprite to hold the offset.
        if size.is_empty() {
            return Ok(self.sprite_at(Rect::EMPTY, z_ramp, offset));
        }

        let expects_indexed = self.kind != SheetType::Bgra;
        if expects_indexed != (frame_type == SpriteFrameType::Indexed8) {
            return Err(SheetError::FrameTypeMismatch { frame_type, channel: self.channel });
        }

        self.ensure_writable()?;
        let sprite = self.allocate(size, z_ramp, offset)?;
        let sheet_size = sprite.sheet().size();
        let bounds = sprite.bounds();
        let channel = sprite.channel();

        sprite.sheet().with_data_mut(|dest| match channel {
            TextureChannel::Rgba => copy_rgba(dest, sheet_size, bounds, frame_type, data, premultiplied),
            _ => copy_indexed(dest, sheet_size, bounds, channel, frame_type, data),
        })??;

        Ok(sprite)
    }

    /// Pack a dual-indexed frame: `primary` goes to the sprite's channel and
    /// `secondary` to the channel after it.
    pub fn add_dual(
        &mut self,
        primary: &[u8],
        secondary: &[u8],
        size: Size,
        z_ramp: f32,
        offset: Vec3,
    ) -> Result<Sprite, SheetError> {
        let sprite = self.add_data(primary, SpriteFrameType::Indexed8, size, z_ramp, offset, false)?;
        if let Some(sec) = sprite.secondary() {
            let (sheet_size, bounds, channel) = (sprite.sheet().size(), sec.bounds, sec.channel);
            sprite.sheet().with_data_mut(|dest| {
                copy_indexed(dest, sheet_size, bounds, channel, SpriteFrameType::Indexed8, secondary)
            })??;
        }
        Ok(sprite)
    }

    /// Open the current sheet's CPU buffer for a batch of writes.  A sheet
    /// whose data has already been sealed on the GPU is retired and packing
    /// continues on a fresh one.
    pub fn open_buffer(&mut self) -> Result<(), SheetError> {
        match self.current.create_buffer() {
            Err(SheetError::Sealed) => {
                self.begin_new_sheet();
                self.current.create_buffer()
            }
            other => other,
        }
    }

    /// Seal the current sheet's buffer; it is freed after the next upload.
    pub fn release_buffer(&self) {
        self.current.release_buffer();
    }

    /// Retire the current sheet and continue packing on a new one.
    pub fn begin_new_sheet(&mut self) {
        self.current.release_buffer();
        self.current = self.allocator.allocate_sheet(self.kind);
        self.sheets.push(self.current.clone());
        self.channel = self.kind.first_channel();
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.row_height = 0;
    }

    fn ensure_writable(&mut self) -> Result<(), SheetError> {
        if !self.current.is_buffered() {
            self.open_buffer()?;
        }
        Ok(())
    }

    fn sprite_at(&self, bounds: Rect, z_ramp: f32, offset: Vec3) -> Sprite {
        let sprite = Sprite::with_params(
            self.current.clone(),
            bounds,
            z_ramp,
            offset,
            self.channel,
            BlendMode::Alpha,
            1.0,
        );
        match self.kind {
            SheetType::DualIndexed => match TextureChannel::from_index(self.channel as u8 + 1) {
                Some(secondary) => sprite.with_secondary(bounds, secondary),
                None => sprite,
            },
            _ => sprite,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
