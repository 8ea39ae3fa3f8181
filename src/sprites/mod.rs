//! Sprite packing and loading.
//!
//! Decoded frames are packed into [`Sheet`]s by a [`SheetBuilder`]; the
//! [`SpriteCache`] batches file loads so each file is decoded once and each
//! `(file, frame, premultiplied)` sprite is packed once.

pub mod cache;
pub mod copy;
pub mod loader;
pub mod sheet;
pub mod sheet_builder;
pub mod sheet_pool;
pub mod sprite;

use thiserror::Error;

use crate::geometry::Size;

pub use cache::{ReservationToken, SourceLocation, SpriteCache, SpriteCacheError};
pub use loader::{Frame, ParsedSprite, PngSpriteLoader, SpriteFrame, SpriteFrameType, SpriteLoader};
pub use sheet::{Sheet, SheetType};
pub use sheet_builder::{FixedSizeAllocator, SheetAllocator, SheetBuilder};
pub use sheet_pool::{PooledSheetAllocator, SheetPool};
pub use sprite::{BlendMode, SecondaryData, Sprite, TextureChannel, UvRect};

// ── SheetError ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SheetError {
    /// The rectangle cannot fit even an empty sheet.  Callers that rotate
    /// sheets on overflow match on this variant specifically.
    #[error("a {size:?} rectangle with margin {margin} does not fit a {sheet:?} sheet")]
    Overflow { size: Size, margin: u32, sheet: Size },

    #[error("sheet has no CPU buffer to write to")]
    Unbuffered,

    #[error("sheet data only exists on the GPU and must be read back before writing")]
    Sealed,

    #[error("{frame_type:?} data cannot be written to the {channel:?} channel")]
    FrameTypeMismatch { frame_type: SpriteFrameType, channel: TextureChannel },

    #[error("frame data is {actual} bytes but {expected} were expected")]
    DataLength { expected: usize, actual: usize },
}

impl SheetError {
    pub fn is_overflow(&self) -> bool {
        matches!(self, SheetError::Overflow { .. })
    }
}
