//! Two-phase sprite loading.
//!
//! Callers first *reserve* the frames they need and receive an opaque
//! [`ReservationToken`].  [`SpriteCache::load_reservations`] then opens each
//! referenced file once, packs every requested frame (shortest first, so rows
//! of similar height pack tightly) and stores the results.  Each token is
//! finally *resolved* exactly once.
//!
//! A bad file does not abort the load: every token that asked for a missing
//! or undecodable file, or for a frame the file does not have, fails on
//! resolve while the rest resolve normally.  Missing files are also listed
//! all at once through [`SpriteCache::missing_files`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Read;
use std::rc::Rc;

use thiserror::Error;

use crate::config::RenderConfig;
use crate::fs::FileSystem;
use crate::geometry::Size;
use crate::sprites::SheetError;
use crate::sprites::loader::{SpriteFrame, SpriteFrameType, SpriteLoader};
use crate::sprites::sheet::SheetType;
use crate::sprites::sheet_builder::SheetBuilder;
use crate::sprites::sprite::Sprite;

// ── Tokens and locations ─────────────────────────────────────────────────────

/// Handle returned by a reservation.  Tokens increase monotonically from 1
/// and are never reused by the same cache.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReservationToken(u32);

impl ReservationToken {
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Where a reservation was requested from, for error messages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self { file: file.into(), line }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SpriteCacheError {
    #[error("{location}: {filename} not found")]
    FileNotFound { filename: String, location: SourceLocation },

    #[error("{location}: {filename} is not a recognised sprite format")]
    UnknownFormat { filename: String, location: SourceLocation },

    #[error("{location}: {filename} has {count} frames, frame {index} requested")]
    FrameOutOfRange { filename: String, index: usize, count: usize, location: SourceLocation },

    #[error("failed to read {filename}: {source}")]
    Io { filename: String, source: std::io::Error },

    #[error("reservation {0:?} is unknown or was already resolved")]
    UnknownToken(ReservationToken),

    #[error("reservation {0:?} has not been loaded yet")]
    NotLoaded(ReservationToken),

    #[error("reservation {token:?} holds {held}, not {requested}")]
    WrongKind { token: ReservationToken, held: &'static str, requested: &'static str },

    #[error(transparent)]
    Sheet(#[from] SheetError),
}

// ── Reservations ─────────────────────────────────────────────────────────────

/// Rewrites a frame before it is packed: `(frame, index, frame_count)`.
/// Adjusted sprites are never shared between reservations.
pub type FrameAdjust = Rc<dyn Fn(Rc<dyn SpriteFrame>, usize, usize) -> Rc<dyn SpriteFrame>>;

enum Request {
    Sprites { premultiplied: bool, adjust: Option<FrameAdjust> },
    Frames,
}

struct Reservation {
    frames: Option<Vec<usize>>,
    location: SourceLocation,
    request: Request,
}

enum Resolved {
    Sprites(Vec<Option<Rc<Sprite>>>),
    Frames(Vec<Option<Rc<dyn SpriteFrame>>>),
    /// Returned once from resolve instead of any output.
    Failed(SpriteCacheError),
}

impl Resolved {
    fn describe(&self) -> &'static str {
        match self {
            Resolved::Sprites(_) => "sprites",
            Resolved::Frames(_) => "frames",
            Resolved::Failed(_) => "a failed load",
        }
    }
}

/// Why a file produced no frames.  Turned into one error per token.
enum DecodeFailure {
    NotFound,
    UnknownFormat,
    Io(std::io::ErrorKind),
}

impl DecodeFailure {
    fn error(&self, filename: &str, location: &SourceLocation) -> SpriteCacheError {
        let filename = filename.to_string();
        let location = location.clone();
        match self {
            DecodeFailure::NotFound => SpriteCacheError::FileNotFound { filename, location },
            DecodeFailure::UnknownFormat => SpriteCacheError::UnknownFormat { filename, location },
            DecodeFailure::Io(kind) => SpriteCacheError::Io { filename, source: (*kind).into() },
        }
    }
}

/// A frame waiting to be packed.
struct Pending {
    filename: Rc<str>,
    index: usize,
    premultiplied: bool,
    adjusted: bool,
    frame: Rc<dyn SpriteFrame>,
    token: ReservationToken,
}

/// Per-token output of a sprite resolve: one slot per frame of the file.
pub type SpriteSlots = Vec<Option<Rc<Sprite>>>;

/// Per-token output of a frame resolve.
pub type FrameSlots = Vec<Option<Rc<dyn SpriteFrame>>>;

// ── SpriteCache ──────────────────────────────────────────────────────────────

pub struct SpriteCache {
    file_system: Box<dyn FileSystem>,
    loaders: Vec<Box<dyn SpriteLoader>>,
    indexed: SheetBuilder,
    bgra: SheetBuilder,

    next_token: u32,
    reservations: HashMap<ReservationToken, Reservation>,
    /// Filenames in first-reserved order with the tokens that want them.
    by_filename: Vec<(Rc<str>, Vec<ReservationToken>)>,
    filename_index: HashMap<Rc<str>, usize>,

    resolved: HashMap<ReservationToken, Resolved>,
    missing: Vec<(String, SourceLocation)>,
}

impl SpriteCache {
    pub fn new(
        file_system: Box<dyn FileSystem>,
        loaders: Vec<Box<dyn SpriteLoader>>,
        config: &RenderConfig,
    ) -> Self {
        let indexed = SheetBuilder::new(
            SheetType::Indexed,
            Size::square(config.indexed_sheet_size),
            config.indexed_sheet_margin,
        );
        let bgra = SheetBuilder::new(
            SheetType::Bgra,
            Size::square(config.sheet_size),
            config.bgra_sheet_margin,
        );
        Self::with_builders(file_system, loaders, indexed, bgra)
    }

    pub fn with_builders(
        file_system: Box<dyn FileSystem>,
        loaders: Vec<Box<dyn SpriteLoader>>,
        indexed: SheetBuilder,
        bgra: SheetBuilder,
    ) -> Self {
        Self {
            file_system,
            loaders,
            indexed,
            bgra,
            next_token: 1,
            reservations: HashMap::new(),
            by_filename: Vec::new(),
            filename_index: HashMap::new(),
            resolved: HashMap::new(),
            missing: Vec::new(),
        }
    }

    /// The builder packing sheets of `kind`, if this cache has one.
    pub fn sheet_builder(&self, kind: SheetType) -> Option<&SheetBuilder> {
        match kind {
            SheetType::Indexed => Some(&self.indexed),
            SheetType::Bgra => Some(&self.bgra),
            SheetType::DualIndexed => None,
        }
    }

    pub fn sheet_builder_mut(&mut self, kind: SheetType) -> Option<&mut SheetBuilder> {
        match kind {
            SheetType::Indexed => Some(&mut self.indexed),
            SheetType::Bgra => Some(&mut self.bgra),
            SheetType::DualIndexed => None,
        }
    }

    fn builder_for(&mut self, frame_type: SpriteFrameType) -> &mut SheetBuilder {
        match SheetType::for_frame_type(frame_type) {
            SheetType::Indexed => &mut self.indexed,
            _ => &mut self.bgra,
        }
    }

    // ── Reserve ──────────────────────────────────────────────────────────────

    /// Reserve packed sprites for `frames` of `filename` (every frame when
    /// `None`).
    pub fn reserve_sprites(
        &mut self,
        filename: &str,
        frames: Option<&[usize]>,
        location: SourceLocation,
        premultiplied: bool,
    ) -> ReservationToken {
        let request = Request::Sprites { premultiplied, adjust: None };
        self.reserve(filename, frames, location, request)
    }

    /// Like [`SpriteCache::reserve_sprites`], but each frame goes through
    /// `adjust` before packing.
    pub fn reserve_sprites_adjusted(
        &mut self,
        filename: &str,
        frames: Option<&[usize]>,
        location: SourceLocation,
        premultiplied: bool,
        adjust: FrameAdjust,
    ) -> ReservationToken {
        let request = Request::Sprites { premultiplied, adjust: Some(adjust) };
        self.reserve(filename, frames, location, request)
    }

    /// Reserve the decoded frames of `filename` without packing them.
    pub fn reserve_frames(
        &mut self,
        filename: &str,
        frames: Option<&[usize]>,
        location: SourceLocation,
    ) -> ReservationToken {
        self.reserve(filename, frames, location, Request::Frames)
    }

    fn reserve(
        &mut self,
        filename: &str,
        frames: Option<&[usize]>,
        location: SourceLocation,
        request: Request,
    ) -> ReservationToken {
        let token = ReservationToken(self.next_token);
        self.next_token += 1;

        self.reservations.insert(
            token,
            Reservation { frames: frames.map(<[usize]>::to_vec), location, request },
        );

        match self.filename_index.get(filename) {
            Some(&i) => self.by_filename[i].1.push(token),
            None => {
                let name: Rc<str> = Rc::from(filename);
                self.filename_index.insert(name.clone(), self.by_filename.len());
                self.by_filename.push((name, vec![token]));
            }
        }
        token
    }

    /// Number of reservations waiting for [`SpriteCache::load_reservations`].
    pub fn pending_reservations(&self) -> usize {
        self.reservations.len()
    }

    // ── Load ─────────────────────────────────────────────────────────────────

    /// Decode and pack everything reserved so far.
    ///
    /// All reservation bookkeeping is cleared afterwards, even on error.
    /// Files that are missing or cannot be decoded, and out-of-range frame
    /// requests, are not errors here: they fail only the tokens concerned,
    /// on resolve.  Only sheet errors abort the load.
    pub fn load_reservations(&mut self) -> Result<(), SpriteCacheError> {
        self.indexed.open_buffer()?;
        self.bgra.open_buffer()?;

        let result = self.load_pending();

        self.reservations.clear();
        self.by_filename.clear();
        self.filename_index.clear();

        self.indexed.release_buffer();
        self.bgra.release_buffer();
        result
    }

    fn load_pending(&mut self) -> Result<(), SpriteCacheError> {
        let mut pending: Vec<Pending> = Vec::new();
        let mut sprite_slots: HashMap<ReservationToken, SpriteSlots> = HashMap::new();
        let by_filename = std::mem::take(&mut self.by_filename);

        for (filename, tokens) in &by_filename {
            let loaded = self.decode(filename);
            if let Err(failure) = &loaded {
                if matches!(failure, DecodeFailure::NotFound) {
                    if let Some(first) = tokens.iter().find_map(|t| self.reservations.get(t)) {
                        self.missing.push((filename.to_string(), first.location.clone()));
                    }
                }
            }

            for &token in tokens {
                let Some(reservation) = self.reservations.get(&token) else { continue };

                let frames = match &loaded {
                    Ok(frames) => frames,
                    Err(failure) => {
                        let error = failure.error(filename, &reservation.location);
                        self.resolved.insert(token, Resolved::Failed(error));
                        continue;
                    }
                };

                let count = frames.len();
                let wanted: Vec<usize> = match &reservation.frames {
                    Some(list) => list.clone(),
                    None => (0..count).collect(),
                };
                if let Some(&index) = wanted.iter().find(|&&i| i >= count) {
                    let error = SpriteCacheError::FrameOutOfRange {
                        filename: filename.to_string(),
                        index,
                        count,
                        location: reservation.location.clone(),
                    };
                    self.resolved.insert(token, Resolved::Failed(error));
                    continue;
                }

                match &reservation.request {
                    Request::Frames => {
                        let mut slots: FrameSlots = vec![None; count];
                        for i in wanted {
                            slots[i] = Some(frames[i].clone());
                        }
                        self.resolved.insert(token, Resolved::Frames(slots));
                    }
                    Request::Sprites { premultiplied, adjust } => {
                        sprite_slots.insert(token, vec![None; count]);
                        for i in wanted {
                            let frame = match adjust {
                                Some(f) => f(frames[i].clone(), i, count),
                                None => frames[i].clone(),
                            };
                            pending.push(Pending {
                                filename: filename.clone(),
                                index: i,
                                premultiplied: *premultiplied,
                                adjusted: adjust.is_some(),
                                frame,
                                token,
                            });
                        }
                    }
                }
            }
        }

        // Rows are as tall as their tallest sprite, so packing similar
        // heights together wastes less space.
        pending.sort_by_key(|p| p.frame.size().height);

        let mut packed: HashMap<(Rc<str>, usize, bool), Rc<Sprite>> = HashMap::new();
        for p in pending {
            let key = (p.filename.clone(), p.index, p.premultiplied);
            let shared = if p.adjusted { None } else { packed.get(&key).cloned() };
            let sprite = match shared {
                Some(sprite) => sprite,
                None => {
                    let sprite = Rc::new(self.builder_for(p.frame.frame_type()).add_data(
                        p.frame.data(),
                        p.frame.frame_type(),
                        p.frame.size(),
                        0.0,
                        glam::Vec3::new(p.frame.offset().x, p.frame.offset().y, 0.0),
                        p.premultiplied || p.frame.premultiplied(),
                    )?);
                    if !p.adjusted {
                        packed.insert(key, sprite.clone());
                    }
                    sprite
                }
            };
            if let Some(slots) = sprite_slots.get_mut(&p.token) {
                slots[p.index] = Some(sprite);
            }
        }

        for (token, slots) in sprite_slots {
            self.resolved.insert(token, Resolved::Sprites(slots));
        }
        Ok(())
    }

    /// Open `filename` and hand it to the first loader that accepts it.
    fn decode(&self, filename: &str) -> Result<Vec<Rc<dyn SpriteFrame>>, DecodeFailure> {
        let mut stream = self.file_system.try_open(filename).ok_or(DecodeFailure::NotFound)?;

        let mut data = Vec::new();
        stream
            .read_to_end(&mut data)
            .map_err(|e| DecodeFailure::Io(e.kind()))?;

        self.loaders
            .iter()
            .find_map(|loader| loader.try_parse_sprite(&data, filename))
            .map(|parsed| parsed.frames)
            .ok_or(DecodeFailure::UnknownFormat)
    }

    // ── Resolve ──────────────────────────────────────────────────────────────

    fn take(&mut self, token: ReservationToken) -> Result<Resolved, SpriteCacheError> {
        match self.resolved.remove(&token) {
            Some(Resolved::Failed(error)) => Err(error),
            Some(resolved) => Ok(resolved),
            None if self.reservations.contains_key(&token) => Err(SpriteCacheError::NotLoaded(token)),
            None => Err(SpriteCacheError::UnknownToken(token)),
        }
    }

    /// Take the packed sprites of a sprite reservation.  A token resolves
    /// once; the slot for each frame that was not requested is `None`.
    pub fn resolve_sprites(&mut self, token: ReservationToken) -> Result<SpriteSlots, SpriteCacheError> {
        match self.take(token)? {
            Resolved::Sprites(slots) => Ok(slots),
            other => {
                let held = other.describe();
                self.resolved.insert(token, other);
                Err(SpriteCacheError::WrongKind { token, held, requested: "sprites" })
            }
        }
    }

    /// Take the decoded frames of a frame reservation.
    pub fn resolve_frames(&mut self, token: ReservationToken) -> Result<FrameSlots, SpriteCacheError> {
        match self.take(token)? {
            Resolved::Frames(slots) => Ok(slots),
            other => {
                let held = other.describe();
                self.resolved.insert(token, other);
                Err(SpriteCacheError::WrongKind { token, held, requested: "frames" })
            }
        }
    }

    /// Every file that could not be found, once per filename, with the
    /// location of the first reservation that asked for it.
    pub fn missing_files(&self) -> Vec<(String, SourceLocation)> {
        let mut seen = HashSet::new();
        self.missing
            .iter()
            .filter(|(filename, _)| seen.insert(filename.as_str()))
            .cloned()
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::sprites::loader::{Frame, ParsedSprite};

    /// `IDX` + frame count, then per frame width, height and indices.
    struct TestLoader;

    impl SpriteLoader for TestLoader {
        fn try_parse_sprite(&self, data: &[u8], _filename: &str) -> Option<ParsedSprite> {
            let body = data.strip_prefix(b"IDX")?;
            let (&count, mut rest) = body.split_first()?;
            let mut frames: Vec<Rc<dyn SpriteFrame>> = Vec::new();
            for _ in 0..count {
                let (w, h) = (*rest.first()? as u32, *rest.get(1)? as u32);
                let len = (w * h) as usize;
                let pixels = rest.get(2..2 + len)?.to_vec();
                frames.push(Rc::new(Frame::indexed(Size::new(w, h), pixels)));
                rest = &rest[2 + len..];
            }
            Some(ParsedSprite { frames, metadata: Default::default() })
        }
    }

    fn idx_file(frames: &[(u8, u8)]) -> Vec<u8> {
        let mut out = b"IDX".to_vec();
        out.push(frames.len() as u8);
        for &(w, h) in frames {
            out.extend([w, h]);
            out.extend(std::iter::repeat_n(1u8, w as usize * h as usize));
        }
        out
    }

    fn cache(fs: MemoryFileSystem) -> SpriteCache {
        let config = RenderConfig {
            sheet_size: 64,
            indexed_sheet_size: 64,
            bgra_sheet_margin: 0,
            indexed_sheet_margin: 0,
            ..RenderConfig::default()
        };
        SpriteCache::new(Box::new(fs), vec![Box::new(TestLoader)], &config)
    }

    fn here(line: u32) -> SourceLocation {
        SourceLocation::new("rules.yaml", line)
    }

    #[test]
    fn tokens_start_at_one_and_increase() {
        let mut c = cache(MemoryFileSystem::new());
        let a = c.reserve_sprites("a", None, here(1), false);
        let b = c.reserve_frames("b", None, here(2));
        assert_eq!((a.get(), b.get()), (1, 2));
        assert_eq!(c.pending_reservations(), 2);
    }

    #[test]
    fn identical_requests_share_sprites() {
        let fs = MemoryFileSystem::new().with_file("unit.idx", idx_file(&[(4, 4), (2, 2)]));
        let mut c = cache(fs);
        let a = c.reserve_sprites("unit.idx", None, here(1), false);
        let b = c.reserve_sprites("unit.idx", Some(&[1]), here(2), false);
        c.load_reservations().unwrap();

        let a = c.resolve_sprites(a).unwrap();
        let b = c.resolve_sprites(b).unwrap();
        assert_eq!(b.len(), 2);
        assert!(b[0].is_none());
        assert!(Rc::ptr_eq(a[1].as_ref().unwrap(), b[1].as_ref().unwrap()));
    }

    #[test]
    fn premultiplied_flag_splits_the_dedup_key() {
        let fs = MemoryFileSystem::new().with_file("unit.idx", idx_file(&[(4, 4)]));
        let mut c = cache(fs);
        let a = c.reserve_sprites("unit.idx", None, here(1), false);
        let b = c.reserve_sprites("unit.idx", None, here(2), true);
        c.load_reservations().unwrap();

        let a = c.resolve_sprites(a).unwrap();
        let b = c.resolve_sprites(b).unwrap();
        assert!(!Rc::ptr_eq(a[0].as_ref().unwrap(), b[0].as_ref().unwrap()));
    }

    #[test]
    fn pending_frames_pack_shortest_first() {
        let fs = MemoryFileSystem::new().with_file("mixed.idx", idx_file(&[(8, 30), (8, 5), (8, 12)]));
        let mut c = cache(fs);
        let t = c.reserve_sprites("mixed.idx", None, here(1), false);
        c.load_reservations().unwrap();

        let s = c.resolve_sprites(t).unwrap();
        let x = |i: usize| s[i].as_ref().unwrap().bounds().x;
        assert_eq!((x(1), x(2), x(0)), (0, 8, 16));
    }

    #[test]
    fn frames_are_returned_unpacked() {
        let fs = MemoryFileSystem::new().with_file("f.idx", idx_file(&[(1, 1), (2, 1)]));
        let mut c = cache(fs);
        let t = c.reserve_frames("f.idx", Some(&[1]), here(1));
        c.load_reservations().unwrap();

        let frames = c.resolve_frames(t).unwrap();
        assert!(frames[0].is_none());
        assert_eq!(frames[1].as_ref().unwrap().size(), Size::new(2, 1));
    }

    #[test]
    fn missing_file_reports_each_reservation_location() {
        let mut c = cache(MemoryFileSystem::new());
        let tokens: Vec<_> = (10..13).map(|line| c.reserve_sprites("gone.shp", None, here(line), false)).collect();
        c.load_reservations().unwrap();

        assert_eq!(c.missing_files(), vec![("gone.shp".to_string(), here(10))]);
        for (token, line) in tokens.into_iter().zip(10..) {
            match c.resolve_sprites(token) {
                Err(SpriteCacheError::FileNotFound { filename, location }) => {
                    assert_eq!(filename, "gone.shp");
                    assert_eq!(location, here(line));
                }
                other => panic!("expected FileNotFound, got {other:?}"),
            }
        }
    }

    #[test]
    fn tokens_resolve_once() {
        let fs = MemoryFileSystem::new().with_file("a.idx", idx_file(&[(1, 1)]));
        let mut c = cache(fs);
        let t = c.reserve_sprites("a.idx", None, here(1), false);
        assert!(matches!(c.resolve_sprites(t), Err(SpriteCacheError::NotLoaded(_))));

        c.load_reservations().unwrap();
        assert!(matches!(c.resolve_frames(t), Err(SpriteCacheError::WrongKind { .. })));
        assert!(c.resolve_sprites(t).is_ok());
        assert!(matches!(c.resolve_sprites(t), Err(SpriteCacheError::UnknownToken(_))));
    }

    #[test]
    fn out_of_range_frame_fails_only_its_token() {
        let fs = MemoryFileSystem::new().with_file("a.idx", idx_file(&[(1, 1)]));
        let mut c = cache(fs);
        let good = c.reserve_sprites("a.idx", None, here(6), false);
        let bad = c.reserve_sprites("a.idx", Some(&[3]), here(7), false);
        c.load_reservations().unwrap();

        match c.resolve_sprites(bad) {
            Err(SpriteCacheError::FrameOutOfRange { index: 3, count: 1, location, .. }) => {
                assert_eq!(location, here(7));
            }
            other => panic!("expected FrameOutOfRange, got {other:?}"),
        }
        assert!(c.resolve_sprites(good).unwrap()[0].is_some());
        assert_eq!(c.pending_reservations(), 0);
    }

    #[test]
    fn unrecognised_data_fails_every_token_for_that_file() {
        let fs = MemoryFileSystem::new()
            .with_file("junk.bin", b"nope".to_vec())
            .with_file("a.idx", idx_file(&[(2, 2)]));
        let mut c = cache(fs);
        let first = c.reserve_sprites("junk.bin", None, here(4), false);
        let good = c.reserve_sprites("a.idx", None, here(5), false);
        let second = c.reserve_frames("junk.bin", None, here(9));
        c.load_reservations().unwrap();

        for (token, line) in [(first, 4), (second, 9)] {
            match c.resolve_sprites(token) {
                Err(SpriteCacheError::UnknownFormat { filename, location }) => {
                    assert_eq!(filename, "junk.bin");
                    assert_eq!(location, here(line));
                }
                other => panic!("expected UnknownFormat, got {other:?}"),
            }
        }
        assert!(c.resolve_sprites(good).unwrap()[0].is_some());
        assert!(c.missing_files().is_empty());
    }

    #[test]
    fn adjusted_sprites_are_not_shared() {
        let fs = MemoryFileSystem::new().with_file("a.idx", idx_file(&[(2, 2)]));
        let mut c = cache(fs);
        let adjust: FrameAdjust = Rc::new(|frame, _, _| frame);
        let a = c.reserve_sprites_adjusted("a.idx", None, here(1), false, adjust.clone());
        let b = c.reserve_sprites_adjusted("a.idx", None, here(2), false, adjust);
        c.load_reservations().unwrap();

        let a = c.resolve_sprites(a).unwrap();
        let b = c.resolve_sprites(b).unwrap();
        assert!(!Rc::ptr_eq(a[0].as_ref().unwrap(), b[0].as_ref().unwrap()));
    }

    #[test]
    fn buffers_are_sealed_after_load() {
        let fs = MemoryFileSystem::new().with_file("a.idx", idx_file(&[(2, 2)]));
        let mut c = cache(fs);
        c.reserve_sprites("a.idx", None, here(1), false);
        c.load_reservations().unwrap();

        let sheet = c.sheet_builder(SheetType::Indexed).unwrap().current().clone();
        assert!(sheet.is_dirty());
        assert!(sheet.has_buffer(), "released on the next upload, not before");
    }
}
