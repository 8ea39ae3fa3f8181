//! `palsprite-view <folder> [config.json] [--dump]`
//!
//! Packs every PNG under `folder` through a [`SpriteCache`] and draws the
//! packed sprites in a grid below an indexed ramp drawn through the cycling
//! "grey" palette.  `--dump` also writes each true-colour sheet to
//! `sheet_<n>.png` in the working directory.

use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::Vec3;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use palsprite::config::RenderConfig;
use palsprite::fs::DirectoryFileSystem;
use palsprite::geometry::Size;
use palsprite::palette::{HardwarePalette, Palette, PaletteReference, RotationModifier, argb};
use palsprite::renderer::Renderer;
use palsprite::renderer::wgpu_backend::WgpuBackend;
use palsprite::sprites::{
    Frame, PngSpriteLoader, SheetBuilder, SheetType, SourceLocation, Sprite, SpriteCache, TextureChannel,
};

const PADDING: f32 = 8.0;
const CELL_BG: [f32; 4] = [0.12, 0.14, 0.16, 1.0];
const CELL_BORDER: [f32; 4] = [0.35, 0.40, 0.45, 1.0];
const RAMP_HEIGHT: u32 = 24;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut folder = None;
    let mut config_path = None;
    let mut dump = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dump" => dump = true,
            _ if folder.is_none() => folder = Some(arg),
            _ => config_path = Some(arg),
        }
    }
    let folder = folder.context("usage: palsprite-view <folder> [config.json] [--dump]")?;

    let config = match &config_path {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            RenderConfig::from_json(&json).with_context(|| format!("parsing {path}"))?
        }
        None => RenderConfig::default(),
    };

    let sprites = load_sprites(&folder, &config, dump)?;
    tracing::info!(count = sprites.len(), "sprites packed");

    let palette = grey_palette_bank(&config)?;
    let grey = palette.palette_reference("grey")?;
    let ramp = index_ramp(&config)?;

    let event_loop = EventLoop::new()?;
    let mut viewer = Viewer {
        config,
        sprites,
        palette,
        grey,
        ramp,
        cycle: RotationModifier::new(16, 16).for_palettes(&["grey"]),
        renderer: None,
    };
    event_loop.run_app(&mut viewer)?;
    Ok(())
}

fn load_sprites(folder: &str, config: &RenderConfig, dump: bool) -> Result<Vec<Rc<Sprite>>> {
    let fs = DirectoryFileSystem::new(folder);
    let files: Vec<String> = fs
        .files()
        .into_iter()
        .filter(|f| f.ends_with(".png"))
        .map(str::to_owned)
        .collect();

    let mut cache = SpriteCache::new(Box::new(fs), vec![Box::new(PngSpriteLoader::new())], config);
    let tokens: Vec<_> = files
        .iter()
        .map(|f| cache.reserve_sprites(f, None, SourceLocation::new(file!(), line!()), false))
        .collect();
    cache.load_reservations()?;

    for (filename, location) in cache.missing_files() {
        tracing::warn!(filename = filename.as_str(), %location, "sprite file missing");
    }

    let mut sprites = Vec::new();
    for (filename, token) in files.iter().zip(tokens) {
        match cache.resolve_sprites(token) {
            Ok(slots) => sprites.extend(slots.into_iter().flatten()),
            Err(err) => tracing::warn!(filename = filename.as_str(), %err, "skipping sprite file"),
        }
    }

    if dump {
        if let Some(builder) = cache.sheet_builder(SheetType::Bgra) {
            for (i, sheet) in builder.sheets().iter().enumerate() {
                let Some(image) = sheet.to_image(TextureChannel::Rgba, None) else {
                    tracing::warn!(sheet = i, "sheet has no CPU copy to dump");
                    continue;
                };
                let path = format!("sheet_{i}.png");
                image.save(&path).with_context(|| format!("writing {path}"))?;
                tracing::info!(%path, "sheet dumped");
            }
        }
    }

    Ok(sprites)
}

fn grey_palette_bank(config: &RenderConfig) -> Result<HardwarePalette> {
    let mut bank = HardwarePalette::new(config.palette_capacity);
    let ramp = Palette::new(std::array::from_fn(|i| {
        let v = i as u8;
        argb(if i == 0 { 0 } else { 255 }, v, v, v)
    }));
    bank.add_palette("grey", ramp, true)?;
    Ok(bank)
}

/// A strip showing every palette index left to right, so palette cycling is
/// visible on screen.
fn index_ramp(config: &RenderConfig) -> Result<Sprite> {
    let size = Size::new(256, RAMP_HEIGHT);
    let pixels = (0..size.area()).map(|i| (i % 256) as u8).collect();
    let mut builder = SheetBuilder::new(
        SheetType::Indexed,
        Size::square(config.indexed_sheet_size),
        config.indexed_sheet_margin,
    );
    Ok(builder.add(&Frame::indexed(size, pixels))?)
}

// ── Viewer (winit ApplicationHandler) ───────────────────────────────────────

struct Viewer {
    config: RenderConfig,
    sprites: Vec<Rc<Sprite>>,
    palette: HardwarePalette,
    grey: PaletteReference,
    ramp: Sprite,
    cycle: RotationModifier,
    renderer: Option<Renderer<WgpuBackend>>,
}

impl Viewer {
    fn redraw(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else { return };

        self.cycle.tick();
        self.palette.apply_modifiers(&[&self.cycle]);
        renderer.set_palette(&mut self.palette);

        if let Err(err) = renderer.begin_frame() {
            tracing::error!(%err, "frame bracket misuse");
            return;
        }

        let width = renderer.backend().surface_size().width as f32;
        renderer.draw_sprite(&self.ramp, Some(&self.grey), Vec3::new(PADDING, PADDING, 0.0), 2.0);
        let top = 2.0 * PADDING + 2.0 * RAMP_HEIGHT as f32;
        let cells = grid_layout(&self.sprites, width, top);

        for (sprite, origin) in self.sprites.iter().zip(&cells) {
            let size = sprite.size();
            renderer.fill_rect(*origin, *origin + Vec3::new(size.x, size.y, 0.0), CELL_BG);
        }
        for (sprite, origin) in self.sprites.iter().zip(&cells) {
            renderer.draw_sprite(sprite, None, *origin - sprite.offset(), 1.0);
        }
        for (sprite, origin) in self.sprites.iter().zip(&cells) {
            let size = sprite.size();
            renderer.draw_rect(*origin, *origin + Vec3::new(size.x, size.y, 0.0), CELL_BORDER);
        }

        if let Err(err) = renderer.end_frame() {
            tracing::error!(%err, "frame bracket misuse");
        }
    }
}

/// Top-left corner of each sprite's cell, filling rows left to right.
fn grid_layout(sprites: &[Rc<Sprite>], width: f32, top: f32) -> Vec<Vec3> {
    let (mut x, mut y, mut row_height) = (PADDING, top, 0.0f32);
    sprites
        .iter()
        .map(|sprite| {
            let size = sprite.size();
            if x + size.x > width && x > PADDING {
                x = PADDING;
                y += row_height + PADDING;
                row_height = 0.0;
            }
            let origin = Vec3::new(x, y, 0.0);
            x += size.x + PADDING;
            row_height = row_height.max(size.y);
            origin
        })
        .collect()
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        let window = match event_loop.create_window(
            Window::default_attributes()
                .with_title("palsprite-view")
                .with_inner_size(winit::dpi::PhysicalSize::new(1280, 720)),
        ) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                tracing::error!(%err, "failed to create window");
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(WgpuBackend::new(window)) {
            Ok(backend) => self.renderer = Some(Renderer::new(backend, &self.config)),
            Err(err) => {
                tracing::error!(%err, "failed to initialise the GPU");
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_ref() {
            renderer.backend().window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.backend_mut().resize(size);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }
}
