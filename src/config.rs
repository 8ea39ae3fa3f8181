// ── RenderConfig ──────────────────────────────────────────────────────────────

use serde::Deserialize;
use thiserror::Error;

/// Problems found by [`RenderConfig::validate`] or while parsing a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse render config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field} must be a non-zero power of two (got {value})")]
    NotPowerOfTwo { field: &'static str, value: u32 },

    #[error("batch_size must hold at least one quad (got {0})")]
    BatchTooSmall(usize),

    #[error("palette_capacity must leave room for at least one palette (got {0})")]
    PaletteCapacityTooSmall(usize),
}

/// Atlas, batching and palette sizing.
///
/// Every field has a default, so a config file only needs to name what it
/// overrides:
///
/// ```json
/// { "sheet_size": 1024, "batch_size": 4096 }
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Edge length of BGRA (true-colour) sheets in pixels.
    pub sheet_size: u32,
    /// Edge length of indexed (palette) sheets in pixels.
    pub indexed_sheet_size: u32,
    /// Gap in pixels left before each sprite packed into a BGRA sheet.
    pub bgra_sheet_margin: u32,
    /// Gap in pixels left before each sprite packed into an indexed sheet.
    pub indexed_sheet_margin: u32,
    /// Requested vertex capacity of each batching renderer.  Rounded down to a
    /// multiple of 4 by [`RenderConfig::temp_vertex_buffer_size`].
    pub batch_size: usize,
    /// Number of 256-colour rows in the hardware palette texture, including
    /// the reserved row 0.
    pub palette_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sheet_size: 2048,
            indexed_sheet_size: 2048,
            bgra_sheet_margin: 1,
            indexed_sheet_margin: 1,
            batch_size: 8192,
            palette_capacity: 64,
        }
    }
}

impl RenderConfig {
    /// Deserialise a config from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RenderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject sizes the packer or renderers cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("sheet_size", self.sheet_size),
            ("indexed_sheet_size", self.indexed_sheet_size),
        ] {
            if !value.is_power_of_two() {
                return Err(ConfigError::NotPowerOfTwo { field, value });
            }
        }
        if self.temp_vertex_buffer_size() < 4 {
            return Err(ConfigError::BatchTooSmall(self.batch_size));
        }
        if self.palette_capacity < 2 {
            return Err(ConfigError::PaletteCapacityTooSmall(self.palette_capacity));
        }
        Ok(())
    }

    /// Vertex capacity shared by every batching renderer (whole quads only).
    pub fn temp_vertex_buffer_size(&self) -> usize {
        self.batch_size - self.batch_size % 4
    }

    /// Index capacity matching [`temp_vertex_buffer_size`](Self::temp_vertex_buffer_size):
    /// six indices per four-vertex quad.
    pub fn temp_index_buffer_size(&self) -> usize {
        self.temp_vertex_buffer_size() / 4 * 6
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
