//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;
use std::time::Duration;

use crate::chunk::SourceKind;
use crate::export::ExportConfig;
use crate::render::{RenderMode, RenderSettings};

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// World (chunk source) settings
    pub world: WorldSettings,
    /// Tile store settings
    pub store: StoreSettings,
    /// Renderer settings
    pub render: RenderConfigSettings,
    /// Export run settings
    pub export: ExportSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Where chunks come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSettings {
    /// Durable world storage database.
    pub database: PathBuf,
    pub source: SourceKind,
}

/// Tile store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Tile database path.
    pub database: PathBuf,
    /// Entries kept in the hot tile cache.
    pub hot_cache_capacity: usize,
}

/// Renderer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfigSettings {
    pub mode: RenderMode,
    /// Tile edge in pixels, a positive multiple of 32.
    pub tile_size: u32,
    pub map_max_y: u16,
    pub map_size_y: u16,
    pub blur_radius: u32,
    pub sharpen: f32,
    /// Optional JSON block color table. The built-in table is used when unset.
    pub block_colors: Option<PathBuf>,
}

/// Export configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub base_zoom: u8,
    /// Tiles rendered concurrently (clamped on load).
    pub parallelism: usize,
    pub residency_batch_size: usize,
    pub residency_timeout_secs: u64,
    pub progress_interval: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl ConfigFile {
    /// Renderer parameters derived from `[render]`.
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            mode: self.render.mode,
            tile_size: self.render.tile_size,
            map_max_y: self.render.map_max_y,
            map_size_y: self.render.map_size_y,
            blur_radius: self.render.blur_radius,
            sharpen: self.render.sharpen,
        }
    }

    /// Orchestrator parameters derived from `[export]`.
    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            base_zoom: self.export.base_zoom,
            parallelism: self.export.parallelism,
            residency_batch_size: self.export.residency_batch_size,
            residency_timeout: Duration::from_secs(self.export.residency_timeout_secs),
            progress_interval: self.export.progress_interval,
        }
    }
}
