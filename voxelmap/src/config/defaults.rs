//! Default values and constants for all configuration settings.

use std::path::PathBuf;

use super::file::config_directory;
use super::settings::*;
use crate::chunk::SourceKind;
use crate::render::{RenderMode, RenderSettings};
use crate::store::DEFAULT_HOT_CACHE_CAPACITY;

// =============================================================================
// CPU helpers
// =============================================================================

/// Get the number of available CPU cores.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Upper bound for export parallelism: a few workers per core at most.
pub fn max_parallelism() -> usize {
    num_cpus() * PARALLELISM_SCALING_FACTOR
}

/// Clamps export parallelism to a usable range and logs a warning if clamped.
pub(super) fn clamp_parallelism(value: usize) -> usize {
    let max = max_parallelism();
    if value < MIN_PARALLELISM {
        tracing::warn!(
            requested = value,
            min = MIN_PARALLELISM,
            max,
            "export parallelism below minimum, clamping to {}",
            MIN_PARALLELISM
        );
        MIN_PARALLELISM
    } else if value > max {
        tracing::warn!(
            requested = value,
            min = MIN_PARALLELISM,
            max,
            "export parallelism above maximum, clamping to {}",
            max
        );
        max
    } else {
        value
    }
}

// =============================================================================
// Export
// =============================================================================

pub const DEFAULT_BASE_ZOOM: u8 = 9;
pub const MIN_PARALLELISM: usize = 1;
pub const PARALLELISM_SCALING_FACTOR: usize = 4;
pub const DEFAULT_RESIDENCY_BATCH_SIZE: usize = 256;
pub const DEFAULT_RESIDENCY_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100;

// =============================================================================
// Files
// =============================================================================

pub const DEFAULT_WORLD_DATABASE: &str = "world.db";
pub const DEFAULT_TILE_DATABASE: &str = "tiles.db";
pub const DEFAULT_LOG_DIRECTORY: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "voxelmap.log";

impl Default for ConfigFile {
    fn default() -> Self {
        let base = config_directory();
        let render = RenderSettings::default();
        Self {
            world: WorldSettings {
                database: base.join(DEFAULT_WORLD_DATABASE),
                source: SourceKind::default(),
            },
            store: StoreSettings {
                database: base.join(DEFAULT_TILE_DATABASE),
                hot_cache_capacity: DEFAULT_HOT_CACHE_CAPACITY,
            },
            render: RenderConfigSettings {
                mode: RenderMode::default(),
                tile_size: render.tile_size,
                map_max_y: render.map_max_y,
                map_size_y: render.map_size_y,
                blur_radius: render.blur_radius,
                sharpen: render.sharpen,
                block_colors: None,
            },
            export: ExportSettings {
                base_zoom: DEFAULT_BASE_ZOOM,
                parallelism: num_cpus(),
                residency_batch_size: DEFAULT_RESIDENCY_BATCH_SIZE,
                residency_timeout_secs: DEFAULT_RESIDENCY_TIMEOUT_SECS,
                progress_interval: DEFAULT_PROGRESS_INTERVAL,
            },
            logging: LoggingSettings {
                directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}
