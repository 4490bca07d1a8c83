//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;
use std::str::FromStr;

use super::defaults::clamp_parallelism;
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::coord::{chunks_per_tile, MAX_ZOOM};

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [world] section
    if let Some(section) = ini.section(Some("world")) {
        if let Some(v) = non_empty(section.get("database")) {
            config.world.database = expand_tilde(v);
        }
        if let Some(v) = section.get("source") {
            config.world.source = v.parse().map_err(|_| {
                invalid("world", "source", v, "must be 'durable' or 'live'")
            })?;
        }
    }

    // [store] section
    if let Some(section) = ini.section(Some("store")) {
        if let Some(v) = non_empty(section.get("database")) {
            config.store.database = expand_tilde(v);
        }
        if let Some(v) = section.get("hot_cache_capacity") {
            config.store.hot_cache_capacity = parse_number(
                "store",
                "hot_cache_capacity",
                v,
                "must be a non-negative integer",
            )?;
        }
    }

    // [render] section
    if let Some(section) = ini.section(Some("render")) {
        if let Some(v) = section.get("mode") {
            config.render.mode = v.parse().map_err(|_| {
                invalid(
                    "render",
                    "mode",
                    v,
                    "must be one of: only_one_color, color_variations, \
                     color_variations_with_height, color_variations_with_hill_shading, \
                     medieval_style_with_hill_shading",
                )
            })?;
        }
        if let Some(v) = section.get("tile_size") {
            let reason = "must be a positive multiple of 32";
            let size: u32 = parse_number("render", "tile_size", v, reason)?;
            chunks_per_tile(size).map_err(|_| invalid("render", "tile_size", v, reason))?;
            config.render.tile_size = size;
        }
        if let Some(v) = section.get("map_max_y") {
            config.render.map_max_y =
                parse_number("render", "map_max_y", v, "must be an integer 0-65535")?;
        }
        if let Some(v) = section.get("map_size_y") {
            let size: u16 =
                parse_number("render", "map_size_y", v, "must be an integer 1-65535")?;
            if size == 0 {
                return Err(invalid("render", "map_size_y", v, "must be an integer 1-65535"));
            }
            config.render.map_size_y = size;
        }
        if let Some(v) = section.get("blur_radius") {
            config.render.blur_radius = parse_number(
                "render",
                "blur_radius",
                v,
                "must be a non-negative integer (pixels)",
            )?;
        }
        if let Some(v) = section.get("sharpen") {
            let sharpen: f32 =
                parse_number("render", "sharpen", v, "must be a non-negative number")?;
            if !sharpen.is_finite() || sharpen < 0.0 {
                return Err(invalid("render", "sharpen", v, "must be a non-negative number"));
            }
            config.render.sharpen = sharpen;
        }
        if let Some(v) = section.get("block_colors") {
            let v = v.trim();
            config.render.block_colors = if v.is_empty() {
                None
            } else {
                Some(expand_tilde(v))
            };
        }
    }

    // [export] section
    if let Some(section) = ini.section(Some("export")) {
        if let Some(v) = section.get("base_zoom") {
            let reason = format!("must be an integer 0-{}", MAX_ZOOM);
            let zoom: u8 = parse_number("export", "base_zoom", v, &reason)?;
            if zoom > MAX_ZOOM {
                return Err(invalid("export", "base_zoom", v, &reason));
            }
            config.export.base_zoom = zoom;
        }
        if let Some(v) = section.get("parallelism") {
            let requested: usize =
                parse_number("export", "parallelism", v, "must be a positive integer")?;
            config.export.parallelism = clamp_parallelism(requested);
        }
        if let Some(v) = section.get("residency_batch_size") {
            let size: usize = parse_number(
                "export",
                "residency_batch_size",
                v,
                "must be a positive integer (chunks)",
            )?;
            if size == 0 {
                return Err(invalid(
                    "export",
                    "residency_batch_size",
                    v,
                    "must be a positive integer (chunks)",
                ));
            }
            config.export.residency_batch_size = size;
        }
        if let Some(v) = section.get("residency_timeout_secs") {
            config.export.residency_timeout_secs = parse_number(
                "export",
                "residency_timeout_secs",
                v,
                "must be a non-negative integer (seconds)",
            )?;
        }
        if let Some(v) = section.get("progress_interval") {
            let interval: u64 = parse_number(
                "export",
                "progress_interval",
                v,
                "must be a positive integer (tiles)",
            )?;
            config.export.progress_interval = interval.max(1);
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section.get("directory")) {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = non_empty(section.get("file")) {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Expand `~/` to the user's home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
