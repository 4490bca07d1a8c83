//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let block_colors = config
        .render
        .block_colors
        .as_ref()
        .map(|p| path_to_string(p))
        .unwrap_or_default();

    format!(
        r#"[world]
; Durable world storage (SQLite) holding serialized chunk columns
database = {}
; Chunk source used by exports:
;   durable - read persisted chunks directly (complete coverage)
;   live    - read resident chunks through the simulation thread
source = {}

[store]
; Tile pyramid database (SQLite, WAL mode)
database = {}
; Tiles kept in the in-memory hot cache (default: 100)
hot_cache_capacity = {}

[render]
; Render mode:
;   only_one_color                     - flat base color per block
;   color_variations                   - random per-block color variation
;   color_variations_with_height       - variations scaled by height
;   color_variations_with_hill_shading - variations with slope shading (default)
;   medieval_style_with_hill_shading   - flat parchment palette with shading
mode = {}
; Tile edge in pixels, must be a positive multiple of 32 (default: 256)
tile_size = {}
; Heights are clamped to this value (default: 255)
map_max_y = {}
; World height used by the height-scaled mode (default: 256)
map_size_y = {}
; Hill-shading blur radius in pixels (default: 2)
blur_radius = {}
; Weight of unblurred shading detail (default: 1.4)
sharpen = {}
; Optional JSON block color table; empty uses the built-in table
block_colors = {}

[export]
; Finest zoom level rendered straight from chunks (default: 9)
base_zoom = {}
; Tiles rendered concurrently (default: number of CPU cores)
parallelism = {}
; Chunks brought into residency per batch, live source only (default: 256)
residency_batch_size = {}
; Seconds a chunk may wait for residency progress before it is skipped (default: 5)
residency_timeout_secs = {}
; Tiles between progress reports (default: 100)
progress_interval = {}

[logging]
directory = {}
file = {}
"#,
        path_to_string(&config.world.database),
        config.world.source.as_str(),
        path_to_string(&config.store.database),
        config.store.hot_cache_capacity,
        config.render.mode.as_str(),
        config.render.tile_size,
        config.render.map_max_y,
        config.render.map_size_y,
        config.render.blur_radius,
        config.render.sharpen,
        block_colors,
        config.export.base_zoom,
        config.export.parallelism,
        config.export.residency_batch_size,
        config.export.residency_timeout_secs,
        config.export.progress_interval,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

/// Collapse the home directory to `~` so the file stays portable.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_string_has_all_sections() {
        let content = to_config_string(&ConfigFile::default());
        for section in ["[world]", "[store]", "[render]", "[export]", "[logging]"] {
            assert!(content.contains(section), "missing {}", section);
        }
        assert!(content.contains("mode = color_variations_with_hill_shading"));
        assert!(content.contains("hot_cache_capacity = 100"));
    }

    #[test]
    fn test_home_paths_collapse_to_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(path_to_string(&home.join("tiles.db")), "~/tiles.db");
    }
}
