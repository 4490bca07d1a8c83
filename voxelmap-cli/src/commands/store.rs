//! Tile store maintenance commands.

use clap::Subcommand;
use voxelmap::store::TileStore;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Store action subcommands.
#[derive(Debug, Subcommand)]
pub enum StoreAction {
    /// Show tile counts per zoom level and database size
    Stats,
    /// Fold the write-ahead log into the main database file
    Checkpoint,
    /// Rebuild the database file, reclaiming free pages
    Vacuum,
    /// Show the tile extent stored at one zoom level
    Extent {
        /// Zoom level
        zoom: u8,
    },
    /// Delete every tile at one zoom level
    Clear {
        /// Zoom level
        zoom: u8,
    },
}

pub fn run(runner: CliRunner, action: StoreAction) -> Result<(), CliError> {
    runner.log_startup("store");
    let store = runner.open_tile_store()?;

    match action {
        StoreAction::Stats => {
            println!("Tile store: {}", store.path().display());
            println!("  Size:  {}", format_bytes(store.size_bytes()?));
            println!("  Tiles: {}", store.count(None)?);
            for zoom in store.zoom_levels()? {
                println!("    zoom {:>2}: {}", zoom, store.count(Some(zoom))?);
            }
        }
        StoreAction::Checkpoint => {
            store.checkpoint()?;
            println!("Checkpoint complete");
        }
        StoreAction::Vacuum => {
            let before = store.size_bytes()?;
            store.checkpoint()?;
            store.vacuum()?;
            let after = store.size_bytes()?;
            println!(
                "Vacuum complete: {} -> {}",
                format_bytes(before),
                format_bytes(after)
            );
        }
        StoreAction::Extent { zoom } => match store.extent(zoom)? {
            Some(extent) => println!(
                "zoom {}: x {}..={}, y {}..={} ({} tile slots)",
                zoom,
                extent.min_x,
                extent.max_x,
                extent.min_y,
                extent.max_y,
                extent.tile_count()
            ),
            None => println!("zoom {}: no tiles", zoom),
        },
        StoreAction::Clear { zoom } => {
            let removed = store.clear_zoom(zoom)?;
            store.checkpoint()?;
            println!("Removed {} tiles at zoom {}", removed, zoom);
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
