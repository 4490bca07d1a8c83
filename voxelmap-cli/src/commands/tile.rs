//! Single tile command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use voxelmap::coord::TilePos;
use voxelmap::store::CachedTileStore;
use voxelmap::tile::MapTileGenerator;

use crate::error::CliError;
use crate::runner::CliRunner;

#[derive(Debug, Args)]
pub struct TileArgs {
    /// Zoom level
    pub zoom: u8,
    /// Tile column
    #[arg(allow_hyphen_values = true)]
    pub x: i32,
    /// Tile row
    #[arg(allow_hyphen_values = true)]
    pub z: i32,

    /// Output PNG file
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Writes one tile to disk, rendering it from the world when the store has
/// no copy and the zoom is the base zoom.
pub async fn run(runner: CliRunner, args: TileArgs) -> Result<(), CliError> {
    runner.log_startup("tile");

    let store = runner.open_tile_store()?;
    let world = runner.open_world()?;
    let tiles = Arc::new(CachedTileStore::new(
        store,
        runner.config().store.hot_cache_capacity,
    ));
    let generator = MapTileGenerator::new(tiles, runner.renderer()?, runner.config().export.base_zoom)
        .with_source(Arc::clone(&world.source));

    let tile = TilePos::new(args.zoom, args.x, args.z);
    let data = generator
        .get_tile_data(args.zoom, args.x, args.z)
        .await?
        .ok_or(CliError::TileNotFound(tile))?;

    std::fs::write(&args.output, &data).map_err(|error| CliError::FileWrite {
        path: args.output.clone(),
        error,
    })?;

    println!(
        "Saved tile {} to {} ({} bytes)",
        tile,
        args.output.display(),
        data.len()
    );
    Ok(())
}
