//! Coordinate systems shared by the renderer, pyramid and store.
//!
//! Three grids are in play:
//! - block columns (world `x`/`z`, one pixel each at the base zoom),
//! - chunks of 32×32 columns,
//! - pyramid tiles, `tile_size` pixels square, halving resolution per level.

mod types;


pub use types::{
    BlockPos, ChunkPos, CoordError, TileExtent, TilePos, CHUNK_AREA, CHUNK_SIZE, CHUNK_VOLUME,
    MAX_ZOOM,
};

use std::collections::BTreeSet;

/// Number of chunks along one tile edge for the given pixel tile size.
///
/// # Errors
///
/// Returns [`CoordError::InvalidTileSize`] unless `tile_size` is a positive
/// multiple of [`CHUNK_SIZE`].
#[inline]
pub fn chunks_per_tile(tile_size: u32) -> Result<i32, CoordError> {
    if tile_size == 0 || tile_size % CHUNK_SIZE as u32 != 0 {
        return Err(CoordError::InvalidTileSize(tile_size));
    }
    Ok((tile_size / CHUNK_SIZE as u32) as i32)
}

/// Validates a zoom level against [`MAX_ZOOM`].
pub fn validate_zoom(zoom: u8) -> Result<u8, CoordError> {
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }
    Ok(zoom)
}

/// Derives the deduplicated, sorted set of base-zoom tiles covering the given
/// chunk positions.
pub fn tiles_covering<'a, I>(chunks: I, base_zoom: u8, chunks_per_tile: i32) -> Vec<TilePos>
where
    I: IntoIterator<Item = &'a ChunkPos>,
{
    chunks
        .into_iter()
        .map(|chunk| chunk.tile(base_zoom, chunks_per_tile))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
