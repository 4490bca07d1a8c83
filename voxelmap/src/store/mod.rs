//! Tile persistence.
//!
//! Two layers:
//!
//! ```text
//! ┌──────────────────────────┐
//! │  HotTileCache            │  bounded map "zoom_x_z" → {bytes, etag, time}
//! └────────────┬─────────────┘
//!              │ miss
//! ┌────────────▼─────────────┐
//! │  TileStore               │  durable (zoom, x, z) → bytes, WAL journal
//! └──────────────────────────┘
//! ```
//!
//! [`CachedTileStore`] ties them together. Writes go straight to the durable
//! store and drop the hot entry; the hot cache is only filled by reads.
//!
//! The SQLite store keeps every write in its write-ahead log until
//! [`TileStore::checkpoint`] is called. Exports call it exactly once, after
//! the whole pyramid is written, so parallel writers never stall on a
//! checkpoint.

mod cached;
mod hot;
mod memory;
mod sqlite;

pub use cached::CachedTileStore;
pub use hot::{CachedTile, HotCacheStats, HotTileCache, DEFAULT_HOT_CACHE_CAPACITY};
pub use memory::MemoryTileStore;
pub use sqlite::SqliteTileStore;

use thiserror::Error;

use crate::coord::{CoordError, TileExtent, TilePos};

/// Errors from the durable tile store.
///
/// Unlike render failures these are never swallowed: once the store fails,
/// further writes are suspect.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("tile database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Coord(#[from] CoordError),
}

/// Durable `(zoom, x, z) → bytes` storage.
///
/// Methods block; async code calls them through `spawn_blocking`. Writes
/// are whole-tile upserts, so re-running an export is always safe.
pub trait TileStore: Send + Sync + 'static {
    fn get(&self, tile: TilePos) -> Result<Option<Vec<u8>>, StoreError>;

    /// Inserts or replaces a tile.
    fn put(&self, tile: TilePos, data: &[u8]) -> Result<(), StoreError>;

    fn contains(&self, tile: TilePos) -> Result<bool, StoreError>;

    /// Removes a tile, returning whether it existed.
    fn delete(&self, tile: TilePos) -> Result<bool, StoreError>;

    /// Number of tiles, optionally restricted to one zoom level.
    fn count(&self, zoom: Option<u8>) -> Result<u64, StoreError>;

    /// Bounding rectangle of all tiles at `zoom`, `None` if the level is
    /// empty.
    fn extent(&self, zoom: u8) -> Result<Option<TileExtent>, StoreError>;

    /// Zoom levels holding at least one tile, ascending.
    fn zoom_levels(&self) -> Result<Vec<u8>, StoreError>;

    /// Removes every tile at `zoom`, returning how many were removed.
    fn clear_zoom(&self, zoom: u8) -> Result<u64, StoreError>;

    /// Flushes the write-ahead log into the main file.
    fn checkpoint(&self) -> Result<(), StoreError>;

    /// Rebuilds the file to reclaim free pages.
    fn vacuum(&self) -> Result<(), StoreError>;

    /// Bytes used on disk, including the write-ahead log.
    fn size_bytes(&self) -> Result<u64, StoreError>;
}
