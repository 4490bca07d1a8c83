//! The chunk data source contract and the per-tile chunk bundle.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use super::ChunkSnapshot;
use crate::coord::{ChunkPos, CoordError, TilePos};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while extracting chunk data.
///
/// Missing chunks are never errors; sources leave them out of the bundle.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("world storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("chunk {pos:?} is corrupt: {reason}")]
    Corrupt { pos: ChunkPos, reason: String },

    #[error("invalid snapshot for chunk {pos:?}: {reason}")]
    InvalidSnapshot { pos: ChunkPos, reason: String },

    #[error("simulation thread is not running")]
    SimulationUnavailable,

    #[error("background task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Coord(#[from] CoordError),
}

// =============================================================================
// TileChunkData
// =============================================================================

/// All chunk snapshots available for one tile.
///
/// The map may be a strict subset of the tile's `chunks_per_tile²` grid;
/// absent chunks render as transparent gaps.
#[derive(Debug, Clone)]
pub struct TileChunkData {
    tile: TilePos,
    tile_size: u32,
    chunks_per_tile: i32,
    chunks: HashMap<ChunkPos, ChunkSnapshot>,
}

impl TileChunkData {
    /// Creates an empty bundle. Fails unless `tile_size` is a positive
    /// multiple of the chunk size.
    pub fn new(tile: TilePos, tile_size: u32) -> Result<Self, SourceError> {
        let chunks_per_tile = crate::coord::chunks_per_tile(tile_size)?;
        Ok(Self {
            tile,
            tile_size,
            chunks_per_tile,
            chunks: HashMap::new(),
        })
    }

    pub fn tile(&self) -> TilePos {
        self.tile
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn chunks_per_tile(&self) -> i32 {
        self.chunks_per_tile
    }

    /// World-space chunk coordinate of the tile's top-left chunk.
    pub fn origin(&self) -> ChunkPos {
        ChunkPos::new(
            self.tile.x * self.chunks_per_tile,
            self.tile.z * self.chunks_per_tile,
        )
    }

    /// Adds a snapshot. Returns `false` (and drops it) if the chunk lies
    /// outside this tile or is not loaded.
    pub fn insert(&mut self, snapshot: ChunkSnapshot) -> bool {
        if !snapshot.is_loaded() || !self.covers(snapshot.pos()) {
            return false;
        }
        self.chunks.insert(snapshot.pos(), snapshot);
        true
    }

    pub fn covers(&self, pos: ChunkPos) -> bool {
        let origin = self.origin();
        let dx = pos.x - origin.x;
        let dz = pos.z - origin.z;
        (0..self.chunks_per_tile).contains(&dx) && (0..self.chunks_per_tile).contains(&dz)
    }

    pub fn get(&self, pos: &ChunkPos) -> Option<&ChunkSnapshot> {
        self.chunks.get(pos)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &ChunkSnapshot> {
        self.chunks.values()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn expected_len(&self) -> usize {
        (self.chunks_per_tile * self.chunks_per_tile) as usize
    }

    pub fn is_complete(&self) -> bool {
        self.len() == self.expected_len()
    }
}

// =============================================================================
// ChunkDataSource
// =============================================================================

/// Supplies chunk snapshots for tiles.
///
/// Two implementations exist: [`DurableChunkSource`](super::DurableChunkSource)
/// reads persisted world storage from any thread, and
/// [`LiveChunkSource`](super::LiveChunkSource) funnels every read onto the
/// simulation thread and only sees resident chunks.
pub trait ChunkDataSource: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Snapshots for every available chunk of `tile`.
    ///
    /// Returns `Ok(None)` only when the tile has no data at all. Missing
    /// chunks are left out of the bundle rather than reported.
    fn tile_chunks(
        &self,
        tile: TilePos,
    ) -> impl Future<Output = Result<Option<TileChunkData>, SourceError>> + Send;

    /// Every chunk position known to the backing world storage.
    fn chunk_positions(&self) -> impl Future<Output = Result<Vec<ChunkPos>, SourceError>> + Send;

    /// Whether chunks must be loaded into residency before `tile_chunks`
    /// can see them.
    fn requires_residency(&self) -> bool {
        false
    }

    /// Loads a batch of chunks into residency and returns the ones that made
    /// it.
    ///
    /// The wait is bounded per chunk: a chunk is skipped once `timeout`
    /// passes without it, or any other chunk of the batch, becoming resident.
    /// Skipped chunks are not errors.
    fn load_resident(
        &self,
        chunks: &[ChunkPos],
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<ChunkPos>, SourceError>> + Send {
        let _ = timeout;
        let loaded = chunks.to_vec();
        async move { Ok(loaded) }
    }

    /// Best-effort release of a batch loaded by [`load_resident`](Self::load_resident).
    fn unload_resident(&self, chunks: &[ChunkPos]) -> impl Future<Output = ()> + Send {
        let _ = chunks;
        async {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_chunk_data_rejects_foreign_chunk() {
        let mut data = TileChunkData::new(TilePos::new(9, 1, 0), 64).unwrap();
        assert_eq!(data.chunks_per_tile(), 2);
        assert_eq!(data.origin(), ChunkPos::new(2, 0));

        assert!(data.insert(ChunkSnapshot::uniform(ChunkPos::new(3, 1), 10, 1)));
        assert!(!data.insert(ChunkSnapshot::uniform(ChunkPos::new(4, 1), 10, 1)));
        assert!(!data.insert(ChunkSnapshot::uniform(ChunkPos::new(1, 0), 10, 1)));
        assert_eq!(data.len(), 1);
        assert!(!data.is_complete());
    }

    #[test]
    fn test_tile_chunk_data_drops_unloaded_snapshot() {
        let mut data = TileChunkData::new(TilePos::new(9, 0, 0), 32).unwrap();
        let unloaded = ChunkSnapshot::builder(ChunkPos::new(0, 0))
            .loaded(false)
            .build()
            .unwrap();
        assert!(!data.insert(unloaded));
        assert!(data.is_empty());
    }

    #[test]
    fn test_tile_chunk_data_invalid_tile_size() {
        assert!(matches!(
            TileChunkData::new(TilePos::new(0, 0, 0), 100),
            Err(SourceError::Coord(_))
        ));
    }

    #[test]
    fn test_negative_tile_origin() {
        let data = TileChunkData::new(TilePos::new(9, -1, -2), 256).unwrap();
        assert_eq!(data.origin(), ChunkPos::new(-8, -16));
        assert!(data.covers(ChunkPos::new(-1, -9)));
        assert!(!data.covers(ChunkPos::new(0, -9)));
    }
}
