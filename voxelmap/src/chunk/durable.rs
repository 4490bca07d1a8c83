//! Chunk source over durable world storage.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{ChunkDataSource, SourceError, TileChunkData, WorldStorage};
use crate::coord::{ChunkPos, TilePos};

/// Reads chunk columns straight from persisted world storage.
///
/// Callable from any thread. Coverage is complete: every stored chunk is
/// visible whether or not the simulation currently has it loaded. Blocking
/// storage reads run on tokio's blocking pool.
pub struct DurableChunkSource<W> {
    storage: Arc<W>,
    tile_size: u32,
}

impl<W: WorldStorage> DurableChunkSource<W> {
    pub fn new(storage: Arc<W>, tile_size: u32) -> Self {
        Self { storage, tile_size }
    }

    pub fn storage(&self) -> &Arc<W> {
        &self.storage
    }
}

impl<W: WorldStorage> ChunkDataSource for DurableChunkSource<W> {
    fn name(&self) -> &str {
        "durable"
    }

    async fn tile_chunks(&self, tile: TilePos) -> Result<Option<TileChunkData>, SourceError> {
        let storage = Arc::clone(&self.storage);
        let tile_size = self.tile_size;

        tokio::task::spawn_blocking(move || read_tile(storage.as_ref(), tile, tile_size))
            .await
            .map_err(|e| SourceError::Join(e.to_string()))?
    }

    async fn chunk_positions(&self) -> Result<Vec<ChunkPos>, SourceError> {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || storage.chunk_positions())
            .await
            .map_err(|e| SourceError::Join(e.to_string()))?
    }
}

/// Collects every stored chunk of a tile. Chunks that fail to decode are
/// logged and skipped; storage failures propagate.
fn read_tile<W: WorldStorage + ?Sized>(
    storage: &W,
    tile: TilePos,
    tile_size: u32,
) -> Result<Option<TileChunkData>, SourceError> {
    let mut data = TileChunkData::new(tile, tile_size)?;

    for pos in tile.chunks(data.chunks_per_tile()) {
        match storage.load_chunk(pos) {
            Ok(Some(snapshot)) => {
                data.insert(snapshot);
            }
            Ok(None) => {}
            Err(
                SourceError::Corrupt { pos, reason } | SourceError::InvalidSnapshot { pos, reason },
            ) => {
                warn!(chunk_x = pos.x, chunk_z = pos.z, reason = %reason, "Skipping unreadable chunk");
            }
            Err(e) => return Err(e),
        }
    }

    if data.is_empty() {
        return Ok(None);
    }
    if !data.is_complete() {
        debug!(
            tile = %tile,
            present = data.len(),
            expected = data.expected_len(),
            "Partial tile"
        );
    }
    Ok(Some(data))
}
