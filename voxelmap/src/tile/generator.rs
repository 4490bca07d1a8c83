use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use super::TileGeneratorError;
use crate::chunk::ChunkDataSource;
use crate::coord::{validate_zoom, TileExtent, TilePos};
use crate::render::TileRenderer;
use crate::store::{CachedTile, CachedTileStore, HotCacheStats, TileStore};

/// Tile lookups exposed to serving collaborators.
pub trait TileGenerator: Send + Sync {
    /// Tile bytes with their ETag, `None` if the tile does not exist and
    /// cannot be rendered.
    fn tile(
        &self,
        tile: TilePos,
    ) -> impl Future<Output = Result<Option<CachedTile>, TileGeneratorError>> + Send;

    /// Bounding rectangle of the stored tiles at `zoom`.
    fn tile_extent(
        &self,
        zoom: u8,
    ) -> impl Future<Output = Result<Option<TileExtent>, TileGeneratorError>> + Send;
}

/// Serves tiles from the store, rendering base-zoom misses on demand when
/// it has a chunk source.
pub struct MapTileGenerator<S, T> {
    tiles: Arc<CachedTileStore<T>>,
    renderer: TileRenderer,
    source: Option<Arc<S>>,
    base_zoom: u8,
}

impl<S: ChunkDataSource, T: TileStore> MapTileGenerator<S, T> {
    /// A generator that only serves stored tiles.
    pub fn new(tiles: Arc<CachedTileStore<T>>, renderer: TileRenderer, base_zoom: u8) -> Self {
        Self {
            tiles,
            renderer,
            source: None,
            base_zoom,
        }
    }

    /// Enables on-demand rendering of base-zoom misses from `source`.
    pub fn with_source(mut self, source: Arc<S>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn tiles(&self) -> &Arc<CachedTileStore<T>> {
        &self.tiles
    }

    /// Tile bytes only.
    pub async fn get_tile_data(
        &self,
        zoom: u8,
        x: i32,
        z: i32,
    ) -> Result<Option<Bytes>, TileGeneratorError> {
        Ok(self.tile(TilePos::new(zoom, x, z)).await?.map(|t| t.data))
    }

    pub async fn get_tile_extent(&self, zoom: u8) -> Result<Option<TileExtent>, TileGeneratorError> {
        self.tile_extent(zoom).await
    }

    /// Drops a tile from the hot cache so the next request re-reads the
    /// store.
    pub fn invalidate(&self, tile: TilePos) -> bool {
        self.tiles.invalidate(tile)
    }

    pub fn cache_stats(&self) -> HotCacheStats {
        self.tiles.stats()
    }

    async fn load_stored(&self, tile: TilePos) -> Result<Option<CachedTile>, TileGeneratorError> {
        let tiles = Arc::clone(&self.tiles);
        Ok(tokio::task::spawn_blocking(move || tiles.load(tile)).await??)
    }

    async fn render_on_demand(&self, tile: TilePos) -> Result<Option<CachedTile>, TileGeneratorError> {
        let Some(source) = self.source.as_ref().filter(|_| tile.zoom == self.base_zoom) else {
            return Ok(None);
        };

        let Some(data) = source.tile_chunks(tile).await? else {
            debug!(tile = %tile, "No chunk data for tile");
            return Ok(None);
        };

        let renderer = self.renderer.clone();
        let Some(png) = tokio::task::spawn_blocking(move || renderer.render(&data)).await? else {
            return Ok(None);
        };

        let tiles = Arc::clone(&self.tiles);
        let cached = tokio::task::spawn_blocking(move || -> Result<_, crate::store::StoreError> {
            tiles.put(tile, &png)?;
            tiles.load(tile)
        })
        .await??;
        debug!(tile = %tile, source = source.name(), "Rendered tile on demand");
        Ok(cached)
    }
}

impl<S: ChunkDataSource, T: TileStore> TileGenerator for MapTileGenerator<S, T> {
    async fn tile(&self, tile: TilePos) -> Result<Option<CachedTile>, TileGeneratorError> {
        validate_zoom(tile.zoom)?;

        if let Some(hit) = self.tiles.cached(tile) {
            return Ok(Some(hit));
        }
        if let Some(stored) = self.load_stored(tile).await? {
            return Ok(Some(stored));
        }
        self.render_on_demand(tile).await
    }

    async fn tile_extent(&self, zoom: u8) -> Result<Option<TileExtent>, TileGeneratorError> {
        validate_zoom(zoom)?;
        let store = Arc::clone(self.tiles.store());
        Ok(tokio::task::spawn_blocking(move || store.extent(zoom)).await??)
    }
}
