use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use super::{CachedTile, HotCacheStats, HotTileCache, StoreError, TileStore};
use crate::coord::TilePos;

/// Durable tile store fronted by a [`HotTileCache`].
///
/// Reads consult the hot cache first and populate it on a durable hit.
/// Writes go to the durable store and invalidate the hot entry so the next
/// read sees the new bytes. A durable read that races a write or an
/// invalidation is served but not cached.
pub struct CachedTileStore<T> {
    store: Arc<T>,
    hot: HotTileCache,
}

impl<T: TileStore> CachedTileStore<T> {
    pub fn new(store: Arc<T>, hot_capacity: usize) -> Self {
        Self {
            store,
            hot: HotTileCache::new(hot_capacity),
        }
    }

    pub fn store(&self) -> &Arc<T> {
        &self.store
    }

    /// Hot-cache lookup only; never touches the durable store.
    pub fn cached(&self, tile: TilePos) -> Option<CachedTile> {
        self.hot.get(&tile.cache_key())
    }

    /// Full read path: hot cache, then durable store.
    pub fn get(&self, tile: TilePos) -> Result<Option<CachedTile>, StoreError> {
        if let Some(hit) = self.cached(tile) {
            return Ok(Some(hit));
        }
        self.load(tile)
    }

    /// Reads from the durable store and caches the result.
    pub fn load(&self, tile: TilePos) -> Result<Option<CachedTile>, StoreError> {
        self.hot.record_durable_read();
        let generation = self.hot.generation();
        let Some(data) = self.store.get(tile)? else {
            return Ok(None);
        };
        let cached = CachedTile::new(Bytes::from(data), Utc::now());
        if !self
            .hot
            .insert_if_unchanged(tile.cache_key(), cached.clone(), generation)
        {
            tracing::debug!(tile = %tile, "Tile changed during load, not caching");
        }
        Ok(Some(cached))
    }

    /// Writes through to the durable store.
    pub fn put(&self, tile: TilePos, data: &[u8]) -> Result<(), StoreError> {
        self.store.put(tile, data)?;
        self.hot.remove(&tile.cache_key());
        Ok(())
    }

    /// Drops a tile from the hot cache. Returns whether it was cached.
    pub fn invalidate(&self, tile: TilePos) -> bool {
        self.hot.remove(&tile.cache_key())
    }

    pub fn invalidate_all(&self) {
        self.hot.clear();
    }

    pub fn stats(&self) -> HotCacheStats {
        self.hot.stats()
    }
}
