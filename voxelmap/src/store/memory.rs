use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{StoreError, TileStore};
use crate::coord::{TileExtent, TilePos};

/// Tile store held in memory.
///
/// Checkpoint and vacuum are no-ops. Counts how many reads reached it,
/// which tests use to observe hot-cache behavior.
#[derive(Default)]
pub struct MemoryTileStore {
    tiles: RwLock<BTreeMap<TilePos, Vec<u8>>>,
    reads: AtomicU64,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl TileStore for MemoryTileStore {
    fn get(&self, tile: TilePos) -> Result<Option<Vec<u8>>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.tiles.read().get(&tile).cloned())
    }

    fn put(&self, tile: TilePos, data: &[u8]) -> Result<(), StoreError> {
        self.tiles.write().insert(tile, data.to_vec());
        Ok(())
    }

    fn contains(&self, tile: TilePos) -> Result<bool, StoreError> {
        Ok(self.tiles.read().contains_key(&tile))
    }

    fn delete(&self, tile: TilePos) -> Result<bool, StoreError> {
        Ok(self.tiles.write().remove(&tile).is_some())
    }

    fn count(&self, zoom: Option<u8>) -> Result<u64, StoreError> {
        let tiles = self.tiles.read();
        let count = match zoom {
            Some(zoom) => tiles.keys().filter(|t| t.zoom == zoom).count(),
            None => tiles.len(),
        };
        Ok(count as u64)
    }

    fn extent(&self, zoom: u8) -> Result<Option<TileExtent>, StoreError> {
        let tiles = self.tiles.read();
        let mut level = tiles.keys().filter(|t| t.zoom == zoom);
        let Some(first) = level.next() else {
            return Ok(None);
        };
        let (min_x, max_x, min_y, max_y) = level.fold(
            (first.x, first.x, first.z, first.z),
            |(min_x, max_x, min_y, max_y), t| {
                (min_x.min(t.x), max_x.max(t.x), min_y.min(t.z), max_y.max(t.z))
            },
        );
        Ok(Some(TileExtent::new(min_x, max_x, min_y, max_y)?))
    }

    fn zoom_levels(&self) -> Result<Vec<u8>, StoreError> {
        let mut levels: Vec<u8> = self.tiles.read().keys().map(|t| t.zoom).collect();
        levels.dedup();
        Ok(levels)
    }

    fn clear_zoom(&self, zoom: u8) -> Result<u64, StoreError> {
        let mut tiles = self.tiles.write();
        let before = tiles.len();
        tiles.retain(|t, _| t.zoom != zoom);
        Ok((before - tiles.len()) as u64)
    }

    fn checkpoint(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn vacuum(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn size_bytes(&self) -> Result<u64, StoreError> {
        Ok(self.tiles.read().values().map(|d| d.len() as u64).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_extent_and_levels() {
        let store = MemoryTileStore::new();
        store.put(TilePos::new(3, 1, -1), b"a").unwrap();
        store.put(TilePos::new(3, -2, 4), b"b").unwrap();
        store.put(TilePos::new(1, 0, 0), b"c").unwrap();

        let extent = store.extent(3).unwrap().unwrap();
        assert_eq!((extent.min_x, extent.max_x, extent.min_y, extent.max_y), (-2, 1, -1, 4));
        assert_eq!(store.zoom_levels().unwrap(), vec![1, 3]);
        assert_eq!(store.count(Some(3)).unwrap(), 2);

        store.get(TilePos::new(1, 0, 0)).unwrap();
        assert_eq!(store.read_count(), 1);
    }
}
