use std::path::Path;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};

use super::{StoreError, TileStore};
use crate::coord::{TileExtent, TilePos};
use crate::db::{JournalOptions, SqlitePool};

const TILE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tiles (
    zoom       INTEGER NOT NULL,
    x          INTEGER NOT NULL,
    z          INTEGER NOT NULL,
    data       BLOB    NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (zoom, x, z)
) WITHOUT ROWID;
";

/// Tile store backed by one SQLite file in WAL mode.
///
/// Automatic checkpointing is disabled; the WAL grows until
/// [`TileStore::checkpoint`] runs.
pub struct SqliteTileStore {
    pool: SqlitePool,
}

impl SqliteTileStore {
    /// Opens or creates the tile database, creating parent directories.
    pub fn open(path: &Path, readers: usize) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let pool = SqlitePool::open(
            path,
            readers,
            JournalOptions {
                auto_checkpoint: false,
            },
            |conn| conn.execute_batch(TILE_SCHEMA),
        )?;
        debug!(path = %path.display(), readers, "Opened tile store");
        Ok(Self { pool })
    }

    pub fn path(&self) -> &Path {
        self.pool.path()
    }
}

impl TileStore for SqliteTileStore {
    fn get(&self, tile: TilePos) -> Result<Option<Vec<u8>>, StoreError> {
        let data = self.pool.read(|conn| {
            conn.prepare_cached("SELECT data FROM tiles WHERE zoom = ?1 AND x = ?2 AND z = ?3")?
                .query_row(params![tile.zoom, tile.x, tile.z], |row| row.get(0))
                .optional()
        })?;
        Ok(data)
    }

    fn put(&self, tile: TilePos, data: &[u8]) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        self.pool.write(|conn| {
            conn.prepare_cached(
                "INSERT INTO tiles (zoom, x, z, data, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (zoom, x, z) DO UPDATE
                 SET data = excluded.data, updated_at = excluded.updated_at",
            )?
            .execute(params![tile.zoom, tile.x, tile.z, data, now])
        })?;
        Ok(())
    }

    fn contains(&self, tile: TilePos) -> Result<bool, StoreError> {
        let found = self.pool.read(|conn| {
            conn.prepare_cached("SELECT 1 FROM tiles WHERE zoom = ?1 AND x = ?2 AND z = ?3")?
                .exists(params![tile.zoom, tile.x, tile.z])
        })?;
        Ok(found)
    }

    fn delete(&self, tile: TilePos) -> Result<bool, StoreError> {
        let removed = self.pool.write(|conn| {
            conn.prepare_cached("DELETE FROM tiles WHERE zoom = ?1 AND x = ?2 AND z = ?3")?
                .execute(params![tile.zoom, tile.x, tile.z])
        })?;
        Ok(removed > 0)
    }

    fn count(&self, zoom: Option<u8>) -> Result<u64, StoreError> {
        let count: i64 = self.pool.read(|conn| match zoom {
            Some(zoom) => conn
                .prepare_cached("SELECT COUNT(*) FROM tiles WHERE zoom = ?1")?
                .query_row([zoom], |row| row.get(0)),
            None => conn
                .prepare_cached("SELECT COUNT(*) FROM tiles")?
                .query_row([], |row| row.get(0)),
        })?;
        Ok(count.max(0) as u64)
    }

    fn extent(&self, zoom: u8) -> Result<Option<TileExtent>, StoreError> {
        let bounds: (Option<i32>, Option<i32>, Option<i32>, Option<i32>) =
            self.pool.read(|conn| {
                conn.prepare_cached(
                    "SELECT MIN(x), MAX(x), MIN(z), MAX(z) FROM tiles WHERE zoom = ?1",
                )?
                .query_row([zoom], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            })?;

        match bounds {
            (Some(min_x), Some(max_x), Some(min_y), Some(max_y)) => {
                Ok(Some(TileExtent::new(min_x, max_x, min_y, max_y)?))
            }
            _ => Ok(None),
        }
    }

    fn zoom_levels(&self) -> Result<Vec<u8>, StoreError> {
        let levels = self.pool.read(|conn| {
            let mut stmt = conn.prepare_cached("SELECT DISTINCT zoom FROM tiles ORDER BY zoom")?;
            let rows = stmt.query_map([], |row| row.get::<_, u8>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        Ok(levels)
    }

    fn clear_zoom(&self, zoom: u8) -> Result<u64, StoreError> {
        let removed = self.pool.write(|conn| {
            conn.prepare_cached("DELETE FROM tiles WHERE zoom = ?1")?
                .execute([zoom])
        })?;
        info!(zoom, removed, "Cleared zoom level");
        Ok(removed as u64)
    }

    fn checkpoint(&self) -> Result<(), StoreError> {
        let (busy, log_frames, checkpointed): (i64, i64, i64) = self.pool.write(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
        })?;
        if busy != 0 {
            warn!(log_frames, checkpointed, "WAL checkpoint could not complete, readers still active");
        } else {
            info!(log_frames, checkpointed, "WAL checkpoint complete");
        }
        Ok(())
    }

    fn vacuum(&self) -> Result<(), StoreError> {
        let before = self.pool.size_bytes()?;
        self.pool.write(|conn| conn.execute_batch("VACUUM"))?;
        let after = self.pool.size_bytes()?;
        info!(before, after, "Tile store vacuumed");
        Ok(())
    }

    fn size_bytes(&self) -> Result<u64, StoreError> {
        Ok(self.pool.size_bytes()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, SqliteTileStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteTileStore::open(&dir.path().join("tiles/map.db"), 2).unwrap();
        (dir, store)
    }

    #[test]
    fn test_sqlite_store_put_get_upsert() {
        let (_dir, store) = open();
        let tile = TilePos::new(9, -3, 4);

        assert!(store.get(tile).unwrap().is_none());
        store.put(tile, b"first").unwrap();
        store.put(tile, b"second").unwrap();

        assert_eq!(store.get(tile).unwrap().as_deref(), Some(&b"second"[..]));
        assert_eq!(store.count(None).unwrap(), 1);
        assert!(store.contains(tile).unwrap());
    }

    #[test]
    fn test_sqlite_store_count_and_extent_by_zoom() {
        let (_dir, store) = open();
        for (x, z) in [(-2, 5), (3, 1), (0, -4)] {
            store.put(TilePos::new(9, x, z), b"t").unwrap();
        }
        store.put(TilePos::new(8, 100, 100), b"t").unwrap();

        assert_eq!(store.count(Some(9)).unwrap(), 3);
        assert_eq!(store.count(Some(8)).unwrap(), 1);
        assert_eq!(store.count(None).unwrap(), 4);

        let extent = store.extent(9).unwrap().unwrap();
        assert_eq!((extent.min_x, extent.max_x), (-2, 3));
        assert_eq!((extent.min_y, extent.max_y), (-4, 5));
        assert!(store.extent(7).unwrap().is_none());
        assert_eq!(store.zoom_levels().unwrap(), vec![8, 9]);
    }

    #[test]
    fn test_sqlite_store_delete_and_clear() {
        let (_dir, store) = open();
        store.put(TilePos::new(2, 0, 0), b"a").unwrap();
        store.put(TilePos::new(2, 1, 0), b"b").unwrap();
        store.put(TilePos::new(3, 0, 0), b"c").unwrap();

        assert!(store.delete(TilePos::new(2, 0, 0)).unwrap());
        assert!(!store.delete(TilePos::new(2, 0, 0)).unwrap());
        assert_eq!(store.clear_zoom(2).unwrap(), 1);
        assert_eq!(store.zoom_levels().unwrap(), vec![3]);
    }

    #[test]
    fn test_sqlite_store_checkpoint_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("map.db");
        {
            let store = SqliteTileStore::open(&path, 1).unwrap();
            store.put(TilePos::new(1, 0, 0), &[7; 512]).unwrap();
            store.checkpoint().unwrap();
            store.vacuum().unwrap();
            assert!(store.size_bytes().unwrap() > 0);
        }
        let store = SqliteTileStore::open(&path, 1).unwrap();
        assert_eq!(store.get(TilePos::new(1, 0, 0)).unwrap(), Some(vec![7; 512]));
    }
}
