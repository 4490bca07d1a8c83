//! Durable world storage: where persisted chunk columns live.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;
use rusqlite::{params, OptionalExtension};

use super::codec::{decode_chunk, encode_chunk};
use super::{ChunkSnapshot, SourceError};
use crate::coord::ChunkPos;
use crate::db::{JournalOptions, SqlitePool};

/// Keyed chunk persistence.
///
/// Implementations are synchronous and safe to call from any thread; async
/// callers wrap them in `spawn_blocking`.
pub trait WorldStorage: Send + Sync + 'static {
    /// Every stored chunk position, in ascending order.
    fn chunk_positions(&self) -> Result<Vec<ChunkPos>, SourceError>;

    /// Loads one chunk, `Ok(None)` if it was never stored.
    fn load_chunk(&self, pos: ChunkPos) -> Result<Option<ChunkSnapshot>, SourceError>;

    /// Inserts or replaces one chunk.
    fn store_chunk(&self, snapshot: &ChunkSnapshot) -> Result<(), SourceError>;
}

// =============================================================================
// SQLite
// =============================================================================

const WORLD_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunk_columns (
    x    INTEGER NOT NULL,
    z    INTEGER NOT NULL,
    data BLOB    NOT NULL,
    PRIMARY KEY (x, z)
) WITHOUT ROWID;
";

/// World storage in an SQLite file, one blob per chunk column.
pub struct SqliteWorldStorage {
    pool: SqlitePool,
}

impl SqliteWorldStorage {
    /// Opens or creates the world database with `readers` concurrent reader
    /// connections.
    pub fn open(path: &Path, readers: usize) -> Result<Self, SourceError> {
        let pool = SqlitePool::open(
            path,
            readers,
            JournalOptions {
                auto_checkpoint: true,
            },
            |conn| conn.execute_batch(WORLD_SCHEMA),
        )?;
        tracing::debug!(path = %path.display(), "Opened world storage");
        Ok(Self { pool })
    }
}

impl WorldStorage for SqliteWorldStorage {
    fn chunk_positions(&self) -> Result<Vec<ChunkPos>, SourceError> {
        let positions = self.pool.read(|conn| {
            let mut stmt = conn.prepare_cached("SELECT x, z FROM chunk_columns ORDER BY x, z")?;
            let rows = stmt.query_map([], |row| Ok(ChunkPos::new(row.get(0)?, row.get(1)?)))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        Ok(positions)
    }

    fn load_chunk(&self, pos: ChunkPos) -> Result<Option<ChunkSnapshot>, SourceError> {
        let blob: Option<Vec<u8>> = self.pool.read(|conn| {
            conn.prepare_cached("SELECT data FROM chunk_columns WHERE x = ?1 AND z = ?2")?
                .query_row(params![pos.x, pos.z], |row| row.get(0))
                .optional()
        })?;
        blob.map(|data| decode_chunk(pos, &data)).transpose()
    }

    fn store_chunk(&self, snapshot: &ChunkSnapshot) -> Result<(), SourceError> {
        let pos = snapshot.pos();
        let data = encode_chunk(snapshot);
        self.pool.write(|conn| {
            conn.prepare_cached(
                "INSERT INTO chunk_columns (x, z, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT (x, z) DO UPDATE SET data = excluded.data",
            )?
            .execute(params![pos.x, pos.z, &data[..]])
        })?;
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// World storage held in memory. Used by tests and by tools that generate
/// worlds on the fly.
#[derive(Default)]
pub struct MemoryWorldStorage {
    chunks: RwLock<BTreeMap<ChunkPos, ChunkSnapshot>>,
}

impl MemoryWorldStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshots(snapshots: impl IntoIterator<Item = ChunkSnapshot>) -> Self {
        let chunks = snapshots.into_iter().map(|s| (s.pos(), s)).collect();
        Self {
            chunks: RwLock::new(chunks),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }
}

impl WorldStorage for MemoryWorldStorage {
    fn chunk_positions(&self) -> Result<Vec<ChunkPos>, SourceError> {
        Ok(self.chunks.read().keys().copied().collect())
    }

    fn load_chunk(&self, pos: ChunkPos) -> Result<Option<ChunkSnapshot>, SourceError> {
        Ok(self.chunks.read().get(&pos).cloned())
    }

    fn store_chunk(&self, snapshot: &ChunkSnapshot) -> Result<(), SourceError> {
        self.chunks.write().insert(snapshot.pos(), snapshot.clone());
        Ok(())
    }
}
