//! Bounded in-memory tile cache with freshness tags.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Default number of tiles kept hot.
pub const DEFAULT_HOT_CACHE_CAPACITY: usize = 100;

/// Leading bytes folded into the ETag.
const ETAG_SAMPLE_LEN: usize = 32;

/// A tile as served to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTile {
    pub data: Bytes,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

impl CachedTile {
    /// Wraps tile bytes cached at `at`.
    ///
    /// The ETag mixes length, a sample of leading bytes and the caching time.
    /// It is cheap and good enough for revalidation, but it changes every
    /// time the tile is re-cached even if the bytes did not.
    pub fn new(data: Bytes, at: DateTime<Utc>) -> Self {
        let etag = make_etag(&data, at);
        Self {
            data,
            etag,
            last_modified: at,
        }
    }
}

fn make_etag(data: &[u8], at: DateTime<Utc>) -> String {
    // FNV-1a over the sample.
    let sample = data
        .iter()
        .take(ETAG_SAMPLE_LEN)
        .fold(0xcbf2_9ce4_8422_2325u64, |hash, &b| {
            (hash ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        });
    format!("\"{:x}-{:x}-{:x}\"", data.len(), sample, at.timestamp_millis())
}

/// Hot cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HotCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Reads that fell through to the durable store.
    pub durable_reads: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl HotCacheStats {
    /// Hit rate between 0.0 and 1.0.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry {
    tile: CachedTile,
    /// Insertion sequence number; the smallest is evicted first.
    inserted: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
    /// Bumped by every removal so in-flight loads can tell they went stale.
    generation: u64,
    stats: HotCacheStats,
}

impl Inner {
    fn insert(&mut self, key: String, tile: CachedTile, capacity: usize) {
        let inserted = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, Entry { tile, inserted });

        if self.entries.len() > capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
                self.stats.evictions += 1;
                tracing::trace!(key = %oldest, "Evicted hot tile");
            }
        }
    }
}

/// Bounded map from `"zoom_x_z"` to [`CachedTile`].
///
/// When an insert pushes the map over capacity the single oldest insert is
/// evicted. Reads do not refresh an entry's age. A capacity of 0 keeps
/// nothing: every insert is evicted straight away.
pub struct HotTileCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl HotTileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                stats: HotCacheStats {
                    capacity,
                    ..HotCacheStats::default()
                },
                ..Inner::default()
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedTile> {
        let mut inner = self.inner.lock();
        let hit = inner.entries.get(key).map(|e| e.tile.clone());
        if hit.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        hit
    }

    pub fn insert(&self, key: String, tile: CachedTile) {
        self.inner.lock().insert(key, tile, self.capacity);
    }

    /// Current removal generation. Pair with [`insert_if_unchanged`](Self::insert_if_unchanged).
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Inserts only if nothing was removed since `generation` was read.
    /// Returns whether the tile was cached.
    pub fn insert_if_unchanged(&self, key: String, tile: CachedTile, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.insert(key, tile, self.capacity);
        true
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.entries.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn record_durable_read(&self) {
        self.inner.lock().stats.durable_reads += 1;
    }

    pub fn stats(&self) -> HotCacheStats {
        let inner = self.inner.lock();
        HotCacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }
}

impl Default for HotTileCache {
    fn default() -> Self {
        Self::new(DEFAULT_HOT_CACHE_CAPACITY)
    }
}
