//! Immutable per-chunk extraction consumed by the renderer.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use super::SourceError;
use crate::coord::{BlockPos, ChunkPos, CHUNK_AREA, CHUNK_SIZE, CHUNK_VOLUME};

/// Block id of air.
pub const AIR: u32 = 0;

/// Auxiliary per-position record attached to a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEntityPayload {
    /// Chiseled block made of sub-voxels; ids are the constituent materials.
    Microblock { material_ids: Vec<u32> },
    /// Any other block entity; the renderer ignores it.
    Opaque(Vec<u8>),
}

impl BlockEntityPayload {
    /// The constituent block id used to color a microblock.
    pub fn first_material(&self) -> Option<u32> {
        match self {
            BlockEntityPayload::Microblock { material_ids } => material_ids.first().copied(),
            BlockEntityPayload::Opaque(_) => None,
        }
    }
}

/// Read-only snapshot of one chunk column.
///
/// Holds the column height map, the 32³ block-id bands that were extracted
/// (normally just the band containing the surface) and microblock records.
/// Snapshots are created per render call and dropped afterwards.
#[derive(Debug, Clone)]
pub struct ChunkSnapshot {
    pos: ChunkPos,
    height_map: Box<[u16]>,
    bands: BTreeMap<i32, Box<[u32]>>,
    block_entities: HashMap<BlockPos, BlockEntityPayload>,
    is_loaded: bool,
    captured_at: DateTime<Utc>,
}

impl ChunkSnapshot {
    pub fn builder(pos: ChunkPos) -> ChunkSnapshotBuilder {
        ChunkSnapshotBuilder {
            pos,
            height_map: None,
            bands: BTreeMap::new(),
            block_entities: HashMap::new(),
            is_loaded: true,
            captured_at: None,
        }
    }

    /// A flat chunk: every column at `height` with `block_id` filling the
    /// whole band that contains the surface.
    pub fn uniform(pos: ChunkPos, height: u16, block_id: u32) -> Self {
        let band = height as i32 / CHUNK_SIZE;
        Self {
            pos,
            height_map: vec![height; CHUNK_AREA].into_boxed_slice(),
            bands: BTreeMap::from([(band, vec![block_id; CHUNK_VOLUME].into_boxed_slice())]),
            block_entities: HashMap::new(),
            is_loaded: true,
            captured_at: Utc::now(),
        }
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Raw height map, indexed `z * 32 + x`.
    pub fn height_map(&self) -> &[u16] {
        &self.height_map
    }

    /// Surface height of a local column.
    #[inline]
    pub fn height_at(&self, x: i32, z: i32) -> u16 {
        self.height_map[column_index(x, z)]
    }

    /// Extracted bands, keyed by band index (`y / 32`).
    pub fn bands(&self) -> impl Iterator<Item = (i32, &[u32])> {
        self.bands.iter().map(|(band, ids)| (*band, &ids[..]))
    }

    /// Block id at a local column and absolute height.
    ///
    /// Heights in bands that were not extracted read as [`AIR`].
    #[inline]
    pub fn block_at(&self, x: i32, y: i32, z: i32) -> u32 {
        if y < 0 {
            return AIR;
        }
        let band = y / CHUNK_SIZE;
        match self.bands.get(&band) {
            Some(ids) => ids[voxel_index(x, y % CHUNK_SIZE, z)],
            None => AIR,
        }
    }

    pub fn block_entity(&self, pos: &BlockPos) -> Option<&BlockEntityPayload> {
        self.block_entities.get(pos)
    }

    pub fn block_entities(&self) -> impl Iterator<Item = (&BlockPos, &BlockEntityPayload)> {
        self.block_entities.iter()
    }
}

/// Builder validating array sizes before a snapshot exists.
#[derive(Debug)]
pub struct ChunkSnapshotBuilder {
    pos: ChunkPos,
    height_map: Option<Vec<u16>>,
    bands: BTreeMap<i32, Vec<u32>>,
    block_entities: HashMap<BlockPos, BlockEntityPayload>,
    is_loaded: bool,
    captured_at: Option<DateTime<Utc>>,
}

impl ChunkSnapshotBuilder {
    pub fn height_map(mut self, heights: Vec<u16>) -> Self {
        self.height_map = Some(heights);
        self
    }

    pub fn band(mut self, band: i32, block_ids: Vec<u32>) -> Self {
        self.bands.insert(band, block_ids);
        self
    }

    pub fn block_entity(mut self, pos: BlockPos, payload: BlockEntityPayload) -> Self {
        self.block_entities.insert(pos, payload);
        self
    }

    pub fn loaded(mut self, is_loaded: bool) -> Self {
        self.is_loaded = is_loaded;
        self
    }

    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    pub fn build(self) -> Result<ChunkSnapshot, SourceError> {
        let height_map = self.height_map.unwrap_or_else(|| vec![0; CHUNK_AREA]);
        if height_map.len() != CHUNK_AREA {
            return Err(SourceError::InvalidSnapshot {
                pos: self.pos,
                reason: format!(
                    "height map has {} entries, expected {}",
                    height_map.len(),
                    CHUNK_AREA
                ),
            });
        }

        let mut bands = BTreeMap::new();
        for (band, ids) in self.bands {
            if band < 0 || ids.len() != CHUNK_VOLUME {
                return Err(SourceError::InvalidSnapshot {
                    pos: self.pos,
                    reason: format!(
                        "band {} has {} block ids, expected {}",
                        band,
                        ids.len(),
                        CHUNK_VOLUME
                    ),
                });
            }
            bands.insert(band, ids.into_boxed_slice());
        }

        Ok(ChunkSnapshot {
            pos: self.pos,
            height_map: height_map.into_boxed_slice(),
            bands,
            block_entities: self.block_entities,
            is_loaded: self.is_loaded,
            captured_at: self.captured_at.unwrap_or_else(Utc::now),
        })
    }
}

/// Index into a 32×32 column array.
#[inline]
pub fn column_index(x: i32, z: i32) -> usize {
    (z * CHUNK_SIZE + x) as usize
}

/// Index into a 32³ band, `y` relative to the band.
#[inline]
pub fn voxel_index(x: i32, y: i32, z: i32) -> usize {
    ((y * CHUNK_SIZE + z) * CHUNK_SIZE + x) as usize
}
