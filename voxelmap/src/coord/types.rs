//! Coordinate type definitions

use std::fmt;
use thiserror::Error;

/// Edge length of a chunk in blocks (and in base-zoom pixels).
pub const CHUNK_SIZE: i32 = 32;

/// Number of columns in one chunk layer (32×32).
pub const CHUNK_AREA: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;

/// Number of voxels in one 32×32×32 chunk band.
pub const CHUNK_VOLUME: usize = CHUNK_AREA * CHUNK_SIZE as usize;

/// Deepest zoom level a pyramid may use.
pub const MAX_ZOOM: u8 = 20;

/// Pyramid tile coordinates.
///
/// Zoom 0 is the coarsest level. At the base zoom one tile pixel maps to one
/// block column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilePos {
    /// Zoom level (0 = coarsest)
    pub zoom: u8,
    /// Tile column (east-west)
    pub x: i32,
    /// Tile row (north-south)
    pub z: i32,
}

impl TilePos {
    /// Create a new tile position.
    pub const fn new(zoom: u8, x: i32, z: i32) -> Self {
        Self { zoom, x, z }
    }

    /// Key used by the in-memory tile cache, formatted as `zoom_x_z`.
    pub fn cache_key(&self) -> String {
        format!("{}_{}_{}", self.zoom, self.x, self.z)
    }

    /// The four tiles at `zoom + 1` that compose this tile.
    ///
    /// Ordered top-left, top-right, bottom-left, bottom-right.
    pub fn children(&self) -> [TilePos; 4] {
        let zoom = self.zoom + 1;
        let (x, z) = (self.x * 2, self.z * 2);
        [
            TilePos::new(zoom, x, z),
            TilePos::new(zoom, x + 1, z),
            TilePos::new(zoom, x, z + 1),
            TilePos::new(zoom, x + 1, z + 1),
        ]
    }

    /// The tile at `zoom - 1` containing this tile, or `None` at zoom 0.
    pub fn parent(&self) -> Option<TilePos> {
        if self.zoom == 0 {
            return None;
        }
        Some(TilePos::new(
            self.zoom - 1,
            self.x.div_euclid(2),
            self.z.div_euclid(2),
        ))
    }

    /// Iterates the chunk positions covered by this base-zoom tile.
    ///
    /// Chunks are yielded in row-major order.
    pub fn chunks(&self, chunks_per_tile: i32) -> impl Iterator<Item = ChunkPos> {
        let origin_x = self.x * chunks_per_tile;
        let origin_z = self.z * chunks_per_tile;
        (0..chunks_per_tile).flat_map(move |dz| {
            (0..chunks_per_tile).map(move |dx| ChunkPos::new(origin_x + dx, origin_z + dz))
        })
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.z)
    }
}

/// Chunk column coordinates in chunk units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The base-zoom tile containing this chunk.
    #[inline]
    pub fn tile(&self, base_zoom: u8, chunks_per_tile: i32) -> TilePos {
        TilePos::new(
            base_zoom,
            self.x.div_euclid(chunks_per_tile),
            self.z.div_euclid(chunks_per_tile),
        )
    }

    /// World block position of a column inside this chunk at height `y`.
    #[inline]
    pub fn block(&self, local_x: i32, y: i32, local_z: i32) -> BlockPos {
        BlockPos::new(
            self.x * CHUNK_SIZE + local_x,
            y,
            self.z * CHUNK_SIZE + local_z,
        )
    }
}

/// Absolute block position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Bounding rectangle of all tiles persisted at one zoom level.
///
/// `y` is the tile row axis (the world `z` axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileExtent {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl TileExtent {
    /// Create an extent, rejecting inverted bounds.
    pub fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Result<Self, CoordError> {
        if min_x > max_x || min_y > max_y {
            return Err(CoordError::InvertedExtent {
                min_x,
                max_x,
                min_y,
                max_y,
            });
        }
        Ok(Self {
            min_x,
            max_x,
            min_y,
            max_y,
        })
    }

    /// Whether the tile column/row lies inside the extent (inclusive).
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }

    pub fn width(&self) -> u64 {
        (self.max_x as i64 - self.min_x as i64 + 1) as u64
    }

    pub fn height(&self) -> u64 {
        (self.max_y as i64 - self.min_y as i64 + 1) as u64
    }

    /// Number of tile slots covered by the rectangle.
    pub fn tile_count(&self) -> u64 {
        self.width() * self.height()
    }

    /// Target rectangle one zoom level coarser.
    ///
    /// Bounds are halved with floor division, so edge tiles may end up with
    /// some or all of their source quadrants missing.
    pub fn halved(&self) -> TileExtent {
        TileExtent {
            min_x: self.min_x.div_euclid(2),
            max_x: self.max_x.div_euclid(2),
            min_y: self.min_y.div_euclid(2),
            max_y: self.max_y.div_euclid(2),
        }
    }

    /// Iterates every tile slot in row-major order at the given zoom.
    pub fn tiles(&self, zoom: u8) -> impl Iterator<Item = TilePos> {
        let (min_x, max_x) = (self.min_x, self.max_x);
        (self.min_y..=self.max_y)
            .flat_map(move |z| (min_x..=max_x).map(move |x| TilePos::new(zoom, x, z)))
    }
}

/// Errors that can occur building coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    /// Tile size is not a positive multiple of the chunk size
    #[error("Invalid tile size: {0} (must be a positive multiple of {CHUNK_SIZE})")]
    InvalidTileSize(u32),

    /// Zoom level outside the supported range
    #[error("Invalid zoom level: {0} (must be between 0 and {MAX_ZOOM})")]
    InvalidZoom(u8),

    /// Extent bounds are inverted
    #[error("Inverted extent: x {min_x}..{max_x}, y {min_y}..{max_y}")]
    InvertedExtent {
        min_x: i32,
        max_x: i32,
        min_y: i32,
        max_y: i32,
    },
}
