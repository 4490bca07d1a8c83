use crate::color::BlockColorResolver;
use crate::coord::CHUNK_SIZE;

/// Whether a lake column borders non-lake material.
///
/// `surface` yields the resolved surface block of a neighbor column, the
/// same block the neighbor's pixel is drawn from. Columns on the chunk
/// border count as open water: their neighbors would live in another chunk.
pub(crate) fn is_water_edge(
    colors: &dyn BlockColorResolver,
    x: i32,
    z: i32,
    surface: impl Fn(i32, i32) -> u32,
) -> bool {
    if x == 0 || z == 0 || x == CHUNK_SIZE - 1 || z == CHUNK_SIZE - 1 {
        return false;
    }
    [(0, -1), (0, 1), (-1, 0), (1, 0)]
        .into_iter()
        .any(|(dx, dz)| !colors.is_lake(surface(x + dx, z + dz)))
}
