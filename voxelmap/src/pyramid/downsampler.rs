use std::sync::Arc;

use futures::stream::{self, StreamExt};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::{debug, info, warn};

use super::PyramidError;
use crate::coord::TilePos;
use crate::render::{decode_png, encode_png};
use crate::store::TileStore;

/// What happened to one target tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    Written,
    /// No source quadrant existed; nothing was stored.
    Empty,
    /// Decoding or encoding failed; logged and skipped.
    Failed,
}

/// Summary of one generated level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelReport {
    pub zoom: u8,
    pub targets: u64,
    pub written: u64,
    pub empty: u64,
    pub failed: u64,
}

impl LevelReport {
    fn record(&mut self, outcome: TileOutcome) {
        match outcome {
            TileOutcome::Written => self.written += 1,
            TileOutcome::Empty => self.empty += 1,
            TileOutcome::Failed => self.failed += 1,
        }
    }
}

/// Builds pyramid levels from the tile store.
pub struct PyramidDownsampler<T> {
    store: Arc<T>,
    tile_size: u32,
    parallelism: usize,
}

impl<T: TileStore> PyramidDownsampler<T> {
    pub fn new(store: Arc<T>, tile_size: u32, parallelism: usize) -> Self {
        Self {
            store,
            tile_size,
            parallelism: parallelism.max(1),
        }
    }

    /// Generates every level from `base_zoom - 1` down to 0, one level at a
    /// time. Stops early, with a warning, when a level has no source tiles.
    pub async fn generate_all(&self, base_zoom: u8) -> Result<Vec<LevelReport>, PyramidError> {
        let mut reports = Vec::new();
        for zoom in (0..base_zoom).rev() {
            match self.generate_level(zoom, |_| {}).await? {
                Some(report) => reports.push(report),
                None => break,
            }
        }
        Ok(reports)
    }

    /// Generates level `zoom` from level `zoom + 1`.
    ///
    /// Returns `Ok(None)` if the source level is empty. Every write of the
    /// level has completed when this returns. `on_tile` is called once per
    /// target as it finishes. Store failures abort the level.
    pub async fn generate_level<F>(
        &self,
        zoom: u8,
        mut on_tile: F,
    ) -> Result<Option<LevelReport>, PyramidError>
    where
        F: FnMut(TileOutcome) + Send,
    {
        let source_zoom = zoom + 1;
        let Some(source_extent) = self.blocking(move |store| store.extent(source_zoom)).await? else {
            warn!(zoom, source_zoom, "No source tiles, stopping pyramid generation");
            return Ok(None);
        };

        let targets = source_extent.halved();
        let mut report = LevelReport {
            zoom,
            targets: targets.tile_count(),
            ..LevelReport::default()
        };
        info!(zoom, targets = report.targets, "Generating pyramid level");

        let mut results = stream::iter(targets.tiles(zoom))
            .map(|target| {
                let store = Arc::clone(&self.store);
                let tile_size = self.tile_size;
                async move {
                    tokio::task::spawn_blocking(move || downsample_tile(store.as_ref(), target, tile_size))
                        .await
                        .map_err(|e| PyramidError::Join(e.to_string()))?
                }
            })
            .buffer_unordered(self.parallelism);

        while let Some(result) = results.next().await {
            let outcome = result?;
            report.record(outcome);
            on_tile(outcome);
        }

        info!(
            zoom,
            written = report.written,
            empty = report.empty,
            failed = report.failed,
            "Pyramid level complete"
        );
        Ok(Some(report))
    }

    async fn blocking<R, F>(&self, f: F) -> Result<R, PyramidError>
    where
        F: FnOnce(&T) -> Result<R, crate::store::StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| PyramidError::Join(e.to_string()))?;
        Ok(result?)
    }
}

/// Reads, composes and writes one target tile.
fn downsample_tile<T: TileStore + ?Sized>(
    store: &T,
    target: TilePos,
    tile_size: u32,
) -> Result<TileOutcome, PyramidError> {
    let mut quadrants: [Option<RgbaImage>; 4] = Default::default();
    let mut present = 0;

    for (slot, child) in quadrants.iter_mut().zip(target.children()) {
        let Some(bytes) = store.get(child)? else {
            continue;
        };
        match decode_png(&bytes) {
            Ok(image) => {
                *slot = Some(image);
                present += 1;
            }
            Err(e) => {
                warn!(zoom = child.zoom, x = child.x, z = child.z, error = %e, "Unreadable source tile");
            }
        }
    }

    if present == 0 {
        return Ok(TileOutcome::Empty);
    }
    if present < 4 {
        debug!(tile = %target, present, "Downsampling with missing quadrants");
    }

    let Some(composed) = compose_quadrants(quadrants, tile_size) else {
        return Ok(TileOutcome::Empty);
    };
    match encode_png(&composed) {
        Ok(bytes) => {
            store.put(target, &bytes)?;
            Ok(TileOutcome::Written)
        }
        Err(e) => {
            warn!(zoom = target.zoom, x = target.x, z = target.z, error = %e, "Failed to encode tile");
            Ok(TileOutcome::Failed)
        }
    }
}

/// Shrinks up to four quadrant images into one `tile_size` tile.
///
/// Quadrants are ordered top-left, top-right, bottom-left, bottom-right;
/// absent ones stay fully transparent. Returns `None` if all are absent.
pub fn compose_quadrants(quadrants: [Option<RgbaImage>; 4], tile_size: u32) -> Option<RgbaImage> {
    if quadrants.iter().all(Option::is_none) {
        return None;
    }

    let half = tile_size / 2;
    let mut out = RgbaImage::new(tile_size, tile_size);
    let offsets = [(0, 0), (half, 0), (0, half), (half, half)];

    for (quadrant, (ox, oy)) in quadrants.into_iter().zip(offsets) {
        let Some(source) = quadrant else {
            continue;
        };
        let shrunk = imageops::resize(&source, half, half, FilterType::Triangle);
        imageops::replace(&mut out, &shrunk, ox as i64, oy as i64);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTileStore;
    use image::Rgba;

    fn solid(size: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(size, size, Rgba(color))
    }

    fn close(a: Rgba<u8>, b: Rgba<u8>) -> bool {
        a.0.iter().zip(b.0.iter()).all(|(x, y)| x.abs_diff(*y) <= 1)
    }

    #[test]
    fn test_uniform_quadrants_stay_uniform() {
        let c = [90, 140, 30, 255];
        let out = compose_quadrants(
            [Some(solid(64, c)), Some(solid(64, c)), Some(solid(64, c)), Some(solid(64, c))],
            64,
        )
        .unwrap();
        assert!(out.pixels().all(|p| close(*p, Rgba(c))));
    }

    #[test]
    fn test_missing_quadrant_is_transparent() {
        let out = compose_quadrants(
            [
                Some(solid(64, [255, 0, 0, 255])),
                Some(solid(64, [0, 255, 0, 255])),
                Some(solid(64, [0, 0, 255, 255])),
                None,
            ],
            64,
        )
        .unwrap();

        assert!(close(*out.get_pixel(10, 10), Rgba([255, 0, 0, 255])));
        assert!(close(*out.get_pixel(50, 10), Rgba([0, 255, 0, 255])));
        assert!(close(*out.get_pixel(10, 50), Rgba([0, 0, 255, 255])));
        assert_eq!(out.get_pixel(50, 50)[3], 0);
    }

    #[test]
    fn test_no_quadrants_composes_nothing() {
        assert!(compose_quadrants([None, None, None, None], 64).is_none());
    }

    #[tokio::test]
    async fn test_generate_level_from_store() {
        let store = Arc::new(MemoryTileStore::new());
        let png = encode_png(&solid(32, [10, 20, 30, 255])).unwrap();
        for (x, z) in [(0, 0), (1, 0), (2, 1), (3, 3)] {
            store.put(TilePos::new(3, x, z), &png).unwrap();
        }
        let downsampler = PyramidDownsampler::new(Arc::clone(&store), 32, 2);

        let mut seen = 0;
        let report = downsampler.generate_level(2, |_| seen += 1).await.unwrap().unwrap();

        // Source extent x 0..3, y 0..3 halves to 0..1 × 0..1.
        assert_eq!(report.targets, 4);
        assert_eq!(seen, 4);
        assert_eq!(report.written, 3);
        assert_eq!(report.empty, 1);
        assert!(store.contains(TilePos::new(2, 0, 0)).unwrap());
        assert!(!store.contains(TilePos::new(2, 0, 1)).unwrap());
    }

    #[tokio::test]
    async fn test_generate_level_without_source_returns_none() {
        let store = Arc::new(MemoryTileStore::new());
        let downsampler = PyramidDownsampler::new(store, 32, 2);
        assert!(downsampler.generate_level(4, |_| {}).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generate_all_reaches_zoom_zero() {
        let store = Arc::new(MemoryTileStore::new());
        let png = encode_png(&solid(32, [200, 0, 0, 255])).unwrap();
        store.put(TilePos::new(3, 5, 6), &png).unwrap();
        store.put(TilePos::new(3, -1, 0), &png).unwrap();

        let reports = PyramidDownsampler::new(Arc::clone(&store), 32, 4)
            .generate_all(3)
            .await
            .unwrap();

        assert_eq!(reports.iter().map(|r| r.zoom).collect::<Vec<_>>(), vec![2, 1, 0]);
        assert_eq!(store.zoom_levels().unwrap(), vec![0, 1, 2, 3]);
        for zoom in 0..=3 {
            let extent = store.extent(zoom).unwrap().unwrap();
            assert!(extent.min_x <= extent.max_x && extent.min_y <= extent.max_y);
        }
    }
}
