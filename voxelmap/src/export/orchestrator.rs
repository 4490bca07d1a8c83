use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::progress::ProgressTracker;
use super::{ExportError, ExportProgressCallback, ExportState};
use crate::chunk::ChunkDataSource;
use crate::coord::{chunks_per_tile, tiles_covering, ChunkPos, TileExtent, TilePos};
use crate::pyramid::{PyramidDownsampler, TileOutcome};
use crate::render::TileRenderer;
use crate::store::{CachedTileStore, TileStore};

/// Export tuning.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Finest zoom level, rendered straight from chunks.
    pub base_zoom: u8,
    /// Tiles processed concurrently.
    pub parallelism: usize,
    /// Chunks loaded into residency at once, for sources that need it.
    pub residency_batch_size: usize,
    /// Wait per chunk, counted from the batch's last residency progress,
    /// before a chunk is skipped.
    pub residency_timeout: Duration,
    /// Tiles between progress callbacks.
    pub progress_interval: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_zoom: 9,
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            residency_batch_size: 256,
            residency_timeout: Duration::from_secs(5),
            progress_interval: 100,
        }
    }
}

/// Aggregate result of one export pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Base-zoom tiles rendered and stored.
    pub tiles_rendered: u64,
    /// Base-zoom tiles whose render failed.
    pub tiles_failed: u64,
    /// Base-zoom tiles with nothing to draw.
    pub tiles_empty: u64,
    /// Tiles written by the downsampler across all levels.
    pub pyramid_tiles: u64,
    pub levels_generated: u32,
    pub duration: Duration,
    pub success: bool,
}

impl ExportSummary {
    /// Total tiles written.
    pub fn tiles_processed(&self) -> u64 {
        self.tiles_rendered + self.pyramid_tiles
    }
}

/// Runs full-pyramid exports, one at a time.
pub struct ExportOrchestrator<S, T> {
    source: Arc<S>,
    store: Arc<T>,
    renderer: TileRenderer,
    config: ExportConfig,
    progress: Option<ExportProgressCallback>,
    hot_cache: Option<Arc<CachedTileStore<T>>>,
    cancellation: CancellationToken,
    state: Mutex<ExportState>,
    active: AtomicBool,
}

impl<S: ChunkDataSource, T: TileStore> ExportOrchestrator<S, T> {
    pub fn new(source: Arc<S>, store: Arc<T>, renderer: TileRenderer, config: ExportConfig) -> Self {
        Self {
            source,
            store,
            renderer,
            config,
            progress: None,
            hot_cache: None,
            cancellation: CancellationToken::new(),
            state: Mutex::new(ExportState::Idle),
            active: AtomicBool::new(false),
        }
    }

    pub fn with_progress(mut self, callback: ExportProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Hot cache to flush once an export completes, so served tiles pick up
    /// the new pyramid.
    pub fn with_hot_cache(mut self, cache: Arc<CachedTileStore<T>>) -> Self {
        self.hot_cache = Some(cache);
        self
    }

    /// Token that stops a running export between tiles. Tiles already
    /// written stay in the store; the WAL is not checkpointed.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn state(&self) -> ExportState {
        *self.state.lock()
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Runs one full export pass.
    ///
    /// # Errors
    ///
    /// [`ExportError::AlreadyRunning`] if another pass is active; storage
    /// failures abort the pass and leave the state at `Failed`.
    pub async fn run_export(&self) -> Result<ExportSummary, ExportError> {
        let Some(_guard) = ActiveGuard::acquire(&self.active) else {
            warn!("Export requested while another export is running");
            return Err(ExportError::AlreadyRunning);
        };

        let started = Instant::now();
        let mut summary = ExportSummary::default();
        let result = self.export_pass(&mut summary).await;
        summary.duration = started.elapsed();

        match result {
            Ok(()) => {
                summary.success = true;
                self.transition(ExportState::Completed);
                info!(
                    rendered = summary.tiles_rendered,
                    failed = summary.tiles_failed,
                    empty = summary.tiles_empty,
                    pyramid = summary.pyramid_tiles,
                    levels = summary.levels_generated,
                    duration_ms = summary.duration.as_millis() as u64,
                    "Export complete"
                );
                Ok(summary)
            }
            Err(e) => {
                self.transition(ExportState::Failed);
                error!(error = %e, duration_ms = summary.duration.as_millis() as u64, "Export failed");
                Err(e)
            }
        }
    }

    async fn export_pass(&self, summary: &mut ExportSummary) -> Result<(), ExportError> {
        self.transition(ExportState::Initializing);
        let base_zoom = self.config.base_zoom;
        let cpt = chunks_per_tile(self.renderer.settings().tile_size)?;

        let positions = self.source.chunk_positions().await?;
        if positions.is_empty() {
            warn!(source = self.source.name(), "No chunks found, nothing to export");
            return Ok(());
        }

        let tiles = tiles_covering(&positions, base_zoom, cpt);
        let tracker = ProgressTracker::new(self.progress.clone(), self.config.progress_interval);
        tracker.set_total(estimate_total(&tiles, base_zoom));
        tracker.set_zoom(base_zoom);
        info!(
            chunks = positions.len(),
            tiles = tiles.len(),
            base_zoom,
            source = self.source.name(),
            "Export starting"
        );

        self.transition(ExportState::RenderingBaseZoom);
        if self.source.requires_residency() {
            let by_tile = group_by_tile(&positions, base_zoom, cpt);
            for (batch_tiles, batch_chunks) in residency_batches(&by_tile, self.config.residency_batch_size) {
                self.check_cancelled()?;
                let resident = self
                    .source
                    .load_resident(&batch_chunks, self.config.residency_timeout)
                    .await?;
                debug!(
                    tiles = batch_tiles.len(),
                    requested = batch_chunks.len(),
                    resident = resident.len(),
                    "Residency batch loaded"
                );
                let rendered = self.render_tiles(batch_tiles, &tracker, summary).await;
                self.source.unload_resident(&batch_chunks).await;
                rendered?;
            }
        } else {
            self.render_tiles(tiles, &tracker, summary).await?;
        }
        tracker.emit();

        self.transition(ExportState::GeneratingPyramidLevels);
        let downsampler = PyramidDownsampler::new(
            Arc::clone(&self.store),
            self.renderer.settings().tile_size,
            self.config.parallelism,
        );
        for zoom in (0..base_zoom).rev() {
            self.check_cancelled()?;
            tracker.set_zoom(zoom);
            let Some(report) = downsampler.generate_level(zoom, |_| tracker.advance()).await? else {
                break;
            };
            summary.pyramid_tiles += report.written;
            summary.levels_generated += 1;
        }
        tracker.emit();

        self.transition(ExportState::Checkpointing);
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.checkpoint()).await??;

        if let Some(cache) = &self.hot_cache {
            cache.invalidate_all();
        }
        Ok(())
    }

    /// Renders and stores base-zoom tiles with bounded parallelism.
    async fn render_tiles(
        &self,
        tiles: Vec<TilePos>,
        tracker: &ProgressTracker,
        summary: &mut ExportSummary,
    ) -> Result<(), ExportError> {
        let mut results = stream::iter(tiles)
            .map(|tile| self.render_tile(tile))
            .buffer_unordered(self.config.parallelism.max(1));

        while let Some(result) = results.next().await {
            self.check_cancelled()?;
            match result? {
                TileOutcome::Written => summary.tiles_rendered += 1,
                TileOutcome::Empty => summary.tiles_empty += 1,
                TileOutcome::Failed => summary.tiles_failed += 1,
            }
            tracker.advance();
        }
        Ok(())
    }

    async fn render_tile(&self, tile: TilePos) -> Result<TileOutcome, ExportError> {
        let data = match self.source.tile_chunks(tile).await {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(TileOutcome::Empty),
            Err(e) => {
                warn!(zoom = tile.zoom, x = tile.x, z = tile.z, error = %e, "Failed to read chunks for tile");
                return Ok(TileOutcome::Failed);
            }
        };

        let renderer = self.renderer.clone();
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || -> Result<TileOutcome, ExportError> {
            match renderer.try_render(&data) {
                Ok(Some(png)) => {
                    store.put(tile, &png)?;
                    Ok(TileOutcome::Written)
                }
                Ok(None) => Ok(TileOutcome::Empty),
                Err(e) => {
                    warn!(zoom = tile.zoom, x = tile.x, z = tile.z, error = %e, "Tile render failed");
                    Ok(TileOutcome::Failed)
                }
            }
        })
        .await?
    }

    fn check_cancelled(&self) -> Result<(), ExportError> {
        if self.cancellation.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }

    fn transition(&self, next: ExportState) {
        let mut state = self.state.lock();
        let from = *state;
        debug!(from = %from, to = %next, "Export state change");
        *state = next;
    }
}

/// Clears the active flag when the export future finishes or is dropped.
struct ActiveGuard<'a>(&'a AtomicBool);

impl<'a> ActiveGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Known chunk positions per base-zoom tile.
fn group_by_tile(positions: &[ChunkPos], base_zoom: u8, cpt: i32) -> BTreeMap<TilePos, Vec<ChunkPos>> {
    let mut by_tile: BTreeMap<TilePos, Vec<ChunkPos>> = BTreeMap::new();
    for pos in positions {
        by_tile.entry(pos.tile(base_zoom, cpt)).or_default().push(*pos);
    }
    by_tile
}

/// Splits tiles into residency batches of roughly `batch_size` chunks.
/// A tile is never split across batches.
fn residency_batches(
    by_tile: &BTreeMap<TilePos, Vec<ChunkPos>>,
    batch_size: usize,
) -> Vec<(Vec<TilePos>, Vec<ChunkPos>)> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut tiles = Vec::new();
    let mut chunks: Vec<ChunkPos> = Vec::new();

    for (tile, tile_chunks) in by_tile {
        if !chunks.is_empty() && chunks.len() + tile_chunks.len() > batch_size {
            batches.push((std::mem::take(&mut tiles), std::mem::take(&mut chunks)));
        }
        tiles.push(*tile);
        chunks.extend_from_slice(tile_chunks);
    }
    if !tiles.is_empty() {
        batches.push((tiles, chunks));
    }
    batches
}

/// Base tiles plus the tiles each pyramid level would have if every base
/// tile rendered.
fn estimate_total(tiles: &[TilePos], base_zoom: u8) -> u64 {
    let Some(first) = tiles.first() else {
        return 0;
    };
    let (min_x, max_x, min_y, max_y) = tiles.iter().fold(
        (first.x, first.x, first.z, first.z),
        |(min_x, max_x, min_y, max_y), t| (min_x.min(t.x), max_x.max(t.x), min_y.min(t.z), max_y.max(t.z)),
    );
    let mut extent = TileExtent {
        min_x,
        max_x,
        min_y,
        max_y,
    };
    let mut total = tiles.len() as u64;
    for _ in 0..base_zoom {
        extent = extent.halved();
        total += extent.tile_count();
    }
    total
}
