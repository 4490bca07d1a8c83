//! Integration tests for the export pipeline.
//!
//! These tests run whole export passes against real stores:
//! - empty worlds
//! - SQLite tile store persistence and extent nesting
//! - concurrent run rejection
//! - live (residency-limited) source against the durable source

use std::sync::Arc;
use std::time::Duration;

use image::Rgba;
use tokio_util::sync::CancellationToken;
use voxelmap::chunk::{
    ChunkDataSource, ChunkSnapshot, DurableChunkSource, LiveChunkSource, MemoryWorldStorage,
    ResidentWorld, SimulationThread, SourceError, StorageBackedWorld, TileChunkData, WorldStorage,
};
use voxelmap::color::{BlockColorTable, BlockMaterial};
use voxelmap::coord::{ChunkPos, TilePos};
use voxelmap::export::{ExportConfig, ExportError, ExportOrchestrator, ExportProgress, ExportState};
use voxelmap::render::{decode_png, RenderMode, RenderSettings, TileRenderer};
use voxelmap::store::{MemoryTileStore, SqliteTileStore, TileStore};

// =============================================================================
// Test Helpers
// =============================================================================

const STONE: Rgba<u8> = Rgba([110, 110, 110, 255]);
const TILE_SIZE: u32 = 64;
const BASE_ZOOM: u8 = 3;

fn renderer(mode: RenderMode) -> TileRenderer {
    let colors = BlockColorTable::builder()
        .block(1, "rock", BlockMaterial::Stone, &[STONE, Rgba([120, 118, 116, 255])])
        .block(2, "grass", BlockMaterial::Soil, &[Rgba([90, 130, 60, 255])])
        .build();
    TileRenderer::new(
        Arc::new(colors),
        RenderSettings {
            mode,
            tile_size: TILE_SIZE,
            ..RenderSettings::default()
        },
    )
}

fn config() -> ExportConfig {
    ExportConfig {
        base_zoom: BASE_ZOOM,
        parallelism: 4,
        residency_batch_size: 4,
        residency_timeout: Duration::from_secs(5),
        progress_interval: 1,
    }
}

/// 8 × 4 chunks of stone at varying heights: 4 × 2 base tiles.
fn world() -> Arc<MemoryWorldStorage> {
    Arc::new(MemoryWorldStorage::from_snapshots((0..4).flat_map(|z| {
        (0..8).map(move |x| ChunkSnapshot::uniform(ChunkPos::new(x, z), 60 + (x * 3 + z) as u16, 1))
    })))
}

/// Chunk source whose enumeration stalls, so an export stays in flight.
struct SlowSource {
    inner: DurableChunkSource<MemoryWorldStorage>,
    delay: Duration,
}

impl ChunkDataSource for SlowSource {
    fn name(&self) -> &str {
        "slow"
    }

    async fn tile_chunks(&self, tile: TilePos) -> Result<Option<TileChunkData>, SourceError> {
        self.inner.tile_chunks(tile).await
    }

    async fn chunk_positions(&self) -> Result<Vec<ChunkPos>, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.chunk_positions().await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_empty_world_exports_nothing() {
    let source = Arc::new(DurableChunkSource::new(
        Arc::new(MemoryWorldStorage::new()),
        TILE_SIZE,
    ));
    let store = Arc::new(MemoryTileStore::new());
    let orchestrator = ExportOrchestrator::new(
        source,
        Arc::clone(&store),
        renderer(RenderMode::OnlyOneColor),
        config(),
    );

    let summary = orchestrator.run_export().await.unwrap();

    assert!(summary.success);
    assert_eq!(summary.tiles_processed(), 0);
    assert_eq!(summary.pyramid_tiles, 0);
    assert_eq!(store.count(None).unwrap(), 0);
    assert_eq!(orchestrator.state(), ExportState::Completed);
}

#[tokio::test]
async fn test_full_export_to_sqlite_store() {
    let temp = tempfile::TempDir::new().unwrap();
    let db_path = temp.path().join("tiles.db");
    let store = Arc::new(SqliteTileStore::open(&db_path, 4).unwrap());
    let source = Arc::new(DurableChunkSource::new(world(), TILE_SIZE));

    let progress = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = Arc::clone(&progress);
    let orchestrator = ExportOrchestrator::new(
        source,
        Arc::clone(&store),
        renderer(RenderMode::ColorVariationsWithHillShading),
        config(),
    )
    .with_progress(Arc::new(move |p: ExportProgress| seen.lock().push(p.tiles_completed)));

    let summary = orchestrator.run_export().await.unwrap();

    assert!(summary.success);
    assert_eq!(summary.tiles_rendered, 8);
    assert_eq!(summary.tiles_failed, 0);
    assert_eq!(summary.levels_generated, BASE_ZOOM as u32);
    // Zoom 2: 2 × 1, zoom 1: 1, zoom 0: 1.
    assert_eq!(summary.pyramid_tiles, 4);
    assert_eq!(orchestrator.state(), ExportState::Completed);

    // Progress never moves backwards.
    let progress = progress.lock();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    // Every coarser extent sits inside the halved finer one.
    for zoom in 0..BASE_ZOOM {
        let finer = store.extent(zoom + 1).unwrap().unwrap().halved();
        let coarser = store.extent(zoom).unwrap().unwrap();
        assert!(finer.contains(coarser.min_x, coarser.min_y));
        assert!(finer.contains(coarser.max_x, coarser.max_y));
    }
    assert_eq!(store.count(Some(0)).unwrap(), 1);

    // Everything is readable from a fresh connection after the checkpoint.
    drop(orchestrator);
    drop(store);
    let reopened = SqliteTileStore::open(&db_path, 1).unwrap();
    assert_eq!(reopened.count(Some(BASE_ZOOM)).unwrap(), 8);
    let top = reopened.get(TilePos::new(0, 0, 0)).unwrap().unwrap();
    let image = decode_png(&top).unwrap();
    assert_eq!(image.dimensions(), (TILE_SIZE, TILE_SIZE));
}

#[tokio::test]
async fn test_concurrent_export_is_rejected() {
    let source = Arc::new(SlowSource {
        inner: DurableChunkSource::new(world(), TILE_SIZE),
        delay: Duration::from_millis(200),
    });
    let store = Arc::new(MemoryTileStore::new());
    let orchestrator =
        ExportOrchestrator::new(source, store, renderer(RenderMode::OnlyOneColor), config());

    let (first, second) = tokio::join!(orchestrator.run_export(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        orchestrator.run_export().await
    });

    assert!(first.unwrap().success);
    assert!(matches!(second, Err(ExportError::AlreadyRunning)));

    // The flag is released once the first run finishes.
    assert!(orchestrator.run_export().await.is_ok());
}

#[tokio::test]
async fn test_live_export_matches_durable_export() {
    let storage = world();

    let durable_store = Arc::new(MemoryTileStore::new());
    ExportOrchestrator::new(
        Arc::new(DurableChunkSource::new(Arc::clone(&storage), TILE_SIZE)),
        Arc::clone(&durable_store),
        renderer(RenderMode::ColorVariationsWithHillShading),
        config(),
    )
    .run_export()
    .await
    .unwrap();

    let sim_storage = Arc::clone(&storage);
    let simulation = SimulationThread::spawn(
        move || StorageBackedWorld::new(sim_storage, 16),
        Duration::from_millis(2),
    )
    .unwrap();
    let live = LiveChunkSource::new(simulation.handle(), Arc::clone(&storage), TILE_SIZE)
        .with_poll_interval(Duration::from_millis(2));
    let live_store = Arc::new(MemoryTileStore::new());
    let summary = ExportOrchestrator::new(
        Arc::new(live),
        Arc::clone(&live_store),
        renderer(RenderMode::ColorVariationsWithHillShading),
        config(),
    )
    .run_export()
    .await
    .unwrap();

    assert_eq!(summary.tiles_rendered, 8);
    for tile in durable_store.extent(BASE_ZOOM).unwrap().unwrap().tiles(BASE_ZOOM) {
        assert_eq!(
            durable_store.get(tile).unwrap(),
            live_store.get(tile).unwrap(),
            "tile {} differs between sources",
            tile
        );
    }

    // Residency batches are released after rendering.
    let positions: Vec<ChunkPos> = storage.chunk_positions().unwrap();
    let still_resident = simulation
        .handle()
        .run(move |world| positions.iter().filter(|p| world.is_resident(**p)).count())
        .await
        .unwrap();
    assert_eq!(still_resident, 0);
    simulation.shutdown();
}

#[tokio::test]
async fn test_only_one_color_tile_is_solid() {
    let store = Arc::new(MemoryTileStore::new());
    let storage = Arc::new(MemoryWorldStorage::from_snapshots(
        (0..2).flat_map(|z| (0..2).map(move |x| ChunkSnapshot::uniform(ChunkPos::new(x, z), 100, 1))),
    ));
    ExportOrchestrator::new(
        Arc::new(DurableChunkSource::new(storage, TILE_SIZE)),
        Arc::clone(&store),
        renderer(RenderMode::OnlyOneColor),
        config(),
    )
    .run_export()
    .await
    .unwrap();

    let png = store.get(TilePos::new(BASE_ZOOM, 0, 0)).unwrap().unwrap();
    let image = decode_png(&png).unwrap();
    assert!(image.pixels().all(|p| *p == STONE));
}

#[tokio::test]
async fn test_cancelled_export_fails() {
    let token = CancellationToken::new();
    token.cancel();
    let orchestrator = ExportOrchestrator::new(
        Arc::new(DurableChunkSource::new(world(), TILE_SIZE)),
        Arc::new(MemoryTileStore::new()),
        renderer(RenderMode::OnlyOneColor),
        config(),
    )
    .with_cancellation(token);

    let result = orchestrator.run_export().await;

    assert!(matches!(result, Err(ExportError::Cancelled)));
    assert_eq!(orchestrator.state(), ExportState::Failed);
}
