//! Integration tests for tile serving and hot cache coherency across exports.

use std::sync::Arc;
use std::time::Duration;

use image::Rgba;
use voxelmap::chunk::{ChunkSnapshot, DurableChunkSource, MemoryWorldStorage, WorldStorage};
use voxelmap::color::{BlockColorTable, BlockMaterial};
use voxelmap::coord::{ChunkPos, TilePos};
use voxelmap::export::{ExportConfig, ExportOrchestrator};
use voxelmap::render::{decode_png, RenderMode, RenderSettings, TileRenderer};
use voxelmap::store::{CachedTileStore, SqliteTileStore};
use voxelmap::tile::{MapTileGenerator, TileGenerator};

const ROCK: Rgba<u8> = Rgba([110, 110, 110, 255]);
const GRASS: Rgba<u8> = Rgba([90, 130, 60, 255]);
const BASE_ZOOM: u8 = 4;

type Generator = MapTileGenerator<DurableChunkSource<MemoryWorldStorage>, SqliteTileStore>;

fn renderer() -> TileRenderer {
    let colors = BlockColorTable::builder()
        .block(1, "rock", BlockMaterial::Stone, &[ROCK])
        .block(2, "grass", BlockMaterial::Soil, &[GRASS])
        .build();
    TileRenderer::new(
        Arc::new(colors),
        RenderSettings {
            mode: RenderMode::OnlyOneColor,
            tile_size: 32,
            ..RenderSettings::default()
        },
    )
}

fn config() -> ExportConfig {
    ExportConfig {
        base_zoom: BASE_ZOOM,
        parallelism: 2,
        residency_batch_size: 16,
        residency_timeout: Duration::from_secs(1),
        progress_interval: 10,
    }
}

fn pixel(png: &[u8]) -> Rgba<u8> {
    *decode_png(png).unwrap().get_pixel(5, 5)
}

#[tokio::test]
async fn test_reexport_invalidates_hot_cache() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = Arc::new(SqliteTileStore::open(&temp.path().join("tiles.db"), 2).unwrap());
    let tiles = Arc::new(CachedTileStore::new(Arc::clone(&store), 8));
    let world = Arc::new(MemoryWorldStorage::from_snapshots([ChunkSnapshot::uniform(
        ChunkPos::new(0, 0),
        40,
        1,
    )]));
    let source = Arc::new(DurableChunkSource::new(Arc::clone(&world), 32));

    let orchestrator = ExportOrchestrator::new(
        Arc::clone(&source),
        Arc::clone(&store),
        renderer(),
        config(),
    )
    .with_hot_cache(Arc::clone(&tiles));
    let generator: Generator = MapTileGenerator::new(Arc::clone(&tiles), renderer(), BASE_ZOOM);

    orchestrator.run_export().await.unwrap();
    let first = generator.tile(TilePos::new(BASE_ZOOM, 0, 0)).await.unwrap().unwrap();
    assert_eq!(pixel(&first.data), ROCK);

    // Served from the hot cache the second time.
    let again = generator.tile(TilePos::new(BASE_ZOOM, 0, 0)).await.unwrap().unwrap();
    assert_eq!(again.etag, first.etag);
    assert_eq!(generator.cache_stats().hits, 1);

    world
        .store_chunk(&ChunkSnapshot::uniform(ChunkPos::new(0, 0), 40, 2))
        .unwrap();
    orchestrator.run_export().await.unwrap();

    let fresh = generator.tile(TilePos::new(BASE_ZOOM, 0, 0)).await.unwrap().unwrap();
    assert_eq!(pixel(&fresh.data), GRASS);
}

#[tokio::test]
async fn test_pyramid_tiles_served_with_extent() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = Arc::new(SqliteTileStore::open(&temp.path().join("tiles.db"), 2).unwrap());
    let tiles = Arc::new(CachedTileStore::new(Arc::clone(&store), 8));
    let world = Arc::new(MemoryWorldStorage::from_snapshots(
        (0..3).map(|x| ChunkSnapshot::uniform(ChunkPos::new(x, -1), 40, 1)),
    ));
    let source = Arc::new(DurableChunkSource::new(world, 32));

    ExportOrchestrator::new(Arc::clone(&source), Arc::clone(&store), renderer(), config())
        .run_export()
        .await
        .unwrap();

    let generator = MapTileGenerator::new(tiles, renderer(), BASE_ZOOM).with_source(source);

    let base = generator.get_tile_extent(BASE_ZOOM).await.unwrap().unwrap();
    assert_eq!((base.min_x, base.max_x, base.min_y, base.max_y), (0, 2, -1, -1));

    let top = generator.get_tile_extent(0).await.unwrap().unwrap();
    assert_eq!((top.min_x, top.max_x, top.min_y, top.max_y), (0, 0, -1, -1));

    let data = generator.get_tile_data(0, 0, -1).await.unwrap().unwrap();
    assert_eq!(&data[..4], b"\x89PNG");
    assert!(generator.get_tile_data(0, 5, 5).await.unwrap().is_none());
    assert!(generator.get_tile_data(21, 0, 0).await.is_err());
}
