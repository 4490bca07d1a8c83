use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use super::shading::{self, slope_boost, ShadowBuffer};
use super::water::is_water_edge;
use super::{encode_png, RenderError, RenderMode, RenderSettings, MICROBLOCK_MARKER};
use crate::chunk::{ChunkSnapshot, TileChunkData, AIR};
use crate::color::{BlockColorResolver, BlockMaterial};
use crate::coord::{TilePos, CHUNK_SIZE};
use crate::panic::panic_message;

/// What a surface column resolved to.
enum Surface {
    Block(u32),
    /// Microblock without an override record.
    Fallback,
}

/// Renders base-zoom tiles from chunk snapshots.
///
/// Stateless between calls: each render owns its image, shadow buffer and
/// RNG, so one renderer can be shared by any number of workers.
#[derive(Clone)]
pub struct TileRenderer {
    colors: Arc<dyn BlockColorResolver>,
    settings: RenderSettings,
}

impl TileRenderer {
    pub fn new(colors: Arc<dyn BlockColorResolver>, settings: RenderSettings) -> Self {
        Self { colors, settings }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Renders and encodes a tile, logging any failure.
    ///
    /// Returns `None` when nothing was drawn or the render failed; a failed
    /// tile is never handed out half-drawn.
    pub fn render(&self, data: &TileChunkData) -> Option<Vec<u8>> {
        match self.try_render(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                let tile = data.tile();
                warn!(zoom = tile.zoom, x = tile.x, z = tile.z, error = %e, "Tile render failed");
                None
            }
        }
    }

    /// Renders and encodes a tile. Panics inside the rasterizer are caught
    /// and reported as [`RenderError::Panicked`].
    pub fn try_render(&self, data: &TileChunkData) -> Result<Option<Vec<u8>>, RenderError> {
        let image = catch_unwind(AssertUnwindSafe(|| self.render_image(data))).map_err(|payload| {
            RenderError::Panicked {
                tile: data.tile(),
                message: panic_message(payload),
            }
        })??;

        image.map(|img| encode_png(&img)).transpose()
    }

    /// Rasterizes a tile without encoding it.
    pub fn render_image(&self, data: &TileChunkData) -> Result<Option<RgbaImage>, RenderError> {
        let settings = &self.settings;
        if data.tile_size() != settings.tile_size {
            return Err(RenderError::TileSizeMismatch {
                tile: data.tile(),
                expected: settings.tile_size,
                actual: data.tile_size(),
            });
        }

        let size = settings.tile_size as usize;
        let mut image = RgbaImage::new(settings.tile_size, settings.tile_size);
        let mut shadows = settings.mode.uses_hill_shading().then(|| ShadowBuffer::new(size));
        let mut rng = ChaCha8Rng::seed_from_u64(tile_seed(data.tile()));

        let origin = data.origin();
        let mut drawn = 0usize;

        // Fixed row-major order keeps the RNG sequence reproducible.
        for pos in data.tile().chunks(data.chunks_per_tile()) {
            let Some(chunk) = data.get(&pos) else {
                continue;
            };
            let offset_x = ((pos.x - origin.x) * CHUNK_SIZE) as usize;
            let offset_z = ((pos.z - origin.z) * CHUNK_SIZE) as usize;

            let mut canvas = Canvas {
                pixels: &mut image,
                shadows: shadows.as_mut(),
                size,
                offset_x,
                offset_z,
            };
            if self.draw_chunk(chunk, &mut canvas, &mut rng) {
                drawn += 1;
            }
        }

        if drawn == 0 {
            return Ok(None);
        }
        if drawn < data.expected_len() {
            debug!(tile = %data.tile(), drawn, expected = data.expected_len(), "Rendered partial tile");
        }

        if let Some(shadows) = shadows {
            let adjustments = shadows.adjustments(settings.blur_radius as usize, settings.sharpen);
            shading::apply(&mut image, &adjustments);
        }

        Ok(Some(image))
    }

    /// Draws one chunk. Returns whether any pixel was drawn.
    fn draw_chunk(&self, chunk: &ChunkSnapshot, canvas: &mut Canvas<'_>, rng: &mut ChaCha8Rng) -> bool {
        let colors = self.colors.as_ref();
        let mode = self.settings.mode;
        let mut any = false;

        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let height = self.height(chunk, x, z);
                let (block, height_offset) = self.resolve_block(chunk, x, height, z);
                let surface_y = height - height_offset;

                let surface = if colors.is_microblock(block) {
                    let override_pos = chunk.pos().block(x, surface_y, z);
                    match chunk.block_entity(&override_pos).and_then(|p| p.first_material()) {
                        Some(material) => Surface::Block(material),
                        None => Surface::Fallback,
                    }
                } else {
                    Surface::Block(block)
                };

                let (color, lake) = match surface {
                    Surface::Block(AIR) => continue,
                    Surface::Block(id) => (self.block_color(chunk, x, z, surface_y, id, rng), colors.is_lake(id)),
                    Surface::Fallback if mode.is_medieval() => (colors.land_color(), false),
                    Surface::Fallback => (MICROBLOCK_MARKER, false),
                };

                canvas.put(x, z, color);
                any = true;

                if let Some(shadows) = canvas.shadows.as_deref_mut() {
                    if !(mode.is_medieval() && lake) {
                        let boost = self.slope_boost(chunk, x, z, surface_y);
                        shadows.set(canvas.offset_x + x as usize, canvas.offset_z + z as usize, boost);
                    }
                }
            }
        }
        any
    }

    #[inline]
    fn height(&self, chunk: &ChunkSnapshot, x: i32, z: i32) -> i32 {
        chunk.height_at(x, z).min(self.settings.map_max_y) as i32
    }

    /// Surface block id plus the height offset introduced by looking
    /// through snow.
    #[inline]
    fn resolve_block(&self, chunk: &ChunkSnapshot, x: i32, height: i32, z: i32) -> (u32, i32) {
        let block = chunk.block_at(x, height, z);
        if height > 0 && self.colors.material(block) == BlockMaterial::Snow {
            return (chunk.block_at(x, height - 1, z), 1);
        }
        (block, 0)
    }

    fn block_color(
        &self,
        chunk: &ChunkSnapshot,
        x: i32,
        z: i32,
        surface_y: i32,
        block: u32,
        rng: &mut ChaCha8Rng,
    ) -> Rgba<u8> {
        let colors = self.colors.as_ref();
        match self.settings.mode {
            RenderMode::OnlyOneColor => colors.base_color(block),
            RenderMode::ColorVariations | RenderMode::ColorVariationsWithHillShading => {
                colors.random_color_variation(block, rng)
            }
            RenderMode::ColorVariationsWithHeight => {
                let half = (self.settings.map_size_y as f32 / 2.0).max(1.0);
                scale_rgb(colors.random_color_variation(block, rng), surface_y as f32 / half)
            }
            RenderMode::MedievalStyleWithHillShading => {
                let edge = colors.is_lake(block)
                    && is_water_edge(colors, x, z, |nx, nz| {
                        self.resolve_block(chunk, nx, self.height(chunk, nx, nz), nz).0
                    });
                colors.medieval_style_color(block, edge)
            }
        }
    }

    /// Hill-shading boost against the N, W and NW columns. At the chunk
    /// border the neighbor one column inward is used instead.
    fn slope_boost(&self, chunk: &ChunkSnapshot, x: i32, z: i32, surface_y: i32) -> f32 {
        let wx = if x == 0 { x + 1 } else { x - 1 };
        let nz = if z == 0 { z + 1 } else { z - 1 };
        slope_boost(
            surface_y,
            self.height(chunk, x, nz),
            self.height(chunk, wx, z),
            self.height(chunk, wx, nz),
        )
    }
}

/// Pixel sink for one chunk's placement within the tile.
struct Canvas<'a> {
    pixels: &'a mut [u8],
    shadows: Option<&'a mut ShadowBuffer>,
    size: usize,
    offset_x: usize,
    offset_z: usize,
}

impl Canvas<'_> {
    #[inline]
    fn put(&mut self, x: i32, z: i32, color: Rgba<u8>) {
        let px = self.offset_x + x as usize;
        let pz = self.offset_z + z as usize;
        let idx = (pz * self.size + px) * 4;
        self.pixels[idx..idx + 4].copy_from_slice(&color.0);
    }
}

fn scale_rgb(color: Rgba<u8>, factor: f32) -> Rgba<u8> {
    let [r, g, b, a] = color.0;
    let scale = |c: u8| (c as f32 * factor).round().clamp(0.0, 255.0) as u8;
    Rgba([scale(r), scale(g), scale(b), a])
}

/// RNG seed derived from the tile coordinates.
fn tile_seed(tile: TilePos) -> u64 {
    let xz = ((tile.x as u32 as u64) << 32) | tile.z as u32 as u64;
    xz ^ (tile.zoom as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{voxel_index, BlockEntityPayload};
    use crate::color::{BlockColorTable, MedievalPalette};
    use crate::coord::{ChunkPos, CHUNK_AREA, CHUNK_VOLUME};
    use crate::render::decode_png;

    const STONE: u32 = 1;
    const GRASS: u32 = 2;
    const WATER: u32 = 3;
    const SNOW: u32 = 4;
    const CHISELED: u32 = 5;
    const SAND: u32 = 6;

    const STONE_RGB: Rgba<u8> = Rgba([120, 120, 120, 255]);
    const GRASS_RGB: Rgba<u8> = Rgba([60, 140, 40, 255]);
    const SAND_RGB: Rgba<u8> = Rgba([210, 190, 130, 255]);

    fn colors() -> Arc<dyn BlockColorResolver> {
        Arc::new(
            BlockColorTable::builder()
                .block(STONE, "stone", BlockMaterial::Stone, &[STONE_RGB])
                .block(
                    GRASS,
                    "grass",
                    BlockMaterial::Soil,
                    &[GRASS_RGB, Rgba([70, 150, 50, 255]), Rgba([50, 130, 30, 255])],
                )
                .block(WATER, "water", BlockMaterial::Water, &[Rgba([40, 60, 200, 255])])
                .block(SNOW, "snow", BlockMaterial::Snow, &[Rgba([250, 250, 250, 255])])
                .microblock(CHISELED, "chiseled")
                .block(SAND, "sand", BlockMaterial::Sand, &[SAND_RGB])
                .build(),
        )
    }

    fn renderer(mode: RenderMode, tile_size: u32) -> TileRenderer {
        TileRenderer::new(
            colors(),
            RenderSettings {
                mode,
                tile_size,
                ..RenderSettings::default()
            },
        )
    }

    fn tile_data(tile_size: u32, chunks: impl IntoIterator<Item = ChunkSnapshot>) -> TileChunkData {
        let mut data = TileChunkData::new(TilePos::new(9, 0, 0), tile_size).unwrap();
        for chunk in chunks {
            assert!(data.insert(chunk));
        }
        data
    }

    /// A flat chunk at height `h` whose surface band is `fill`, with
    /// per-column overrides at the surface.
    fn flat_chunk(pos: ChunkPos, h: u16, fill: u32, overrides: &[(i32, i32, u32)]) -> ChunkSnapshot {
        let mut band = vec![fill; CHUNK_VOLUME];
        let local_y = h as i32 % CHUNK_SIZE;
        for &(x, z, id) in overrides {
            band[voxel_index(x, local_y, z)] = id;
        }
        ChunkSnapshot::builder(pos)
            .height_map(vec![h; CHUNK_AREA])
            .band(h as i32 / CHUNK_SIZE, band)
            .build()
            .unwrap()
    }

    fn pixel(image: &RgbaImage, x: u32, z: u32) -> Rgba<u8> {
        *image.get_pixel(x, z)
    }

    #[test]
    fn test_flat_stone_tile_is_solid_base_color() {
        let chunks = (0..8).flat_map(|z| (0..8).map(move |x| ChunkSnapshot::uniform(ChunkPos::new(x, z), 100, STONE)));
        let data = tile_data(256, chunks);
        let bytes = renderer(RenderMode::OnlyOneColor, 256).render(&data).unwrap();

        let image = decode_png(&bytes).unwrap();
        assert_eq!(image.dimensions(), (256, 256));
        assert!(image.pixels().all(|p| *p == STONE_RGB));
    }

    #[test]
    fn test_partial_tile_leaves_transparent_gaps() {
        let data = tile_data(
            64,
            [
                ChunkSnapshot::uniform(ChunkPos::new(0, 0), 40, STONE),
                ChunkSnapshot::uniform(ChunkPos::new(1, 1), 40, STONE),
            ],
        );
        let image = renderer(RenderMode::OnlyOneColor, 64).render_image(&data).unwrap().unwrap();

        assert_eq!(pixel(&image, 5, 5), STONE_RGB);
        assert_eq!(pixel(&image, 40, 40), STONE_RGB);
        assert_eq!(pixel(&image, 40, 5)[3], 0);
        assert_eq!(pixel(&image, 5, 40)[3], 0);
    }

    #[test]
    fn test_empty_tile_renders_nothing() {
        let data = tile_data(64, []);
        assert!(renderer(RenderMode::OnlyOneColor, 64).render(&data).is_none());

        let air = tile_data(64, [ChunkSnapshot::uniform(ChunkPos::new(0, 0), 10, AIR)]);
        assert!(renderer(RenderMode::OnlyOneColor, 64).render(&air).is_none());
    }

    #[test]
    fn test_render_is_deterministic() {
        let chunks: Vec<_> = (0..2)
            .flat_map(|z| (0..2).map(move |x| ChunkSnapshot::uniform(ChunkPos::new(x, z), 70, GRASS)))
            .collect();
        for mode in RenderMode::ALL {
            let r = renderer(mode, 64);
            let first = r.render(&tile_data(64, chunks.clone())).unwrap();
            let second = r.render(&tile_data(64, chunks.clone())).unwrap();
            assert_eq!(first, second, "mode {}", mode);
        }
    }

    #[test]
    fn test_color_variations_use_variation_list() {
        let data = tile_data(32, [ChunkSnapshot::uniform(ChunkPos::new(0, 0), 70, GRASS)]);
        let image = renderer(RenderMode::ColorVariations, 32).render_image(&data).unwrap().unwrap();
        let distinct: std::collections::HashSet<_> = image.pixels().map(|p| p.0).collect();
        assert!(distinct.len() > 1);
        assert!(distinct.len() <= 3);
    }

    #[test]
    fn test_snow_resolves_block_below() {
        // Surface block is snow at y=100; grass fills the rest of the band.
        let chunk = flat_chunk(ChunkPos::new(0, 0), 100, GRASS, &[(3, 3, SNOW)]);
        let r = renderer(RenderMode::OnlyOneColor, 32);
        let (block, offset) = r.resolve_block(&chunk, 3, 100, 3);
        assert_eq!((block, offset), (GRASS, 1));

        let image = r.render_image(&tile_data(32, [chunk])).unwrap().unwrap();
        assert_eq!(pixel(&image, 3, 3), GRASS_RGB);
    }

    #[test]
    fn test_water_edge_detection() {
        let chunk = flat_chunk(ChunkPos::new(0, 0), 60, WATER, &[(10, 10, STONE)]);
        let image = renderer(RenderMode::MedievalStyleWithHillShading, 32)
            .render_image(&tile_data(32, [chunk]))
            .unwrap()
            .unwrap();
        let palette = MedievalPalette::default();

        assert_eq!(pixel(&image, 10, 11), palette.water_edge);
        assert_eq!(pixel(&image, 9, 10), palette.water_edge);
        assert_eq!(pixel(&image, 20, 20), palette.water);
        // Chunk border pixels are always open water.
        assert_eq!(pixel(&image, 0, 10), palette.water);
    }

    #[test]
    fn test_snow_on_water_is_not_a_shore() {
        // Snow lying on water draws as water, so it must not outline its
        // neighbors as shore either.
        let chunk = flat_chunk(ChunkPos::new(0, 0), 60, WATER, &[(10, 10, SNOW)]);
        let image = renderer(RenderMode::MedievalStyleWithHillShading, 32)
            .render_image(&tile_data(32, [chunk]))
            .unwrap()
            .unwrap();
        let palette = MedievalPalette::default();

        assert_eq!(pixel(&image, 10, 10), palette.water);
        assert_eq!(pixel(&image, 10, 11), palette.water);
        assert_eq!(pixel(&image, 9, 10), palette.water);
    }

    #[test]
    fn test_microblock_override_and_fallback() {
        let mut band = vec![STONE; CHUNK_VOLUME];
        band[voxel_index(4, 50 % CHUNK_SIZE, 4)] = CHISELED;
        band[voxel_index(8, 50 % CHUNK_SIZE, 8)] = CHISELED;
        let chunk = ChunkSnapshot::builder(ChunkPos::new(0, 0))
            .height_map(vec![50; CHUNK_AREA])
            .band(1, band)
            .block_entity(
                ChunkPos::new(0, 0).block(4, 50, 4),
                BlockEntityPayload::Microblock {
                    material_ids: vec![SAND, STONE],
                },
            )
            .build()
            .unwrap();

        let image = renderer(RenderMode::OnlyOneColor, 32)
            .render_image(&tile_data(32, [chunk.clone()]))
            .unwrap()
            .unwrap();
        assert_eq!(pixel(&image, 4, 4), SAND_RGB);
        assert_eq!(pixel(&image, 8, 8), MICROBLOCK_MARKER);

        let medieval = renderer(RenderMode::MedievalStyleWithHillShading, 32)
            .render_image(&tile_data(32, [chunk]))
            .unwrap()
            .unwrap();
        assert_eq!(pixel(&medieval, 8, 8), MedievalPalette::default().land);
    }

    #[test]
    fn test_height_mode_scales_by_half_world_height() {
        let data = tile_data(32, [ChunkSnapshot::uniform(ChunkPos::new(0, 0), 64, STONE)]);
        let image = renderer(RenderMode::ColorVariationsWithHeight, 32)
            .render_image(&data)
            .unwrap()
            .unwrap();
        assert_eq!(pixel(&image, 16, 16), Rgba([60, 60, 60, 255]));
    }

    #[test]
    fn test_heights_clamped_to_map_max() {
        let data = tile_data(32, [ChunkSnapshot::uniform(ChunkPos::new(0, 0), 300, STONE)]);
        // Clamped to 255; band 7 was never extracted so the surface reads as air.
        assert!(renderer(RenderMode::OnlyOneColor, 32).render_image(&data).unwrap().is_none());
    }

    #[test]
    fn test_hill_shading_brightens_slope_facing_light() {
        let heights: Vec<u16> = (0..CHUNK_AREA).map(|i| 40 + (i % 32) as u16 / 4).collect();
        let chunk = ChunkSnapshot::builder(ChunkPos::new(0, 0))
            .height_map(heights)
            .band(1, vec![STONE; CHUNK_VOLUME])
            .build()
            .unwrap();
        let flat = ChunkSnapshot::uniform(ChunkPos::new(0, 0), 40, STONE);

        let r = renderer(RenderMode::ColorVariationsWithHillShading, 32);
        let shaded = r.render_image(&tile_data(32, [chunk])).unwrap().unwrap();
        let plain = r.render_image(&tile_data(32, [flat])).unwrap().unwrap();

        assert_eq!(pixel(&plain, 16, 16), STONE_RGB);
        // Column 16 steps up from column 15, so it faces the light.
        assert!(pixel(&shaded, 16, 16)[0] > STONE_RGB[0]);
        assert_eq!(pixel(&shaded, 16, 16)[3], 255);
    }

    #[test]
    fn test_tile_size_mismatch_is_error() {
        let data = tile_data(64, [ChunkSnapshot::uniform(ChunkPos::new(0, 0), 10, STONE)]);
        let result = renderer(RenderMode::OnlyOneColor, 32).try_render(&data);
        assert!(matches!(result, Err(RenderError::TileSizeMismatch { .. })));
    }

    struct PanickingResolver;

    impl BlockColorResolver for PanickingResolver {
        fn base_color(&self, _: u32) -> Rgba<u8> {
            panic!("resolver exploded")
        }
        fn random_color_variation(&self, _: u32, _: &mut dyn rand::RngCore) -> Rgba<u8> {
            panic!("resolver exploded")
        }
        fn medieval_style_color(&self, _: u32, _: bool) -> Rgba<u8> {
            panic!("resolver exploded")
        }
        fn is_lake(&self, _: u32) -> bool {
            false
        }
        fn material(&self, _: u32) -> BlockMaterial {
            BlockMaterial::Stone
        }
        fn is_microblock(&self, _: u32) -> bool {
            false
        }
        fn land_color(&self) -> Rgba<u8> {
            Rgba([0, 0, 0, 255])
        }
    }

    #[test]
    fn test_panic_during_render_is_caught() {
        let r = TileRenderer::new(
            Arc::new(PanickingResolver),
            RenderSettings {
                mode: RenderMode::OnlyOneColor,
                tile_size: 32,
                ..RenderSettings::default()
            },
        );
        let data = tile_data(32, [ChunkSnapshot::uniform(ChunkPos::new(0, 0), 10, STONE)]);

        assert!(matches!(r.try_render(&data), Err(RenderError::Panicked { .. })));
        assert!(r.render(&data).is_none());
    }
}
