//! Stock block colors, used when no color table file is configured.
//!
//! Ids follow the order of the stock world storage block registry.

use image::Rgba;

use super::{BlockColorTable, BlockMaterial};

/// Id of the stock chiseled block.
pub const BUILTIN_MICROBLOCK_ID: u32 = 15;

const fn rgb(r: u8, g: u8, b: u8) -> Rgba<u8> {
    Rgba([r, g, b, 255])
}

const BUILTIN_BLOCKS: &[(u32, &str, BlockMaterial, &[Rgba<u8>])] = &[
    (1, "rock-granite", BlockMaterial::Stone, &[rgb(110, 108, 106), rgb(118, 115, 112), rgb(102, 100, 98)]),
    (2, "soil-medium", BlockMaterial::Soil, &[rgb(120, 86, 58), rgb(112, 80, 54)]),
    (3, "soil-grass", BlockMaterial::Soil, &[rgb(92, 128, 60), rgb(86, 122, 56), rgb(98, 134, 64)]),
    (4, "sand", BlockMaterial::Sand, &[rgb(214, 196, 148), rgb(206, 188, 140)]),
    (5, "gravel", BlockMaterial::Gravel, &[rgb(132, 126, 120), rgb(124, 118, 112)]),
    (6, "water", BlockMaterial::Water, &[rgb(52, 84, 168)]),
    (7, "snowlayer", BlockMaterial::Snow, &[rgb(244, 246, 250)]),
    (8, "ice", BlockMaterial::Ice, &[rgb(170, 200, 236), rgb(162, 194, 232)]),
    (9, "leaves", BlockMaterial::Leaves, &[rgb(54, 96, 40), rgb(48, 88, 36), rgb(60, 104, 44)]),
    (10, "log", BlockMaterial::Wood, &[rgb(96, 72, 44)]),
    (11, "tallgrass", BlockMaterial::Plant, &[rgb(100, 140, 64), rgb(94, 134, 60)]),
    (12, "lava", BlockMaterial::Lava, &[rgb(220, 90, 20), rgb(232, 110, 28)]),
    (13, "planks", BlockMaterial::Wood, &[rgb(160, 124, 80)]),
    (14, "cobblestone", BlockMaterial::Stone, &[rgb(122, 122, 122), rgb(114, 114, 114)]),
];

impl BlockColorTable {
    /// The stock table.
    pub fn builtin() -> Self {
        BUILTIN_BLOCKS
            .iter()
            .fold(BlockColorTable::builder(), |builder, &(id, code, material, colors)| {
                builder.block(id, code, material, colors)
            })
            .microblock(BUILTIN_MICROBLOCK_ID, "chiseledblock")
            .build()
    }
}
