//! Block color resolution.
//!
//! The renderer never interprets block semantics itself. Everything it needs
//! (colors, snow/water classification, microblock flag) comes through the
//! [`BlockColorResolver`] trait, so lookups must stay O(1): they sit on the
//! per-pixel hot path.
//!
//! [`BlockColorTable`] is the stock implementation. It is immutable once
//! built and is shared by `Arc`; [`init_block_colors`] installs one
//! process-wide.

mod builtin;
mod registry;
mod table;

pub use builtin::BUILTIN_MICROBLOCK_ID;
pub use registry::{block_colors, init_block_colors};
pub use table::{
    parse_hex_color, BlockColorDefinition, BlockColorTable, BlockColorTableBuilder,
    ColorTableError, MedievalPalette,
};

use image::Rgba;
use rand::RngCore;
use serde::Deserialize;

/// Material class of a block, as far as map coloring cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockMaterial {
    #[default]
    Air,
    Soil,
    Stone,
    Gravel,
    Sand,
    Plant,
    Leaves,
    Wood,
    Water,
    Lava,
    Snow,
    Ice,
    Other,
}

/// Maps block identities to map colors and material classes.
///
/// Implementations must be cheap to call from many render workers at once.
pub trait BlockColorResolver: Send + Sync {
    /// The block's canonical color.
    fn base_color(&self, block_id: u32) -> Rgba<u8>;

    /// One color drawn from the block's variation list.
    fn random_color_variation(&self, block_id: u32, rng: &mut dyn RngCore) -> Rgba<u8>;

    /// Flat "medieval map" color for the block's material class.
    fn medieval_style_color(&self, block_id: u32, is_water_edge: bool) -> Rgba<u8>;

    /// Whether the block counts as open lake water.
    fn is_lake(&self, block_id: u32) -> bool;

    /// Material class of the block.
    fn material(&self, block_id: u32) -> BlockMaterial;

    /// Whether the block's appearance lives in a per-position microblock record.
    fn is_microblock(&self, block_id: u32) -> bool;

    /// Generic land color, used when a microblock has no override record.
    fn land_color(&self) -> Rgba<u8>;
}
