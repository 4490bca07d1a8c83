//! Tile rasterization.
//!
//! [`TileRenderer`] turns one [`TileChunkData`](crate::chunk::TileChunkData)
//! into a PNG. Per surface column it resolves a block id (with snow and
//! microblock substitution), picks a color according to the
//! [`RenderMode`], and for the hill-shading modes records a slope-derived
//! brightness factor that is blurred and applied once the whole tile is
//! drawn.
//!
//! ```text
//! chunks ──► resolve block ──► pick color ──► draw pixel
//!                                  │
//!                                  └──► shadow buffer ──► blur ──► apply
//! ```

mod png;
mod renderer;
mod shading;
mod water;

pub use png::{decode_png, encode_png};
pub use renderer::TileRenderer;

use std::fmt;
use std::str::FromStr;

use image::Rgba;
use thiserror::Error;

use crate::coord::TilePos;

/// Marker drawn for microblocks without an override record, outside the
/// medieval style.
pub const MICROBLOCK_MARKER: Rgba<u8> = Rgba([255, 0, 255, 255]);

/// Color selection strategy, fixed for a whole tile render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// The resolver's base color.
    OnlyOneColor,
    /// A seeded random pick from the block's variations.
    ColorVariations,
    /// A variation scaled by height relative to half the world height.
    ColorVariationsWithHeight,
    /// A variation with hill shading.
    #[default]
    ColorVariationsWithHillShading,
    /// Flat medieval palette with water edges and hill shading.
    MedievalStyleWithHillShading,
}

impl RenderMode {
    pub const ALL: [RenderMode; 5] = [
        RenderMode::OnlyOneColor,
        RenderMode::ColorVariations,
        RenderMode::ColorVariationsWithHeight,
        RenderMode::ColorVariationsWithHillShading,
        RenderMode::MedievalStyleWithHillShading,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::OnlyOneColor => "only_one_color",
            RenderMode::ColorVariations => "color_variations",
            RenderMode::ColorVariationsWithHeight => "color_variations_with_height",
            RenderMode::ColorVariationsWithHillShading => "color_variations_with_hill_shading",
            RenderMode::MedievalStyleWithHillShading => "medieval_style_with_hill_shading",
        }
    }

    pub fn uses_hill_shading(&self) -> bool {
        matches!(
            self,
            RenderMode::ColorVariationsWithHillShading | RenderMode::MedievalStyleWithHillShading
        )
    }

    pub fn is_medieval(&self) -> bool {
        matches!(self, RenderMode::MedievalStyleWithHillShading)
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        RenderMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| format!("unknown render mode '{}'", s.trim()))
    }
}

/// Renderer parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub mode: RenderMode,
    /// Tile edge in pixels; a positive multiple of 32.
    pub tile_size: u32,
    /// Heights are clamped to `[0, map_max_y]`.
    pub map_max_y: u16,
    /// World height, used by the height-scaled mode.
    pub map_size_y: u16,
    pub blur_radius: u32,
    /// Weight of unblurred detail when recombining the shadow buffer.
    pub sharpen: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            tile_size: 256,
            map_max_y: 255,
            map_size_y: 256,
            blur_radius: 2,
            sharpen: 1.4,
        }
    }
}

/// Errors from rendering or image coding.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("tile {tile} was built for {actual}px, renderer expects {expected}px")]
    TileSizeMismatch {
        tile: TilePos,
        expected: u32,
        actual: u32,
    },

    #[error("render of tile {tile} panicked: {message}")]
    Panicked { tile: TilePos, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_mode_round_trips_names() {
        for mode in RenderMode::ALL {
            assert_eq!(mode.as_str().parse::<RenderMode>().unwrap(), mode);
        }
        assert!("sepia".parse::<RenderMode>().is_err());
    }

    #[test]
    fn test_hill_shading_modes() {
        assert!(RenderMode::MedievalStyleWithHillShading.uses_hill_shading());
        assert!(RenderMode::ColorVariationsWithHillShading.uses_hill_shading());
        assert!(!RenderMode::ColorVariationsWithHeight.uses_hill_shading());
    }
}
