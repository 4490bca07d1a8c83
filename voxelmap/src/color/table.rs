//! Immutable block color table.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use image::Rgba;
use rand::{Rng, RngCore};
use serde::Deserialize;
use thiserror::Error;

use super::{BlockColorResolver, BlockMaterial};

/// Color used for ids that have no table entry.
const UNKNOWN_COLOR: Rgba<u8> = Rgba([128, 128, 128, 255]);

/// Ids below this live in the dense lookup array; larger ids go to a map.
const MAX_DENSE_BLOCK_ID: u32 = 1 << 16;

/// Errors building a block color table.
#[derive(Debug, Error)]
pub enum ColorTableError {
    #[error("Failed to read block color file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse block color file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid color '{value}' for block '{code}'")]
    InvalidColor { code: String, value: String },

    #[error("Block '{0}' has no colors")]
    NoColors(String),
}

/// Flat palette for the medieval map style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MedievalPalette {
    pub land: Rgba<u8>,
    pub water: Rgba<u8>,
    pub water_edge: Rgba<u8>,
    pub forest: Rgba<u8>,
    pub mountain: Rgba<u8>,
    pub sand: Rgba<u8>,
    pub ice: Rgba<u8>,
}

impl Default for MedievalPalette {
    fn default() -> Self {
        Self {
            land: Rgba([172, 136, 88, 255]),
            water: Rgba([164, 196, 192, 255]),
            water_edge: Rgba([50, 55, 35, 255]),
            forest: Rgba([126, 102, 64, 255]),
            mountain: Rgba([112, 100, 84, 255]),
            sand: Rgba([200, 174, 120, 255]),
            ice: Rgba([226, 232, 236, 255]),
        }
    }
}

#[derive(Debug, Clone)]
struct BlockColorEntry {
    code: String,
    colors: Vec<Rgba<u8>>,
    material: BlockMaterial,
    lake: bool,
    microblock: bool,
}

/// Block-id indexed color table.
///
/// Ids below 65536 are a bounds check and an index; rarer
/// large ids fall back to a hash lookup. The table never changes after
/// [`BlockColorTableBuilder::build`].
#[derive(Debug, Clone)]
pub struct BlockColorTable {
    entries: Vec<Option<BlockColorEntry>>,
    sparse: HashMap<u32, BlockColorEntry>,
    palette: MedievalPalette,
}

impl BlockColorTable {
    pub fn builder() -> BlockColorTableBuilder {
        BlockColorTableBuilder::default()
    }

    /// Loads a table from a JSON color definition file.
    pub fn load_json(path: &Path) -> Result<Self, ColorTableError> {
        let file = std::fs::File::open(path)?;
        Self::from_json_reader(std::io::BufReader::new(file))
    }

    /// Parses a table from JSON.
    ///
    /// ```json
    /// {
    ///   "palette": { "land": "#ac8858" },
    ///   "blocks": [
    ///     { "id": 1, "code": "rock-granite", "material": "stone", "colors": ["#6e6e6e"] }
    ///   ]
    /// }
    /// ```
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ColorTableError> {
        let file: ColorFile = serde_json::from_reader(reader)?;
        let mut builder = BlockColorTableBuilder::default();

        if let Some(palette) = file.palette {
            builder = builder.palette(palette.resolve()?);
        }

        for block in file.blocks {
            if block.colors.is_empty() && !block.microblock {
                return Err(ColorTableError::NoColors(block.code));
            }
            let colors = block
                .colors
                .iter()
                .map(|value| {
                    parse_hex_color(value).ok_or_else(|| ColorTableError::InvalidColor {
                        code: block.code.clone(),
                        value: value.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            builder = builder.definition(BlockColorDefinition {
                id: block.id,
                code: block.code,
                material: block.material,
                colors,
                lake: block.lake,
                microblock: block.microblock,
            });
        }

        Ok(builder.build())
    }

    /// Number of defined blocks.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count() + self.sparse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block code for an id, if defined.
    pub fn code(&self, block_id: u32) -> Option<&str> {
        self.entry(block_id).map(|e| e.code.as_str())
    }

    pub fn palette(&self) -> &MedievalPalette {
        &self.palette
    }

    #[inline]
    fn entry(&self, block_id: u32) -> Option<&BlockColorEntry> {
        match self.entries.get(block_id as usize) {
            Some(slot) => slot.as_ref(),
            None => self.sparse.get(&block_id),
        }
    }
}

impl BlockColorResolver for BlockColorTable {
    #[inline]
    fn base_color(&self, block_id: u32) -> Rgba<u8> {
        self.entry(block_id)
            .and_then(|e| e.colors.first().copied())
            .unwrap_or(UNKNOWN_COLOR)
    }

    #[inline]
    fn random_color_variation(&self, block_id: u32, rng: &mut dyn RngCore) -> Rgba<u8> {
        match self.entry(block_id) {
            Some(entry) if !entry.colors.is_empty() => {
                entry.colors[rng.gen_range(0..entry.colors.len())]
            }
            _ => UNKNOWN_COLOR,
        }
    }

    fn medieval_style_color(&self, block_id: u32, is_water_edge: bool) -> Rgba<u8> {
        let Some(entry) = self.entry(block_id) else {
            return self.palette.land;
        };
        if entry.lake {
            return if is_water_edge {
                self.palette.water_edge
            } else {
                self.palette.water
            };
        }
        match entry.material {
            BlockMaterial::Plant | BlockMaterial::Leaves | BlockMaterial::Wood => {
                self.palette.forest
            }
            BlockMaterial::Stone | BlockMaterial::Gravel => self.palette.mountain,
            BlockMaterial::Sand => self.palette.sand,
            BlockMaterial::Snow | BlockMaterial::Ice => self.palette.ice,
            BlockMaterial::Lava => entry.colors.first().copied().unwrap_or(UNKNOWN_COLOR),
            _ => self.palette.land,
        }
    }

    #[inline]
    fn is_lake(&self, block_id: u32) -> bool {
        self.entry(block_id).is_some_and(|e| e.lake)
    }

    #[inline]
    fn material(&self, block_id: u32) -> BlockMaterial {
        self.entry(block_id)
            .map(|e| e.material)
            .unwrap_or(BlockMaterial::Other)
    }

    #[inline]
    fn is_microblock(&self, block_id: u32) -> bool {
        self.entry(block_id).is_some_and(|e| e.microblock)
    }

    fn land_color(&self) -> Rgba<u8> {
        self.palette.land
    }
}

/// One block's color definition.
#[derive(Debug, Clone)]
pub struct BlockColorDefinition {
    pub id: u32,
    pub code: String,
    pub material: BlockMaterial,
    /// First entry is the base color, all entries are variations.
    pub colors: Vec<Rgba<u8>>,
    pub lake: bool,
    pub microblock: bool,
}

/// Builder for [`BlockColorTable`].
#[derive(Debug, Default)]
pub struct BlockColorTableBuilder {
    definitions: Vec<BlockColorDefinition>,
    palette: MedievalPalette,
}

impl BlockColorTableBuilder {
    /// Adds a plain block. Water blocks are lake blocks.
    pub fn block(
        self,
        id: u32,
        code: impl Into<String>,
        material: BlockMaterial,
        colors: &[Rgba<u8>],
    ) -> Self {
        self.definition(BlockColorDefinition {
            id,
            code: code.into(),
            material,
            colors: colors.to_vec(),
            lake: material == BlockMaterial::Water,
            microblock: false,
        })
    }

    /// Adds a chiseled/microblock block whose appearance comes from
    /// per-position override records.
    pub fn microblock(self, id: u32, code: impl Into<String>) -> Self {
        self.definition(BlockColorDefinition {
            id,
            code: code.into(),
            material: BlockMaterial::Other,
            colors: Vec::new(),
            lake: false,
            microblock: true,
        })
    }

    pub fn definition(mut self, definition: BlockColorDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn palette(mut self, palette: MedievalPalette) -> Self {
        self.palette = palette;
        self
    }

    pub fn build(self) -> BlockColorTable {
        let len = self
            .definitions
            .iter()
            .map(|d| d.id)
            .filter(|id| *id < MAX_DENSE_BLOCK_ID)
            .map(|id| id as usize + 1)
            .max()
            .unwrap_or(0);
        let mut entries: Vec<Option<BlockColorEntry>> = vec![None; len];
        let mut sparse = HashMap::new();

        for def in self.definitions {
            let id = def.id;
            let entry = BlockColorEntry {
                code: def.code,
                colors: def.colors,
                material: def.material,
                lake: def.lake,
                microblock: def.microblock,
            };
            let previous = if id < MAX_DENSE_BLOCK_ID {
                entries[id as usize].replace(entry)
            } else {
                sparse.insert(id, entry)
            };
            if previous.is_some() {
                tracing::warn!(id, "Duplicate block color definition, last one wins");
            }
        }

        BlockColorTable {
            entries,
            sparse,
            palette: self.palette,
        }
    }
}

/// Parses `#rrggbb` or `#rrggbbaa` (leading `#` optional).
pub fn parse_hex_color(value: &str) -> Option<Rgba<u8>> {
    let hex = value.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
        8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
        _ => None,
    }
}

#[derive(Deserialize)]
struct ColorFile {
    #[serde(default)]
    palette: Option<PaletteFile>,
    blocks: Vec<BlockFile>,
}

#[derive(Deserialize)]
struct BlockFile {
    id: u32,
    code: String,
    #[serde(default)]
    material: BlockMaterial,
    #[serde(default)]
    colors: Vec<String>,
    #[serde(default)]
    lake: bool,
    #[serde(default)]
    microblock: bool,
}

#[derive(Deserialize, Default)]
struct PaletteFile {
    land: Option<String>,
    water: Option<String>,
    water_edge: Option<String>,
    forest: Option<String>,
    mountain: Option<String>,
    sand: Option<String>,
    ice: Option<String>,
}

impl PaletteFile {
    fn resolve(self) -> Result<MedievalPalette, ColorTableError> {
        let defaults = MedievalPalette::default();
        let pick = |value: Option<String>, fallback: Rgba<u8>| match value {
            Some(v) => parse_hex_color(&v).ok_or(ColorTableError::InvalidColor {
                code: "palette".to_string(),
                value: v,
            }),
            None => Ok(fallback),
        };
        Ok(MedievalPalette {
            land: pick(self.land, defaults.land)?,
            water: pick(self.water, defaults.water)?,
            water_edge: pick(self.water_edge, defaults.water_edge)?,
            forest: pick(self.forest, defaults.forest)?,
            mountain: pick(self.mountain, defaults.mountain)?,
            sand: pick(self.sand, defaults.sand)?,
            ice: pick(self.ice, defaults.ice)?,
        })
    }
}
