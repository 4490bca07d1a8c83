//! Slope-derived hill shading.
//!
//! Each drawn pixel stores a brightness factor as a byte, `128 × boost`,
//! with 0 meaning "nothing drawn here". After the tile is complete the
//! buffer is box-blurred (skipping unset cells), recombined with the
//! unblurred values and turned into a per-pixel multiplier.

/// Neutral shadow value.
pub(crate) const NEUTRAL: f32 = 128.0;

/// Brightness change for any non-flat pixel.
const BASE_BOOST: f32 = 0.08;
/// Height difference at which the slope term saturates.
const STEEPNESS_SCALE: f32 = 10.0;
const MAX_STEEPNESS: f32 = 0.5;
const SLOPE_DAMPING: f32 = 1.25;

/// Multiplicative boost for a column given its neighbors' heights.
///
/// Light comes from the north-west: a column standing above its N/W/NW
/// neighbors faces the light and brightens, one below them darkens.
pub(crate) fn slope_boost(height: i32, north: i32, west: i32, north_west: i32) -> f32 {
    let delta = (height - north) + (height - west) + (height - north_west);
    if delta == 0 {
        return 1.0;
    }
    let slope = (delta.unsigned_abs() as f32 / STEEPNESS_SCALE).min(MAX_STEEPNESS) / SLOPE_DAMPING;
    if delta > 0 {
        1.0 + BASE_BOOST + slope
    } else {
        1.0 - BASE_BOOST - slope
    }
}

/// Per-tile shadow buffer, one byte per pixel.
pub(crate) struct ShadowBuffer {
    size: usize,
    cells: Vec<u8>,
}

impl ShadowBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![0; size * size],
        }
    }

    /// Records a pixel's boost. Drawn cells never read back as unset.
    #[inline]
    pub fn set(&mut self, px: usize, pz: usize, boost: f32) {
        let value = (NEUTRAL * boost).round().clamp(1.0, 255.0) as u8;
        self.cells[pz * self.size + px] = value;
    }

    #[inline]
    pub fn get(&self, px: usize, pz: usize) -> u8 {
        self.cells[pz * self.size + px]
    }

    /// Final multipliers, 0.0 where nothing was drawn.
    pub fn adjustments(&self, radius: usize, sharpen: f32) -> Vec<f32> {
        let raw: Vec<f32> = self.cells.iter().map(|&c| c as f32).collect();
        let blurred = box_blur(&raw, self.size, radius);

        raw.iter()
            .zip(&blurred)
            .map(|(&r, &b)| {
                if r == 0.0 {
                    return 0.0;
                }
                let soft = b / NEUTRAL - 1.0;
                let detail = r / NEUTRAL - 1.0;
                (1.0 + soft + (detail - soft) * sharpen).clamp(0.25, 2.0)
            })
            .collect()
    }
}

/// Separable box blur that ignores zero cells, horizontal then vertical.
fn box_blur(cells: &[f32], size: usize, radius: usize) -> Vec<f32> {
    if radius == 0 {
        return cells.to_vec();
    }
    let horizontal = blur_pass(cells, size, radius, |row, col| row * size + col);
    blur_pass(&horizontal, size, radius, |row, col| col * size + row)
}

fn blur_pass(cells: &[f32], size: usize, radius: usize, index: impl Fn(usize, usize) -> usize) -> Vec<f32> {
    let mut out = vec![0.0; cells.len()];
    for row in 0..size {
        for col in 0..size {
            let center = index(row, col);
            if cells[center] == 0.0 {
                continue;
            }
            let start = col.saturating_sub(radius);
            let end = (col + radius).min(size - 1);
            let (sum, count) = (start..=end)
                .map(|c| cells[index(row, c)])
                .filter(|v| *v != 0.0)
                .fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
            out[center] = sum / count as f32;
        }
    }
    out
}

/// Multiplies each drawn RGBA pixel by its adjustment, preserving alpha.
pub(crate) fn apply(pixels: &mut [u8], adjustments: &[f32]) {
    debug_assert_eq!(pixels.len(), adjustments.len() * 4);
    for (pixel, &factor) in pixels.chunks_exact_mut(4).zip(adjustments) {
        if factor == 0.0 || pixel[3] == 0 {
            continue;
        }
        for channel in &mut pixel[..3] {
            *channel = (*channel as f32 * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
}
