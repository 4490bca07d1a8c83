use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use super::RenderError;

/// Losslessly encodes a tile.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Decodes stored tile bytes into RGBA.
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, RenderError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
    Ok(image.into_rgba8())
}
