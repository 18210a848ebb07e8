//! Raster encoding helpers: `DynamicImage` ⇄ PNG bytes.
//!
//! Pages travel through the pipeline as encoded PNG buffers. PNG is lossless,
//! so a transform that decodes, edits and re-encodes a page never compounds
//! compression artefacts across stages.

use crate::error::ScanError;
use crate::output::RenderedPage;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Decode an encoded raster (PNG, JPEG) back into pixels.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}

/// Wrap an image as a [`RenderedPage`] ready for the transform stage.
pub fn rendered_page(
    page_num: usize,
    img: &DynamicImage,
    dpi: f32,
) -> Result<RenderedPage, ScanError> {
    let data = encode_png(img).map_err(|e| ScanError::Render {
        page: page_num,
        detail: format!("PNG encoding failed: {e}"),
    })?;
    Ok(RenderedPage {
        data,
        width: img.width(),
        height: img.height(),
        dpi,
    })
}
