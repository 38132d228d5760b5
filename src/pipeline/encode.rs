//! Image encoding: `NormalizedImage` → PNG bytes for external recognizers.
//!
//! PNG is lossless; JPEG ringing around thin strokes (fraction bars,
//! subscripts) measurably hurts formula OCR.

use crate::pipeline::normalize::NormalizedImage;
use image::ImageFormat;
use std::io::Cursor;
use tracing::debug;

/// Encode a normalised image as PNG.
pub fn encode_png(img: &NormalizedImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.as_rgb()
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;

    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}
