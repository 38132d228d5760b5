//! Image normalisation: data-URL → opaque RGB raster of bounded size.
//!
//! Every recognizer downstream sees the same canonical input: white
//! background, no alpha channel, longest side within `max_dimension`, and
//! (optionally) both sides a multiple of [`ALIGNMENT`]. Canvas drawings
//! usually arrive as transparent PNGs, and most formula models read
//! transparent pixels as black, so compositing onto white is mandatory.
//!
//! The transform is pure and CPU-bound. Async callers should go through
//! [`normalize_data_url_blocking`] which moves the work onto tokio's
//! blocking pool.

use crate::error::Img2TexError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage, RgbaImage};
use tracing::{debug, info};

/// Stride required by formula models that pad to a fixed grid.
pub const ALIGNMENT: u32 = 32;

const DATA_URL_PREFIX: &str = "data:image/";

/// Knobs for [`normalize_data_url`], usually derived from
/// [`crate::ServiceConfig::normalize_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub max_encoded_bytes: usize,
    pub max_dimension: u32,
    pub pad_to_alignment: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_encoded_bytes: 8 * 1024 * 1024,
            max_dimension: 1024,
            pad_to_alignment: false,
        }
    }
}

/// An opaque RGB image ready for recognition.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    image: RgbImage,
}

impl NormalizedImage {
    /// Wrap an image that is already opaque and correctly sized.
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    /// Single-channel luma copy, used by the heuristic recognizer.
    pub fn to_luma(&self) -> GrayImage {
        imageops::grayscale(&self.image)
    }

    pub fn into_inner(self) -> RgbImage {
        self.image
    }
}

/// Split a data-URL into `(header, payload)` after validating the prefix.
///
/// The header is everything before the first comma, e.g.
/// `data:image/png;base64`.
pub fn split_data_url(data_url: &str) -> Result<(&str, &str), Img2TexError> {
    if !data_url.starts_with(DATA_URL_PREFIX) {
        return Err(Img2TexError::InvalidImageFormat {
            reason: "expected a data:image/...;base64 URL".into(),
        });
    }

    let (header, payload) =
        data_url
            .split_once(',')
            .ok_or_else(|| Img2TexError::InvalidImageFormat {
                reason: "data URL has no payload".into(),
            })?;

    if !header.to_ascii_lowercase().ends_with(";base64") {
        return Err(Img2TexError::InvalidImageFormat {
            reason: "data URL is not base64-encoded".into(),
        });
    }

    Ok((header, payload))
}

/// Validate, decode and normalise a data-URL submission.
pub fn normalize_data_url(
    data_url: &str,
    opts: &NormalizeOptions,
) -> Result<NormalizedImage, Img2TexError> {
    let (header, payload) = split_data_url(data_url)?;

    if payload.len() > opts.max_encoded_bytes {
        return Err(Img2TexError::ImageTooLarge {
            size: payload.len(),
            limit: opts.max_encoded_bytes,
        });
    }

    // Browsers and some clients wrap long base64 strings.
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Img2TexError::DecodeError {
            detail: format!("invalid base64: {e}"),
        })?;
    debug!("Decoded {} ({} bytes)", header, bytes.len());

    normalize_bytes(&bytes, opts)
}

/// Run steps 3–6 of normalisation on raw encoded image bytes.
pub fn normalize_bytes(
    bytes: &[u8],
    opts: &NormalizeOptions,
) -> Result<NormalizedImage, Img2TexError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| Img2TexError::DecodeError {
        detail: e.to_string(),
    })?;
    let rgba = decoded.to_rgba8();

    let bound = if opts.pad_to_alignment {
        // Rounding up to the grid must not push a side past the bound.
        (opts.max_dimension / ALIGNMENT * ALIGNMENT).max(ALIGNMENT)
    } else {
        opts.max_dimension
    };

    let rgba = fit_within(rgba, bound);
    let mut rgb = flatten_on_white(&rgba);

    if opts.pad_to_alignment {
        rgb = align_to_grid(rgb);
    }

    Ok(NormalizedImage::from_rgb(rgb))
}

/// [`normalize_data_url`] on the blocking pool.
pub async fn normalize_data_url_blocking(
    data_url: String,
    opts: NormalizeOptions,
) -> Result<NormalizedImage, Img2TexError> {
    tokio::task::spawn_blocking(move || normalize_data_url(&data_url, &opts))
        .await
        .map_err(|e| Img2TexError::Internal(format!("Normalisation task panicked: {e}")))?
}

/// Proportional Lanczos downscale so the longer side is at most `bound`.
fn fit_within(img: RgbaImage, bound: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w <= bound && h <= bound {
        return img;
    }

    let scale = bound as f64 / w.max(h) as f64;
    let new_w = ((w as f64 * scale).round() as u32).clamp(1, bound);
    let new_h = ((h as f64 * scale).round() as u32).clamp(1, bound);

    info!("Image resized from {}x{} to {}x{}", w, h, new_w, new_h);
    imageops::resize(&img, new_w, new_h, FilterType::Lanczos3)
}

/// Alpha-composite onto an opaque white canvas of the same size.
fn flatten_on_white(img: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(img.width(), img.height());
    for (x, y, px) in img.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Resample (not pad) so both sides are multiples of [`ALIGNMENT`].
fn align_to_grid(img: RgbImage) -> RgbImage {
    let (w, h) = img.dimensions();
    let new_w = w.div_ceil(ALIGNMENT) * ALIGNMENT;
    let new_h = h.div_ceil(ALIGNMENT) * ALIGNMENT;
    if new_w == w && new_h == h {
        return img;
    }

    debug!("Aligning {}x{} to {}x{}", w, h, new_w, new_h);
    imageops::resize(&img, new_w, new_h, FilterType::Lanczos3)
}
