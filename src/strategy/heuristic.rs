//! Pixel-density guesser used when no real recognizer is reachable.
//!
//! **This is not recognition.** Four binary detectors look at ink density
//! in fixed regions of the grayscale image and each one that fires
//! contributes a canned LaTeX snippet. When none fire, a template is picked
//! from the image's aspect ratio. Output is always labelled advisory so
//! callers never mistake it for a transcription.
//!
//! Everything here is deterministic: the same pixels always produce the
//! same string, and template choice uses `(width + height) mod len` rather
//! than a random number generator.

use crate::pipeline::normalize::NormalizedImage;
use image::GrayImage;

/// Luma below this counts as ink.
pub const DEFAULT_DARK_THRESHOLD: u8 = 128;

const FRACTION_ROW_RATIO: f64 = 0.30;
const INTEGRAL_REGION_RATIO: f64 = 0.10;
const SQRT_TOP_ROW_RATIO: f64 = 0.20;
const POWER_REGION_RATIO: f64 = 0.05;

/// Used for images more than twice as wide as tall.
pub const WIDE_TEMPLATES: [&str; 4] = ["y = mx + b", "f(x) = ax + b", "y = 2x + 1", "a + b = c"];

/// Used for images more than twice as tall as wide.
pub const TALL_TEMPLATES: [&str; 4] = [
    "\\sqrt{x}",
    "\\frac{dy}{dx}",
    "\\sum_{i=1}^{n} i",
    "\\lim_{x \\to 0} f(x)",
];

/// Used for everything in between.
pub const SQUARE_TEMPLATES: [&str; 4] = [
    "x^2 + y^2 = r^2",
    "\\frac{a}{b}",
    "E = mc^2",
    "a^2 + b^2 = c^2",
];

/// Which detectors fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Detections {
    pub integral: bool,
    pub fraction: bool,
    pub sqrt: bool,
    pub power: bool,
}

impl Detections {
    pub fn any(&self) -> bool {
        self.integral || self.fraction || self.sqrt || self.power
    }

    /// Snippets for the detectors that fired, in a fixed order.
    pub fn snippets(&self) -> Vec<&'static str> {
        let mut out = Vec::with_capacity(4);
        if self.integral {
            out.push("\\int");
        }
        if self.fraction {
            out.push("\\frac{a}{b}");
        }
        if self.sqrt {
            out.push("\\sqrt{x}");
        }
        if self.power {
            out.push("x^n");
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct HeuristicRecognizer {
    dark_threshold: u8,
}

impl Default for HeuristicRecognizer {
    fn default() -> Self {
        Self {
            dark_threshold: DEFAULT_DARK_THRESHOLD,
        }
    }
}

impl HeuristicRecognizer {
    pub fn with_dark_threshold(dark_threshold: u8) -> Self {
        Self { dark_threshold }
    }

    /// Best-guess LaTeX for the image.
    pub fn recognize(&self, img: &NormalizedImage) -> String {
        self.recognize_luma(&img.to_luma())
    }

    pub fn recognize_luma(&self, luma: &GrayImage) -> String {
        let found = self.detect(luma);
        if found.any() {
            return found.snippets().join(" ");
        }
        template_for(luma.width(), luma.height()).to_string()
    }

    /// Run the four detectors.
    pub fn detect(&self, luma: &GrayImage) -> Detections {
        let (w, h) = luma.dimensions();
        if w == 0 || h == 0 {
            return Detections::default();
        }

        Detections {
            integral: self.integral_stroke(luma),
            fraction: self.fraction_bar(luma),
            sqrt: self.radical(luma),
            power: self.superscript(luma),
        }
    }

    fn is_dark(&self, luma: &GrayImage, x: u32, y: u32) -> bool {
        luma.get_pixel(x, y)[0] < self.dark_threshold
    }

    /// Share of dark pixels in `[x0, x1) × [y0, y1)`; empty regions give 0.
    fn dark_ratio(&self, luma: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32) -> f64 {
        let area = (x1.saturating_sub(x0) as u64) * (y1.saturating_sub(y0) as u64);
        if area == 0 {
            return 0.0;
        }
        let mut dark = 0u64;
        for y in y0..y1 {
            for x in x0..x1 {
                if self.is_dark(luma, x, y) {
                    dark += 1;
                }
            }
        }
        dark as f64 / area as f64
    }

    // A horizontal bar through the middle row.
    fn fraction_bar(&self, luma: &GrayImage) -> bool {
        let (w, h) = luma.dimensions();
        let mid = h / 2;
        self.dark_ratio(luma, 0, w, mid, mid + 1) > FRACTION_ROW_RATIO
    }

    // A tall stroke in the left quarter.
    fn integral_stroke(&self, luma: &GrayImage) -> bool {
        let (w, h) = luma.dimensions();
        let quarter = (w / 4).max(1);
        self.dark_ratio(luma, 0, quarter, 0, h) > INTEGRAL_REGION_RATIO
    }

    // Check-mark rising from the lower left of the top-left box, plus a
    // vinculum along the top.
    fn radical(&self, luma: &GrayImage) -> bool {
        let (w, h) = luma.dimensions();
        let n = (w.min(h) / 4).max(1);
        let diagonal = (0..n).filter(|&i| self.is_dark(luma, i, n - 1 - i)).count() as u32;
        if diagonal * 2 < n {
            return false;
        }

        let band = (h / 10).max(1);
        (0..band).any(|y| self.dark_ratio(luma, 0, w, y, y + 1) > SQRT_TOP_ROW_RATIO)
    }

    // Ink in the upper-right third.
    fn superscript(&self, luma: &GrayImage) -> bool {
        let (w, h) = luma.dimensions();
        self.dark_ratio(luma, 2 * w / 3, w, 0, (h / 3).max(1)) > POWER_REGION_RATIO
    }
}

/// Aspect-ratio template, chosen with `(w + h) mod len`.
pub fn template_for(w: u32, h: u32) -> &'static str {
    let pool: &[&'static str] = if w > 2 * h {
        &WIDE_TEMPLATES
    } else if h > 2 * w {
        &TALL_TEMPLATES
    } else {
        &SQUARE_TEMPLATES
    };
    let idx = (w as usize + h as usize) % pool.len();
    pool[idx]
}
