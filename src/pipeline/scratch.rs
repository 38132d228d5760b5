//! Request-scoped scratch files for recognizers that need a path.
//!
//! A [`ScratchImage`] is created right before an external call and removed
//! right after it, whatever the outcome. Call [`ScratchImage::release`] on
//! the normal path so a failed deletion is logged; `Drop` removes the file
//! on every other path (early return, panic unwinding).

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A PNG written to a named temporary file.
#[derive(Debug)]
pub struct ScratchImage {
    file: NamedTempFile,
}

impl ScratchImage {
    /// Write `png` to a fresh `.png` temp file.
    pub fn write_png(png: &[u8]) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("img2latex-")
            .suffix(".png")
            .tempfile()?;
        file.write_all(png)?;
        file.flush()?;
        debug!("Image saved to temporary file: {}", file.path().display());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the file now. Failures are logged, never returned.
    pub fn release(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!("Temporary file cleaned up: {}", path.display()),
            Err(e) => warn!(
                "Failed to clean up temporary file {}: {}",
                path.display(),
                e
            ),
        }
    }
}
