//! Error types for the img2latex library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Img2TexError`] — **Request-level**: the request cannot be served at
//!   all (bad data-URL, oversized payload, no recognizer configured). These
//!   are returned from the normaliser and the pipeline and map onto HTTP
//!   status codes in [`crate::server`].
//!
//! * [`StrategyError`] — **Non-fatal**: a single recognition attempt failed
//!   (model crashed, remote API timed out, output looked like a
//!   placeholder). The pipeline swallows these, records them in
//!   [`crate::output::AttemptRecord`] and moves on to the next strategy.

use crate::output::StrategyKind;
use thiserror::Error;

/// All request-level errors returned by the img2latex library.
#[derive(Debug, Error)]
pub enum Img2TexError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The submission is not an `data:image/...;base64,` URL.
    #[error("Invalid image format: {reason}")]
    InvalidImageFormat { reason: String },

    /// The encoded payload is larger than the configured ceiling.
    #[error("Image too large: {size} encoded bytes (limit {limit})")]
    ImageTooLarge { size: usize, limit: usize },

    /// Base64 or raster decoding failed.
    #[error("Could not decode image: {detail}")]
    DecodeError { detail: String },

    // ── Recognition errors ────────────────────────────────────────────────
    /// The pipeline has no strategy to run.
    #[error("No recognizer is available")]
    RecognizerUnavailable,

    /// Every configured strategy failed and the pipeline is configured to
    /// surface that instead of returning a placeholder.
    #[error("All {attempts} recognition strategies failed.\nFirst error: {first_error}")]
    AllStrategiesFailed { attempts: usize, first_error: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Server errors ─────────────────────────────────────────────────────
    /// Binding or serving the HTTP listener failed.
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Img2TexError {
    /// True for errors caused by the caller's input rather than the service.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Img2TexError::InvalidImageFormat { .. }
                | Img2TexError::ImageTooLarge { .. }
                | Img2TexError::DecodeError { .. }
        )
    }
}

/// A non-fatal error for a single recognition attempt.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum StrategyError {
    /// The attempt exceeded its time budget.
    #[error("{strategy} timed out after {secs}s")]
    Timeout { strategy: StrategyKind, secs: u64 },

    /// The local model could not be loaded.
    #[error("local model unavailable: {detail}")]
    ModelUnavailable { detail: String },

    /// The local model ran but reported an error.
    #[error("local model failed: {detail}")]
    ModelFailed { detail: String },

    /// Transport-level failure talking to the remote API.
    #[error("remote API request failed: {detail}")]
    Http { detail: String },

    /// The remote API answered with a non-success status code.
    #[error("remote API returned HTTP {status}")]
    BadStatus { status: u16 },

    /// The remote API answered but the body did not contain LaTeX.
    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },

    /// The strategy produced output too weak to return to a caller.
    #[error("insufficient output {output:?}")]
    Insufficient { output: String },

    /// Scratch-file or encoding failure before the call could be made.
    #[error("I/O error: {detail}")]
    Io { detail: String },
}
