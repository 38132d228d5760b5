//! Pipeline stages shared by every recognition request.
//!
//! ## Data Flow
//!
//! ```text
//! normalize ──▶ encode ──▶ scratch ──▶ (strategy) ──▶ postprocess
//! (data-URL)    (PNG)      (temp file)                 (cleanup)
//! ```
//!
//! 1. [`normalize`] — validate and decode the data-URL, bound the size,
//!    flatten alpha onto white, optionally align to a 32-px grid
//! 2. [`encode`] — PNG-encode the normalised image for external recognizers
//! 3. [`scratch`] — request-scoped temp file for recognizers that need a path
//! 4. [`postprocess`] — deterministic cleanup of the recognizer's LaTeX

pub mod encode;
pub mod normalize;
pub mod postprocess;
pub mod scratch;
