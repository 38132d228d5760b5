//! # img2latex
//!
//! Turn images of mathematical formulas into LaTeX.
//!
//! ## Why this crate?
//!
//! Formula OCR backends come and go: a local model may not be installed, the
//! hosted API may be down or over quota. This crate puts them behind one
//! ordered chain and always answers, labelling results that are only a guess
//! so callers can tell a transcription from an approximation.
//!
//! ## Pipeline Overview
//!
//! ```text
//! data:image/png;base64,…
//!  │
//!  ├─ 1. Validate   data-URL prefix, base64, encoded-size ceiling
//!  ├─ 2. Normalise  decode → fit within bound (Lanczos3) → white background
//!  │                → optional 32-px grid (CPU-bound, spawn_blocking)
//!  ├─ 3. Recognise  local model → remote API → heuristic, first good answer wins
//!  ├─ 4. Polish     strip delimiters, fences, invisible chars, whitespace
//!  └─ 5. Output     LaTeX + which strategy served it
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use img2latex::{normalize_data_url, RecognitionPipeline, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::default();
//!     let pipeline = RecognitionPipeline::from_config(&config)?;
//!
//!     let data_url = std::fs::read_to_string("formula.txt")?;
//!     let image = normalize_data_url(&data_url, &config.normalize_options())?;
//!     let result = pipeline.recognize(&image).await?;
//!     println!("{} (via {})", result.latex, result.strategy);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `img2latex` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the library or the router:
//! ```toml
//! img2latex = { version = "0.1", default-features = false }
//! ```
//!
//! ## Strategies
//!
//! | Id | Backend | Advisory |
//! |----|---------|----------|
//! | `local-model` | recognizer executable on `PATH`, loaded lazily | no |
//! | `remote-api`  | Pix2Text-compatible web API | no |
//! | `heuristic`   | pixel-density guesser | yes |
//! | `fallback`    | fixed formula when all of the above failed | yes |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod recognize;
pub mod server;
pub mod strategy;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{LastResort, LocalModelConfig, RemoteApiConfig, ServiceConfig, ServiceConfigBuilder};
pub use error::{Img2TexError, StrategyError};
pub use output::{AttemptRecord, RecognitionResult, StrategyKind};
pub use pipeline::normalize::{normalize_bytes, normalize_data_url, NormalizeOptions, NormalizedImage};
pub use recognize::{RecognitionPipeline, FALLBACK_LATEX};
pub use server::{router, serve, AppState};
pub use strategy::{FormulaModel, HeuristicRecognizer, ModelCell, ModelFuture, Strategy};
