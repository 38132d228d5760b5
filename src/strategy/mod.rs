//! Recognition strategies: the ways a normalised image becomes LaTeX.
//!
//! The set is closed. Each variant is a concrete type and [`Strategy`]
//! dispatches with a `match`, so the pipeline can read off a strategy's
//! [`StrategyKind`] and time budget without downcasting.
//!
//! | Variant | Backend | Time budget |
//! |---------|---------|-------------|
//! | [`Strategy::LocalModel`] | [`local::FormulaModel`] on a temp PNG | `inference_timeout_secs` (120 s) |
//! | [`Strategy::RemoteApi`]  | multipart POST to a Pix2Text-style API | `timeout_secs` (30 s) |
//! | [`Strategy::Heuristic`]  | pixel-density guesser | 5 s |

pub mod heuristic;
pub mod local;
pub mod remote;

use crate::error::StrategyError;
use crate::output::StrategyKind;
use crate::pipeline::normalize::NormalizedImage;
use std::time::Duration;

pub use heuristic::HeuristicRecognizer;
pub use local::{
    CommandModel, FormulaModel, LocalModelStrategy, ModelCell, ModelFuture, ModelLoader,
};
pub use remote::RemoteApiStrategy;

const HEURISTIC_TIMEOUT: Duration = Duration::from_secs(5);

/// One configured recognition method.
#[derive(Debug, Clone)]
pub enum Strategy {
    LocalModel(LocalModelStrategy),
    RemoteApi(RemoteApiStrategy),
    Heuristic(HeuristicRecognizer),
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::LocalModel(_) => StrategyKind::LocalModel,
            Strategy::RemoteApi(_) => StrategyKind::RemoteApi,
            Strategy::Heuristic(_) => StrategyKind::Heuristic,
        }
    }

    /// Upper bound the pipeline puts on a single attempt.
    pub fn timeout(&self) -> Duration {
        match self {
            Strategy::LocalModel(s) => s.timeout(),
            Strategy::RemoteApi(s) => s.timeout(),
            Strategy::Heuristic(_) => HEURISTIC_TIMEOUT,
        }
    }

    /// Raw, uncleaned output of one attempt.
    pub async fn recognize(&self, img: &NormalizedImage) -> Result<String, StrategyError> {
        match self {
            Strategy::LocalModel(s) => s.recognize(img).await,
            Strategy::RemoteApi(s) => s.recognize(img).await,
            Strategy::Heuristic(h) => {
                // Pixel scans are CPU-bound; keep them off the async workers.
                let h = h.clone();
                let img = img.clone();
                tokio::task::spawn_blocking(move || h.recognize(&img))
                    .await
                    .map_err(|e| StrategyError::Io {
                        detail: format!("heuristic task panicked: {e}"),
                    })
            }
        }
    }

    /// The model cell, for local-model strategies.
    pub fn model_cell(&self) -> Option<&std::sync::Arc<ModelCell>> {
        match self {
            Strategy::LocalModel(s) => Some(s.cell()),
            _ => None,
        }
    }
}
