//! Result types produced by the recognition pipeline.

use crate::error::StrategyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of the strategy that produced (or failed to produce) LaTeX.
///
/// The serialised form is the `service` field of the `/convert` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// In-process / local recognition model.
    LocalModel,
    /// Hosted Pix2Text-compatible OCR API.
    RemoteApi,
    /// Pixel-density guesser.
    Heuristic,
    /// Hardcoded last-resort answer when every strategy failed.
    Fallback,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::LocalModel => "local-model",
            StrategyKind::RemoteApi => "remote-api",
            StrategyKind::Heuristic => "heuristic",
            StrategyKind::Fallback => "fallback",
        }
    }

    /// Whether results labelled with this kind are only approximations.
    pub fn is_advisory(&self) -> bool {
        matches!(self, StrategyKind::Heuristic | StrategyKind::Fallback)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    /// Accepts the canonical ids plus a few short aliases (`local`, `remote`,
    /// `api`, `p2t`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local-model" | "local" | "model" => Ok(StrategyKind::LocalModel),
            "remote-api" | "remote" | "api" | "p2t" => Ok(StrategyKind::RemoteApi),
            "heuristic" | "pattern" => Ok(StrategyKind::Heuristic),
            other => Err(format!(
                "unknown strategy '{other}' (expected local-model, remote-api or heuristic)"
            )),
        }
    }
}

/// One failed attempt, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy: StrategyKind,
    pub error: StrategyError,
    pub duration_ms: u64,
}

/// The answer for one normalised image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// LaTeX transcription (or the fallback constant).
    pub latex: String,

    /// Strategy that produced `latex`.
    pub strategy: StrategyKind,

    /// False only when every strategy failed and the fallback was used.
    pub success: bool,

    /// True when `latex` is a guess rather than a real recognition.
    pub advisory: bool,

    /// Failed attempts preceding the one that produced `latex`.
    pub attempts: Vec<AttemptRecord>,

    /// Wall-clock time spent in the pipeline.
    pub duration_ms: u64,
}

impl RecognitionResult {
    /// Caller-facing note for advisory results, `None` for real recognitions.
    pub fn note(&self) -> Option<&'static str> {
        match self.strategy {
            StrategyKind::Heuristic => Some(
                "Approximate result from pixel-pattern heuristics; no recognition model was available",
            ),
            StrategyKind::Fallback => {
                Some("Recognition failed; returned a minimal placeholder formula")
            }
            _ => None,
        }
    }
}
