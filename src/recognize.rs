//! The recognition pipeline: ordered strategies with fallback.
//!
//! ## Ordering
//!
//! Strategies run strictly one after another in configured order, never
//! concurrently. Racing them would bill the remote API for requests whose
//! answer is thrown away, and would make it ambiguous which backend served
//! a response.
//!
//! ## Sufficiency
//!
//! A strategy "succeeds" only if its cleaned output is non-empty, at least
//! `min_latex_chars` long, and does not start with a placeholder marker.
//! Anything else counts as a failure and the next strategy runs.

use crate::config::{LastResort, ServiceConfig};
use crate::error::{Img2TexError, StrategyError};
use crate::output::{AttemptRecord, RecognitionResult, StrategyKind};
use crate::pipeline::normalize::NormalizedImage;
use crate::pipeline::postprocess::clean_latex;
use crate::strategy::{
    HeuristicRecognizer, LocalModelStrategy, ModelCell, RemoteApiStrategy, Strategy,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Returned, labelled `fallback`, when every strategy failed.
pub const FALLBACK_LATEX: &str = "x";

/// Ordered strategy chain plus the rules for judging and labelling results.
#[derive(Debug, Clone)]
pub struct RecognitionPipeline {
    strategies: Vec<Strategy>,
    min_latex_chars: usize,
    placeholder_markers: Vec<String>,
    last_resort: LastResort,
}

impl RecognitionPipeline {
    /// A pipeline over `strategies` with default sufficiency rules.
    pub fn new(strategies: Vec<Strategy>) -> Self {
        let defaults = ServiceConfig::default();
        Self {
            strategies,
            min_latex_chars: defaults.min_latex_chars,
            placeholder_markers: defaults.placeholder_markers,
            last_resort: defaults.last_resort,
        }
    }

    /// Build the chain described by `config.strategy_order`.
    ///
    /// A local model listed in the order but absent from the config is
    /// skipped, so "local first if present" needs no special casing.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, Img2TexError> {
        let mut strategies = Vec::with_capacity(config.strategy_order.len());

        for kind in &config.strategy_order {
            match kind {
                StrategyKind::LocalModel => match &config.local_model {
                    Some(local) => {
                        let cell = Arc::new(ModelCell::for_command(local.clone()));
                        let timeout = Duration::from_secs(local.inference_timeout_secs);
                        strategies.push(Strategy::LocalModel(LocalModelStrategy::new(
                            cell, timeout,
                        )));
                    }
                    None => info!("No local model configured; skipping local-model strategy"),
                },
                StrategyKind::RemoteApi => {
                    strategies.push(Strategy::RemoteApi(RemoteApiStrategy::new(
                        &config.remote_api,
                    )?));
                }
                StrategyKind::Heuristic => {
                    strategies.push(Strategy::Heuristic(HeuristicRecognizer::default()));
                }
                StrategyKind::Fallback => {
                    warn!("'fallback' is not a strategy; ignoring it in the order")
                }
            }
        }

        let kinds: Vec<&str> = strategies.iter().map(|s| s.kind().as_str()).collect();
        info!("Recognition order: [{}]", kinds.join(", "));

        Ok(Self {
            strategies,
            min_latex_chars: config.min_latex_chars,
            placeholder_markers: config.placeholder_markers.clone(),
            last_resort: config.last_resort,
        })
    }

    pub fn with_min_latex_chars(mut self, n: usize) -> Self {
        self.min_latex_chars = n;
        self
    }

    pub fn with_placeholder_markers(mut self, markers: Vec<String>) -> Self {
        self.placeholder_markers = markers;
        self
    }

    pub fn with_last_resort(mut self, last_resort: LastResort) -> Self {
        self.last_resort = last_resort;
        self
    }

    /// Strategy ids in the order they will be tried.
    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(Strategy::kind).collect()
    }

    /// True when no strategy is configured at all.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Whether a local model is resident. Never triggers a load.
    pub fn model_loaded(&self) -> bool {
        self.strategies
            .iter()
            .filter_map(Strategy::model_cell)
            .any(|cell| cell.is_loaded())
    }

    /// Whether cleaned output is good enough to return.
    pub fn is_sufficient(&self, latex: &str) -> bool {
        let trimmed = latex.trim();
        !trimmed.is_empty()
            && trimmed.chars().count() >= self.min_latex_chars
            && !self
                .placeholder_markers
                .iter()
                .any(|m| !m.is_empty() && trimmed.starts_with(m.as_str()))
    }

    /// Recognise `img`, trying each strategy until one gives usable LaTeX.
    ///
    /// # Errors
    /// - [`Img2TexError::RecognizerUnavailable`] if no strategy is configured
    /// - [`Img2TexError::AllStrategiesFailed`] if all failed and the
    ///   last resort is [`LastResort::Error`]
    pub async fn recognize(&self, img: &NormalizedImage) -> Result<RecognitionResult, Img2TexError> {
        let start = Instant::now();
        if self.strategies.is_empty() {
            return Err(Img2TexError::RecognizerUnavailable);
        }
        debug!("Recognising {}x{} image", img.width(), img.height());

        let mut attempts: Vec<AttemptRecord> = Vec::new();

        for strategy in &self.strategies {
            let kind = strategy.kind();
            let attempt_start = Instant::now();

            match self.attempt(strategy, img).await {
                Ok(latex) => {
                    info!(
                        "{} produced {} characters in {}ms",
                        kind,
                        latex.len(),
                        attempt_start.elapsed().as_millis()
                    );
                    return Ok(RecognitionResult {
                        latex,
                        strategy: kind,
                        success: true,
                        advisory: kind.is_advisory(),
                        attempts,
                        duration_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Err(error) => {
                    warn!("{} failed: {}", kind, error);
                    attempts.push(AttemptRecord {
                        strategy: kind,
                        error,
                        duration_ms: attempt_start.elapsed().as_millis() as u64,
                    });
                }
            }
        }

        match self.last_resort {
            LastResort::Placeholder => {
                warn!(
                    "All {} strategies failed; returning fallback formula",
                    attempts.len()
                );
                Ok(RecognitionResult {
                    latex: FALLBACK_LATEX.to_string(),
                    strategy: StrategyKind::Fallback,
                    success: false,
                    advisory: true,
                    attempts,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
            LastResort::Error => Err(Img2TexError::AllStrategiesFailed {
                attempts: attempts.len(),
                first_error: attempts
                    .first()
                    .map(|a| a.error.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            }),
        }
    }

    /// One bounded attempt, with cleanup and the sufficiency check applied.
    async fn attempt(
        &self,
        strategy: &Strategy,
        img: &NormalizedImage,
    ) -> Result<String, StrategyError> {
        let budget = strategy.timeout();
        let raw = tokio::time::timeout(budget, strategy.recognize(img))
            .await
            .map_err(|_| StrategyError::Timeout {
                strategy: strategy.kind(),
                secs: budget.as_secs(),
            })??;

        let latex = clean_latex(&raw);
        if self.is_sufficient(&latex) {
            Ok(latex)
        } else {
            Err(StrategyError::Insufficient { output: latex })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalModelConfig;
    use crate::strategy::{FormulaModel, ModelFuture};
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned-answer model that counts how often it is called.
    struct Stub {
        answer: Result<String, StrategyError>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Stub {
        fn ok(s: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(s.to_string()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: Err(StrategyError::ModelFailed {
                    detail: "stub failure".into(),
                }),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(s: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(s.to_string()),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FormulaModel for Stub {
        fn recognize_file<'a>(&'a self, _path: &'a Path) -> ModelFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                self.answer.clone()
            })
        }
    }

    fn local(stub: &Arc<Stub>, timeout: Duration) -> Strategy {
        let cell = Arc::new(ModelCell::preloaded(stub.clone()));
        Strategy::LocalModel(LocalModelStrategy::new(cell, timeout))
    }

    fn blank(w: u32, h: u32) -> NormalizedImage {
        NormalizedImage::from_rgb(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let first = Stub::ok("\\frac{a}{b}");
        let second = Stub::ok("y = x");
        let pipeline = RecognitionPipeline::new(vec![
            local(&first, Duration::from_secs(5)),
            local(&second, Duration::from_secs(5)),
        ]);

        let result = pipeline.recognize(&blank(16, 16)).await.unwrap();
        assert_eq!(result.latex, "\\frac{a}{b}");
        assert_eq!(result.strategy, StrategyKind::LocalModel);
        assert!(result.success && !result.advisory);
        assert!(result.attempts.is_empty());
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn all_failing_returns_fallback() {
        let a = Stub::failing();
        let b = Stub::failing();
        let pipeline = RecognitionPipeline::new(vec![
            local(&a, Duration::from_secs(5)),
            local(&b, Duration::from_secs(5)),
        ]);

        let result = pipeline.recognize(&blank(16, 16)).await.unwrap();
        assert_eq!(result.latex, FALLBACK_LATEX);
        assert_eq!(result.strategy, StrategyKind::Fallback);
        assert!(!result.success);
        assert!(result.advisory);
        assert_eq!(result.attempts.len(), 2);
        assert_eq!((a.calls(), b.calls()), (1, 1));
    }

    #[tokio::test]
    async fn all_failing_with_error_policy_is_error() {
        let a = Stub::failing();
        let pipeline = RecognitionPipeline::new(vec![local(&a, Duration::from_secs(5))])
            .with_last_resort(LastResort::Error);

        let err = pipeline.recognize(&blank(16, 16)).await.unwrap_err();
        match err {
            Img2TexError::AllStrategiesFailed {
                attempts,
                first_error,
            } => {
                assert_eq!(attempts, 1);
                assert!(first_error.contains("stub failure"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_pipeline_is_unavailable() {
        let pipeline = RecognitionPipeline::new(vec![]);
        assert!(pipeline.is_empty());
        assert!(matches!(
            pipeline.recognize(&blank(8, 8)).await,
            Err(Img2TexError::RecognizerUnavailable)
        ));
    }

    #[tokio::test]
    async fn insufficient_output_falls_through() {
        let short = Stub::ok("$x$");
        let placeholder = Stub::ok("[placeholder] formula");
        let good = Stub::ok("a^2 + b^2");
        let pipeline = RecognitionPipeline::new(vec![
            local(&short, Duration::from_secs(5)),
            local(&placeholder, Duration::from_secs(5)),
            local(&good, Duration::from_secs(5)),
        ]);

        let result = pipeline.recognize(&blank(8, 8)).await.unwrap();
        assert_eq!(result.latex, "a^2 + b^2");
        assert_eq!(result.attempts.len(), 2);
        assert!(matches!(
            result.attempts[0].error,
            StrategyError::Insufficient { ref output } if output == "x"
        ));
    }

    #[tokio::test]
    async fn output_is_cleaned_before_return() {
        let stub = Stub::ok("$$ \\sqrt{2}   + 1 $$\n");
        let pipeline = RecognitionPipeline::new(vec![local(&stub, Duration::from_secs(5))]);
        let result = pipeline.recognize(&blank(8, 8)).await.unwrap();
        assert_eq!(result.latex, "\\sqrt{2} + 1");
    }

    #[tokio::test]
    async fn timeout_advances_to_next_strategy() {
        let slow = Stub::slow("never used", Duration::from_millis(1500));
        let pipeline = RecognitionPipeline::new(vec![
            local(&slow, Duration::from_millis(100)),
            Strategy::Heuristic(HeuristicRecognizer::default()),
        ]);

        let result = pipeline.recognize(&blank(64, 64)).await.unwrap();
        assert_eq!(result.strategy, StrategyKind::Heuristic);
        assert_eq!(result.latex, "x^2 + y^2 = r^2");
        assert!(result.advisory);
        assert!(matches!(
            result.attempts[0].error,
            StrategyError::Timeout {
                strategy: StrategyKind::LocalModel,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_local_command_leaves_no_process_or_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("image-path");
        let done = dir.path().join("done");
        let script = dir.path().join("slow.sh");
        std::fs::write(
            &script,
            format!(
                "printf '%s' \"$1\" > '{}'\nsleep 2\ntouch '{}'\n",
                marker.display(),
                done.display()
            ),
        )
        .unwrap();

        let mut local = LocalModelConfig::new("sh");
        local.args = vec![script.to_string_lossy().into_owned()];
        local.inference_timeout_secs = 1;
        let config = ServiceConfig::builder()
            .strategy_order(vec![StrategyKind::LocalModel, StrategyKind::Heuristic])
            .local_model(local)
            .build()
            .unwrap();
        let p = RecognitionPipeline::from_config(&config).unwrap();

        let result = p.recognize(&blank(64, 64)).await.unwrap();
        assert_eq!(result.strategy, StrategyKind::Heuristic);
        assert!(matches!(
            result.attempts[0].error,
            StrategyError::Timeout {
                strategy: StrategyKind::LocalModel,
                ..
            }
        ));

        let scratch = std::path::PathBuf::from(std::fs::read_to_string(&marker).unwrap());
        assert!(!scratch.exists(), "scratch {} left behind", scratch.display());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!done.exists(), "recognizer kept running after timeout");
    }

    #[tokio::test]
    async fn heuristic_is_labelled_advisory() {
        let pipeline =
            RecognitionPipeline::new(vec![Strategy::Heuristic(HeuristicRecognizer::default())]);
        let result = pipeline.recognize(&blank(300, 2000)).await.unwrap();
        assert_eq!(result.latex, "\\sqrt{x}");
        assert!(result.success);
        assert!(result.advisory);
    }

    #[test]
    fn sufficiency_rules() {
        let p = RecognitionPipeline::new(vec![]);
        assert!(p.is_sufficient("x^2"));
        assert!(!p.is_sufficient(""));
        assert!(!p.is_sufficient("  "));
        assert!(!p.is_sufficient("xy"));
        assert!(!p.is_sufficient("\\text{?} unreadable"));
        assert!(!p.is_sufficient("..."));

        let relaxed = RecognitionPipeline::new(vec![])
            .with_min_latex_chars(1)
            .with_placeholder_markers(vec![]);
        assert!(relaxed.is_sufficient("x"));
        assert!(relaxed.is_sufficient("..."));
    }

    #[test]
    fn from_config_skips_unconfigured_local_model() {
        let config = ServiceConfig::default();
        let p = RecognitionPipeline::from_config(&config).unwrap();
        assert_eq!(
            p.strategy_kinds(),
            vec![StrategyKind::RemoteApi, StrategyKind::Heuristic]
        );
        assert!(!p.model_loaded());
    }

    #[test]
    fn from_config_keeps_configured_order() {
        let config = ServiceConfig::builder()
            .strategy_order(vec![
                StrategyKind::Heuristic,
                StrategyKind::LocalModel,
                StrategyKind::RemoteApi,
            ])
            .local_model(LocalModelConfig::new("img2latex-no-such-recognizer-binary"))
            .build()
            .unwrap();
        let p = RecognitionPipeline::from_config(&config).unwrap();
        assert_eq!(
            p.strategy_kinds(),
            vec![
                StrategyKind::Heuristic,
                StrategyKind::LocalModel,
                StrategyKind::RemoteApi
            ]
        );
        // Building the pipeline must not load the model.
        assert!(!p.model_loaded());
    }

    #[tokio::test]
    async fn unloadable_model_falls_through_and_stays_unloaded() {
        let config = ServiceConfig::builder()
            .strategy_order(vec![StrategyKind::LocalModel, StrategyKind::Heuristic])
            .local_model(LocalModelConfig::new("img2latex-no-such-recognizer-binary"))
            .build()
            .unwrap();
        let p = RecognitionPipeline::from_config(&config).unwrap();

        let result = p.recognize(&blank(64, 64)).await.unwrap();
        assert_eq!(result.strategy, StrategyKind::Heuristic);
        assert!(matches!(
            result.attempts[0].error,
            StrategyError::ModelUnavailable { .. }
        ));
        assert!(!p.model_loaded());
    }

    #[tokio::test]
    async fn model_loaded_reflects_cell() {
        let stub = Stub::ok("x + 1");
        let p = RecognitionPipeline::new(vec![local(&stub, Duration::from_secs(1))]);
        assert!(p.model_loaded());
    }
}
