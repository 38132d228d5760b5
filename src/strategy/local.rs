//! Local recognition model: lazily loaded, shared, driven through a temp file.
//!
//! The model itself is opaque. Anything implementing [`FormulaModel`] can sit
//! behind the strategy; the crate ships [`CommandModel`], which runs a
//! formula-OCR executable (e.g. `pix2tex`, `p2t`) on the image path and reads
//! LaTeX from stdout.
//!
//! ## Cancellation
//!
//! A recognition attempt is a future. When the pipeline's timeout drops it,
//! the recognizer child is killed (`kill_on_drop`) and the scratch PNG is
//! removed by its guard, so a hung recognizer leaks neither.
//!
//! ## Loading
//!
//! The model lives in a [`ModelCell`] owned by the pipeline. The first
//! request that needs it runs the loader; concurrent requests wait for that
//! load instead of starting their own. A failed load leaves the cell empty,
//! so the next request simply tries again.

use crate::config::LocalModelConfig;
use crate::error::StrategyError;
use crate::pipeline::encode::encode_png;
use crate::pipeline::normalize::NormalizedImage;
use crate::pipeline::scratch::ScratchImage;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Pending result of one [`FormulaModel::recognize_file`] call.
pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = Result<String, StrategyError>> + Send + 'a>>;

/// A thread-safe formula recognizer that reads an image file.
///
/// Implementations must stop their work when the returned future is
/// dropped. In-process models that block should move their work onto
/// `tokio::task::spawn_blocking`.
pub trait FormulaModel: Send + Sync {
    /// Recognise the formula in the PNG at `path`.
    fn recognize_file<'a>(&'a self, path: &'a Path) -> ModelFuture<'a>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "model"
    }
}

/// Produces a loaded model, or explains why it cannot.
pub type ModelLoader =
    Arc<dyn Fn() -> Result<Arc<dyn FormulaModel>, StrategyError> + Send + Sync>;

/// Single-initialisation slot for the shared model.
pub struct ModelCell {
    cell: OnceCell<Arc<dyn FormulaModel>>,
    loader: ModelLoader,
}

impl ModelCell {
    pub fn new(loader: ModelLoader) -> Self {
        Self {
            cell: OnceCell::new(),
            loader,
        }
    }

    /// A cell that starts out loaded with `model`.
    pub fn preloaded(model: Arc<dyn FormulaModel>) -> Self {
        let loader_model = model.clone();
        Self {
            cell: OnceCell::new_with(Some(model)),
            loader: Arc::new(move || Ok(loader_model.clone())),
        }
    }

    /// A cell whose loader runs [`CommandModel::resolve`] on `config`.
    pub fn for_command(config: LocalModelConfig) -> Self {
        Self::new(Arc::new(move || {
            CommandModel::resolve(&config).map(|m| Arc::new(m) as Arc<dyn FormulaModel>)
        }))
    }

    /// Whether the model is resident. Never triggers a load.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Return the model, loading it first if needed.
    pub async fn get(&self) -> Result<Arc<dyn FormulaModel>, StrategyError> {
        let model = self
            .cell
            .get_or_try_init(|| async {
                info!("Loading local recognition model...");
                let loader = self.loader.clone();
                let loaded = tokio::task::spawn_blocking(move || (*loader)())
                    .await
                    .map_err(|e| StrategyError::ModelUnavailable {
                        detail: format!("loader panicked: {e}"),
                    })?;
                match &loaded {
                    Ok(m) => info!("Local model '{}' loaded successfully", m.name()),
                    Err(e) => warn!("Failed to load local model: {}", e),
                }
                loaded
            })
            .await?;
        Ok(model.clone())
    }
}

impl fmt::Debug for ModelCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCell")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Strategy wrapper: temp file in, LaTeX out.
#[derive(Debug, Clone)]
pub struct LocalModelStrategy {
    model: Arc<ModelCell>,
    timeout: Duration,
}

impl LocalModelStrategy {
    pub fn new(model: Arc<ModelCell>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub fn cell(&self) -> &Arc<ModelCell> {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the model on `img`.
    ///
    /// The scratch file lives in this future: if the caller drops it on a
    /// timeout, the guard removes the file and the model call is cancelled.
    pub async fn recognize(&self, img: &NormalizedImage) -> Result<String, StrategyError> {
        let model = self.model.get().await?;
        let img = img.clone();

        let scratch = tokio::task::spawn_blocking(move || {
            let png = encode_png(&img).map_err(|e| StrategyError::Io {
                detail: format!("PNG encoding failed: {e}"),
            })?;
            ScratchImage::write_png(&png).map_err(|e| StrategyError::Io {
                detail: format!("could not write temp file: {e}"),
            })
        })
        .await
        .map_err(|e| StrategyError::Io {
            detail: format!("encoding task panicked: {e}"),
        })??;

        let result = model.recognize_file(scratch.path()).await;
        scratch.release();
        result
    }
}

/// Runs a recognizer executable as `program [args...] <image.png>`.
#[derive(Debug, Clone)]
pub struct CommandModel {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandModel {
    /// Locate the configured program, falling back to `fallback_program`
    /// (with no extra arguments) when it is not installed.
    pub fn resolve(config: &LocalModelConfig) -> Result<Self, StrategyError> {
        match which::which(&config.program) {
            Ok(program) => {
                debug!("Resolved local model command: {}", program.display());
                Ok(Self {
                    program,
                    args: config.args.clone(),
                })
            }
            Err(e) => {
                warn!(
                    "Local model command {:?} not found ({}), trying fallback",
                    config.program, e
                );
                let fallback = config.fallback_program.as_ref().ok_or_else(|| {
                    StrategyError::ModelUnavailable {
                        detail: format!("{:?} not found: {e}", config.program),
                    }
                })?;
                let program =
                    which::which(fallback).map_err(|e2| StrategyError::ModelUnavailable {
                        detail: format!("{:?} and fallback {:?} not found: {e2}", config.program, fallback),
                    })?;
                info!("Fallback model command loaded: {}", program.display());
                Ok(Self {
                    program,
                    args: Vec::new(),
                })
            }
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl FormulaModel for CommandModel {
    fn recognize_file<'a>(&'a self, path: &'a Path) -> ModelFuture<'a> {
        Box::pin(async move {
            let output = Command::new(&self.program)
                .args(&self.args)
                .arg(path)
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| StrategyError::ModelFailed {
                    detail: format!("could not run {}: {e}", self.program.display()),
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let tail: String = stderr.trim().chars().take(200).collect();
                return Err(StrategyError::ModelFailed {
                    detail: format!(
                        "{} exited with {}: {}",
                        self.program.display(),
                        output.status,
                        tail
                    ),
                });
            }

            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }

    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("command")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct EchoPath {
        seen: Mutex<Vec<PathBuf>>,
    }

    impl FormulaModel for EchoPath {
        fn recognize_file<'a>(&'a self, path: &'a Path) -> ModelFuture<'a> {
            Box::pin(async move {
                assert!(path.exists(), "scratch file must exist during inference");
                let bytes = std::fs::read(path).unwrap();
                assert!(image::load_from_memory(&bytes).is_ok());
                self.seen.lock().unwrap().push(path.to_path_buf());
                Ok("x^2".into())
            })
        }
    }

    fn image() -> NormalizedImage {
        NormalizedImage::from_rgb(RgbImage::from_pixel(8, 8, Rgb([255, 255, 255])))
    }

    #[tokio::test]
    async fn scratch_file_removed_after_inference() {
        let model = Arc::new(EchoPath {
            seen: Mutex::new(Vec::new()),
        });
        let cell = Arc::new(ModelCell::preloaded(model.clone()));
        let strategy = LocalModelStrategy::new(cell, Duration::from_secs(5));

        assert_eq!(strategy.recognize(&image()).await.unwrap(), "x^2");
        let seen = model.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].exists());
    }

    #[tokio::test]
    async fn failed_load_is_retried_on_next_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cell = ModelCell::new(Arc::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(StrategyError::ModelUnavailable {
                    detail: "first load fails".into(),
                })
            } else {
                Ok(Arc::new(EchoPath {
                    seen: Mutex::new(Vec::new()),
                }) as Arc<dyn FormulaModel>)
            }
        }));

        assert!(!cell.is_loaded());
        assert!(cell.get().await.is_err());
        assert!(!cell.is_loaded());
        assert!(cell.get().await.is_ok());
        assert!(cell.is_loaded());
        // Loaded once; later calls reuse it.
        assert!(cell.get().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_program_without_fallback_is_unavailable() {
        let cfg = LocalModelConfig::new("img2latex-no-such-recognizer-binary");
        let err = CommandModel::resolve(&cfg).unwrap_err();
        assert!(matches!(err, StrategyError::ModelUnavailable { .. }));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        // Run through `sh`: exec'ing a just-written file races with forks
        // in other test threads (ETXTBSY).
        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("{body}\n")).unwrap();
            path
        }

        fn sh_config(script: &Path, extra: &[&str]) -> LocalModelConfig {
            let mut cfg = LocalModelConfig::new("sh");
            cfg.args = std::iter::once(script.to_string_lossy().into_owned())
                .chain(extra.iter().map(|s| s.to_string()))
                .collect();
            cfg
        }

        #[tokio::test]
        async fn command_model_reads_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let prog = script(dir.path(), "ok.sh", "printf '%s\\n' '$$\\frac{1}{2}$$'");
            let model = CommandModel::resolve(&sh_config(&prog, &[])).unwrap();
            let out = model.recognize_file(Path::new("/dev/null")).await.unwrap();
            assert_eq!(out.trim(), "$$\\frac{1}{2}$$");
            assert_eq!(model.name(), "sh");
        }

        #[tokio::test]
        async fn command_model_passes_image_path_last() {
            let dir = tempfile::tempdir().unwrap();
            let prog = script(dir.path(), "args.sh", "echo \"$1|$2\"");
            let model = CommandModel::resolve(&sh_config(&prog, &["--formula"])).unwrap();
            let out = model.recognize_file(Path::new("/tmp/some.png")).await.unwrap();
            assert_eq!(out.trim(), "--formula|/tmp/some.png");
        }

        #[tokio::test]
        async fn nonzero_exit_is_model_failure() {
            let dir = tempfile::tempdir().unwrap();
            let prog = script(dir.path(), "fail.sh", "echo boom >&2; exit 3");
            let model = CommandModel::resolve(&sh_config(&prog, &[])).unwrap();
            let err = model.recognize_file(Path::new("/dev/null")).await.unwrap_err();
            match err {
                StrategyError::ModelFailed { detail } => assert!(detail.contains("boom")),
                other => panic!("unexpected {other:?}"),
            }
        }

        #[tokio::test]
        async fn timed_out_command_is_killed_and_scratch_removed() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("image-path");
            let done = dir.path().join("done");
            let prog = script(
                dir.path(),
                "slow.sh",
                &format!(
                    "printf '%s' \"$1\" > '{}'; sleep 2; touch '{}'",
                    marker.display(),
                    done.display()
                ),
            );
            let cell = Arc::new(ModelCell::for_command(sh_config(&prog, &[])));
            let strategy = LocalModelStrategy::new(cell, Duration::from_secs(1));

            let outcome =
                tokio::time::timeout(strategy.timeout(), strategy.recognize(&image())).await;
            assert!(outcome.is_err(), "attempt should have timed out");

            let scratch = PathBuf::from(std::fs::read_to_string(&marker).unwrap());
            assert!(scratch.to_string_lossy().ends_with(".png"));
            assert!(!scratch.exists(), "scratch file left behind");

            tokio::time::sleep(Duration::from_millis(2500)).await;
            assert!(!done.exists(), "recognizer kept running after timeout");
        }

        #[tokio::test]
        async fn fallback_program_used_without_primary_args() {
            let mut cfg = LocalModelConfig::new("img2latex-no-such-recognizer-binary");
            cfg.args = vec!["--ignored".into()];
            cfg.fallback_program = Some(PathBuf::from("echo"));
            let model = CommandModel::resolve(&cfg).unwrap();
            assert_eq!(model.name(), "echo");
            let out = model.recognize_file(Path::new("/dev/null")).await.unwrap();
            assert_eq!(out.trim(), "/dev/null");
        }
    }
}
