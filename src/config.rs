//! Configuration types for the recognition service.
//!
//! All behaviour is controlled through [`ServiceConfig`], built via its
//! [`ServiceConfigBuilder`]. The config is read once at startup and then
//! shared read-only (behind an `Arc`) by every request.

use crate::error::Img2TexError;
use crate::output::StrategyKind;
use crate::pipeline::normalize::NormalizeOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default Pix2Text web API endpoint.
pub const DEFAULT_REMOTE_ENDPOINT: &str = "https://p2t.breezedeus.com/api/v1/pix2text";

/// Configuration for the recognition service.
///
/// # Example
/// ```rust
/// use img2latex::{ServiceConfig, StrategyKind};
///
/// let config = ServiceConfig::builder()
///     .max_dimension(2048)
///     .pad_to_alignment(true)
///     .strategy_order(vec![StrategyKind::RemoteApi, StrategyKind::Heuristic])
///     .build()
///     .unwrap();
/// assert_eq!(config.max_dimension, 2048);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Ceiling on the base64 payload length in bytes. Default: 8 MiB.
    ///
    /// Checked on the encoded text before decoding, so a small raster that
    /// arrives badly bloated is still rejected.
    pub max_encoded_bytes: usize,

    /// Ceiling on the whole HTTP request body in bytes. Default: 16 MiB.
    pub max_body_bytes: usize,

    /// Largest allowed width or height after normalisation. Default: 1024.
    pub max_dimension: u32,

    /// Resample both sides up to the next multiple of 32. Default: false.
    ///
    /// Some formula models use a 32-pixel stride internally and reject
    /// other sizes.
    pub pad_to_alignment: bool,

    /// Strategies to try, in order. Default: local model, remote API, heuristic.
    pub strategy_order: Vec<StrategyKind>,

    /// Local recognizer settings. `None` disables the local model even if it
    /// is listed in `strategy_order`.
    pub local_model: Option<LocalModelConfig>,

    /// Remote OCR API settings.
    pub remote_api: RemoteApiConfig,

    /// Output shorter than this many characters counts as a failure. Default: 3.
    pub min_latex_chars: usize,

    /// Output starting with any of these counts as a failure.
    pub placeholder_markers: Vec<String>,

    /// What to do when every strategy fails. Default: [`LastResort::Placeholder`].
    pub last_resort: LastResort,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_encoded_bytes: 8 * 1024 * 1024,
            max_body_bytes: 16 * 1024 * 1024,
            max_dimension: 1024,
            pad_to_alignment: false,
            strategy_order: vec![
                StrategyKind::LocalModel,
                StrategyKind::RemoteApi,
                StrategyKind::Heuristic,
            ],
            local_model: None,
            remote_api: RemoteApiConfig::default(),
            min_latex_chars: 3,
            placeholder_markers: vec![
                "[placeholder]".to_string(),
                "\\text{placeholder}".to_string(),
                "\\text{?}".to_string(),
                "...".to_string(),
            ],
            last_resort: LastResort::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Options handed to the image normaliser.
    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            max_encoded_bytes: self.max_encoded_bytes,
            max_dimension: self.max_dimension,
            pad_to_alignment: self.pad_to_alignment,
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn max_encoded_bytes(mut self, n: usize) -> Self {
        self.config.max_encoded_bytes = n;
        self
    }

    pub fn max_body_bytes(mut self, n: usize) -> Self {
        self.config.max_body_bytes = n;
        self
    }

    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = px;
        self
    }

    pub fn pad_to_alignment(mut self, v: bool) -> Self {
        self.config.pad_to_alignment = v;
        self
    }

    pub fn strategy_order(mut self, order: Vec<StrategyKind>) -> Self {
        self.config.strategy_order = order;
        self
    }

    pub fn local_model(mut self, local: LocalModelConfig) -> Self {
        self.config.local_model = Some(local);
        self
    }

    pub fn remote_api(mut self, remote: RemoteApiConfig) -> Self {
        self.config.remote_api = remote;
        self
    }

    pub fn min_latex_chars(mut self, n: usize) -> Self {
        self.config.min_latex_chars = n;
        self
    }

    pub fn placeholder_markers(mut self, markers: Vec<String>) -> Self {
        self.config.placeholder_markers = markers;
        self
    }

    pub fn last_resort(mut self, v: LastResort) -> Self {
        self.config.last_resort = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ServiceConfig, Img2TexError> {
        let c = &self.config;
        if c.max_dimension < 32 {
            return Err(Img2TexError::InvalidConfig(format!(
                "max_dimension must be ≥ 32, got {}",
                c.max_dimension
            )));
        }
        if c.max_encoded_bytes == 0 || c.max_encoded_bytes > c.max_body_bytes {
            return Err(Img2TexError::InvalidConfig(format!(
                "max_encoded_bytes must be 1–{} (the body limit), got {}",
                c.max_body_bytes, c.max_encoded_bytes
            )));
        }
        if c.strategy_order.contains(&StrategyKind::Fallback) {
            return Err(Img2TexError::InvalidConfig(
                "'fallback' is not a selectable strategy".into(),
            ));
        }
        if c.remote_api.timeout_secs == 0 {
            return Err(Img2TexError::InvalidConfig(
                "remote API timeout must be ≥ 1s".into(),
            ));
        }
        if let Some(local) = &c.local_model {
            if local.inference_timeout_secs == 0 {
                return Err(Img2TexError::InvalidConfig(
                    "local inference timeout must be ≥ 1s".into(),
                ));
            }
        }

        // Keep the first occurrence of each strategy.
        let mut seen = Vec::with_capacity(self.config.strategy_order.len());
        self.config.strategy_order.retain(|k| {
            if seen.contains(k) {
                false
            } else {
                seen.push(*k);
                true
            }
        });

        Ok(self.config)
    }
}

/// Settings for the local recognizer executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    /// Recognizer executable (name on `PATH` or absolute path).
    pub program: PathBuf,

    /// Extra arguments placed before the image path.
    pub args: Vec<String>,

    /// Tried when `program` cannot be resolved, with no extra arguments.
    pub fallback_program: Option<PathBuf>,

    /// Per-inference timeout in seconds. Default: 120.
    pub inference_timeout_secs: u64,
}

impl LocalModelConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            fallback_program: None,
            inference_timeout_secs: 120,
        }
    }
}

/// Settings for the hosted OCR API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteApiConfig {
    /// Multipart upload endpoint.
    pub endpoint: String,

    /// Request timeout in seconds. Default: 30.
    pub timeout_secs: u64,
}

impl Default for RemoteApiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
            timeout_secs: 30,
        }
    }
}

/// Behaviour when the whole strategy chain fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LastResort {
    /// Return [`crate::recognize::FALLBACK_LATEX`] labelled `fallback`. (default)
    #[default]
    Placeholder,
    /// Return [`Img2TexError::AllStrategiesFailed`].
    Error,
}
