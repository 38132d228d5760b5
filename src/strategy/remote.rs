//! Hosted OCR API: multipart upload, JSON answer.
//!
//! Speaks the Pix2Text web API. The image goes up as a multipart `image`
//! part alongside `recognize_formula=true` / `recognize_text=false`, and the
//! answer looks like
//!
//! ```json
//! {"status": "success", "data": {"latex_results": [{"latex": "x^2"}]}}
//! ```
//!
//! A flat `{"latex": "..."}` body is accepted too, which covers most
//! self-hosted formula-OCR servers. Anything else is a failure the pipeline
//! recovers from by moving on.

use crate::config::RemoteApiConfig;
use crate::error::{Img2TexError, StrategyError};
use crate::output::StrategyKind;
use crate::pipeline::encode::encode_png;
use crate::pipeline::normalize::NormalizedImage;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RemoteApiStrategy {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl RemoteApiStrategy {
    pub fn new(config: &RemoteApiConfig) -> Result<Self, Img2TexError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Img2TexError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn recognize(&self, img: &NormalizedImage) -> Result<String, StrategyError> {
        let png = encode_png(img).map_err(|e| StrategyError::Io {
            detail: format!("PNG encoding failed: {e}"),
        })?;

        let part = Part::bytes(png)
            .file_name("image.png")
            .mime_str("image/png")
            .map_err(|e| StrategyError::Http {
                detail: e.to_string(),
            })?;
        let form = Form::new()
            .part("image", part)
            .text("recognize_formula", "true")
            .text("recognize_text", "false");

        info!("Calling remote OCR API at {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(StrategyError::BadStatus {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| match self.transport_error(e) {
                StrategyError::Http { detail } => StrategyError::MalformedResponse { detail },
                other => other,
            })?;

        let latex = extract_latex(&body)?;
        debug!("Remote OCR API returned {} characters", latex.len());
        Ok(latex)
    }

    fn transport_error(&self, e: reqwest::Error) -> StrategyError {
        if e.is_timeout() {
            StrategyError::Timeout {
                strategy: StrategyKind::RemoteApi,
                secs: self.timeout.as_secs(),
            }
        } else {
            StrategyError::Http {
                detail: e.to_string(),
            }
        }
    }
}

/// Pull the first LaTeX string out of an API response body.
pub fn extract_latex(body: &Value) -> Result<String, StrategyError> {
    if let Some(latex) = body.get("latex").and_then(Value::as_str) {
        return non_empty(latex);
    }

    match body.get("status").and_then(Value::as_str) {
        Some("success") => {}
        Some(other) => {
            return Err(StrategyError::MalformedResponse {
                detail: format!("status '{other}'"),
            })
        }
        None => {
            return Err(StrategyError::MalformedResponse {
                detail: "no 'status' or 'latex' field".into(),
            })
        }
    }

    let latex = body
        .get("data")
        .and_then(|d| d.get("latex_results"))
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(|first| first.get("latex"))
        .and_then(Value::as_str)
        .ok_or_else(|| StrategyError::MalformedResponse {
            detail: "missing data.latex_results[0].latex".into(),
        })?;

    non_empty(latex)
}

fn non_empty(latex: &str) -> Result<String, StrategyError> {
    if latex.trim().is_empty() {
        Err(StrategyError::MalformedResponse {
            detail: "empty latex field".into(),
        })
    } else {
        Ok(latex.to_string())
    }
}
