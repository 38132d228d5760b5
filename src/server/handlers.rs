use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::{from_json_rejection, ApiError};
use super::AppState;
use crate::output::StrategyKind;
use crate::pipeline::normalize::normalize_data_url_blocking;

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    /// `data:image/<fmt>;base64,<payload>`
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub latex: String,
    pub status: String,
    pub service: StrategyKind,
    pub advisory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub strategies: Vec<StrategyKind>,
    pub version: String,
}

/// Health check. Reports model residency without loading it.
pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.pipeline.model_loaded(),
        strategies: state.pipeline.strategy_kinds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Convert a data-URL image into LaTeX.
pub async fn convert(
    State(state): State<AppState>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|rejection| from_json_rejection(rejection, state.config.max_body_bytes))?;

    let image = match request.image {
        Some(image) if !image.trim().is_empty() => image,
        _ => return Err(ApiError::bad_request("No image provided")),
    };

    if state.pipeline.is_empty() {
        return Err(crate::Img2TexError::RecognizerUnavailable.into());
    }

    info!("Processing /convert request ({} encoded bytes)", image.len());

    let normalized = normalize_data_url_blocking(image, state.config.normalize_options()).await?;
    debug!(
        "Normalised image to {}x{}",
        normalized.width(),
        normalized.height()
    );

    let result = state.pipeline.recognize(&normalized).await?;
    info!(
        "Served by {} in {}ms ({} failed attempts)",
        result.strategy,
        result.duration_ms,
        result.attempts.len()
    );

    Ok(Json(ConvertResponse {
        note: result.note().map(str::to_string),
        latex: result.latex,
        status: "success".to_string(),
        service: result.strategy,
        advisory: result.advisory,
    }))
}

/// JSON 404 for every unknown route.
pub async fn not_found() -> impl IntoResponse {
    ApiError::not_found()
}
