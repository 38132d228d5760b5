//! JSON error bodies for the HTTP surface.
//!
//! Every error leaves the service as `{"error": "<short message>"}`. The
//! detailed cause goes to the log, never to the client.

use crate::error::Img2TexError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub error: String,

    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            status,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Endpoint not found")
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl From<Img2TexError> for ApiError {
    fn from(e: Img2TexError) -> Self {
        match &e {
            Img2TexError::InvalidImageFormat { .. } => {
                warn!("Rejected submission: {e}");
                ApiError::bad_request("Invalid image format")
            }
            Img2TexError::DecodeError { .. } => {
                warn!("Rejected submission: {e}");
                ApiError::bad_request("Could not decode image")
            }
            Img2TexError::ImageTooLarge { limit, .. } => {
                warn!("Rejected submission: {e}");
                ApiError::payload_too_large(format!(
                    "Image too large (max {}MB encoded)",
                    limit / (1024 * 1024)
                ))
            }
            Img2TexError::RecognizerUnavailable => {
                error!("{e}");
                ApiError::service_unavailable("Formula recognition is not available")
            }
            Img2TexError::AllStrategiesFailed { .. }
            | Img2TexError::InvalidConfig(_)
            | Img2TexError::Io(_)
            | Img2TexError::Internal(_) => {
                error!("Request failed: {e}");
                ApiError::internal()
            }
        }
    }
}

/// Map a failed JSON extraction onto the service's own error bodies.
pub fn from_json_rejection(rejection: JsonRejection, max_body_bytes: usize) -> ApiError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            ApiError::bad_request("Content-Type must be application/json")
        }
        JsonRejection::JsonSyntaxError(_) => ApiError::bad_request("Malformed JSON body"),
        JsonRejection::JsonDataError(_) => ApiError::bad_request("Field 'image' must be a string"),
        other if other.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            warn!("Request body over {} bytes rejected", max_body_bytes);
            ApiError::payload_too_large(format!(
                "File too large (max {}MB)",
                max_body_bytes / (1024 * 1024)
            ))
        }
        other => {
            warn!("Unreadable request body: {}", other.body_text());
            ApiError::bad_request("Could not read request body")
        }
    }
}
