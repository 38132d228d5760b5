//! HTTP surface: `POST /convert`, `GET /health` and a JSON 404.
//!
//! The router is built from an [`AppState`] so tests can drive it in-process
//! with `tower::ServiceExt::oneshot`; [`serve`] binds it to a socket with
//! graceful shutdown on Ctrl+C or SIGTERM.

pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

use crate::config::ServiceConfig;
use crate::error::Img2TexError;
use crate::recognize::RecognitionPipeline;

pub use error::ApiError;
pub use handlers::{ConvertRequest, ConvertResponse, HealthResponse};

/// Shared, read-only request context.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RecognitionPipeline>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(pipeline: RecognitionPipeline, config: ServiceConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }

    /// Build the pipeline described by `config`.
    pub fn from_config(config: ServiceConfig) -> Result<Self, Img2TexError> {
        let pipeline = RecognitionPipeline::from_config(&config)?;
        Ok(Self::new(pipeline, config))
    }
}

/// Create the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/convert", post(handlers::convert))
        .route("/health", get(handlers::get_health))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Bind `addr` and serve until a shutdown signal arrives.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), Img2TexError> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Could not listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, shutting down..."),
        _ = terminate => warn!("Received terminate signal, shutting down..."),
    }
}
