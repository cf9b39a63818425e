use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Root info payload.
#[derive(Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub status: &'static str,
    pub version: &'static str,
}

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests.
    pub status: &'static str,
    /// Whether the inference backend has model weights resident.
    pub model_loaded: bool,
    /// Effective concurrency ceiling.
    pub max_concurrent: usize,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
}

/// GET / -- service banner.
async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "voxgate TTS API",
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health -- liveness plus backend readiness.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.synthesizer.model_loaded(),
        max_concurrent: state.dispatcher.max_concurrent(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
}
