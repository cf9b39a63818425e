//! Handler for adapter discovery.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LoraListResponse {
    pub loras: Vec<String>,
    pub count: usize,
}

/// GET /loras
///
/// Adapters under the configured root, reverse sorted by name.
pub async fn list_loras(State(state): State<AppState>) -> AppResult<Json<LoraListResponse>> {
    let adapters = std::sync::Arc::clone(&state.adapters);
    let loras = tokio::task::spawn_blocking(move || adapters.list())
        .await
        .map_err(|e| AppError::InternalError(format!("adapter scan failed: {e}")))?;

    Ok(Json(LoraListResponse {
        count: loras.len(),
        loras,
    }))
}
