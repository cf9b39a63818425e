//! Handlers for downloading and expiring generated audio.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use voxgate_core::error::CoreError;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET /download/{filename}
// ---------------------------------------------------------------------------

/// Stream a generated WAV file as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    let path = state
        .artifacts
        .resolve(&filename)
        .map_err(CoreError::from)?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        // Swept between resolve and read.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CoreError::NotFound {
                entity: "Artifact",
                id: filename,
            }
            .into());
        }
        Err(e) => {
            return Err(AppError::InternalError(format!(
                "failed to read artifact {filename}: {e}"
            )));
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

// ---------------------------------------------------------------------------
// DELETE /cleanup
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub deleted_count: usize,
}

/// Delete artifacts older than the configured retention window.
pub async fn cleanup(State(state): State<AppState>) -> AppResult<Json<CleanupResponse>> {
    let retention = state.config.artifact_retention();
    let artifacts = Arc::clone(&state.artifacts);

    let deleted = tokio::task::spawn_blocking(move || artifacts.cleanup(retention))
        .await
        .map_err(|e| AppError::InternalError(format!("cleanup task failed: {e}")))?
        .map_err(CoreError::from)?;

    tracing::info!(deleted, "Manual artifact cleanup");

    Ok(Json(CleanupResponse {
        message: format!("Deleted {deleted} old audio files"),
        deleted_count: deleted,
    }))
}
