//! Handler for `POST /synthesize`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use voxgate_core::synthesis::SynthesisInput;

use crate::engine::gateway::Submission;
use crate::error::{AppError, AppResult};
use crate::handlers::download_url;
use crate::state::AppState;

const MSG_QUEUED: &str = "Task submitted, query its status with the task_id";

/// Body returned by both submission modes.
///
/// Async submissions fill `estimated_time`; sync ones fill the artifact
/// fields.
#[derive(Debug, Serialize)]
pub struct SynthesizeResponse {
    pub task_id: String,
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    pub progress: f64,
}

/// POST /synthesize
///
/// Async mode (default) returns the task id immediately. Sync mode blocks
/// until the audio is written and returns its location.
pub async fn synthesize(
    State(state): State<AppState>,
    payload: Result<Json<SynthesisInput>, JsonRejection>,
) -> AppResult<Json<SynthesizeResponse>> {
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let response = match state.gateway.submit(input).await? {
        Submission::Queued {
            job_id,
            estimated_duration,
        } => SynthesizeResponse {
            task_id: job_id.to_string(),
            status: "submitted",
            message: MSG_QUEUED.to_string(),
            estimated_time: Some(estimated_duration),
            audio_path: None,
            download_url: None,
            sample_rate: None,
            progress: 0.0,
        },
        Submission::Completed { job_id, artifact } => SynthesizeResponse {
            task_id: job_id.to_string(),
            status: "success",
            message: crate::engine::progress::MSG_COMPLETED.to_string(),
            estimated_time: None,
            download_url: Some(download_url(&artifact.filename)),
            audio_path: Some(artifact.path),
            sample_rate: Some(artifact.sample_rate),
            progress: 1.0,
        },
    };

    Ok(Json(response))
}
