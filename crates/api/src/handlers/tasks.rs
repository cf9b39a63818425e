//! Handlers for polling and listing tasks.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use voxgate_core::error::CoreError;
use voxgate_core::job::{Job, JobStatus};
use voxgate_core::types::{JobId, Timestamp};

use crate::error::AppResult;
use crate::handlers::download_url;
use crate::state::AppState;

/// Default page size for `GET /tasks`.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Largest page size accepted by `GET /tasks`.
pub const MAX_LIST_LIMIT: i64 = 1000;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Client-facing snapshot of a job.
#[derive(Debug, Serialize)]
pub struct TaskView {
    pub task_id: String,
    pub status: JobStatus,
    pub message: String,
    pub progress: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub estimated_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for TaskView {
    fn from(job: Job) -> Self {
        let (audio_path, download_url, sample_rate) = match job.result {
            Some(artifact) => (
                Some(artifact.path),
                Some(download_url(&artifact.filename)),
                Some(artifact.sample_rate),
            ),
            None => (None, None, None),
        };

        Self {
            task_id: job.id.to_string(),
            status: job.status,
            message: job.message,
            progress: job.progress,
            created_at: job.created_at,
            updated_at: job.updated_at,
            estimated_time: job.estimated_duration,
            audio_path,
            download_url,
            sample_rate,
            error: job.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskView>,
    /// Number of tasks in this response.
    pub total: usize,
    /// Tasks currently processing, across the whole registry.
    pub processing: usize,
    /// Tasks waiting for a slot, across the whole registry.
    pub pending: usize,
    pub max_concurrent: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /task/{id}
///
/// Malformed ids are reported as not found, like unknown ones.
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<TaskView>> {
    let not_found = || CoreError::NotFound {
        entity: "Task",
        id: id.clone(),
    };

    let job_id: JobId = id.parse().map_err(|_| not_found())?;
    let job = state.registry.get(&job_id).ok_or_else(not_found)?;

    Ok(Json(TaskView::from(job)))
}

/// GET /tasks?status=&limit=
///
/// Most recent first. `limit` defaults to 50 and is clamped to 1..=1000.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListTasksQuery>,
) -> AppResult<Json<TaskListResponse>> {
    let filter = params
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<JobStatus>)
        .transpose()?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT) as usize;

    // Counts and listing come from one registry view so they agree.
    let snapshot = state.registry.snapshot(filter, limit);
    let tasks: Vec<TaskView> = snapshot.jobs.into_iter().map(TaskView::from).collect();

    Ok(Json(TaskListResponse {
        total: tasks.len(),
        tasks,
        processing: snapshot.processing,
        pending: snapshot.pending,
        max_concurrent: state.dispatcher.max_concurrent(),
    }))
}
