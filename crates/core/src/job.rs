//! Synthesis job model and its state machine.
//!
//! ```text
//! pending ──admit──▶ processing ──complete──▶ completed
//!    │                   │
//!    └──────fail─────────┴──────fail────────▶ failed
//! ```
//!
//! `pending → failed` is reserved for jobs that never got admitted because
//! the dispatcher shut down. Terminal states accept no further updates.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::synthesis::SynthesisRequest;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition can leave this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown status '{other}'. Must be one of: pending, processing, completed, failed"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Reference to the artifact produced by a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobArtifact {
    /// Bare filename inside the artifact store.
    pub filename: String,
    /// Path of the file as written by the artifact store.
    pub path: String,
    pub sample_rate: u32,
}

/// One synthesis request tracked through its lifecycle.
///
/// Snapshots are cheap to clone: the request is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub request: Arc<SynthesisRequest>,
    pub progress: f64,
    pub message: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Advisory duration in seconds.
    pub estimated_duration: f64,
    pub result: Option<JobArtifact>,
    pub error: Option<String>,
}

/// Message attached to newly created jobs.
pub const MSG_SUBMITTED: &str = "Task submitted, waiting for processing";

/// A single mutation applied to a job by its executor.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// The job obtained an execution slot.
    Admit { message: String },
    /// Phase progress reported while processing.
    Progress { progress: f64, message: String },
    /// Inference succeeded and the artifact was stored.
    Complete { artifact: JobArtifact, message: String },
    /// Inference, storage, or admission failed.
    Fail { error: String },
}

impl JobUpdate {
    fn target(&self) -> &'static str {
        match self {
            Self::Admit { .. } => "processing",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "completed",
            Self::Fail { .. } => "failed",
        }
    }
}

/// Rejected state-machine transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Illegal job transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: &'static str,
}

impl From<TransitionError> for CoreError {
    fn from(err: TransitionError) -> Self {
        CoreError::Internal(err.to_string())
    }
}

impl Job {
    /// Create a job in the `pending` state with zero progress.
    pub fn new(
        id: JobId,
        request: SynthesisRequest,
        estimated_duration: f64,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            request: Arc::new(request),
            progress: 0.0,
            message: MSG_SUBMITTED.to_string(),
            created_at: now,
            updated_at: now,
            estimated_duration,
            result: None,
            error: None,
        }
    }

    /// Apply `update` at time `now`, enforcing the state machine.
    ///
    /// Progress is clamped to `[0, 1]` and never decreases. On error the job
    /// is left untouched.
    pub fn apply(&mut self, update: JobUpdate, now: Timestamp) -> Result<(), TransitionError> {
        let illegal = TransitionError {
            from: self.status,
            to: update.target(),
        };

        match (self.status, update) {
            (JobStatus::Pending, JobUpdate::Admit { message }) => {
                self.status = JobStatus::Processing;
                self.message = message;
            }
            (JobStatus::Processing, JobUpdate::Progress { progress, message }) => {
                self.advance_progress(progress);
                self.message = message;
            }
            (JobStatus::Processing, JobUpdate::Complete { artifact, message }) => {
                self.status = JobStatus::Completed;
                self.progress = 1.0;
                self.message = message;
                self.result = Some(artifact);
            }
            (JobStatus::Pending | JobStatus::Processing, JobUpdate::Fail { error }) => {
                self.status = JobStatus::Failed;
                self.message = format!("Task failed: {error}");
                self.error = Some(error);
            }
            _ => return Err(illegal),
        }

        self.updated_at = now;
        Ok(())
    }

    fn advance_progress(&mut self, progress: f64) {
        let clamped = if progress.is_nan() {
            self.progress
        } else {
            progress.clamp(0.0, 1.0)
        };
        self.progress = self.progress.max(clamped);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
