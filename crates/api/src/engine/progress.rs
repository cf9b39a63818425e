//! Progress plumbing from a running synthesis into the job registry.

use std::sync::Arc;

use voxgate_core::job::JobUpdate;
use voxgate_core::types::JobId;
use voxgate_inference::ProgressReporter;
use voxgate_store::JobRegistry;

/// Message applied when a job obtains an execution slot.
pub const MSG_STARTED: &str = "Processing started";

/// Phase reported after inference, while the artifact is written.
pub const PHASE_SAVING: (f64, &str) = (0.8, "Saving audio file");

/// Message applied on successful completion.
pub const MSG_COMPLETED: &str = "Speech synthesis completed";

/// Failure recorded for jobs still queued when the dispatcher stops.
pub const MSG_SHUTDOWN: &str = "Server shut down before the task started";

/// Forwards backend progress reports to the registry entry of one job.
pub struct RegistryProgress {
    registry: Arc<JobRegistry>,
    job_id: JobId,
}

impl RegistryProgress {
    pub fn new(registry: Arc<JobRegistry>, job_id: JobId) -> Self {
        Self { registry, job_id }
    }
}

impl ProgressReporter for RegistryProgress {
    fn report(&self, progress: f64, message: &str) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        tracing::trace!(job_id = %self.job_id, progress, message, "Job progress");
        self.registry.update(
            &self.job_id,
            JobUpdate::Progress {
                progress,
                message: message.to_string(),
            },
        );
    }
}
