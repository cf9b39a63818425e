//! Runs one admitted job from `processing` to a terminal state.

use std::any::Any;
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinError;
use voxgate_core::error::CoreError;
use voxgate_core::job::{JobArtifact, JobUpdate};
use voxgate_core::types::JobId;
use voxgate_inference::Synthesizer;
use voxgate_store::{ArtifactStore, JobRegistry};

use super::progress::{RegistryProgress, MSG_COMPLETED, MSG_STARTED, PHASE_SAVING};

/// Executes jobs against the synthesizer and stores their artifacts.
///
/// Shared by the dispatcher workers and the synchronous request path, so
/// both apply identical transitions.
pub struct JobExecutor {
    registry: Arc<JobRegistry>,
    artifacts: Arc<ArtifactStore>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl JobExecutor {
    pub fn new(
        registry: Arc<JobRegistry>,
        artifacts: Arc<ArtifactStore>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            registry,
            artifacts,
            synthesizer,
        }
    }

    pub fn synthesizer(&self) -> &Arc<dyn Synthesizer> {
        &self.synthesizer
    }

    /// Run `job_id` while holding an execution slot.
    ///
    /// Always leaves the job terminal (unless it was not `pending`), and
    /// releases `slot` only after the terminal update is applied.
    pub async fn run(
        &self,
        job_id: JobId,
        slot: OwnedSemaphorePermit,
    ) -> Result<JobArtifact, CoreError> {
        let outcome = self.execute(job_id).await;

        match &outcome {
            Ok(artifact) => {
                self.registry.update(
                    &job_id,
                    JobUpdate::Complete {
                        artifact: artifact.clone(),
                        message: MSG_COMPLETED.to_string(),
                    },
                );
                tracing::info!(
                    job_id = %job_id,
                    filename = %artifact.filename,
                    "Job completed",
                );
            }
            Err(e) => {
                self.registry.update(
                    &job_id,
                    JobUpdate::Fail {
                        error: failure_description(e),
                    },
                );
                tracing::warn!(job_id = %job_id, error = %e, "Job failed");
            }
        }

        drop(slot);
        outcome
    }

    async fn execute(&self, job_id: JobId) -> Result<JobArtifact, CoreError> {
        let job = self.registry.get(&job_id).ok_or_else(|| CoreError::NotFound {
            entity: "Task",
            id: job_id.to_string(),
        })?;

        let admitted = self.registry.update(
            &job_id,
            JobUpdate::Admit {
                message: MSG_STARTED.to_string(),
            },
        );
        if !admitted {
            return Err(CoreError::Internal(format!(
                "task {job_id} was not pending when admitted"
            )));
        }
        tracing::info!(
            job_id = %job_id,
            backend = self.synthesizer.name(),
            lora = job.request.lora_name.as_deref().unwrap_or("none"),
            "Job admitted",
        );

        let request = Arc::clone(&job.request);
        let synthesizer = Arc::clone(&self.synthesizer);
        let reporter = RegistryProgress::new(Arc::clone(&self.registry), job_id);
        let waveform = tokio::task::spawn_blocking(move || {
            synthesizer.synthesize(&request, &reporter)
        })
        .await
        .map_err(inference_join_error)??;

        if waveform.is_empty() {
            return Err(CoreError::Inference("Inference produced no audio".into()));
        }

        let (progress, message) = PHASE_SAVING;
        self.registry.update(
            &job_id,
            JobUpdate::Progress {
                progress,
                message: message.to_string(),
            },
        );

        let artifacts = Arc::clone(&self.artifacts);
        let artifact = tokio::task::spawn_blocking(move || artifacts.save(&job_id, &waveform))
            .await
            .map_err(|e| CoreError::Internal(format!("artifact task failed: {e}")))??;

        Ok(artifact)
    }
}

/// Text stored in the job's `error` field.
fn failure_description(err: &CoreError) -> String {
    match err {
        CoreError::Inference(msg) | CoreError::Internal(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn inference_join_error(err: JoinError) -> CoreError {
    if err.is_panic() {
        let reason = panic_message(err.into_panic());
        CoreError::Inference(format!("Inference panicked: {reason}"))
    } else {
        CoreError::Internal(format!("inference task was cancelled: {err}"))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
