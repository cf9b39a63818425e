//! Entry point for synthesis submissions.
//!
//! Validates client input, resolves the adapter, creates the job, and either
//! queues it (async mode) or executes it inline under a shared execution
//! slot (sync mode).

use std::sync::Arc;

use voxgate_core::error::CoreError;
use voxgate_core::estimation::estimate_duration_secs;
use voxgate_core::job::{JobArtifact, JobUpdate};
use voxgate_core::synthesis::SynthesisInput;
use voxgate_core::types::JobId;
use voxgate_inference::AdapterCatalog;
use voxgate_store::JobRegistry;

use super::dispatcher::Dispatcher;
use super::executor::JobExecutor;

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Queued for the dispatcher; poll with the id.
    Queued {
        job_id: JobId,
        estimated_duration: f64,
    },
    /// Executed inline and completed.
    Completed {
        job_id: JobId,
        artifact: JobArtifact,
    },
}

pub struct SynthesisGateway {
    registry: Arc<JobRegistry>,
    dispatcher: Arc<Dispatcher>,
    executor: Arc<JobExecutor>,
    adapters: Arc<AdapterCatalog>,
}

impl SynthesisGateway {
    pub fn new(
        registry: Arc<JobRegistry>,
        dispatcher: Arc<Dispatcher>,
        executor: Arc<JobExecutor>,
        adapters: Arc<AdapterCatalog>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            executor,
            adapters,
        }
    }

    /// Validate and submit `input`.
    ///
    /// No job is created when validation, adapter resolution, or capacity
    /// checks fail. In sync mode an inference failure is returned as
    /// [`CoreError::Inference`] after the job has been marked failed.
    pub async fn submit(&self, input: SynthesisInput) -> Result<Submission, CoreError> {
        let async_mode = input.async_mode;
        let request = input.validate()?;

        if let Some(name) = request.lora_name.as_deref() {
            if !self.adapters.contains(name) {
                return Err(CoreError::Validation(format!(
                    "LoRA model '{name}' not found"
                )));
            }
        }

        let estimated_duration = estimate_duration_secs(&request);

        if async_mode {
            let reservation = self.dispatcher.reserve()?;
            let job_id = self.registry.create(request, estimated_duration);
            reservation.submit(job_id)?;

            tracing::info!(
                job_id = %job_id,
                estimated_secs = estimated_duration,
                "Job submitted",
            );
            return Ok(Submission::Queued {
                job_id,
                estimated_duration,
            });
        }

        if self.dispatcher.is_shutting_down() {
            return Err(CoreError::Capacity("Server is shutting down".into()));
        }
        let job_id = self.registry.create(request, estimated_duration);
        tracing::info!(job_id = %job_id, "Synchronous job submitted");

        // Detached so a disconnecting client cannot abandon the job mid-run.
        let dispatcher = Arc::clone(&self.dispatcher);
        let executor = Arc::clone(&self.executor);
        let registry = Arc::clone(&self.registry);
        let handle = tokio::spawn(async move {
            let slot = match dispatcher.acquire_slot().await {
                Ok(slot) => slot,
                Err(e) => {
                    registry.update(
                        &job_id,
                        JobUpdate::Fail {
                            error: e.to_string(),
                        },
                    );
                    return Err(e);
                }
            };
            executor.run(job_id, slot).await
        });

        let artifact = handle
            .await
            .map_err(|e| CoreError::Internal(format!("synchronous job task failed: {e}")))??;

        Ok(Submission::Completed { job_id, artifact })
    }
}
