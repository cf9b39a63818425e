//! Periodic expiry of generated audio and finished jobs.
//!
//! Every `interval` the sweep deletes artifacts older than the artifact
//! retention window and, when job retention is enabled, drops terminal jobs
//! from the registry once they have been finished that long.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use voxgate_store::{ArtifactStore, JobRegistry};

/// Sweep settings.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub interval: Duration,
    pub artifact_max_age: Duration,
    /// `None` keeps finished jobs forever.
    pub job_max_age: Option<Duration>,
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    artifacts: Arc<ArtifactStore>,
    registry: Arc<JobRegistry>,
    policy: RetentionPolicy,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = policy.interval.as_secs(),
        artifact_max_age_secs = policy.artifact_max_age.as_secs(),
        job_max_age_secs = policy.job_max_age.map(|d| d.as_secs()),
        "Artifact retention job started"
    );

    let mut interval = tokio::time::interval(policy.interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Artifact retention job stopping");
                break;
            }
            _ = interval.tick() => {
                sweep(&artifacts, &registry, &policy).await;
            }
        }
    }
}

/// One retention pass.
pub async fn sweep(artifacts: &Arc<ArtifactStore>, registry: &JobRegistry, policy: &RetentionPolicy) {
    let store = Arc::clone(artifacts);
    let max_age = policy.artifact_max_age;
    match tokio::task::spawn_blocking(move || store.cleanup(max_age)).await {
        Ok(Ok(deleted)) if deleted > 0 => {
            tracing::info!(deleted, "Artifact retention: deleted old audio files");
        }
        Ok(Ok(_)) => tracing::debug!("Artifact retention: nothing to delete"),
        Ok(Err(e)) => tracing::error!(error = %e, "Artifact retention: cleanup failed"),
        Err(e) => tracing::error!(error = %e, "Artifact retention: cleanup task panicked"),
    }

    if let Some(job_max_age) = policy.job_max_age {
        let Ok(age) = chrono::Duration::from_std(job_max_age) else {
            return;
        };
        let pruned = registry.prune_finished_before(Utc::now() - age);
        if pruned > 0 {
            tracing::info!(pruned, "Job retention: pruned finished jobs");
        }
    }
}
