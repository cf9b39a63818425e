use std::sync::Arc;

use voxgate_core::error::CoreError;
use voxgate_inference::{AdapterCatalog, Synthesizer};
use voxgate_store::{ArtifactStore, JobRegistry};

use crate::config::ServerConfig;
use crate::engine::dispatcher::Dispatcher;
use crate::engine::executor::JobExecutor;
use crate::engine::gateway::SynthesisGateway;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Every job known to this process.
    pub registry: Arc<JobRegistry>,
    /// Generated audio files.
    pub artifacts: Arc<ArtifactStore>,
    /// Adapters discovered under `LORA_DIR`.
    pub adapters: Arc<AdapterCatalog>,
    /// Active inference backend.
    pub synthesizer: Arc<dyn Synthesizer>,
    /// Worker pool and execution slots.
    pub dispatcher: Arc<Dispatcher>,
    /// Submission entry point.
    pub gateway: Arc<SynthesisGateway>,
}

impl AppState {
    /// Wire the registry, artifact store, and engine around `synthesizer`
    /// and start the dispatcher workers.
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(config: ServerConfig, synthesizer: Arc<dyn Synthesizer>) -> Result<Self, CoreError> {
        let registry = Arc::new(JobRegistry::new());
        let artifacts = Arc::new(ArtifactStore::open(&config.output_dir).map_err(|e| {
            CoreError::Internal(format!(
                "cannot open output directory {}: {e}",
                config.output_dir.display()
            ))
        })?);
        let adapters = Arc::new(AdapterCatalog::new(&config.lora_dir));

        let executor = Arc::new(JobExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&artifacts),
            Arc::clone(&synthesizer),
        ));
        let dispatcher = Arc::new(Dispatcher::start(
            Arc::clone(&registry),
            Arc::clone(&executor),
            config.max_concurrent,
            config.max_queue_depth,
        ));
        let gateway = Arc::new(SynthesisGateway::new(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            executor,
            Arc::clone(&adapters),
        ));

        Ok(Self {
            config: Arc::new(config),
            registry,
            artifacts,
            adapters,
            synthesizer,
            dispatcher,
            gateway,
        })
    }
}
