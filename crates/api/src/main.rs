use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxgate_api::background::artifact_retention::{self, RetentionPolicy};
use voxgate_api::config::{InferenceBackend, ServerConfig};
use voxgate_api::{router, state};
use voxgate_inference::{AdapterCatalog, MockSynthesizer, ScriptSynthesizer, Synthesizer};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voxgate_api=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        max_concurrent = config.max_concurrent,
        output_dir = %config.output_dir.display(),
        lora_dir = %config.lora_dir.display(),
        "Loaded server configuration"
    );

    // --- Inference backend ---
    let synthesizer: Arc<dyn Synthesizer> = match config.inference.backend {
        InferenceBackend::Script => Arc::new(ScriptSynthesizer::new(
            config.inference.program.clone(),
            config.inference.script.clone(),
            AdapterCatalog::new(&config.lora_dir),
        )),
        InferenceBackend::Mock => Arc::new(MockSynthesizer::new()),
    };
    if synthesizer.is_ready() {
        tracing::info!(
            backend = synthesizer.name(),
            model_loaded = synthesizer.model_loaded(),
            "Inference backend ready",
        );
    } else {
        tracing::warn!(
            backend = synthesizer.name(),
            script = %config.inference.script.display(),
            "Inference backend is not ready; jobs will fail until it is",
        );
    }

    // --- App state (starts dispatcher workers) ---
    let state = AppState::build(config.clone(), synthesizer).expect("Failed to build app state");

    // --- Retention sweep ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = (config.cleanup_interval_secs > 0).then(|| {
        let policy = RetentionPolicy {
            interval: Duration::from_secs(config.cleanup_interval_secs),
            artifact_max_age: config.artifact_retention(),
            job_max_age: (config.job_retention_secs > 0)
                .then(|| Duration::from_secs(config.job_retention_secs)),
        };
        tokio::spawn(artifact_retention::run(
            Arc::clone(&state.artifacts),
            Arc::clone(&state.registry),
            policy,
            retention_cancel.clone(),
        ))
    });

    let dispatcher = Arc::clone(&state.dispatcher);
    let app = router::build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    if let Some(handle) = retention_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    dispatcher
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
