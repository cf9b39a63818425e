use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which synthesis backend the server drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceBackend {
    /// External inference program (see `voxgate_inference::script`).
    Script,
    /// Synthetic tone generator for development.
    Mock,
}

impl FromStr for InferenceBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "script" => Ok(Self::Script),
            "mock" => Ok(Self::Mock),
            other => Err(format!("unknown inference backend '{other}'")),
        }
    }
}

/// Inference backend selection and launch settings.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub backend: InferenceBackend,
    /// Interpreter or binary used to run the script (default: `python3`).
    pub program: String,
    /// Inference script path (default: `scripts/synthesize.py`).
    pub script: PathBuf,
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single-GPU deployment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `300`). Synchronous
    /// synthesis must finish within it.
    pub request_timeout_secs: u64,
    /// Upper bound on the post-shutdown drain in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Jobs allowed to run inference at once (default: `1`).
    pub max_concurrent: usize,
    /// Queued-job limit; `None` means unbounded.
    pub max_queue_depth: Option<usize>,
    /// Artifact directory (default: `api_outputs`).
    pub output_dir: PathBuf,
    /// Adapter root directory (default: `lora`).
    pub lora_dir: PathBuf,
    /// Artifact age before the cleanup sweep deletes it (default: `3600`).
    pub artifact_retention_secs: u64,
    /// Period of the background sweep; `0` disables it (default: `600`).
    pub cleanup_interval_secs: u64,
    /// Age after which finished jobs leave the registry; `0` keeps them
    /// forever (default: `0`).
    pub job_retention_secs: u64,
    pub inference: InferenceConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `8000`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `300`                   |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                    |
    /// | `MAX_CONCURRENT`          | `1`                     |
    /// | `MAX_QUEUE_DEPTH`         | unset (unbounded)       |
    /// | `OUTPUT_DIR`              | `api_outputs`           |
    /// | `LORA_DIR`                | `lora`                  |
    /// | `ARTIFACT_RETENTION_SECS` | `3600`                  |
    /// | `CLEANUP_INTERVAL_SECS`   | `600`                   |
    /// | `JOB_RETENTION_SECS`      | `0`                     |
    /// | `INFERENCE_BACKEND`       | `script`                |
    /// | `INFERENCE_PROGRAM`       | `python3`               |
    /// | `INFERENCE_SCRIPT`        | `scripts/synthesize.py` |
    ///
    /// Panics on malformed values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parse_env("PORT", 8000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = parse_env("REQUEST_TIMEOUT_SECS", 300);
        let shutdown_timeout_secs: u64 = parse_env("SHUTDOWN_TIMEOUT_SECS", 30);

        let max_concurrent: usize = parse_env("MAX_CONCURRENT", 1);
        assert!(max_concurrent >= 1, "MAX_CONCURRENT must be at least 1");

        // 0 and unset both mean unbounded.
        let max_queue_depth = Some(parse_env::<usize>("MAX_QUEUE_DEPTH", 0)).filter(|&d| d > 0);

        let output_dir = PathBuf::from(
            std::env::var("OUTPUT_DIR")
                .unwrap_or_else(|_| voxgate_store::artifacts::DEFAULT_OUTPUT_DIR.into()),
        );
        let lora_dir = PathBuf::from(
            std::env::var("LORA_DIR")
                .unwrap_or_else(|_| voxgate_inference::adapters::DEFAULT_LORA_DIR.into()),
        );

        let artifact_retention_secs: u64 = parse_env("ARTIFACT_RETENTION_SECS", 3600);
        let cleanup_interval_secs: u64 = parse_env("CLEANUP_INTERVAL_SECS", 600);
        let job_retention_secs: u64 = parse_env("JOB_RETENTION_SECS", 0);

        let inference = InferenceConfig {
            backend: parse_env("INFERENCE_BACKEND", InferenceBackend::Script),
            program: std::env::var("INFERENCE_PROGRAM").unwrap_or_else(|_| "python3".into()),
            script: PathBuf::from(
                std::env::var("INFERENCE_SCRIPT")
                    .unwrap_or_else(|_| "scripts/synthesize.py".into()),
            ),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            max_concurrent,
            max_queue_depth,
            output_dir,
            lora_dir,
            artifact_retention_secs,
            cleanup_interval_secs,
            job_retention_secs,
            inference,
        }
    }

    pub fn artifact_retention(&self) -> Duration {
        Duration::from_secs(self.artifact_retention_secs)
    }
}

/// Parse `key` from the environment, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}
