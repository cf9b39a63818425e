#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use voxgate_api::router::build_app_router;
use voxgate_api::config::{InferenceBackend, InferenceConfig, ServerConfig};
use voxgate_api::state::AppState;
use voxgate_inference::adapters::WEIGHTS_FILE;
use voxgate_inference::{MockSynthesizer, Synthesizer};

/// Build a test `ServerConfig` rooted in `dir`.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and disables the periodic sweep.
pub fn test_config(dir: &Path, max_concurrent: usize) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_concurrent,
        max_queue_depth: None,
        output_dir: dir.join("api_outputs"),
        lora_dir: dir.join("lora"),
        artifact_retention_secs: 3600,
        cleanup_interval_secs: 0,
        job_retention_secs: 0,
        inference: InferenceConfig {
            backend: InferenceBackend::Mock,
            program: "python3".to_string(),
            script: dir.join("synthesize.py"),
        },
    }
}

/// A running test application plus handles to its internals.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mock: Arc<MockSynthesizer>,
    /// Keeps the output and adapter directories alive.
    pub dir: TempDir,
}

impl TestApp {
    pub fn lora_dir(&self) -> std::path::PathBuf {
        self.state.config.lora_dir.clone()
    }

    /// Create an adapter directory under the configured root.
    pub fn add_adapter(&self, name: &str) {
        let dir = self.lora_dir().join(name);
        std::fs::create_dir_all(&dir).expect("create adapter dir");
        std::fs::write(dir.join(WEIGHTS_FILE), b"weights").expect("write weights");
    }
}

/// Build the full application with a mock backend.
pub fn build_test_app(mock: MockSynthesizer, max_concurrent: usize) -> TestApp {
    build_test_app_with(mock, |dir| test_config(dir, max_concurrent))
}

/// Build the full application with a customised configuration.
pub fn build_test_app_with(
    mock: MockSynthesizer,
    configure: impl FnOnce(&Path) -> ServerConfig,
) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = configure(dir.path());
    let mock = Arc::new(mock);
    let synthesizer: Arc<dyn Synthesizer> = mock.clone();

    let state = AppState::build(config, synthesizer).expect("build state");
    let router = build_app_router(state.clone());

    TestApp {
        router,
        state,
        mock,
        dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ---------------------------------------------------------------------------
// Task helpers
// ---------------------------------------------------------------------------

/// Submit an async job and return its task id.
pub async fn submit(app: &Router, body: Value) -> String {
    let response = post_json(app, "/synthesize", body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "submitted");
    json["task_id"].as_str().unwrap().to_string()
}

/// Poll `GET /task/{id}` until the task is terminal.
pub async fn wait_for_terminal(app: &Router, task_id: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let json = body_json(get(app, &format!("/task/{task_id}")).await).await;
        if json["status"] == "completed" || json["status"] == "failed" {
            return json;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {task_id} did not finish: {json}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
