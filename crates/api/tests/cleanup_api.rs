//! Integration tests for artifact download and manual cleanup.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{body_json, build_test_app, delete, get, submit, wait_for_terminal};
use serde_json::json;
use voxgate_core::audio::Waveform;
use voxgate_core::types::JobId;
use voxgate_inference::MockSynthesizer;

fn short_tone() -> Waveform {
    Waveform::new(vec![0.0, 0.25, 0.5, 0.25, 0.0], 16_000)
}

// ---------------------------------------------------------------------------
// Test: cleanup removes expired artifacts and keeps fresh ones
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_deletes_only_expired_artifacts() {
    let app = build_test_app(MockSynthesizer::new(), 1);

    let fresh_id = submit(&app.router, json!({"text": "fresh"})).await;
    let fresh = wait_for_terminal(&app.router, &fresh_id).await;
    let fresh_url = fresh["download_url"].as_str().unwrap().to_string();

    // Two hours old with a one hour retention window.
    let old = app
        .state
        .artifacts
        .save_at(&JobId::new(), &short_tone(), Utc::now().timestamp() - 7200)
        .unwrap();
    let old_url = format!("/download/{}", old.filename);
    assert_eq!(get(&app.router, &old_url).await.status(), StatusCode::OK);

    let response = delete(&app.router, "/cleanup").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["deleted_count"], 1);
    assert_eq!(json["message"], "Deleted 1 old audio files");

    let response = get(&app.router, &old_url).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    assert_eq!(get(&app.router, &fresh_url).await.status(), StatusCode::OK);

    // The job record outlives its file.
    let task = body_json(get(&app.router, &format!("/task/{fresh_id}")).await).await;
    assert_eq!(task["status"], "completed");
}

// ---------------------------------------------------------------------------
// Test: cleanup leaves unrelated files alone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_ignores_foreign_files() {
    let app = build_test_app(MockSynthesizer::new(), 1);
    let foreign = app.state.artifacts.dir().join("notes.txt");
    std::fs::write(&foreign, b"keep me").unwrap();

    let json = body_json(delete(&app.router, "/cleanup").await).await;
    assert_eq!(json["deleted_count"], 0);
    assert!(foreign.exists());
}

// ---------------------------------------------------------------------------
// Test: download rejects unknown and non-artifact names
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_rejects_unknown_and_foreign_names() {
    let app = build_test_app(MockSynthesizer::new(), 1);
    std::fs::write(app.state.artifacts.dir().join("notes.txt"), b"secret").unwrap();

    for uri in [
        "/download/tts_000000000000_1700000000.wav",
        "/download/notes.txt",
        "/download/..%2F..%2Fetc%2Fpasswd",
    ] {
        let response = get(&app.router, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body_json(response).await["code"], "NOT_FOUND", "{uri}");
    }
}
