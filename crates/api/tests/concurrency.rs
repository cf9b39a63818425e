//! Integration tests for the concurrency ceiling, fault isolation and shutdown.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, post_json, submit, wait_for_terminal};
use serde_json::json;
use voxgate_api::engine::progress::MSG_SHUTDOWN;
use voxgate_core::job::JobStatus;
use voxgate_core::types::JobId;
use voxgate_inference::MockSynthesizer;

// ---------------------------------------------------------------------------
// Test: a ceiling of one serializes inference
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ceiling_of_one_runs_jobs_one_at_a_time() {
    let app = build_test_app(
        MockSynthesizer::new().with_delay(Duration::from_millis(40)),
        1,
    );

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(submit(&app.router, json!({"text": format!("job {i}")})).await);
    }

    let mut completed_at = Vec::new();
    for id in &ids {
        let task = wait_for_terminal(&app.router, id).await;
        assert_eq!(task["status"], "completed");
        let job = app.state.registry.get(&id.parse::<JobId>().unwrap()).unwrap();
        completed_at.push(job.updated_at);
    }

    assert_eq!(app.mock.peak_concurrency(), 1);
    assert_eq!(app.mock.calls(), 5);
    // Admission is FIFO, so completions follow submission order.
    assert!(completed_at.windows(2).all(|w| w[0] <= w[1]));
}

// ---------------------------------------------------------------------------
// Test: the ceiling bounds but does not serialize
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ceiling_of_two_never_exceeded() {
    let app = build_test_app(
        MockSynthesizer::new().with_delay(Duration::from_millis(60)),
        2,
    );

    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(submit(&app.router, json!({"text": format!("job {i}")})).await);
    }
    for id in &ids {
        assert_eq!(wait_for_terminal(&app.router, id).await["status"], "completed");
    }

    assert!(app.mock.peak_concurrency() <= 2);
    assert_eq!(app.mock.calls(), 6);
}

// ---------------------------------------------------------------------------
// Test: sync requests share the ceiling with queued jobs
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sync_and_async_share_the_ceiling() {
    let app = build_test_app(
        MockSynthesizer::new().with_delay(Duration::from_millis(100)),
        1,
    );

    let queued = submit(&app.router, json!({"text": "queued"})).await;
    let response = post_json(
        &app.router,
        "/synthesize",
        json!({"text": "inline", "async_mode": false}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "success");

    assert_eq!(wait_for_terminal(&app.router, &queued).await["status"], "completed");
    assert_eq!(app.mock.peak_concurrency(), 1);
}

// ---------------------------------------------------------------------------
// Test: a failing or panicking job does not affect its neighbours
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failures_are_isolated_per_job() {
    let app = build_test_app(
        MockSynthesizer::new()
            .with_failure_marker("FAIL")
            .with_panic_marker("PANIC")
            .with_silent_marker("SILENT"),
        1,
    );

    let before = submit(&app.router, json!({"text": "before"})).await;
    let failing = submit(&app.router, json!({"text": "FAIL"})).await;
    let panicking = submit(&app.router, json!({"text": "PANIC"})).await;
    let silent = submit(&app.router, json!({"text": "SILENT"})).await;
    let after = submit(&app.router, json!({"text": "after"})).await;

    assert_eq!(wait_for_terminal(&app.router, &before).await["status"], "completed");

    let task = wait_for_terminal(&app.router, &failing).await;
    assert_eq!(task["status"], "failed");

    let task = wait_for_terminal(&app.router, &panicking).await;
    assert_eq!(task["status"], "failed");
    assert!(task["error"]
        .as_str()
        .unwrap()
        .starts_with("Inference panicked"));

    let task = wait_for_terminal(&app.router, &silent).await;
    assert_eq!(task["status"], "failed");
    assert_eq!(task["error"], "Inference produced no audio");

    assert_eq!(wait_for_terminal(&app.router, &after).await["status"], "completed");

    // The panic did not leak a slot.
    let health = body_json(get(&app.router, "/health").await).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(app.state.registry.count_by_state(JobStatus::Processing), 0);
}

// ---------------------------------------------------------------------------
// Test: observed progress never decreases
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn progress_is_monotonic_while_polling() {
    let app = build_test_app(
        MockSynthesizer::new().with_delay(Duration::from_millis(150)),
        1,
    );
    let id = submit(&app.router, json!({"text": "watch me"})).await;

    let mut observed = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let task = body_json(get(&app.router, &format!("/task/{id}")).await).await;
        observed.push(task["progress"].as_f64().unwrap());
        if task["status"] == "completed" || task["status"] == "failed" {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{observed:?}");
    assert_eq!(observed.last().copied(), Some(1.0));
}

// ---------------------------------------------------------------------------
// Test: shutdown drains in-flight work and fails queued jobs
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_fails_jobs_that_never_started() {
    let app = build_test_app(
        MockSynthesizer::new().with_delay(Duration::from_millis(200)),
        1,
    );

    let running = submit(&app.router, json!({"text": "running"})).await;
    let waiting_a = submit(&app.router, json!({"text": "waiting a"})).await;
    let waiting_b = submit(&app.router, json!({"text": "waiting b"})).await;

    let running_id: JobId = running.parse().unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while app.state.registry.get(&running_id).unwrap().status != JobStatus::Processing {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    app.state.dispatcher.shutdown(Duration::from_secs(5)).await;
    assert!(app.state.dispatcher.is_shutting_down());

    let task = body_json(get(&app.router, &format!("/task/{running}")).await).await;
    assert_eq!(task["status"], "completed");

    for id in [waiting_a, waiting_b] {
        let task = body_json(get(&app.router, &format!("/task/{id}")).await).await;
        assert_eq!(task["status"], "failed");
        assert_eq!(task["error"], MSG_SHUTDOWN);
    }

    // New work is refused in both modes.
    let response = post_json(&app.router, "/synthesize", json!({"text": "late"})).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "CAPACITY_ERROR");

    let response = post_json(
        &app.router,
        "/synthesize",
        json!({"text": "late", "async_mode": false}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ---------------------------------------------------------------------------
// Test: task listings never report more running jobs than the ceiling
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn listings_never_exceed_the_ceiling() {
    for max_concurrent in [1, 2] {
        let app = build_test_app(
            MockSynthesizer::new().with_delay(Duration::from_millis(30)),
            max_concurrent,
        );

        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(submit(&app.router, json!({"text": format!("job {i}")})).await);
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
        loop {
            let all = body_json(get(&app.router, "/tasks").await).await;
            let processing = all["processing"].as_u64().unwrap() as usize;
            assert!(processing <= max_concurrent, "{all}");

            let running = body_json(get(&app.router, "/tasks?status=processing").await).await;
            let listed = running["total"].as_u64().unwrap();
            assert_eq!(listed, running["processing"].as_u64().unwrap(), "{running}");
            assert!(listed as usize <= max_concurrent, "{running}");

            if all["processing"] == 0 && all["pending"] == 0 {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline);
        }

        for id in &ids {
            assert_eq!(wait_for_terminal(&app.router, id).await["status"], "completed");
        }
    }
}

// ---------------------------------------------------------------------------
// Test: a dequeued job waiting for a slot still counts as queued
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queue_depth_counts_jobs_waiting_for_a_slot() {
    let app = build_test_app(
        MockSynthesizer::new().with_delay(Duration::from_millis(300)),
        1,
    );

    let router = app.router.clone();
    let inline = tokio::spawn(async move {
        post_json(
            &router,
            "/synthesize",
            json!({"text": "inline", "async_mode": false}),
        )
        .await
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while app.state.registry.count_by_state(JobStatus::Processing) != 1 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // The worker dequeues this job at once but cannot get the only slot.
    let queued = submit(&app.router, json!({"text": "queued"})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.state.dispatcher.queue_depth(), 1);

    let response = inline.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(wait_for_terminal(&app.router, &queued).await["status"], "completed");
    assert_eq!(app.state.dispatcher.queue_depth(), 0);
}
