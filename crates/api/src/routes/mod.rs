pub mod artifacts;
pub mod health;
pub mod loras;
pub mod synthesis;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the API route tree.
///
/// Route hierarchy:
///
/// ```text
/// /                        service info
/// /health                  liveness and backend readiness
/// /loras                   discovered adapters
/// /synthesize              submit (async) or execute (sync)
/// /task/{id}               poll one task
/// /tasks                   list tasks (?status=&limit=)
/// /download/{filename}     fetch a generated WAV
/// /cleanup                 delete expired artifacts (DELETE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(loras::router())
        .merge(synthesis::router())
        .merge(tasks::router())
        .merge(artifacts::router())
}
