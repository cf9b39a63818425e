//! Route definitions for task polling.

use axum::routing::get;
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// ```text
/// GET    /task/{id}       -> get_task
/// GET    /tasks           -> list_tasks
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/task/{id}", get(tasks::get_task))
        .route("/tasks", get(tasks::list_tasks))
}
