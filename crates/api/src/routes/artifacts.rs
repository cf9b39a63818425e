//! Route definitions for generated audio.

use axum::routing::{delete, get};
use axum::Router;

use crate::handlers::artifacts;
use crate::state::AppState;

/// ```text
/// GET    /download/{filename}   -> download
/// DELETE /cleanup               -> cleanup
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/download/{filename}", get(artifacts::download))
        .route("/cleanup", delete(artifacts::cleanup))
}
