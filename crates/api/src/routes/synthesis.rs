use axum::routing::post;
use axum::Router;

use crate::handlers::synthesis;
use crate::state::AppState;

/// ```text
/// POST   /synthesize      -> synthesize
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/synthesize", post(synthesis::synthesize))
}
