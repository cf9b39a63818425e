use axum::routing::get;
use axum::Router;

use crate::handlers::loras;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/loras", get(loras::list_loras))
}
