use axum::routing::post;
use axum::Router;

use crate::handlers::bake;
use crate::state::AppState;

/// Routes mounted at `/bake`.
///
/// ```text
/// POST   /{kind}/{game}/{name}   -> submit_bake
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{kind}/{game}/{name}", post(bake::submit_bake))
}
